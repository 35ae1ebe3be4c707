//! Live database tests for the cart engine and product stock
//! reconciliation. Each test runs against a fresh schema.

use duka_core::{CartIdentity, NewImage, NewProduct, NewVariant, ProductPatch, VariantPatch};
use duka_db::{AddItemOptions, DbError, ProductListFilters, UpdateProductOptions};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

fn new_product(name: &str, slug: &str, price: &str) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        slug: slug.to_string(),
        category: "OTHER".to_string(),
        description: None,
        brand: None,
        price: price.parse().expect("price"),
        compare_at_price: None,
        currency: None,
        track_inventory: true,
        stock: 0,
        is_active: true,
        is_featured: false,
        meta_title: None,
        meta_description: None,
    }
}

fn new_variant(sku: &str, stock: i32) -> NewVariant {
    NewVariant {
        sku: Some(sku.to_string()),
        size: None,
        color: None,
        price_override: None,
        stock,
    }
}

fn variant_patch(id: Option<i64>, sku: Option<&str>, stock: i32) -> VariantPatch {
    VariantPatch {
        id,
        sku: sku.map(ToString::to_string),
        size: None,
        color: None,
        price_override: None,
        stock,
    }
}

fn add_options(quantity: i32) -> AddItemOptions {
    AddItemOptions {
        quantity,
        currency_hint: None,
    }
}

// ---------------------------------------------------------------------------
// Cart engine
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn double_add_accumulates_into_one_line(pool: PgPool) {
    let product = duka_db::create_product(&pool, &new_product("Tee", "tee", "10.00"), &[], &[])
        .await
        .expect("create product");
    let identity = CartIdentity::Guest(Uuid::new_v4());

    duka_db::add_cart_item(&pool, identity, product.product.id, None, add_options(2))
        .await
        .expect("first add");
    let graph = duka_db::add_cart_item(&pool, identity, product.product.id, None, add_options(2))
        .await
        .expect("second add");

    assert_eq!(graph.items.len(), 1);
    assert_eq!(graph.items[0].quantity, 4);
    assert_eq!(graph.total_items(), 4);
}

#[sqlx::test(migrations = "../../migrations")]
async fn null_variant_line_is_distinct_from_variant_line(pool: PgPool) {
    let product = duka_db::create_product(
        &pool,
        &new_product("Hoodie", "hoodie", "80.00"),
        &[new_variant("HOOD-M", 5)],
        &[],
    )
    .await
    .expect("create product");
    let variant_id = product.variants[0].id;
    let identity = CartIdentity::Guest(Uuid::new_v4());

    duka_db::add_cart_item(&pool, identity, product.product.id, None, add_options(1))
        .await
        .expect("add without variant");
    let graph = duka_db::add_cart_item(
        &pool,
        identity,
        product.product.id,
        Some(variant_id),
        add_options(1),
    )
    .await
    .expect("add with variant");

    assert_eq!(graph.items.len(), 2, "variant and no-variant are separate lines");
}

#[sqlx::test(migrations = "../../migrations")]
async fn unit_price_is_snapshotted_at_first_insert(pool: PgPool) {
    let product = duka_db::create_product(&pool, &new_product("Bag", "bag", "50.00"), &[], &[])
        .await
        .expect("create product");
    let identity = CartIdentity::User(Uuid::new_v4());

    duka_db::add_cart_item(&pool, identity, product.product.id, None, add_options(1))
        .await
        .expect("first add");

    // Price change after the line exists must not touch the snapshot.
    let patch = ProductPatch {
        price: Some("75.00".parse::<Decimal>().expect("price")),
        ..ProductPatch::default()
    };
    duka_db::update_product(
        &pool,
        product.product.id,
        &patch,
        &UpdateProductOptions::default(),
    )
    .await
    .expect("price update");

    let graph = duka_db::add_cart_item(&pool, identity, product.product.id, None, add_options(1))
        .await
        .expect("second add");

    assert_eq!(graph.items.len(), 1);
    assert_eq!(graph.items[0].unit_price, "50.00".parse::<Decimal>().expect("decimal"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn variant_not_belonging_to_product_is_not_found(pool: PgPool) {
    let owner = duka_db::create_product(
        &pool,
        &new_product("Owner", "owner", "10.00"),
        &[new_variant("OWN-1", 2)],
        &[],
    )
    .await
    .expect("owner product");
    let other = duka_db::create_product(&pool, &new_product("Other", "other", "10.00"), &[], &[])
        .await
        .expect("other product");

    let result = duka_db::add_cart_item(
        &pool,
        CartIdentity::Guest(Uuid::new_v4()),
        other.product.id,
        Some(owner.variants[0].id),
        add_options(1),
    )
    .await;

    assert!(matches!(result, Err(DbError::NotFound)));
}

#[sqlx::test(migrations = "../../migrations")]
async fn clear_cart_without_cart_is_a_noop_success(pool: PgPool) {
    let identity = CartIdentity::Guest(Uuid::new_v4());

    duka_db::clear_cart(&pool, identity).await.expect("clear");

    let cart_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM carts")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(cart_count, 0, "clear must not create a cart");
}

#[sqlx::test(migrations = "../../migrations")]
async fn clear_cart_empties_items_but_keeps_cart(pool: PgPool) {
    let product = duka_db::create_product(&pool, &new_product("Cap", "cap", "15.00"), &[], &[])
        .await
        .expect("create product");
    let identity = CartIdentity::Guest(Uuid::new_v4());

    duka_db::add_cart_item(&pool, identity, product.product.id, None, add_options(3))
        .await
        .expect("add");
    duka_db::clear_cart(&pool, identity).await.expect("clear");

    let graph = duka_db::get_cart(&pool, identity)
        .await
        .expect("get")
        .expect("cart row survives the clear");
    assert!(graph.items.is_empty());
    assert_eq!(graph.cart.status, "ACTIVE");
}

#[sqlx::test(migrations = "../../migrations")]
async fn user_and_guest_identities_get_separate_carts(pool: PgPool) {
    let product = duka_db::create_product(&pool, &new_product("Mug", "mug", "8.00"), &[], &[])
        .await
        .expect("create product");
    let id = Uuid::new_v4();

    let user_graph = duka_db::add_cart_item(
        &pool,
        CartIdentity::User(id),
        product.product.id,
        None,
        add_options(1),
    )
    .await
    .expect("user add");
    let guest_graph = duka_db::add_cart_item(
        &pool,
        CartIdentity::Guest(id),
        product.product.id,
        None,
        add_options(1),
    )
    .await
    .expect("guest add");

    assert_ne!(user_graph.cart.id, guest_graph.cart.id);
}

// ---------------------------------------------------------------------------
// Stock reconciliation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn create_with_variants_stores_summed_stock(pool: PgPool) {
    let graph = duka_db::create_product(
        &pool,
        &new_product("Sneaker", "sneaker", "120.00"),
        &[new_variant("SNK-42", 3), new_variant("SNK-43", 5)],
        &[],
    )
    .await
    .expect("create product");

    assert_eq!(graph.product.stock, 8);
    assert_eq!(graph.variants.len(), 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn empty_variant_list_with_delete_missing_zeroes_stock(pool: PgPool) {
    let graph = duka_db::create_product(
        &pool,
        &new_product("Dress", "dress", "200.00"),
        &[new_variant("DRS-S", 3), new_variant("DRS-M", 5)],
        &[],
    )
    .await
    .expect("create product");

    let options = UpdateProductOptions {
        variants: Some(Vec::new()),
        delete_missing_variants: true,
        ..UpdateProductOptions::default()
    };
    let updated = duka_db::update_product(
        &pool,
        graph.product.id,
        &ProductPatch::default(),
        &options,
    )
    .await
    .expect("update");

    assert_eq!(updated.product.stock, 0);
    assert!(updated.variants.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn manual_stock_applies_only_when_variants_untouched(pool: PgPool) {
    let graph = duka_db::create_product(&pool, &new_product("Belt", "belt", "30.00"), &[], &[])
        .await
        .expect("create product");

    let patch = ProductPatch {
        stock: Some(20),
        ..ProductPatch::default()
    };
    let updated = duka_db::update_product(
        &pool,
        graph.product.id,
        &patch,
        &UpdateProductOptions::default(),
    )
    .await
    .expect("manual stock");
    assert_eq!(updated.product.stock, 20);

    // Same patch with a variant list supplied: reconciliation wins.
    let options = UpdateProductOptions {
        variants: Some(vec![variant_patch(None, Some("BLT-1"), 4)]),
        delete_missing_variants: false,
        ..UpdateProductOptions::default()
    };
    let updated = duka_db::update_product(&pool, graph.product.id, &patch, &options)
        .await
        .expect("reconcile");
    assert_eq!(updated.product.stock, 4);
}

#[sqlx::test(migrations = "../../migrations")]
async fn reconcile_matches_by_id_then_sku_then_inserts(pool: PgPool) {
    let graph = duka_db::create_product(
        &pool,
        &new_product("Jeans", "jeans", "90.00"),
        &[new_variant("JNS-30", 2), new_variant("JNS-32", 3)],
        &[],
    )
    .await
    .expect("create product");
    let by_id = graph.variants[0].id;

    let options = UpdateProductOptions {
        variants: Some(vec![
            variant_patch(Some(by_id), Some("JNS-30"), 7),
            variant_patch(None, Some("JNS-32"), 1),
            variant_patch(None, Some("JNS-34"), 2),
        ]),
        delete_missing_variants: false,
        ..UpdateProductOptions::default()
    };
    let updated = duka_db::update_product(
        &pool,
        graph.product.id,
        &ProductPatch::default(),
        &options,
    )
    .await
    .expect("reconcile");

    assert_eq!(updated.variants.len(), 3, "sku match must not duplicate");
    assert_eq!(updated.product.stock, 10);
}

#[sqlx::test(migrations = "../../migrations")]
async fn sku_less_id_less_entry_is_inserted(pool: PgPool) {
    let graph = duka_db::create_product(&pool, &new_product("Scarf", "scarf", "25.00"), &[], &[])
        .await
        .expect("create product");

    let options = UpdateProductOptions {
        variants: Some(vec![variant_patch(None, None, 6)]),
        delete_missing_variants: false,
        ..UpdateProductOptions::default()
    };
    let updated = duka_db::update_product(
        &pool,
        graph.product.id,
        &ProductPatch::default(),
        &options,
    )
    .await
    .expect("reconcile");

    assert_eq!(updated.variants.len(), 1);
    assert_eq!(updated.product.stock, 6);
}

#[sqlx::test(migrations = "../../migrations")]
async fn delete_missing_prunes_unkept_variants(pool: PgPool) {
    let graph = duka_db::create_product(
        &pool,
        &new_product("Slides", "slides", "40.00"),
        &[new_variant("SLD-40", 2), new_variant("SLD-41", 3)],
        &[],
    )
    .await
    .expect("create product");
    let keep = graph.variants[0].id;

    let options = UpdateProductOptions {
        variants: Some(vec![variant_patch(Some(keep), Some("SLD-40"), 2)]),
        delete_missing_variants: true,
        ..UpdateProductOptions::default()
    };
    let updated = duka_db::update_product(
        &pool,
        graph.product.id,
        &ProductPatch::default(),
        &options,
    )
    .await
    .expect("reconcile");

    assert_eq!(updated.variants.len(), 1);
    assert_eq!(updated.variants[0].id, keep);
    assert_eq!(updated.product.stock, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn foreign_variant_id_rolls_back_the_whole_update(pool: PgPool) {
    let owner = duka_db::create_product(
        &pool,
        &new_product("Owner", "owner", "10.00"),
        &[new_variant("OWN-1", 2)],
        &[],
    )
    .await
    .expect("owner product");
    let target = duka_db::create_product(&pool, &new_product("Target", "target", "10.00"), &[], &[])
        .await
        .expect("target product");

    let patch = ProductPatch {
        name: Some("Renamed".to_string()),
        ..ProductPatch::default()
    };
    let options = UpdateProductOptions {
        variants: Some(vec![variant_patch(Some(owner.variants[0].id), None, 9)]),
        delete_missing_variants: false,
        ..UpdateProductOptions::default()
    };
    let result = duka_db::update_product(&pool, target.product.id, &patch, &options).await;
    assert!(matches!(result, Err(DbError::NotFound)));

    // The field patch must not have been committed.
    let reloaded = duka_db::get_product(&pool, target.product.id)
        .await
        .expect("get")
        .expect("product");
    assert_eq!(reloaded.product.name, "Target");
}

// ---------------------------------------------------------------------------
// Meta fallback and listing
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn rename_refreshes_meta_title_only_when_none_stored(pool: PgPool) {
    let graph = duka_db::create_product(&pool, &new_product("Old Name", "old-name", "10.00"), &[], &[])
        .await
        .expect("create product");
    // Create falls back meta_title to the name.
    assert_eq!(graph.product.meta_title.as_deref(), Some("Old Name"));

    // Clear the stored meta title, then rename.
    sqlx::query("UPDATE products SET meta_title = NULL WHERE id = $1")
        .bind(graph.product.id)
        .execute(&pool)
        .await
        .expect("clear meta");
    let patch = ProductPatch {
        name: Some("New Name".to_string()),
        ..ProductPatch::default()
    };
    let updated = duka_db::update_product(
        &pool,
        graph.product.id,
        &patch,
        &UpdateProductOptions::default(),
    )
    .await
    .expect("rename");
    assert_eq!(updated.product.meta_title.as_deref(), Some("New Name"));

    // With a stored meta title, renaming leaves it alone.
    let patch = ProductPatch {
        name: Some("Third Name".to_string()),
        ..ProductPatch::default()
    };
    let updated = duka_db::update_product(
        &pool,
        graph.product.id,
        &patch,
        &UpdateProductOptions::default(),
    )
    .await
    .expect("rename again");
    assert_eq!(updated.product.meta_title.as_deref(), Some("New Name"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn list_filters_by_category_and_counts_total(pool: PgPool) {
    let mut hoodie = new_product("Zip Hoodie", "zip-hoodie", "80.00");
    hoodie.category = "HOODIES".to_string();
    duka_db::create_product(&pool, &hoodie, &[], &[])
        .await
        .expect("hoodie");
    duka_db::create_product(&pool, &new_product("Plain Tee", "plain-tee", "20.00"), &[], &[])
        .await
        .expect("tee");

    let filters = ProductListFilters {
        category: Some("HOODIES"),
        limit: 10,
        ..ProductListFilters::default()
    };
    let (graphs, total) = duka_db::list_products(&pool, &filters)
        .await
        .expect("list");

    assert_eq!(total, 1);
    assert_eq!(graphs.len(), 1);
    assert_eq!(graphs[0].product.slug, "zip-hoodie");
}

#[sqlx::test(migrations = "../../migrations")]
async fn delete_product_removes_graph_and_reports_absence(pool: PgPool) {
    let graph = duka_db::create_product(
        &pool,
        &new_product("Gone", "gone", "10.00"),
        &[new_variant("GONE-1", 1)],
        &[NewImage {
            url: "https://cdn.example.com/gone.jpg".to_string(),
            alt: None,
        }],
    )
    .await
    .expect("create product");

    assert!(duka_db::delete_product(&pool, graph.product.id)
        .await
        .expect("delete"));
    assert!(!duka_db::delete_product(&pool, graph.product.id)
        .await
        .expect("second delete"));
    assert!(duka_db::get_product(&pool, graph.product.id)
        .await
        .expect("get")
        .is_none());
}
