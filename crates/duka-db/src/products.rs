//! Database operations for `products`, `product_images`, and
//! `product_variants`, including the stock reconciliation that keeps
//! `products.stock` equal to the sum of variant stock whenever variants
//! exist.

use chrono::{DateTime, Utc};
use duka_core::{
    catalog::meta_or_fallback, normalize_slug, total_variant_stock, NewImage, NewProduct,
    NewVariant, ProductPatch, VariantPatch,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub category: String,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub currency: String,
    pub track_inventory: bool,
    /// Aggregate stock; equal to the sum of variant stock whenever the
    /// product has variants, authoritative on its own otherwise.
    pub stock: i32,
    pub is_active: bool,
    pub is_featured: bool,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `product_images` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ImageRow {
    pub id: i64,
    pub product_id: i64,
    pub url: String,
    pub alt: Option<String>,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `product_variants` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VariantRow {
    pub id: i64,
    pub product_id: i64,
    pub sku: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub price_override: Option<Decimal>,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A product with its images (by sort order) and variants.
#[derive(Debug, Clone)]
pub struct ProductGraph {
    pub product: ProductRow,
    pub images: Vec<ImageRow>,
    pub variants: Vec<VariantRow>,
}

/// Filters for the product listing.
#[derive(Debug, Clone, Default)]
pub struct ProductListFilters<'a> {
    /// Case-insensitive substring match over name, description, and brand.
    pub search: Option<&'a str>,
    pub category: Option<&'a str>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

/// Flags and attachments for a product update beyond the field patch.
#[derive(Debug, Clone, Default)]
pub struct UpdateProductOptions {
    /// Variant reconciliation list; `None` leaves variants (and the
    /// variant-derived stock) untouched. `Some` with an empty list is a
    /// valid call and still triggers stock recomputation.
    pub variants: Option<Vec<VariantPatch>>,
    /// Delete variants of this product that the list did not keep.
    pub delete_missing_variants: bool,
    /// Pre-resolved image URLs to attach.
    pub images: Vec<NewImage>,
    /// Drop existing images before attaching the new ones.
    pub replace_images: bool,
}

const PRODUCT_COLUMNS: &str = "id, name, slug, category, description, brand, price, \
     compare_at_price, currency, track_inventory, stock, is_active, is_featured, \
     meta_title, meta_description, created_at, updated_at";

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// Creates a product with its images and variants in one transaction.
///
/// When `variants` is non-empty the persisted `stock` is the sum of the
/// variant stock values; the scalar `new_product.stock` applies otherwise.
/// A consumer can never observe the product with a stock that disagrees
/// with its variants.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails, including unique
/// violations on `slug` or variant `sku` (mapped to a conflict by the
/// boundary).
pub async fn create_product(
    pool: &PgPool,
    new_product: &NewProduct,
    variants: &[NewVariant],
    images: &[NewImage],
) -> Result<ProductGraph, DbError> {
    let stock = if variants.is_empty() {
        new_product.stock.max(0)
    } else {
        total_variant_stock(variants)
    };
    let slug = normalize_slug(&new_product.slug);
    let meta_title = new_product.resolved_meta_title();
    let meta_description = new_product.resolved_meta_description();

    let mut tx = pool.begin().await?;

    let product_id: i64 = sqlx::query_scalar(
        "INSERT INTO products \
             (name, slug, category, description, brand, price, compare_at_price, \
              currency, track_inventory, stock, is_active, is_featured, \
              meta_title, meta_description) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, \
                 COALESCE($8, 'GHS'), $9, $10, $11, $12, $13, $14) \
         RETURNING id",
    )
    .bind(&new_product.name)
    .bind(&slug)
    .bind(&new_product.category)
    .bind(&new_product.description)
    .bind(&new_product.brand)
    .bind(new_product.price)
    .bind(new_product.compare_at_price)
    .bind(&new_product.currency)
    .bind(new_product.track_inventory)
    .bind(stock)
    .bind(new_product.is_active)
    .bind(new_product.is_featured)
    .bind(&meta_title)
    .bind(&meta_description)
    .fetch_one(&mut *tx)
    .await?;

    insert_images(&mut tx, product_id, images, 0, &new_product.name).await?;

    for variant in variants {
        sqlx::query(
            "INSERT INTO product_variants (product_id, sku, size, color, price_override, stock) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(product_id)
        .bind(&variant.sku)
        .bind(&variant.size)
        .bind(&variant.color)
        .bind(variant.price_override)
        .bind(variant.stock.max(0))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    load_product_graph(pool, product_id)
        .await?
        .ok_or(DbError::NotFound)
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// Applies a sparse field patch and reconciles variants and stock in one
/// transaction.
///
/// Variant entries are matched by id (must belong to this product), then by
/// SKU within the product, and inserted as new rows otherwise. When
/// `delete_missing_variants` is set, variants the list did not keep are
/// removed. Whenever a variant list was supplied — even an empty one —
/// `stock` is recomputed as the sum over the variants that remain; the
/// manual `patch.stock` override only applies when variants were not
/// touched by this call.
///
/// A failure anywhere (e.g. a variant id that does not belong to the
/// product) rolls back the entire update, including the field patch.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the product or a referenced variant id
/// does not exist, [`DbError::Sqlx`] on store failure.
pub async fn update_product(
    pool: &PgPool,
    product_id: i64,
    patch: &ProductPatch,
    options: &UpdateProductOptions,
) -> Result<ProductGraph, DbError> {
    let mut tx = pool.begin().await?;

    let current = fetch_product_for_update(&mut tx, product_id)
        .await?
        .ok_or(DbError::NotFound)?;

    apply_field_patch(&mut tx, &current, patch).await?;

    if options.replace_images && !options.images.is_empty() {
        sqlx::query("DELETE FROM product_images WHERE product_id = $1")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
    }

    if !options.images.is_empty() {
        let start_order: i32 = if options.replace_images {
            0
        } else {
            sqlx::query_scalar("SELECT COALESCE(MAX(sort_order) + 1, 0) FROM product_images WHERE product_id = $1")
                .bind(product_id)
                .fetch_one(&mut *tx)
                .await?
        };
        let alt_fallback = patch.name.as_deref().unwrap_or(&current.name);
        insert_images(&mut tx, product_id, &options.images, start_order, alt_fallback).await?;
    }

    if let Some(variant_patches) = options.variants.as_deref() {
        reconcile_variants(
            &mut tx,
            product_id,
            variant_patches,
            options.delete_missing_variants,
        )
        .await?;
    } else if let Some(manual_stock) = patch.stock {
        sqlx::query("UPDATE products SET stock = $2, updated_at = NOW() WHERE id = $1")
            .bind(product_id)
            .bind(manual_stock.max(0))
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    load_product_graph(pool, product_id)
        .await?
        .ok_or(DbError::NotFound)
}

// ---------------------------------------------------------------------------
// Read / delete
// ---------------------------------------------------------------------------

/// Fetches a product with images and variants, or `None` if it does not
/// exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn get_product(pool: &PgPool, product_id: i64) -> Result<Option<ProductGraph>, DbError> {
    load_product_graph(pool, product_id).await
}

/// Lists products matching the filters, newest first, with the total count
/// for pagination.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn list_products(
    pool: &PgPool,
    filters: &ProductListFilters<'_>,
) -> Result<(Vec<ProductGraph>, i64), DbError> {
    let where_clause = "WHERE ($1::TEXT IS NULL OR name ILIKE '%' || $1 || '%' \
            OR description ILIKE '%' || $1 || '%' OR brand ILIKE '%' || $1 || '%') \
           AND ($2::TEXT IS NULL OR category = $2) \
           AND ($3::BOOL IS NULL OR is_active = $3) \
           AND ($4::BOOL IS NULL OR is_featured = $4)";

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM products {where_clause}"))
        .bind(filters.search)
        .bind(filters.category)
        .bind(filters.is_active)
        .bind(filters.is_featured)
        .fetch_one(pool)
        .await?;

    let products = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products {where_clause} \
         ORDER BY created_at DESC, id DESC LIMIT $5 OFFSET $6"
    ))
    .bind(filters.search)
    .bind(filters.category)
    .bind(filters.is_active)
    .bind(filters.is_featured)
    .bind(filters.limit)
    .bind(filters.offset)
    .fetch_all(pool)
    .await?;

    let ids: Vec<i64> = products.iter().map(|p| p.id).collect();

    let mut images = sqlx::query_as::<_, ImageRow>(
        "SELECT id, product_id, url, alt, sort_order, created_at, updated_at \
         FROM product_images WHERE product_id = ANY($1) \
         ORDER BY sort_order ASC, id ASC",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut variants = sqlx::query_as::<_, VariantRow>(
        "SELECT id, product_id, sku, size, color, price_override, stock, created_at, updated_at \
         FROM product_variants WHERE product_id = ANY($1) \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let graphs = products
        .into_iter()
        .map(|product| {
            let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut images)
                .into_iter()
                .partition(|img| img.product_id == product.id);
            images = rest;
            let (my_variants, other_variants): (Vec<_>, Vec<_>) = std::mem::take(&mut variants)
                .into_iter()
                .partition(|v| v.product_id == product.id);
            variants = other_variants;
            ProductGraph {
                product,
                images: mine,
                variants: my_variants,
            }
        })
        .collect();

    Ok((graphs, total))
}

/// Deletes a product with its variants and images in one transaction.
///
/// Returns `false` when no product with that id exists.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a store operation fails (e.g. a cart item
/// still references the product; `cart_items.product_id` is RESTRICT).
pub async fn delete_product(pool: &PgPool, product_id: i64) -> Result<bool, DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM product_variants WHERE product_id = $1")
        .bind(product_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM product_images WHERE product_id = $1")
        .bind(product_id)
        .execute(&mut *tx)
        .await?;
    let deleted = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(product_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;
    Ok(deleted > 0)
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

async fn fetch_product_for_update(
    tx: &mut Transaction<'_, Postgres>,
    product_id: i64,
) -> Result<Option<ProductRow>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
    ))
    .bind(product_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row)
}

/// Overlay the sparse patch onto the product row.
///
/// For nullable columns (`Option<Option<T>>`), a bool flag distinguishes
/// "not supplied" (keep) from "supplied" (set, possibly to NULL), the same
/// CASE/COALESCE single-statement shape used across the write paths.
async fn apply_field_patch(
    tx: &mut Transaction<'_, Postgres>,
    current: &ProductRow,
    patch: &ProductPatch,
) -> Result<(), DbError> {
    let slug = patch.slug.as_deref().map(normalize_slug);

    // SEO meta fallback: an explicit blank value falls back to the (new)
    // name/description; renaming a product without a stored meta title also
    // refreshes it.
    let next_name = patch.name.as_deref().unwrap_or(&current.name);
    let next_description = match &patch.description {
        Some(supplied) => supplied.as_deref(),
        None => current.description.as_deref(),
    };

    let meta_title: Option<Option<String>> = match &patch.meta_title {
        Some(explicit) => Some(meta_or_fallback(explicit.as_deref(), Some(next_name))),
        None if patch.name.is_some() && current.meta_title.is_none() => {
            Some(Some(next_name.to_string()))
        }
        None => None,
    };
    let meta_description: Option<Option<String>> = match &patch.meta_description {
        Some(explicit) => Some(meta_or_fallback(explicit.as_deref(), next_description)),
        None if patch.description.is_some() && current.meta_description.is_none() => {
            Some(next_description.map(ToString::to_string))
        }
        None => None,
    };

    sqlx::query(
        "UPDATE products \
         SET name             = COALESCE($2, name), \
             slug             = COALESCE($3, slug), \
             category         = COALESCE($4, category), \
             description      = CASE WHEN $5::BOOL THEN $6 ELSE description END, \
             brand            = CASE WHEN $7::BOOL THEN $8 ELSE brand END, \
             price            = COALESCE($9, price), \
             compare_at_price = CASE WHEN $10::BOOL THEN $11 ELSE compare_at_price END, \
             currency         = COALESCE($12, currency), \
             track_inventory  = COALESCE($13, track_inventory), \
             is_active        = COALESCE($14, is_active), \
             is_featured      = COALESCE($15, is_featured), \
             meta_title       = CASE WHEN $16::BOOL THEN $17 ELSE meta_title END, \
             meta_description = CASE WHEN $18::BOOL THEN $19 ELSE meta_description END, \
             updated_at       = NOW() \
         WHERE id = $1",
    )
    .bind(current.id)
    .bind(&patch.name)
    .bind(slug)
    .bind(&patch.category)
    .bind(patch.description.is_some())
    .bind(patch.description.clone().flatten())
    .bind(patch.brand.is_some())
    .bind(patch.brand.clone().flatten())
    .bind(patch.price)
    .bind(patch.compare_at_price.is_some())
    .bind(patch.compare_at_price.flatten())
    .bind(&patch.currency)
    .bind(patch.track_inventory)
    .bind(patch.is_active)
    .bind(patch.is_featured)
    .bind(meta_title.is_some())
    .bind(meta_title.flatten())
    .bind(meta_description.is_some())
    .bind(meta_description.flatten())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Upsert each patch entry, prune unkept variants when asked, and recompute
/// the aggregate stock from whatever variants remain.
async fn reconcile_variants(
    tx: &mut Transaction<'_, Postgres>,
    product_id: i64,
    patches: &[VariantPatch],
    delete_missing: bool,
) -> Result<(), DbError> {
    let mut keep_ids: Vec<i64> = Vec::with_capacity(patches.len());

    for patch in patches {
        let stock = patch.stock.max(0);

        if let Some(id) = patch.id {
            let updated: Option<i64> = sqlx::query_scalar(
                "UPDATE product_variants \
                 SET sku = $3, size = $4, color = $5, price_override = $6, stock = $7, \
                     updated_at = NOW() \
                 WHERE id = $1 AND product_id = $2 \
                 RETURNING id",
            )
            .bind(id)
            .bind(product_id)
            .bind(&patch.sku)
            .bind(&patch.size)
            .bind(&patch.color)
            .bind(patch.price_override)
            .bind(stock)
            .fetch_optional(&mut **tx)
            .await?;
            // An id that does not belong to this product aborts the whole
            // update.
            keep_ids.push(updated.ok_or(DbError::NotFound)?);
            continue;
        }

        if let Some(sku) = patch.sku.as_deref() {
            let existing: Option<i64> = sqlx::query_scalar(
                "SELECT id FROM product_variants WHERE sku = $1 AND product_id = $2",
            )
            .bind(sku)
            .bind(product_id)
            .fetch_optional(&mut **tx)
            .await?;

            if let Some(id) = existing {
                sqlx::query(
                    "UPDATE product_variants \
                     SET size = $2, color = $3, price_override = $4, stock = $5, \
                         updated_at = NOW() \
                     WHERE id = $1",
                )
                .bind(id)
                .bind(&patch.size)
                .bind(&patch.color)
                .bind(patch.price_override)
                .bind(stock)
                .execute(&mut **tx)
                .await?;
                keep_ids.push(id);
                continue;
            }
        }

        let inserted: i64 = sqlx::query_scalar(
            "INSERT INTO product_variants (product_id, sku, size, color, price_override, stock) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id",
        )
        .bind(product_id)
        .bind(&patch.sku)
        .bind(&patch.size)
        .bind(&patch.color)
        .bind(patch.price_override)
        .bind(stock)
        .fetch_one(&mut **tx)
        .await?;
        keep_ids.push(inserted);
    }

    if delete_missing {
        sqlx::query("DELETE FROM product_variants WHERE product_id = $1 AND NOT (id = ANY($2))")
            .bind(product_id)
            .bind(&keep_ids)
            .execute(&mut **tx)
            .await?;
    }

    // Unconditional whenever a variant list was supplied: an empty list with
    // delete_missing prunes everything and forces stock to 0.
    sqlx::query(
        "UPDATE products \
         SET stock = COALESCE((SELECT SUM(stock) FROM product_variants WHERE product_id = $1)::INT, 0), \
             updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(product_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_images(
    tx: &mut Transaction<'_, Postgres>,
    product_id: i64,
    images: &[NewImage],
    start_order: i32,
    alt_fallback: &str,
) -> Result<(), DbError> {
    for (index, image) in images.iter().enumerate() {
        let sort_order = start_order + i32::try_from(index).unwrap_or(i32::MAX);
        sqlx::query(
            "INSERT INTO product_images (product_id, url, alt, sort_order) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(product_id)
        .bind(&image.url)
        .bind(image.alt.as_deref().unwrap_or(alt_fallback))
        .bind(sort_order)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn load_product_graph(
    pool: &PgPool,
    product_id: i64,
) -> Result<Option<ProductGraph>, DbError> {
    let product = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
    ))
    .bind(product_id)
    .fetch_optional(pool)
    .await?;

    let Some(product) = product else {
        return Ok(None);
    };

    let images = sqlx::query_as::<_, ImageRow>(
        "SELECT id, product_id, url, alt, sort_order, created_at, updated_at \
         FROM product_images WHERE product_id = $1 \
         ORDER BY sort_order ASC, id ASC",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;

    let variants = sqlx::query_as::<_, VariantRow>(
        "SELECT id, product_id, sku, size, color, price_override, stock, created_at, updated_at \
         FROM product_variants WHERE product_id = $1 \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;

    Ok(Some(ProductGraph {
        product,
        images,
        variants,
    }))
}
