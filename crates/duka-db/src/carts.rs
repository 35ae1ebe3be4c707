//! The cart engine: transactional operations on `carts` and `cart_items`.
//!
//! Every identity owns at most one cart with status `ACTIVE`. There is no
//! partial unique index backing that invariant, so find-or-create runs under
//! `SELECT ... FOR UPDATE` inside a transaction and the candidate line item
//! is locked before its quantity is read, preventing lost updates when two
//! adds for the same identity race.

use chrono::{DateTime, Utc};
use duka_core::CartIdentity;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `carts` table. Exactly one of `user_id`/`guest_id` is set.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartRow {
    pub id: i64,
    pub user_id: Option<Uuid>,
    pub guest_id: Option<Uuid>,
    pub status: String,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A `cart_items` row joined with its product and (optional) variant.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartItemDetail {
    pub id: i64,
    pub cart_id: i64,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub quantity: i32,
    /// Unit price snapshotted at first insert; not refreshed on accumulation.
    pub unit_price: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub product_name: String,
    pub product_slug: String,
    pub product_price: Decimal,
    pub variant_sku: Option<String>,
    pub variant_size: Option<String>,
    pub variant_color: Option<String>,
    pub variant_price_override: Option<Decimal>,
}

/// An `ACTIVE` cart with its line items, ordered by item creation time.
#[derive(Debug, Clone)]
pub struct CartGraph {
    pub cart: CartRow,
    pub items: Vec<CartItemDetail>,
}

impl CartGraph {
    /// Sum of line quantities across the cart.
    #[must_use]
    pub fn total_items(&self) -> i64 {
        self.items.iter().map(|item| i64::from(item.quantity)).sum()
    }
}

/// Add-to-cart knobs beyond the (product, variant) key.
#[derive(Debug, Clone, Default)]
pub struct AddItemOptions {
    /// Already normalized to >= 1 by the boundary.
    pub quantity: i32,
    /// Currency for a cart created by this call; the product's currency is
    /// used when absent. Ignored when the identity already has a cart.
    pub currency_hint: Option<String>,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Adds a line to the identity's `ACTIVE` cart, creating the cart when none
/// exists and accumulating quantity when a line for the same
/// (product, variant) key is already present — a NULL variant matches NULL.
///
/// The unit price is snapshotted from the product at first insert and left
/// untouched on accumulation. All writes run in one transaction; the
/// returned graph is reloaded after commit.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the product does not exist or the
/// variant does not belong to it, and [`DbError::Sqlx`] on store failure.
pub async fn add_cart_item(
    pool: &PgPool,
    identity: CartIdentity,
    product_id: i64,
    variant_id: Option<i64>,
    options: AddItemOptions,
) -> Result<CartGraph, DbError> {
    let quantity = options.quantity.max(1);

    let mut tx = pool.begin().await?;

    let product: Option<(Decimal, String)> =
        sqlx::query_as("SELECT price, currency FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some((unit_price, product_currency)) = product else {
        return Err(DbError::NotFound);
    };

    if let Some(variant) = variant_id {
        let belongs: Option<i64> =
            sqlx::query_scalar("SELECT id FROM product_variants WHERE id = $1 AND product_id = $2")
                .bind(variant)
                .bind(product_id)
                .fetch_optional(&mut *tx)
                .await?;
        if belongs.is_none() {
            return Err(DbError::NotFound);
        }
    }

    let cart = match find_active_cart_for_update(&mut tx, identity).await? {
        Some(cart) => cart,
        None => {
            let currency = options.currency_hint.unwrap_or(product_currency);
            sqlx::query_as::<_, CartRow>(
                "INSERT INTO carts (user_id, guest_id, status, currency) \
                 VALUES ($1, $2, 'ACTIVE', $3) \
                 RETURNING id, user_id, guest_id, status, currency, created_at, updated_at",
            )
            .bind(identity.user_id())
            .bind(identity.guest_id())
            .bind(currency)
            .fetch_one(&mut *tx)
            .await?
        }
    };

    let existing_item: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM cart_items \
         WHERE cart_id = $1 AND product_id = $2 AND variant_id IS NOT DISTINCT FROM $3 \
         FOR UPDATE",
    )
    .bind(cart.id)
    .bind(product_id)
    .bind(variant_id)
    .fetch_optional(&mut *tx)
    .await?;

    match existing_item {
        Some(item_id) => {
            sqlx::query(
                "UPDATE cart_items SET quantity = quantity + $2, updated_at = NOW() \
                 WHERE id = $1",
            )
            .bind(item_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
        }
        None => {
            sqlx::query(
                "INSERT INTO cart_items \
                     (cart_id, product_id, variant_id, quantity, unit_price, currency) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(cart.id)
            .bind(product_id)
            .bind(variant_id)
            .bind(quantity)
            .bind(unit_price)
            .bind(&cart.currency)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;

    load_cart_graph(pool, cart.id).await
}

/// Deletes every line item in the identity's `ACTIVE` cart. The cart row is
/// retained. Clearing an identity with no cart is a no-op success.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a store operation fails.
pub async fn clear_cart(pool: &PgPool, identity: CartIdentity) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    let Some(cart) = find_active_cart_for_update(&mut tx, identity).await? else {
        return Ok(());
    };

    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Returns the identity's `ACTIVE` cart with items, or `None` when the
/// identity has no active cart — "no cart yet" is not an error.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_cart(pool: &PgPool, identity: CartIdentity) -> Result<Option<CartGraph>, DbError> {
    let cart = sqlx::query_as::<_, CartRow>(
        "SELECT id, user_id, guest_id, status, currency, created_at, updated_at \
         FROM carts \
         WHERE status = 'ACTIVE' \
           AND user_id IS NOT DISTINCT FROM $1 \
           AND guest_id IS NOT DISTINCT FROM $2",
    )
    .bind(identity.user_id())
    .bind(identity.guest_id())
    .fetch_optional(pool)
    .await?;

    match cart {
        Some(cart) => {
            let items = load_cart_items(pool, cart.id).await?;
            Ok(Some(CartGraph { cart, items }))
        }
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

async fn find_active_cart_for_update(
    tx: &mut Transaction<'_, Postgres>,
    identity: CartIdentity,
) -> Result<Option<CartRow>, DbError> {
    let cart = sqlx::query_as::<_, CartRow>(
        "SELECT id, user_id, guest_id, status, currency, created_at, updated_at \
         FROM carts \
         WHERE status = 'ACTIVE' \
           AND user_id IS NOT DISTINCT FROM $1 \
           AND guest_id IS NOT DISTINCT FROM $2 \
         FOR UPDATE",
    )
    .bind(identity.user_id())
    .bind(identity.guest_id())
    .fetch_optional(&mut **tx)
    .await?;

    Ok(cart)
}

async fn load_cart_graph(pool: &PgPool, cart_id: i64) -> Result<CartGraph, DbError> {
    let cart = sqlx::query_as::<_, CartRow>(
        "SELECT id, user_id, guest_id, status, currency, created_at, updated_at \
         FROM carts WHERE id = $1",
    )
    .bind(cart_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    let items = load_cart_items(pool, cart_id).await?;
    Ok(CartGraph { cart, items })
}

async fn load_cart_items(pool: &PgPool, cart_id: i64) -> Result<Vec<CartItemDetail>, DbError> {
    let items = sqlx::query_as::<_, CartItemDetail>(
        "SELECT ci.id, ci.cart_id, ci.product_id, ci.variant_id, ci.quantity, \
                ci.unit_price, ci.currency, ci.created_at, \
                p.name AS product_name, p.slug AS product_slug, p.price AS product_price, \
                v.sku AS variant_sku, v.size AS variant_size, v.color AS variant_color, \
                v.price_override AS variant_price_override \
         FROM cart_items ci \
         JOIN products p ON p.id = ci.product_id \
         LEFT JOIN product_variants v ON v.id = ci.variant_id \
         WHERE ci.cart_id = $1 \
         ORDER BY ci.created_at ASC, ci.id ASC",
    )
    .bind(cart_id)
    .fetch_all(pool)
    .await?;

    Ok(items)
}
