use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use duka_core::{normalize_quantity, CartIdentity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use duka_db::{AddItemOptions, CartGraph, CartItemDetail, CartRow};

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub struct AddCartItemRequest {
    pub user_id: Option<Uuid>,
    /// Guest identity; older clients send it as `cart_token`.
    #[serde(alias = "cart_token")]
    pub guest_id: Option<Uuid>,
    pub product_id: Option<i64>,
    pub variant_id: Option<i64>,
    pub quantity: Option<i64>,
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CartIdentityParams {
    pub user_id: Option<Uuid>,
    #[serde(alias = "cart_token")]
    pub guest_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CartSummary {
    pub id: i64,
    pub user_id: Option<Uuid>,
    pub guest_id: Option<Uuid>,
    pub status: String,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CartItemView {
    pub id: i64,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub currency: String,
    pub product_name: String,
    pub product_slug: String,
    pub variant_sku: Option<String>,
    pub variant_size: Option<String>,
    pub variant_color: Option<String>,
}

/// The cart payload every cart route responds with. An identity with no
/// active cart gets the empty shape rather than an error.
#[derive(Debug, Serialize)]
pub struct CartContents {
    pub cart: Option<CartSummary>,
    pub items: Vec<CartItemView>,
    pub total_items: i64,
}

impl CartContents {
    pub(super) fn empty() -> Self {
        Self {
            cart: None,
            items: Vec::new(),
            total_items: 0,
        }
    }
}

impl From<CartGraph> for CartContents {
    fn from(graph: CartGraph) -> Self {
        let total_items = graph.total_items();
        Self {
            cart: Some(summary_from(graph.cart)),
            items: graph.items.into_iter().map(item_view_from).collect(),
            total_items,
        }
    }
}

fn summary_from(row: CartRow) -> CartSummary {
    CartSummary {
        id: row.id,
        user_id: row.user_id,
        guest_id: row.guest_id,
        status: row.status,
        currency: row.currency,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn item_view_from(item: CartItemDetail) -> CartItemView {
    CartItemView {
        id: item.id,
        product_id: item.product_id,
        variant_id: item.variant_id,
        quantity: item.quantity,
        unit_price: item.unit_price,
        currency: item.currency,
        product_name: item.product_name,
        product_slug: item.product_slug,
        variant_sku: item.variant_sku,
        variant_size: item.variant_size,
        variant_color: item.variant_color,
    }
}

fn require_identity(
    request_id: &str,
    user_id: Option<Uuid>,
    guest_id: Option<Uuid>,
) -> Result<CartIdentity, ApiError> {
    CartIdentity::from_ids(user_id, guest_id).ok_or_else(|| {
        ApiError::new(
            request_id,
            "invalid_request",
            "user_id or guest_id (cart_token) is required",
        )
    })
}

pub async fn add_cart_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(payload): Json<AddCartItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = require_identity(&req_id.0, payload.user_id, payload.guest_id)?;
    let Some(product_id) = payload.product_id else {
        return Err(ApiError::new(
            req_id.0,
            "invalid_request",
            "product_id is required",
        ));
    };

    let options = AddItemOptions {
        quantity: normalize_quantity(payload.quantity),
        currency_hint: payload.currency,
    };

    let graph = duka_db::add_cart_item(&state.pool, identity, product_id, payload.variant_id, options)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: CartContents::from(graph),
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[derive(Debug, Serialize)]
pub struct ClearCartData {
    pub cleared: bool,
}

pub async fn clear_cart(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(payload): Json<CartIdentityParams>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = require_identity(&req_id.0, payload.user_id, payload.guest_id)?;

    duka_db::clear_cart(&state.pool, identity)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: ClearCartData { cleared: true },
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub async fn get_cart_items(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(params): Query<CartIdentityParams>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = require_identity(&req_id.0, params.user_id, params.guest_id)?;

    let contents = duka_db::get_cart(&state.pool, identity)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .map_or_else(CartContents::empty, CartContents::from);

    Ok(Json(ApiResponse {
        data: contents,
        meta: ResponseMeta::new(req_id.0),
    }))
}
