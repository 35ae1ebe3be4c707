mod list;
mod write;

pub use list::list_products;
pub use write::{create_product, delete_product, update_product};

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use duka_db::{ImageRow, ProductGraph, ProductRow, VariantRow};

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

pub(super) const CATEGORIES: &[&str] = &[
    "DRESSES",
    "TROUSERS",
    "HOODIES",
    "SNEAKERS",
    "BAGS",
    "SLIPPERS",
    "SPRAY",
    "JEWELLERY",
    "OTHER",
];

#[derive(Debug, Serialize)]
pub struct ProductView {
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
    pub stock: i32,
    pub is_active: bool,
    pub is_featured: bool,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ImageView {
    pub id: i64,
    pub url: String,
    pub alt: Option<String>,
    pub sort_order: i32,
}

#[derive(Debug, Serialize)]
pub struct VariantView {
    pub id: i64,
    pub sku: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub price_override: Option<Decimal>,
    pub stock: i32,
}

/// A product with its images and variants, as every product route returns it.
#[derive(Debug, Serialize)]
pub struct ProductDetail {
    pub product: ProductView,
    pub images: Vec<ImageView>,
    pub variants: Vec<VariantView>,
}

impl From<ProductGraph> for ProductDetail {
    fn from(graph: ProductGraph) -> Self {
        Self {
            product: product_view_from(graph.product),
            images: graph.images.into_iter().map(image_view_from).collect(),
            variants: graph.variants.into_iter().map(variant_view_from).collect(),
        }
    }
}

fn product_view_from(row: ProductRow) -> ProductView {
    ProductView {
        id: row.id,
        name: row.name,
        slug: row.slug,
        category: row.category,
        description: row.description,
        brand: row.brand,
        price: row.price,
        compare_at_price: row.compare_at_price,
        currency: row.currency,
        track_inventory: row.track_inventory,
        stock: row.stock,
        is_active: row.is_active,
        is_featured: row.is_featured,
        meta_title: row.meta_title,
        meta_description: row.meta_description,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn image_view_from(row: ImageRow) -> ImageView {
    ImageView {
        id: row.id,
        url: row.url,
        alt: row.alt,
        sort_order: row.sort_order,
    }
}

fn variant_view_from(row: VariantRow) -> VariantView {
    VariantView {
        id: row.id,
        sku: row.sku,
        size: row.size,
        color: row.color,
        price_override: row.price_override,
        stock: row.stock,
    }
}

pub async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(product_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let graph = duka_db::get_product(&state.pool, product_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| ApiError::new(req_id.0.clone(), "not_found", "product not found"))?;

    Ok(Json(ApiResponse {
        data: ProductDetail::from(graph),
        meta: ResponseMeta::new(req_id.0),
    }))
}
