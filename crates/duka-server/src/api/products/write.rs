use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use duka_core::{NewImage, NewProduct, NewVariant, ProductPatch, VariantPatch};
use duka_db::UpdateProductOptions;

use crate::middleware::RequestId;

use super::super::{map_write_error, ApiError, ApiResponse, AppState, ResponseMeta};
use super::{ProductDetail, CATEGORIES};

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub product: NewProduct,
    #[serde(default)]
    pub variants: Vec<NewVariant>,
    #[serde(default)]
    pub images: Vec<NewImage>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    #[serde(default)]
    pub product: ProductPatch,
    /// Absent leaves variants alone; present (even empty) reconciles them.
    #[serde(default)]
    pub variants: Option<Vec<VariantPatch>>,
    #[serde(default)]
    pub delete_missing_variants: bool,
    #[serde(default)]
    pub images: Vec<NewImage>,
    #[serde(default)]
    pub replace_images: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteProductData {
    pub deleted: bool,
}

fn validation_error(request_id: &str, message: &str) -> ApiError {
    ApiError::new(request_id, "validation_error", message)
}

fn validate_new_product(request_id: &str, product: &NewProduct) -> Result<(), ApiError> {
    let name = product.name.trim();
    if name.is_empty() {
        return Err(validation_error(request_id, "name must not be empty"));
    }
    if name.len() > 191 {
        return Err(validation_error(request_id, "name must be at most 191 characters"));
    }
    if product.slug.trim().is_empty() {
        return Err(validation_error(request_id, "slug must not be empty"));
    }
    if product.price < Decimal::ZERO {
        return Err(validation_error(request_id, "price must not be negative"));
    }
    validate_category(request_id, &product.category)
}

fn validate_category(request_id: &str, category: &str) -> Result<(), ApiError> {
    if CATEGORIES.contains(&category) {
        Ok(())
    } else {
        Err(validation_error(request_id, "unknown category"))
    }
}

fn validate_patch(request_id: &str, patch: &ProductPatch) -> Result<(), ApiError> {
    if let Some(name) = patch.name.as_deref() {
        if name.trim().is_empty() {
            return Err(validation_error(request_id, "name must not be empty"));
        }
        if name.trim().len() > 191 {
            return Err(validation_error(request_id, "name must be at most 191 characters"));
        }
    }
    if let Some(slug) = patch.slug.as_deref() {
        if slug.trim().is_empty() {
            return Err(validation_error(request_id, "slug must not be empty"));
        }
    }
    if let Some(price) = patch.price {
        if price < Decimal::ZERO {
            return Err(validation_error(request_id, "price must not be negative"));
        }
    }
    if let Some(category) = patch.category.as_deref() {
        validate_category(request_id, category)?;
    }
    Ok(())
}

pub async fn create_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(mut payload): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_new_product(&req_id.0, &payload.product)?;

    if payload.product.currency.is_none() {
        payload.product.currency = Some(state.default_currency.clone());
    }

    let graph = duka_db::create_product(
        &state.pool,
        &payload.product,
        &payload.variants,
        &payload.images,
    )
    .await
    .map_err(|e| map_write_error(&req_id.0, &e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: ProductDetail::from(graph),
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

pub async fn update_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(product_id): Path<i64>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_patch(&req_id.0, &payload.product)?;

    let options = UpdateProductOptions {
        variants: payload.variants,
        delete_missing_variants: payload.delete_missing_variants,
        images: payload.images,
        replace_images: payload.replace_images,
    };

    let graph = duka_db::update_product(&state.pool, product_id, &payload.product, &options)
        .await
        .map_err(|e| map_write_error(&req_id.0, &e))?;

    Ok(Json(ApiResponse {
        data: ProductDetail::from(graph),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(product_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = duka_db::delete_product(&state.pool, product_id)
        .await
        .map_err(|e| map_write_error(&req_id.0, &e))?;

    if !deleted {
        return Err(ApiError::new(req_id.0, "not_found", "product not found"));
    }

    Ok(Json(ApiResponse {
        data: DeleteProductData { deleted: true },
        meta: ResponseMeta::new(req_id.0),
    }))
}
