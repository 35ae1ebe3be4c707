use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use duka_db::ProductListFilters;

use crate::middleware::RequestId;

use super::super::{
    map_db_error, normalize_limit, normalize_page, ApiError, ApiResponse, AppState, ResponseMeta,
};
use super::ProductDetail;

#[derive(Debug, Deserialize)]
pub struct ListProductsParams {
    pub search: Option<String>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct ProductListData {
    pub items: Vec<ProductDetail>,
    pub pagination: Pagination,
}

pub async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(params): Query<ListProductsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = normalize_limit(params.limit);
    let page = normalize_page(params.page);

    let filters = ProductListFilters {
        search: params.search.as_deref().filter(|s| !s.trim().is_empty()),
        category: params.category.as_deref(),
        is_active: params.is_active,
        is_featured: params.is_featured,
        limit,
        offset: (page - 1) * limit,
    };

    let (graphs, total) = duka_db::list_products(&state.pool, &filters)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let total_pages = if total == 0 { 0 } else { (total + limit - 1) / limit };

    Ok(Json(ApiResponse {
        data: ProductListData {
            items: graphs.into_iter().map(ProductDetail::from).collect(),
            pagination: Pagination {
                page,
                limit,
                total,
                total_pages,
            },
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}
