use crate::error::{AppError, AppResult};
use crate::middleware::auth::{require_admin, AuthUser};
use crate::models::ProductModel;
use crate::response::ApiResponse;
use crate::services::catalog::{CatalogService, ProductInput};
use axum::{extract::Query, response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
    #[serde(alias = "image_url")]
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub stock: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductResponse {
    pub id: i32,
    pub title: String,
    pub price: f64,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub stock: i32,
}

impl From<ProductModel> for ProductResponse {
    fn from(p: ProductModel) -> Self {
        Self {
            id: p.id,
            title: p.title,
            price: p.price,
            image_url: p.image_url,
            description: p.description,
            category: p.category,
            stock: p.stock,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ProductListQuery {
    /// Only products in this category
    pub category: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(ProductListQuery),
    responses(
        (status = 200, description = "Products", body = Vec<ProductResponse>),
    ),
    tag = "products"
)]
pub async fn list_products(
    Extension(db): Extension<DatabaseConnection>,
    Query(query): Query<ProductListQuery>,
) -> AppResult<impl IntoResponse> {
    let category = query.category.as_deref().filter(|c| !c.trim().is_empty());
    let products = CatalogService::new(db).list_products(category).await?;
    let response: Vec<ProductResponse> = products.into_iter().map(ProductResponse::from).collect();
    Ok(ApiResponse::ok(response))
}

#[utoipa::path(
    post,
    path = "/api/v1/products",
    security(("jwt_token" = [])),
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ProductResponse),
        (status = 400, description = "Validation error", body = AppError),
        (status = 403, description = "Admin only", body = AppError),
    ),
    tag = "products"
)]
pub async fn create_product(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Json(payload): Json<CreateProductRequest>,
) -> AppResult<impl IntoResponse> {
    require_admin(&auth_user)?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(format!("Validation error: {e}")))?;
    let price = payload
        .price
        .ok_or_else(|| AppError::Validation("price is required".to_string()))?;

    let created = CatalogService::new(db)
        .create_product(ProductInput {
            title: payload.title,
            price,
            image_url: payload.image_url,
            description: payload.description,
            category: payload.category,
            stock: payload.stock,
        })
        .await?;

    Ok(ApiResponse::ok(ProductResponse::from(created)).created())
}
