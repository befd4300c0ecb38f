use crate::error::{AppError, AppResult};
use crate::handlers::products::ProductResponse;
use crate::middleware::auth::{require_admin, AuthUser};
use crate::models::MysteryBoxModel;
use crate::response::ApiResponse;
use crate::services::catalog::{BoxInput, BoxSize, CatalogService};
use crate::utils::parse_id;
use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    Extension, Json,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BoxRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub rarity: Option<String>,
    /// Percentage off, 0-100
    #[validate(range(min = 0.0, max = 100.0))]
    pub discount: Option<f64>,
    pub in_stock: Option<bool>,
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
    #[serde(alias = "image_url")]
    pub image_url: Option<String>,
}

impl From<BoxRequest> for BoxInput {
    fn from(req: BoxRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            category: req.category,
            rarity: req.rarity,
            discount: req.discount,
            in_stock: req.in_stock,
            price: req.price,
            image_url: req.image_url,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BoxResponse {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub rarity: Option<String>,
    pub discount: f64,
    pub in_stock: bool,
    pub price: f64,
    pub image_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<MysteryBoxModel> for BoxResponse {
    fn from(b: MysteryBoxModel) -> Self {
        Self {
            id: b.id,
            name: b.name,
            description: b.description,
            category: b.category,
            rarity: b.rarity,
            discount: b.discount,
            in_stock: b.in_stock,
            price: b.price,
            image_url: b.image_url,
            created_at: b.created_at.to_string(),
            updated_at: b.updated_at.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct BoxSizeQuery {
    /// `large` for the bigger box; anything else is the regular size
    pub size: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BoxSampleResponse {
    #[serde(rename = "box")]
    pub mystery_box: BoxResponse,
    /// Random products from the box's category
    pub items: Vec<ProductResponse>,
    pub final_price: i64,
    pub size: BoxSize,
}

#[utoipa::path(
    get,
    path = "/api/v1/boxes",
    responses(
        (status = 200, description = "All mystery boxes", body = Vec<BoxResponse>),
    ),
    tag = "boxes"
)]
pub async fn list_boxes(
    Extension(db): Extension<DatabaseConnection>,
) -> AppResult<impl IntoResponse> {
    let boxes = CatalogService::new(db).list_boxes().await?;
    let response: Vec<BoxResponse> = boxes.into_iter().map(BoxResponse::from).collect();
    Ok(ApiResponse::ok(response))
}

#[utoipa::path(
    get,
    path = "/api/v1/boxes/{id}",
    params(("id" = i32, Path, description = "Box ID"), BoxSizeQuery),
    responses(
        (status = 200, description = "Box with a random item sample and its price", body = BoxSampleResponse),
        (status = 400, description = "Invalid id", body = AppError),
        (status = 404, description = "Box not found", body = AppError),
    ),
    tag = "boxes"
)]
pub async fn get_box(
    Extension(db): Extension<DatabaseConnection>,
    Path(id): Path<String>,
    Query(query): Query<BoxSizeQuery>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id, "id")?;
    let size = BoxSize::parse(query.size.as_deref());

    let sample = CatalogService::new(db).sample_box(id, size).await?;

    Ok(ApiResponse::ok(BoxSampleResponse {
        mystery_box: sample.mystery_box.into(),
        items: sample.items.into_iter().map(ProductResponse::from).collect(),
        final_price: sample.final_price,
        size: sample.size,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/boxes",
    security(("jwt_token" = [])),
    request_body = BoxRequest,
    responses(
        (status = 201, description = "Box created", body = BoxResponse),
        (status = 400, description = "Validation error", body = AppError),
        (status = 403, description = "Admin only", body = AppError),
    ),
    tag = "boxes"
)]
pub async fn create_box(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Json(payload): Json<BoxRequest>,
) -> AppResult<impl IntoResponse> {
    require_admin(&auth_user)?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(format!("Validation error: {e}")))?;

    let created = CatalogService::new(db).create_box(payload.into()).await?;
    Ok(ApiResponse::ok(BoxResponse::from(created)).created())
}

#[utoipa::path(
    put,
    path = "/api/v1/boxes/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Box ID")),
    request_body = BoxRequest,
    responses(
        (status = 200, description = "Box updated", body = BoxResponse),
        (status = 403, description = "Admin only", body = AppError),
        (status = 404, description = "Box not found", body = AppError),
    ),
    tag = "boxes"
)]
pub async fn update_box(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<BoxRequest>,
) -> AppResult<impl IntoResponse> {
    require_admin(&auth_user)?;
    let id = parse_id(&id, "id")?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(format!("Validation error: {e}")))?;

    let updated = CatalogService::new(db)
        .update_box(id, payload.into())
        .await?;
    Ok(ApiResponse::ok(BoxResponse::from(updated)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/boxes/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Box ID")),
    responses(
        (status = 200, description = "Box deleted"),
        (status = 403, description = "Admin only", body = AppError),
        (status = 404, description = "Box not found", body = AppError),
    ),
    tag = "boxes"
)]
pub async fn delete_box(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    require_admin(&auth_user)?;
    let id = parse_id(&id, "id")?;

    CatalogService::new(db).delete_box(id).await?;
    Ok(ApiResponse::with_message(serde_json::json!({ "id": id }), "Box deleted"))
}
