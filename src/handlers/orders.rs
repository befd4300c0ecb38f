use crate::error::{AppError, AppResult};
use crate::middleware::auth::{require_admin, AuthUser};
use crate::models::{OrderStatus, UserModel};
use crate::response::ApiResponse;
use crate::services::catalog::CatalogItem;
use crate::services::email::EmailService;
use crate::services::order::{NewOrder, NewOrderLine, OrderDetails, OrderService, ResolvedLine};
use crate::utils::{parse_id, RawId};
use axum::{extract::Path, response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    /// Product id (a mystery box id is also accepted)
    pub product_id: Option<RawId>,
    /// Defaults to 1
    pub quantity: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// Buyer id, as a number or numeric string
    pub user_id: Option<RawId>,
    #[serde(default)]
    pub items: Vec<OrderLineRequest>,
    pub total: Option<f64>,
    pub payment_method: Option<String>,
    /// Free-form metadata stored with the order
    #[schema(value_type = Object)]
    pub payment_details: Option<serde_json::Value>,
    pub shipping_address: Option<String>,
}

impl CreateOrderRequest {
    fn into_new_order(self) -> AppResult<NewOrder> {
        let user_id = self
            .user_id
            .ok_or_else(|| AppError::Validation("userId is required".to_string()))?
            .parse("userId")?;

        let items = self
            .items
            .into_iter()
            .map(|line| {
                let product_id = line
                    .product_id
                    .ok_or_else(|| AppError::Validation("productId is required".to_string()))?
                    .parse("productId")?;
                Ok(NewOrderLine {
                    product_id,
                    quantity: line.quantity.unwrap_or(1),
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(NewOrder {
            user_id,
            items,
            total: self
                .total
                .ok_or_else(|| AppError::Validation("total is required".to_string()))?,
            payment_method: self.payment_method,
            payment_details: self.payment_details,
            shipping_address: self.shipping_address,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BuyerResponse {
    pub id: i32,
    pub username: String,
    pub email: String,
}

impl From<UserModel> for BuyerResponse {
    fn from(u: UserModel) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ItemSummary {
    pub id: i32,
    pub title: String,
    pub price: f64,
    pub image_url: Option<String>,
    pub category: Option<String>,
    /// `product` or `box`
    pub kind: String,
}

impl From<&CatalogItem> for ItemSummary {
    fn from(item: &CatalogItem) -> Self {
        Self {
            id: item.id(),
            title: item.title().to_string(),
            price: item.price(),
            image_url: item.image_url().map(str::to_string),
            category: item.category().map(str::to_string),
            kind: item.kind().to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderLineResponse {
    pub product_id: i32,
    pub quantity: i32,
    /// Null when the id matches neither a product nor a box
    pub product: Option<ItemSummary>,
}

impl From<ResolvedLine> for OrderLineResponse {
    fn from(line: ResolvedLine) -> Self {
        Self {
            product_id: line.item.product_id,
            quantity: line.item.quantity,
            product: line.resolved.as_ref().map(ItemSummary::from),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: i32,
    pub user_id: i32,
    /// Null if the buyer could not be loaded
    pub user: Option<BuyerResponse>,
    pub items: Vec<OrderLineResponse>,
    pub total: f64,
    pub status: OrderStatus,
    pub payment_method: Option<String>,
    #[schema(value_type = Object)]
    pub payment_details: serde_json::Value,
    pub shipping_address: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<OrderDetails> for OrderResponse {
    fn from(details: OrderDetails) -> Self {
        let order = details.order;
        Self {
            id: order.id,
            user_id: order.user_id,
            user: details.buyer.map(BuyerResponse::from),
            items: details
                .lines
                .into_iter()
                .map(OrderLineResponse::from)
                .collect(),
            total: order.total,
            status: order.status,
            payment_method: order.payment_method,
            payment_details: order.payment_details,
            shipping_address: order.shipping_address,
            created_at: order.created_at.to_string(),
            updated_at: order.updated_at.to_string(),
        }
    }
}

fn to_responses(orders: Vec<OrderDetails>) -> Vec<OrderResponse> {
    orders.into_iter().map(OrderResponse::from).collect()
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    security(("jwt_token" = [])),
    responses(
        (status = 200, description = "All orders, newest first", body = Vec<OrderResponse>),
        (status = 403, description = "Admin only", body = AppError),
    ),
    tag = "orders"
)]
pub async fn list_orders(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
) -> AppResult<impl IntoResponse> {
    require_admin(&auth_user)?;
    let orders = OrderService::new(db).list_all().await?;
    Ok(ApiResponse::ok(to_responses(orders)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/user/{user_id}",
    params(("user_id" = i32, Path, description = "Buyer ID")),
    responses(
        (status = 200, description = "The buyer's orders, newest first", body = Vec<OrderResponse>),
        (status = 400, description = "Invalid id", body = AppError),
    ),
    tag = "orders"
)]
pub async fn list_user_orders(
    Extension(db): Extension<DatabaseConnection>,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let user_id = parse_id(&user_id, "userId")?;
    let orders = OrderService::new(db).list_for_user(user_id).await?;
    Ok(ApiResponse::ok(to_responses(orders)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = i32, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order", body = OrderResponse),
        (status = 400, description = "Invalid id", body = AppError),
        (status = 404, description = "Order not found", body = AppError),
    ),
    tag = "orders"
)]
pub async fn get_order(
    Extension(db): Extension<DatabaseConnection>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id, "id")?;
    let order = OrderService::new(db).get(id).await?;
    Ok(ApiResponse::ok(OrderResponse::from(order)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = OrderResponse),
        (status = 400, description = "Invalid ids or fields", body = AppError),
        (status = 404, description = "Buyer not found", body = AppError),
    ),
    tag = "orders"
)]
pub async fn create_order(
    Extension(db): Extension<DatabaseConnection>,
    Extension(email_service): Extension<EmailService>,
    Json(payload): Json<CreateOrderRequest>,
) -> AppResult<impl IntoResponse> {
    let new_order = payload.into_new_order()?;
    let details = OrderService::new(db)
        .place(new_order, &email_service)
        .await?;
    Ok(ApiResponse::ok(OrderResponse::from(details)).created())
}
