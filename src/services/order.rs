use crate::{
    error::{AppError, AppResult},
    models::{
        order, order_item, user, Order, OrderItem, OrderItemModel, OrderModel, OrderStatus, User,
        UserModel,
    },
    services::{
        catalog::{CatalogItem, CatalogService},
        email::EmailService,
        invoice::{self, INVOICE_SUBJECT},
    },
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const CASH_ON_DELIVERY: &str = "cash on delivery";

#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub product_id: i32,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i32,
    pub items: Vec<NewOrderLine>,
    pub total: f64,
    pub payment_method: Option<String>,
    pub payment_details: Option<Value>,
    pub shipping_address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedLine {
    pub item: OrderItemModel,
    pub resolved: Option<CatalogItem>,
}

/// An order with its buyer and catalog-resolved lines.
#[derive(Debug, Clone)]
pub struct OrderDetails {
    pub order: OrderModel,
    pub buyer: Option<UserModel>,
    pub lines: Vec<ResolvedLine>,
}

/// Result of applying a gateway callback to an order.
#[derive(Debug, Clone)]
pub struct PaymentApplied {
    pub order: OrderModel,
    pub became_paid: bool,
}

pub struct OrderService {
    db: DatabaseConnection,
}

impl OrderService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Persist a pending order and its lines, then return it expanded.
    /// Cash on delivery orders get an invoice email (best-effort).
    pub async fn place(&self, input: NewOrder, email_service: &EmailService) -> AppResult<OrderDetails> {
        if !input.total.is_finite() || input.total < 0.0 {
            return Err(AppError::Validation(
                "total must be a non-negative number".to_string(),
            ));
        }
        if input.items.iter().any(|l| l.quantity < 1) {
            return Err(AppError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }
        if User::find_by_id(input.user_id).one(&self.db).await?.is_none() {
            return Err(AppError::NotFound("User"));
        }

        let now = chrono::Utc::now().naive_utc();
        let payment_details = match input.payment_details {
            Some(Value::Object(map)) => Value::Object(map),
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(other) => serde_json::json!({ "value": other }),
        };

        let txn = self.db.begin().await?;

        let created = order::ActiveModel {
            user_id: sea_orm::ActiveValue::Set(input.user_id),
            total: sea_orm::ActiveValue::Set(input.total),
            status: sea_orm::ActiveValue::Set(OrderStatus::Pending),
            payment_method: sea_orm::ActiveValue::Set(input.payment_method.clone()),
            payment_details: sea_orm::ActiveValue::Set(payment_details),
            shipping_address: sea_orm::ActiveValue::Set(input.shipping_address),
            created_at: sea_orm::ActiveValue::Set(now),
            updated_at: sea_orm::ActiveValue::Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for (position, line) in input.items.iter().enumerate() {
            order_item::ActiveModel {
                order_id: sea_orm::ActiveValue::Set(created.id),
                product_id: sea_orm::ActiveValue::Set(line.product_id),
                quantity: sea_orm::ActiveValue::Set(line.quantity),
                position: sea_orm::ActiveValue::Set(position as i32),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;
        tracing::info!(
            "Order {} created for user {} ({} items)",
            created.id,
            created.user_id,
            input.items.len()
        );

        let details = self.expand_one(created).await?;

        if is_cash_on_delivery(input.payment_method.as_deref()) {
            invoice::send_order_email(email_service, &details, INVOICE_SUBJECT)
                .await
                .log(&format!("order {} invoice", details.order.id));
        }

        Ok(details)
    }

    pub async fn find(&self, id: i32) -> AppResult<OrderModel> {
        Order::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound("Order"))
    }

    pub async fn get(&self, id: i32) -> AppResult<OrderDetails> {
        let order = self.find(id).await?;
        self.expand_one(order).await
    }

    pub async fn list_all(&self) -> AppResult<Vec<OrderDetails>> {
        let orders = Order::find()
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .all(&self.db)
            .await?;
        self.expand(orders).await
    }

    pub async fn list_for_user(&self, user_id: i32) -> AppResult<Vec<OrderDetails>> {
        let orders = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .all(&self.db)
            .await?;
        self.expand(orders).await
    }

    pub async fn expand_one(&self, order: OrderModel) -> AppResult<OrderDetails> {
        let mut expanded = self.expand(vec![order]).await?;
        expanded
            .pop()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("order expansion lost a row")))
    }

    /// Load buyers, lines and catalog entries for a batch of orders.
    pub async fn expand(&self, orders: Vec<OrderModel>) -> AppResult<Vec<OrderDetails>> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let order_ids: Vec<i32> = orders.iter().map(|o| o.id).collect();
        let buyers = self.load_buyers(&orders).await;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .order_by_asc(order_item::Column::OrderId)
            .order_by_asc(order_item::Column::Position)
            .all(&self.db)
            .await?;

        let mut product_ids: Vec<i32> = items.iter().map(|i| i.product_id).collect();
        product_ids.sort_unstable();
        product_ids.dedup();
        let catalog = CatalogService::new(self.db.clone())
            .resolve_items(&product_ids)
            .await?;

        let mut lines_by_order: HashMap<i32, Vec<ResolvedLine>> = HashMap::new();
        for item in items {
            let resolved = catalog.get(&item.product_id).cloned();
            lines_by_order
                .entry(item.order_id)
                .or_default()
                .push(ResolvedLine { item, resolved });
        }

        Ok(orders
            .into_iter()
            .map(|order| OrderDetails {
                buyer: buyers.get(&order.user_id).cloned(),
                lines: lines_by_order.remove(&order.id).unwrap_or_default(),
                order,
            })
            .collect())
    }

    /// Buyer lookup never fails the request; a missing buyer renders as null.
    async fn load_buyers(&self, orders: &[OrderModel]) -> HashMap<i32, UserModel> {
        let mut user_ids: Vec<i32> = orders.iter().map(|o| o.user_id).collect();
        user_ids.sort_unstable();
        user_ids.dedup();

        match User::find()
            .filter(user::Column::Id.is_in(user_ids))
            .all(&self.db)
            .await
        {
            Ok(users) => users.into_iter().map(|u| (u.id, u)).collect(),
            Err(e) => {
                tracing::warn!("Failed to load order buyers: {e}");
                HashMap::new()
            }
        }
    }

    /// Persist a gateway callback: an optional method stamp, an optional
    /// status signal folded through the order state machine, and a metadata
    /// update built from the current row.
    ///
    /// The row is re-read inside the transaction and locked on Postgres, so
    /// overlapping deliveries apply one after the other.
    pub async fn apply_payment<F>(
        &self,
        order_id: i32,
        payment_method: Option<&str>,
        signal: Option<OrderStatus>,
        update_details: F,
    ) -> AppResult<PaymentApplied>
    where
        F: FnOnce(Value) -> Value,
    {
        let txn = self.db.begin().await?;

        let mut query = Order::find_by_id(order_id);
        if txn.get_database_backend() == DbBackend::Postgres {
            query = query.lock_exclusive();
        }
        let current = query
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound("Order"))?;

        let previous = current.status;
        let next = signal.map_or(previous, |s| previous.apply(s));
        let payment_details = update_details(current.payment_details.clone());

        let mut active: order::ActiveModel = current.into();
        if let Some(method) = payment_method {
            active.payment_method = sea_orm::ActiveValue::Set(Some(method.to_string()));
        }
        active.status = sea_orm::ActiveValue::Set(next);
        active.payment_details = sea_orm::ActiveValue::Set(payment_details);
        active.updated_at = sea_orm::ActiveValue::Set(chrono::Utc::now().naive_utc());
        let order = active.update(&txn).await?;

        txn.commit().await?;

        if previous != next {
            tracing::info!(
                "Order {} status {} -> {}",
                order.id,
                previous.as_str(),
                next.as_str()
            );
        }

        Ok(PaymentApplied {
            became_paid: previous != OrderStatus::Paid && next == OrderStatus::Paid,
            order,
        })
    }
}

pub fn is_cash_on_delivery(method: Option<&str>) -> bool {
    method.is_some_and(|m| m.trim().eq_ignore_ascii_case(CASH_ON_DELIVERY))
}

/// A copy of the object stored under `details[gateway]`, empty if absent.
pub fn gateway_section(details: &Value, gateway: &str) -> Map<String, Value> {
    match details.get(gateway) {
        Some(Value::Object(section)) => section.clone(),
        _ => Map::new(),
    }
}

/// Overlay `fields` on the existing `details[gateway]` section.
pub fn merge_gateway_section(details: Value, gateway: &str, fields: Map<String, Value>) -> Value {
    let mut section = gateway_section(&details, gateway);
    section.extend(fields);
    with_gateway_section(details, gateway, section)
}

/// Store `section` under `details[gateway]`, keeping every other key. A
/// non-object bag is replaced.
pub fn with_gateway_section(details: Value, gateway: &str, section: Map<String, Value>) -> Value {
    let mut root = match details {
        Value::Object(root) => root,
        _ => Map::new(),
    };
    root.insert(gateway.to_string(), Value::Object(section));
    Value::Object(root)
}
