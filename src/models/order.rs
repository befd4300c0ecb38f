use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl OrderStatus {
    /// Resolve the status after a gateway signal. `Paid` is terminal, so a
    /// late or duplicated failure can never undo a confirmed payment.
    pub fn apply(self, signal: OrderStatus) -> OrderStatus {
        match (self, signal) {
            (OrderStatus::Paid, _) => OrderStatus::Paid,
            (current, OrderStatus::Pending) => current,
            (_, next) => next,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub total: f64,
    pub status: OrderStatus,
    pub payment_method: Option<String>,
    /// Gateway bookkeeping keyed by gateway name (`payfast`, `stripe`) plus
    /// whatever the storefront sent at checkout.
    #[sea_orm(column_type = "JsonBinary")]
    #[schema(value_type = Object)]
    pub payment_details: Json,
    #[sea_orm(column_type = "Text", nullable)]
    pub shipping_address: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::OrderStatus::{self, *};

    #[test]
    fn pending_moves_to_either_outcome() {
        assert_eq!(Pending.apply(Paid), Paid);
        assert_eq!(Pending.apply(Failed), Failed);
    }

    #[test]
    fn paid_is_sticky() {
        assert_eq!(Paid.apply(Failed), Paid);
        assert_eq!(Paid.apply(Pending), Paid);
        assert_eq!(Paid.apply(Paid), Paid);
    }

    #[test]
    fn failed_can_still_be_paid() {
        assert_eq!(Failed.apply(Paid), Paid);
        assert_eq!(Failed.apply(Pending), Failed);
    }

    #[test]
    fn any_sequence_with_a_success_ends_paid() {
        let signals = [Failed, Pending, Paid, Failed, Pending, Failed];
        for start in 0..signals.len() {
            let mut rotated = signals.to_vec();
            rotated.rotate_left(start);
            let end = rotated
                .iter()
                .fold(OrderStatus::Pending, |acc, s| acc.apply(*s));
            assert_eq!(end, Paid, "rotation {start} did not end paid");
        }
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Paid).unwrap(), "\"paid\"");
        assert_eq!(Failed.as_str(), "failed");
    }
}
