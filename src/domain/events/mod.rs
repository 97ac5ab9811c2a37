//! Domain events
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Catalog(CatalogEvent),
    Order(OrderEvent),
    Loyalty(LoyaltyEvent),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CatalogEvent {
    StockCommitted { order_id: String, product_ids: Vec<String> },
    StockOverridden { line_key: String, stock: u32 },
    ProductRemoved { product_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: String, owner_id: String, total: Decimal, potential_points: i64 },
    Completed { order_id: String, owner_id: String, points_granted: i64 },
    Reopened { order_id: String, owner_id: String, points_revoked: i64 },
    Deleted { order_id: String, owner_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoyaltyEvent {
    TierClaimed { owner_id: String, tier: u32, code: String },
    TierRejected { owner_id: String, tier: u32 },
}

impl DomainEvent {
    /// Dotted subject suffix, e.g. `order.completed`.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Catalog(CatalogEvent::StockCommitted { .. }) => "catalog.stock_committed",
            Self::Catalog(CatalogEvent::StockOverridden { .. }) => "catalog.stock_overridden",
            Self::Catalog(CatalogEvent::ProductRemoved { .. }) => "catalog.product_removed",
            Self::Order(OrderEvent::Placed { .. }) => "order.placed",
            Self::Order(OrderEvent::Completed { .. }) => "order.completed",
            Self::Order(OrderEvent::Reopened { .. }) => "order.reopened",
            Self::Order(OrderEvent::Deleted { .. }) => "order.deleted",
            Self::Loyalty(LoyaltyEvent::TierClaimed { .. }) => "loyalty.tier_claimed",
            Self::Loyalty(LoyaltyEvent::TierRejected { .. }) => "loyalty.tier_rejected",
        }
    }
}
