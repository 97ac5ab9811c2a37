//! Application layer: the service collaborators call into.

pub mod locks;
mod service;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::aggregates::{Cart, DeliveryInfo, PricingMode, ResolvedOrderLine};
use crate::domain::value_objects::{LineKey, Money};

pub use locks::KeyedLocks;
pub use service::ShopService;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub owner_id: String,
    pub cart: Cart,
    pub delivery: Option<DeliveryInfo>,
}

impl CheckoutRequest {
    pub fn new(owner_id: impl Into<String>, cart: Cart) -> Self {
        Self { owner_id: owner_id.into(), cart, delivery: None }
    }

    pub fn with_delivery(mut self, delivery: DeliveryInfo) -> Self {
        self.delivery = Some(delivery);
        self
    }
}

/// Priced view of a cart. Lines whose product disappeared are listed in `skipped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartSummary {
    pub lines: Vec<ResolvedOrderLine>,
    pub total: Money,
    pub skipped: Vec<LineKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub pricing: PricingMode,
    pub display_order: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewBundle {
    pub name: String,
    pub description: Option<String>,
    pub components: BTreeMap<String, u32>,
    pub price: Money,
}

/// Admin edit. Price and stock only apply to simple products.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductUpdate {
    pub name: String,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub stock: Option<u32>,
}

/// Bulk inventory form: stock keyed by cart line key, display order keyed by product id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InventoryUpdate {
    #[serde(default)]
    pub stock: BTreeMap<String, u32>,
    #[serde(default)]
    pub display_order: BTreeMap<String, Option<i32>>,
}
