//! Order Aggregate
//!
//! An order is an immutable snapshot of a checked-out cart. Only the completion flag and
//! the granted points change after placement, and both always change together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::aggregates::cart::CartLine;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{LineKey, Money, OrderId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    owner_id: String,
    lines: Vec<CartLine>,
    resolved_lines: Vec<ResolvedOrderLine>,
    total: Money,
    potential_points: i64,
    granted_points: Option<i64>,
    completed: bool,
    delivery: Option<DeliveryInfo>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    revision: u64,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Name and price of a line as they were at checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedOrderLine {
    pub key: LineKey,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub subtotal: Money,
}

impl ResolvedOrderLine {
    pub fn new(key: LineKey, name: impl Into<String>, unit_price: Money, quantity: u32) -> Result<Self, OrderError> {
        let subtotal = unit_price.checked_multiply(quantity).ok_or(OrderError::AmountOverflow)?;
        Ok(Self { key, name: name.into(), unit_price, quantity, subtotal })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    pub day: String,
    pub time: String,
    pub station: String,
}

impl Order {
    pub fn place(
        id: OrderId,
        owner_id: impl Into<String>,
        lines: Vec<CartLine>,
        resolved_lines: Vec<ResolvedOrderLine>,
        potential_points: i64,
        delivery: Option<DeliveryInfo>,
    ) -> Result<Self, OrderError> {
        if lines.is_empty() { return Err(OrderError::NoItems); }
        let total = Money::checked_sum(resolved_lines.iter().map(|l| &l.subtotal)).ok_or(OrderError::AmountOverflow)?;
        let now = Utc::now();
        let mut order = Self {
            id, owner_id: owner_id.into(), lines, resolved_lines, total, potential_points,
            granted_points: None, completed: false, delivery, created_at: now, updated_at: now,
            revision: 0, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_id: order.id.to_string(),
            owner_id: order.owner_id.clone(),
            total: order.total.amount(),
            potential_points,
        }));
        Ok(order)
    }

    pub fn id(&self) -> &OrderId { &self.id }
    pub fn owner_id(&self) -> &str { &self.owner_id }
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn resolved_lines(&self) -> &[ResolvedOrderLine] { &self.resolved_lines }
    pub fn total(&self) -> &Money { &self.total }
    pub fn potential_points(&self) -> i64 { self.potential_points }
    pub fn granted_points(&self) -> Option<i64> { self.granted_points }
    pub fn is_completed(&self) -> bool { self.completed }
    pub fn delivery(&self) -> Option<&DeliveryInfo> { self.delivery.as_ref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn revision(&self) -> u64 { self.revision }

    /// `false -> true`: records the points granted for this completion.
    pub fn complete(&mut self, points: i64) -> Result<(), OrderError> {
        if self.completed { return Err(OrderError::AlreadyCompleted); }
        self.completed = true;
        self.granted_points = Some(points);
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Completed {
            order_id: self.id.to_string(),
            owner_id: self.owner_id.clone(),
            points_granted: points,
        }));
        Ok(())
    }

    /// `true -> false`: clears and returns the points that must be revoked.
    pub fn reopen(&mut self) -> Result<i64, OrderError> {
        if !self.completed { return Err(OrderError::NotCompleted); }
        let revoked = self.granted_points.take().unwrap_or(0);
        self.completed = false;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Reopened {
            order_id: self.id.to_string(),
            owner_id: self.owner_id.clone(),
            points_revoked: revoked,
        }));
        Ok(revoked)
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("Order has no items")]
    NoItems,
    #[error("Order is already completed")]
    AlreadyCompleted,
    #[error("Order is not completed")]
    NotCompleted,
    #[error("Order amount out of range")]
    AmountOverflow,
}
