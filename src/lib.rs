//! Aura Storefront
//!
//! Core of a small merchant's storefront and admin backend.
//!
//! ## Features
//! - Cart line resolution for simple products, priced variants and fixed bundles
//! - Two-phase stock ledger for whole-order checkout
//! - Order ledger with an idempotent completion toggle
//! - Aura points, ordered reward tiers and one-shot tier claims

use thiserror::Error;

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use application::{CartSummary, CheckoutRequest, ShopService};
pub use domain::aggregates::{Cart, LoyaltyAccount, Order, Product};
pub use domain::services::{Catalog, LoyaltyProgram, LoyaltyStatus, ResolvedLine};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum ShopError {
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Insufficient stock for {product_name}")]
    InsufficientStock { product_name: String },

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Tier {0} was already claimed or rejected")]
    AlreadyClaimed(u32),

    #[error("Tier {tier} needs {required} points, account has {points}")]
    InsufficientPoints { tier: u32, points: i64, required: i64 },

    #[error("Tier not found: {0}")]
    TierNotFound(u32),

    #[error("Concurrent modification of {0}, try again")]
    ConcurrentModification(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid quantity")]
    InvalidQuantity,

    #[error("Product {product_id} is part of bundles: {}", bundles.join(", "))]
    ProductInBundle { product_id: String, bundles: Vec<String> },

    #[error("Invalid product: {0}")]
    InvalidProduct(#[from] domain::aggregates::ProductError),

    #[error("Invalid loyalty program: {0}")]
    InvalidProgram(String),

    #[error("Amount out of range")]
    AmountOverflow,

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl ShopError {
    /// Lock contention and revision conflicts can succeed on a later attempt.
    pub fn is_retryable(&self) -> bool { matches!(self, Self::ConcurrentModification(_)) }
}

pub type Result<T> = std::result::Result<T, ShopError>;
