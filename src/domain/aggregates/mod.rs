//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod loyalty;

pub use product::{slug_from_name, PricingMode, Product, ProductError, VariantOffer, DEFAULT_DISPLAY_ORDER};
pub use order::{DeliveryInfo, Order, OrderError, ResolvedOrderLine};
pub use cart::{Cart, CartError, CartLine};
pub use loyalty::{LoyaltyAccount, TierState};
