//! Domain services: pure pricing, stock and loyalty logic over aggregates.
pub mod catalog;
pub mod stock;
pub mod loyalty;

pub use catalog::{resolve_cart_line, Catalog, LineKind, ResolvedLine};
pub use stock::{StockCounter, StockPlan};
pub use loyalty::{AuraTier, LevelProgress, LoyaltyProgram, LoyaltyStatus, PointsMultiplier, Threshold};
