//! Storage boundary for the storefront core.
//!
//! Every write names the revision it expects to replace. A mismatch means another writer got
//! there first and surfaces as [`ShopError::ConcurrentModification`]. New records expect no
//! stored row at all, so two inserts under the same key never both succeed.

use async_trait::async_trait;

use crate::domain::aggregates::{LoyaltyAccount, Order, Product};
use crate::domain::services::{Catalog, LoyaltyProgram};
use crate::{Result, ShopError};

/// A record to write together with the revision it was read at. `None` means the record
/// must not be stored yet.
#[derive(Debug, Clone, Copy)]
pub struct Guarded<'a, T> {
    pub record: &'a T,
    pub expected_revision: Option<u64>,
}

impl<'a, T> Guarded<'a, T> {
    pub fn new(record: &'a T, expected_revision: u64) -> Self { Self { record, expected_revision: Some(expected_revision) } }

    /// For records that have never been stored.
    pub fn fresh(record: &'a T) -> Self { Self { record, expected_revision: None } }

    pub fn expecting(record: &'a T, expected_revision: Option<u64>) -> Self { Self { record, expected_revision } }
}

#[async_trait]
pub trait ShopRepository: Send + Sync {
    async fn load_catalog(&self) -> Result<Catalog>;

    async fn save_products(&self, products: &[Guarded<'_, Product>]) -> Result<()>;

    async fn delete_product(&self, product: Guarded<'_, Product>) -> Result<()>;

    async fn count_orders(&self) -> Result<u64>;

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>>;

    /// Newest first, optionally only one owner's orders.
    async fn list_orders(&self, owner_id: Option<&str>) -> Result<Vec<Order>>;

    /// Stock decrements and the new order, all or nothing.
    async fn commit_checkout(&self, products: &[Guarded<'_, Product>], order: &Order) -> Result<()>;

    /// Completion flag change together with the owner's point balance.
    async fn commit_completion(&self, order: Guarded<'_, Order>, account: Guarded<'_, LoyaltyAccount>) -> Result<()>;

    /// Deletes an order, saving the owner's account in the same unit when points were revoked.
    async fn remove_order(&self, order: Guarded<'_, Order>, account: Option<Guarded<'_, LoyaltyAccount>>) -> Result<()>;

    async fn get_account(&self, owner_id: &str) -> Result<Option<LoyaltyAccount>>;

    async fn save_account(&self, account: Guarded<'_, LoyaltyAccount>) -> Result<()>;

    async fn load_program(&self) -> Result<Option<LoyaltyProgram>>;

    async fn save_program(&self, program: &LoyaltyProgram) -> Result<()>;
}

pub(crate) fn conflict(kind: &str, id: &str) -> ShopError {
    ShopError::ConcurrentModification(format!("{kind} {id}"))
}

/// Compare-and-swap rule shared by the stores: a missing record only matches a fresh write,
/// a stored one only its exact revision.
pub(crate) fn check_revision(kind: &str, id: &str, stored: Option<u64>, expected: Option<u64>) -> Result<()> {
    if stored == expected { Ok(()) } else { Err(conflict(kind, id)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_write_requires_absent_record() {
        assert!(check_revision("product", "gomitas", None, None).is_ok());
        assert!(check_revision("product", "gomitas", Some(0), None).unwrap_err().is_retryable());
        assert!(check_revision("product", "gomitas", Some(0), Some(0)).is_ok());
        assert!(check_revision("product", "gomitas", None, Some(0)).is_err());
        assert!(check_revision("product", "gomitas", Some(2), Some(1)).is_err());
    }
}
