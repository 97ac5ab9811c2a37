//! In-memory repository for development and tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::repository::{check_revision, Guarded, ShopRepository};
use crate::domain::aggregates::{LoyaltyAccount, Order, Product};
use crate::domain::services::{Catalog, LoyaltyProgram};
use crate::{Result, ShopError};

#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: RwLock<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    products: BTreeMap<String, Product>,
    orders: BTreeMap<String, Order>,
    accounts: HashMap<String, LoyaltyAccount>,
    program: Option<LoyaltyProgram>,
}

impl MemoryState {
    fn check_products(&self, products: &[Guarded<'_, Product>]) -> Result<()> {
        products.iter().try_for_each(|g| {
            let id = g.record.id();
            check_revision("product", id, self.products.get(id).map(Product::revision), g.expected_revision)
        })
    }

    fn check_order(&self, order: &Guarded<'_, Order>) -> Result<()> {
        let id = order.record.id().as_str();
        let stored = self.orders.get(id).ok_or_else(|| ShopError::OrderNotFound(id.to_string()))?;
        check_revision("order", id, Some(stored.revision()), order.expected_revision)
    }

    fn check_account(&self, account: &Guarded<'_, LoyaltyAccount>) -> Result<()> {
        let id = account.record.owner_id();
        check_revision("account", id, self.accounts.get(id).map(LoyaltyAccount::revision), account.expected_revision)
    }

    fn put_products(&mut self, products: &[Guarded<'_, Product>]) {
        for g in products {
            self.products.insert(g.record.id().to_string(), g.record.clone());
        }
    }

    fn put_account(&mut self, account: &LoyaltyAccount) {
        self.accounts.insert(account.owner_id().to_string(), account.clone());
    }
}

impl InMemoryRepository {
    pub fn new() -> Self { Self::default() }

    /// Repository preloaded with a catalog.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let state = MemoryState {
            products: products.into_iter().map(|p| (p.id().to_string(), p)).collect(),
            ..MemoryState::default()
        };
        Self { state: RwLock::new(state) }
    }
}

#[async_trait]
impl ShopRepository for InMemoryRepository {
    async fn load_catalog(&self) -> Result<Catalog> {
        Ok(Catalog::new(self.state.read().await.products.values().cloned()))
    }

    async fn save_products(&self, products: &[Guarded<'_, Product>]) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_products(products)?;
        state.put_products(products);
        Ok(())
    }

    async fn delete_product(&self, product: Guarded<'_, Product>) -> Result<()> {
        let mut state = self.state.write().await;
        let id = product.record.id();
        if !state.products.contains_key(id) { return Err(ShopError::ProductNotFound(id.to_string())); }
        check_revision("product", id, state.products.get(id).map(Product::revision), product.expected_revision)?;
        state.products.remove(id);
        Ok(())
    }

    async fn count_orders(&self) -> Result<u64> {
        Ok(self.state.read().await.orders.len() as u64)
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(order_id).cloned())
    }

    async fn list_orders(&self, owner_id: Option<&str>) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| owner_id.map_or(true, |owner| o.owner_id() == owner))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(orders)
    }

    async fn commit_checkout(&self, products: &[Guarded<'_, Product>], order: &Order) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_products(products)?;
        let id = order.id().as_str();
        if state.orders.contains_key(id) {
            return Err(ShopError::ConcurrentModification(format!("order {id}")));
        }
        state.put_products(products);
        state.orders.insert(id.to_string(), order.clone());
        Ok(())
    }

    async fn commit_completion(&self, order: Guarded<'_, Order>, account: Guarded<'_, LoyaltyAccount>) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_order(&order)?;
        state.check_account(&account)?;
        state.orders.insert(order.record.id().to_string(), order.record.clone());
        state.put_account(account.record);
        Ok(())
    }

    async fn remove_order(&self, order: Guarded<'_, Order>, account: Option<Guarded<'_, LoyaltyAccount>>) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_order(&order)?;
        if let Some(account) = &account {
            state.check_account(account)?;
        }
        state.orders.remove(order.record.id().as_str());
        if let Some(account) = account {
            state.put_account(account.record);
        }
        Ok(())
    }

    async fn get_account(&self, owner_id: &str) -> Result<Option<LoyaltyAccount>> {
        Ok(self.state.read().await.accounts.get(owner_id).cloned())
    }

    async fn save_account(&self, account: Guarded<'_, LoyaltyAccount>) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_account(&account)?;
        state.put_account(account.record);
        Ok(())
    }

    async fn load_program(&self) -> Result<Option<LoyaltyProgram>> {
        Ok(self.state.read().await.program.clone())
    }

    async fn save_program(&self, program: &LoyaltyProgram) -> Result<()> {
        self.state.write().await.program = Some(program.clone());
        Ok(())
    }
}
