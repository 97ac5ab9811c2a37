use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::locks::KeyedLocks;
use super::{CartSummary, CheckoutRequest, InventoryUpdate, NewBundle, NewProduct, ProductUpdate};
use crate::config::ServiceSettings;
use crate::domain::aggregates::{
    Cart, CartLine, LoyaltyAccount, Order, OrderError, PricingMode, Product, ProductError, ResolvedOrderLine,
};
use crate::domain::events::{CatalogEvent, DomainEvent, OrderEvent};
use crate::domain::services::{resolve_cart_line, Catalog, LoyaltyProgram, LoyaltyStatus, ResolvedLine, StockPlan};
use crate::domain::value_objects::{LineKey, Money, OrderId, RewardCode};
use crate::infrastructure::{EventPublisher, Guarded, ShopRepository};
use crate::{Result, ShopError};

const CATALOG_KEY: &str = "catalog";

/// Orchestrates the storefront core over a repository.
///
/// Checkout and catalog edits are serialised by the catalog lock. Completion and deletion
/// take the order's lock and then its owner's lock; claims and rejections take the owner's
/// lock only. The repository's revision checks catch writers outside this process.
pub struct ShopService {
    repo: Arc<dyn ShopRepository>,
    publisher: Arc<dyn EventPublisher>,
    program: RwLock<Arc<LoyaltyProgram>>,
    catalog_lock: KeyedLocks,
    order_locks: KeyedLocks,
    owner_locks: KeyedLocks,
    settings: ServiceSettings,
}

impl ShopService {
    /// Fails with [`ShopError::InvalidProgram`] when `program` is malformed.
    pub fn new(
        repo: Arc<dyn ShopRepository>,
        publisher: Arc<dyn EventPublisher>,
        program: LoyaltyProgram,
        settings: ServiceSettings,
    ) -> Result<Self> {
        program.validate()?;
        Ok(Self {
            repo,
            publisher,
            program: RwLock::new(Arc::new(program)),
            catalog_lock: KeyedLocks::new("catalog", settings.lock_timeout),
            order_locks: KeyedLocks::new("order", settings.lock_timeout),
            owner_locks: KeyedLocks::new("owner", settings.lock_timeout),
            settings,
        })
    }

    /// Uses the stored loyalty program, or validates and stores `seed` when there is none.
    pub async fn load(
        repo: Arc<dyn ShopRepository>,
        publisher: Arc<dyn EventPublisher>,
        seed: LoyaltyProgram,
        settings: ServiceSettings,
    ) -> Result<Self> {
        let program = match repo.load_program().await? {
            Some(stored) => stored,
            None => {
                seed.validate()?;
                repo.save_program(&seed).await?;
                info!(tiers = seed.tiers().len(), "Seeded loyalty program");
                seed
            }
        };
        Self::new(repo, publisher, program, settings)
    }

    pub async fn program(&self) -> Arc<LoyaltyProgram> {
        Arc::clone(&*self.program.read().await)
    }

    async fn publish(&self, events: Vec<DomainEvent>) {
        for event in events {
            if let Err(e) = self.publisher.publish(&event).await {
                warn!(subject = event.subject(), error = %e, "Failed to publish event");
            }
        }
    }

    // =========================================================================
    // Catalog resolution and cart
    // =========================================================================

    pub async fn resolve_cart_line(&self, line_key: &str) -> Result<ResolvedLine> {
        let catalog = self.repo.load_catalog().await?;
        resolve_cart_line(line_key, &catalog)
    }

    /// Adds one unit while the cart holds less than the line's availability.
    pub async fn add_to_cart(&self, cart: &mut Cart, line_key: &str) -> Result<bool> {
        let resolved = self.resolve_cart_line(line_key).await?;
        Ok(cart.add_one(resolved.key, resolved.available))
    }

    pub fn remove_from_cart(&self, cart: &mut Cart, line_key: &str) -> Result<()> {
        let key = LineKey::parse(line_key);
        cart.remove_one(&key).map_err(|_| ShopError::ProductNotFound(key.to_string()))
    }

    pub async fn cart_summary(&self, cart: &Cart) -> Result<CartSummary> {
        let catalog = self.repo.load_catalog().await?;
        let mut lines = Vec::with_capacity(cart.item_count());
        let mut skipped = Vec::new();
        for line in cart.items() {
            match catalog.resolve(&line.key) {
                Ok(resolved) => lines.push(price_line(line, resolved)?),
                Err(ShopError::ProductNotFound(_)) => skipped.push(line.key.clone()),
                Err(e) => return Err(e),
            }
        }
        let total = Money::checked_sum(lines.iter().map(|l| &l.subtotal)).ok_or(ShopError::AmountOverflow)?;
        Ok(CartSummary { lines, total, skipped })
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Validates the whole cart, commits every stock decrement together with the new order,
    /// and records the order's potential points. Nothing is written when any line is short.
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<Order> {
        let CheckoutRequest { owner_id, cart, delivery } = request;
        if cart.is_empty() { return Err(ShopError::EmptyCart); }

        let _catalog_guard = self.catalog_lock.acquire(CATALOG_KEY).await?;
        let mut catalog = self.repo.load_catalog().await?;

        let mut resolved_lines = Vec::with_capacity(cart.item_count());
        for line in cart.items() {
            resolved_lines.push(price_line(line, catalog.resolve(&line.key)?)?);
        }

        let plan = StockPlan::validate(&catalog, cart.items())?;
        let updated = plan.apply(&catalog)?;
        let expected: Vec<Option<u64>> = updated.iter().map(|p| catalog.get(p.id()).map(Product::revision)).collect();
        for product in &updated {
            catalog.insert(product.clone());
        }

        let potential_points = self.program().await.points_for_lines(&catalog, cart.items())?;
        let order_count = self.repo.count_orders().await?;
        let order_id = {
            let now = Utc::now().with_timezone(&self.settings.store_offset);
            OrderId::generate(&now, order_count, &mut rand::thread_rng())
        };

        let mut order = Order::place(order_id, owner_id, cart.items().to_vec(), resolved_lines, potential_points, delivery)
            .map_err(|e| match e {
                OrderError::AmountOverflow => ShopError::AmountOverflow,
                _ => ShopError::EmptyCart,
            })?;
        let mut events = order.take_events();
        let writes: Vec<Guarded<'_, Product>> =
            updated.iter().zip(expected).map(|(p, rev)| Guarded::expecting(p, rev)).collect();
        self.repo.commit_checkout(&writes, &order).await?;

        info!(
            order_id = %order.id(),
            owner_id = %order.owner_id(),
            total = %order.total(),
            potential_points,
            products = updated.len(),
            "Checkout committed"
        );
        events.push(DomainEvent::Catalog(CatalogEvent::StockCommitted {
            order_id: order.id().to_string(),
            product_ids: updated.iter().map(|p| p.id().to_string()).collect(),
        }));
        self.publish(events).await;
        Ok(order)
    }

    // =========================================================================
    // Orders
    // =========================================================================

    pub async fn get_order(&self, order_id: &str) -> Result<Order> {
        self.repo.get_order(order_id).await?.ok_or_else(|| ShopError::OrderNotFound(order_id.to_string()))
    }

    pub async fn list_orders(&self, owner_id: Option<&str>) -> Result<Vec<Order>> {
        self.repo.list_orders(owner_id).await
    }

    /// Flips the completion flag, granting or revoking points exactly once per edge.
    pub async fn toggle_order_completion(&self, order_id: &str) -> Result<Order> {
        let _order_guard = self.order_locks.acquire(order_id).await?;
        let order = self.get_order(order_id).await?;
        let target = !order.is_completed();
        self.transition(order, target).await
    }

    /// Moves the order to the requested state. Repeating a request is a no-op.
    pub async fn set_order_completion(&self, order_id: &str, completed: bool) -> Result<Order> {
        let _order_guard = self.order_locks.acquire(order_id).await?;
        let order = self.get_order(order_id).await?;
        if order.is_completed() == completed {
            debug!(order_id, completed, "Order already in requested state");
            return Ok(order);
        }
        self.transition(order, completed).await
    }

    /// Caller holds the order lock.
    async fn transition(&self, mut order: Order, completed: bool) -> Result<Order> {
        let _owner_guard = self.owner_locks.acquire(order.owner_id()).await?;
        let (mut account, account_revision) = self.account(order.owner_id()).await?;
        let order_revision = order.revision();

        if completed {
            let catalog = self.repo.load_catalog().await?;
            let points = self.program().await.points_for_lines(&catalog, order.lines())?;
            order.complete(points).map_err(|e| order_conflict(&order, e))?;
            account.grant(points);
            info!(order_id = %order.id(), owner_id = %order.owner_id(), points, "Order completed, points granted");
        } else {
            let points = revoke_grant(&mut order, &mut account)?;
            info!(order_id = %order.id(), owner_id = %order.owner_id(), points, "Order reopened, points revoked");
        }

        let events = order.take_events();
        self.repo
            .commit_completion(Guarded::new(&order, order_revision), Guarded::expecting(&account, account_revision))
            .await?;
        self.publish(events).await;
        Ok(order)
    }

    /// Removes an order. A completed order gives its points back first.
    pub async fn delete_order(&self, order_id: &str) -> Result<Order> {
        let _order_guard = self.order_locks.acquire(order_id).await?;
        let mut order = self.get_order(order_id).await?;
        let order_revision = order.revision();

        let mut events = Vec::new();
        if order.is_completed() {
            let _owner_guard = self.owner_locks.acquire(order.owner_id()).await?;
            let (mut account, account_revision) = self.account(order.owner_id()).await?;
            let points = revoke_grant(&mut order, &mut account)?;
            events.append(&mut order.take_events());
            self.repo
                .remove_order(Guarded::new(&order, order_revision), Some(Guarded::expecting(&account, account_revision)))
                .await?;
            info!(order_id, owner_id = %order.owner_id(), points, "Completed order deleted, points revoked");
        } else {
            self.repo.remove_order(Guarded::new(&order, order_revision), None).await?;
            info!(order_id, owner_id = %order.owner_id(), "Order deleted");
        }

        events.push(DomainEvent::Order(OrderEvent::Deleted {
            order_id: order.id().to_string(),
            owner_id: order.owner_id().to_string(),
        }));
        self.publish(events).await;
        Ok(order)
    }

    // =========================================================================
    // Loyalty
    // =========================================================================

    /// The stored account with its revision, or a new empty one that must not exist yet.
    async fn account(&self, owner_id: &str) -> Result<(LoyaltyAccount, Option<u64>)> {
        Ok(match self.repo.get_account(owner_id).await? {
            Some(account) => {
                let revision = account.revision();
                (account, Some(revision))
            }
            None => (LoyaltyAccount::open(owner_id), None),
        })
    }

    pub async fn loyalty_status(&self, owner_id: &str) -> Result<LoyaltyStatus> {
        let (account, _) = self.account(owner_id).await?;
        Ok(self.program().await.status(&account))
    }

    pub async fn claim_tier(&self, owner_id: &str, tier: u32) -> Result<RewardCode> {
        let _owner_guard = self.owner_locks.acquire(owner_id).await?;
        let (mut account, revision) = self.account(owner_id).await?;
        let program = self.program().await;
        let code = program.claim(&mut account, tier, &mut rand::thread_rng())?;
        let events = account.take_events();
        self.repo.save_account(Guarded::expecting(&account, revision)).await?;
        info!(owner_id, tier, points = account.points(), "Tier reward claimed");
        self.publish(events).await;
        Ok(code)
    }

    /// Closes a tier without issuing a code.
    pub async fn reject_tier(&self, owner_id: &str, tier: u32) -> Result<LoyaltyStatus> {
        let _owner_guard = self.owner_locks.acquire(owner_id).await?;
        let (mut account, revision) = self.account(owner_id).await?;
        let program = self.program().await;
        program.reject(&mut account, tier)?;
        let events = account.take_events();
        self.repo.save_account(Guarded::expecting(&account, revision)).await?;
        info!(owner_id, tier, "Tier reward rejected");
        self.publish(events).await;
        Ok(program.status(&account))
    }

    pub async fn replace_program(&self, program: LoyaltyProgram) -> Result<()> {
        program.validate()?;
        self.repo.save_program(&program).await?;
        info!(tiers = program.tiers().len(), multipliers = program.multipliers().len(), "Loyalty program replaced");
        *self.program.write().await = Arc::new(program);
        Ok(())
    }

    /// Re-reads the program from storage, keeping the current one when storage has none.
    pub async fn reload_program(&self) -> Result<Arc<LoyaltyProgram>> {
        if let Some(stored) = self.repo.load_program().await? {
            stored.validate()?;
            *self.program.write().await = Arc::new(stored);
        }
        Ok(self.program().await)
    }

    // =========================================================================
    // Catalog management
    // =========================================================================

    pub async fn list_catalog(&self) -> Result<Vec<Product>> {
        let catalog = self.repo.load_catalog().await?;
        Ok(catalog.sorted().into_iter().cloned().collect())
    }

    pub async fn get_product(&self, product_id: &str) -> Result<Product> {
        let catalog = self.repo.load_catalog().await?;
        catalog.get(product_id).cloned().ok_or_else(|| ShopError::ProductNotFound(product_id.to_string()))
    }

    /// Adds a product under an id derived from its name.
    pub async fn add_product(&self, new: NewProduct) -> Result<Product> {
        let _catalog_guard = self.catalog_lock.acquire(CATALOG_KEY).await?;
        let catalog = self.repo.load_catalog().await?;
        let id = catalog.unique_id_for(&new.name);
        let mut product = match new.pricing {
            PricingMode::Bundle { components, price } => {
                check_components(&catalog, &components)?;
                Product::bundle(id, new.name, components, price)?
            }
            pricing => Product::create(id, new.name, pricing)?,
        };
        if let Some(description) = new.description {
            product = product.with_description(description);
        }
        if new.display_order.is_some() {
            product.set_display_order(new.display_order);
        }
        self.repo.save_products(&[Guarded::fresh(&product)]).await?;
        info!(product_id = product.id(), "Product added");
        Ok(product)
    }

    pub async fn create_bundle(&self, bundle: NewBundle) -> Result<Product> {
        self.add_product(NewProduct {
            name: bundle.name,
            description: bundle.description,
            pricing: PricingMode::Bundle { components: bundle.components, price: bundle.price },
            display_order: None,
        })
        .await
    }

    pub async fn update_product(&self, product_id: &str, update: ProductUpdate) -> Result<Product> {
        let _catalog_guard = self.catalog_lock.acquire(CATALOG_KEY).await?;
        let mut product = self.get_product(product_id).await?;
        let revision = product.revision();
        product.rename(update.name, update.description)?;
        if update.price.is_some() || update.stock.is_some() {
            match product.update_simple(update.price, update.stock) {
                Ok(()) => {}
                Err(ProductError::NotSimple(_)) => {
                    debug!(product_id, "Price and stock ignored for non-simple product")
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.repo.save_products(&[Guarded::new(&product, revision)]).await?;
        info!(product_id, "Product updated");
        Ok(product)
    }

    /// Applies the bulk inventory form. Unknown products or variants are skipped. Returns the
    /// number of products changed.
    pub async fn apply_inventory_update(&self, update: InventoryUpdate) -> Result<usize> {
        let _catalog_guard = self.catalog_lock.acquire(CATALOG_KEY).await?;
        let mut catalog = self.repo.load_catalog().await?;
        let mut originals: BTreeMap<String, u64> = BTreeMap::new();
        let mut events = Vec::new();

        for (raw_key, stock) in &update.stock {
            let key = LineKey::parse(raw_key);
            let Some(product) = catalog.get_mut(key.base_id()) else {
                warn!(line_key = %raw_key, "Stock override for unknown product skipped");
                continue;
            };
            let revision = product.revision();
            if !product.set_stock(key.variant(), *stock) {
                warn!(line_key = %raw_key, "Stock override for unknown counter skipped");
                continue;
            }
            originals.entry(product.id().to_string()).or_insert(revision);
            info!(line_key = %raw_key, stock, "Stock overridden");
            events.push(DomainEvent::Catalog(CatalogEvent::StockOverridden { line_key: raw_key.clone(), stock: *stock }));
        }

        for (product_id, order) in &update.display_order {
            let Some(product) = catalog.get_mut(product_id) else {
                warn!(product_id = %product_id, "Display order for unknown product skipped");
                continue;
            };
            let revision = product.revision();
            product.set_display_order(*order);
            originals.entry(product_id.clone()).or_insert(revision);
        }

        let writes: Vec<Guarded<'_, Product>> = originals
            .iter()
            .filter_map(|(id, revision)| catalog.get(id).map(|p| Guarded::new(p, *revision)))
            .collect();
        self.repo.save_products(&writes).await?;
        self.publish(events).await;
        Ok(writes.len())
    }

    pub async fn toggle_promotion(&self, product_id: &str) -> Result<bool> {
        let _catalog_guard = self.catalog_lock.acquire(CATALOG_KEY).await?;
        let mut product = self.get_product(product_id).await?;
        let revision = product.revision();
        let promotion = product.toggle_promotion();
        self.repo.save_products(&[Guarded::new(&product, revision)]).await?;
        info!(product_id, promotion, "Promotion toggled");
        Ok(promotion)
    }

    /// Refused while any bundle references the product.
    pub async fn delete_product(&self, product_id: &str) -> Result<()> {
        let _catalog_guard = self.catalog_lock.acquire(CATALOG_KEY).await?;
        let catalog = self.repo.load_catalog().await?;
        let product = catalog.get(product_id).ok_or_else(|| ShopError::ProductNotFound(product_id.to_string()))?;
        let bundles: Vec<String> = catalog.bundles_containing(product_id).iter().map(|b| b.id().to_string()).collect();
        if !bundles.is_empty() {
            warn!(product_id, bundles = ?bundles, "Product deletion refused, product is part of bundles");
            return Err(ShopError::ProductInBundle { product_id: product_id.to_string(), bundles });
        }
        self.repo.delete_product(Guarded::new(product, product.revision())).await?;
        info!(product_id, "Product deleted");
        self.publish(vec![DomainEvent::Catalog(CatalogEvent::ProductRemoved { product_id: product_id.to_string() })]).await;
        Ok(())
    }
}

fn price_line(line: &CartLine, resolved: ResolvedLine) -> Result<ResolvedOrderLine> {
    ResolvedOrderLine::new(line.key.clone(), resolved.display_name, resolved.unit_price, line.quantity)
        .map_err(|_| ShopError::AmountOverflow)
}

/// Reverses a completion: clears the order's grant and takes the points back from the account.
fn revoke_grant(order: &mut Order, account: &mut LoyaltyAccount) -> Result<i64> {
    let points = order.reopen().map_err(|e| order_conflict(order, e))?;
    account.revoke(points);
    Ok(points)
}

/// The completion flag moved under us; only reachable when another process edited the order.
fn order_conflict(order: &Order, error: OrderError) -> ShopError {
    warn!(order_id = %order.id(), %error, "Order changed state concurrently");
    ShopError::ConcurrentModification(format!("order {}", order.id()))
}

fn check_components(catalog: &Catalog, components: &BTreeMap<String, u32>) -> Result<()> {
    for id in components.keys() {
        match catalog.get(id) {
            Some(p) if p.simple_stock().is_some() => {}
            _ => return Err(ProductError::InvalidComponent(id.clone()).into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::LineKey;
    use crate::infrastructure::{InMemoryRepository, RecordingPublisher};

    fn service(products: Vec<Product>) -> (ShopService, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::new());
        let service = ShopService::new(
            Arc::new(InMemoryRepository::with_products(products)),
            publisher.clone(),
            LoyaltyProgram::default(),
            ServiceSettings::default(),
        )
        .unwrap();
        (service, publisher)
    }

    fn cart(lines: &[(&str, u32)]) -> Cart {
        Cart::from_lines(lines.iter().map(|(k, q)| (LineKey::parse(k), *q))).unwrap()
    }

    #[tokio::test]
    async fn test_checkout_publishes_placed_and_stock_events() {
        let (shop, publisher) = service(vec![Product::simple("gomitas", "Gomitas", Money::from(60), 5).unwrap()]);
        let order = shop.checkout(CheckoutRequest::new("ana", cart(&[("gomitas", 2)]))).await.unwrap();
        assert_eq!(order.potential_points(), 480);
        assert_eq!(publisher.subjects(), vec!["order.placed", "catalog.stock_committed"]);
    }

    #[tokio::test]
    async fn test_empty_cart_is_rejected() {
        let (shop, _) = service(vec![]);
        let err = shop.checkout(CheckoutRequest::new("ana", Cart::new())).await.unwrap_err();
        assert!(matches!(err, ShopError::EmptyCart));
    }

    #[tokio::test]
    async fn test_add_to_cart_stops_at_availability() {
        let (shop, _) = service(vec![Product::simple("pelon", "Pelon", Money::from(25), 2).unwrap()]);
        let mut cart = Cart::new();
        assert!(shop.add_to_cart(&mut cart, "pelon").await.unwrap());
        assert!(shop.add_to_cart(&mut cart, "pelon").await.unwrap());
        assert!(!shop.add_to_cart(&mut cart, "pelon").await.unwrap());
        assert_eq!(cart.quantity_of(&LineKey::parse("pelon")), 2);
        assert!(matches!(shop.add_to_cart(&mut cart, "ghost").await, Err(ShopError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn test_cart_summary_skips_missing_products() {
        let (shop, _) = service(vec![Product::simple("pelon", "Pelon", Money::from(25), 9).unwrap()]);
        let summary = shop.cart_summary(&cart(&[("pelon", 2), ("ghost", 1)])).await.unwrap();
        assert_eq!(summary.lines.len(), 1);
        assert_eq!(summary.total, Money::from(50));
        assert_eq!(summary.skipped, vec![LineKey::parse("ghost")]);
    }

    #[tokio::test]
    async fn test_add_product_derives_unique_ids() {
        let (shop, _) = service(vec![]);
        let pricing = PricingMode::Simple { price: Money::from(10), stock: Default::default() };
        let new = |name: &str| NewProduct { name: name.into(), description: None, pricing: pricing.clone(), display_order: None };
        assert_eq!(shop.add_product(new("Gomitas Acidas")).await.unwrap().id(), "gomitas_acidas");
        assert_eq!(shop.add_product(new("Gomitas Acidas")).await.unwrap().id(), "gomitas_acidas_1");
        assert_eq!(shop.add_product(new("¡¡!!")).await.unwrap().id(), "producto");
    }

    #[tokio::test]
    async fn test_bundle_components_must_be_simple() {
        let vapes = Product::with_variants(
            "vapes",
            "Vapes",
            BTreeMap::from([("mango".to_string(), crate::domain::aggregates::VariantOffer::new(Money::from(1200), 2))]),
        )
        .unwrap();
        let (shop, _) = service(vec![vapes]);
        let err = shop
            .create_bundle(NewBundle {
                name: "Combo".into(),
                description: None,
                components: BTreeMap::from([("vapes".to_string(), 1)]),
                price: Money::from(100),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::InvalidProduct(ProductError::InvalidComponent(id)) if id == "vapes"));
    }

    #[tokio::test]
    async fn test_inventory_update_skips_unknown_counters() {
        let (shop, publisher) = service(vec![Product::simple("pelon", "Pelon", Money::from(25), 1).unwrap()]);
        let update = InventoryUpdate {
            stock: BTreeMap::from([("pelon".to_string(), 40), ("pelon-xl".to_string(), 3), ("ghost".to_string(), 1)]),
            display_order: BTreeMap::from([("pelon".to_string(), Some(2))]),
        };
        assert_eq!(shop.apply_inventory_update(update).await.unwrap(), 1);
        let pelon = shop.get_product("pelon").await.unwrap();
        assert_eq!(pelon.simple_stock().unwrap().value(), 40);
        assert_eq!(pelon.display_order(), 2);
        assert_eq!(publisher.subjects(), vec!["catalog.stock_overridden"]);
    }

    #[tokio::test]
    async fn test_update_product_ignores_price_for_bundles() {
        let (shop, _) = service(vec![
            Product::simple("pelon", "Pelon", Money::from(25), 4).unwrap(),
            Product::bundle("combo", "Combo", BTreeMap::from([("pelon".to_string(), 2)]), Money::from(40)).unwrap(),
        ]);
        let update = ProductUpdate { name: "Combo Pelon".into(), description: None, price: Some(Money::from(1)), stock: Some(1) };
        let combo = shop.update_product("combo", update).await.unwrap();
        assert_eq!(combo.name(), "Combo Pelon");
        assert!(matches!(combo.pricing(), PricingMode::Bundle { price, .. } if *price == Money::from(40)));
    }

    #[tokio::test]
    async fn test_toggle_promotion() {
        let (shop, _) = service(vec![Product::simple("pelon", "Pelon", Money::from(25), 4).unwrap()]);
        assert!(shop.toggle_promotion("pelon").await.unwrap());
        assert!(!shop.toggle_promotion("pelon").await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_program_rejects_invalid_tiers() {
        let (shop, _) = service(vec![]);
        let mut tiers = LoyaltyProgram::default().tiers().to_vec();
        tiers.swap(2, 3);
        let program = serde_json::from_value::<LoyaltyProgram>(serde_json::json!({
            "tiers": tiers,
            "multipliers": [],
            "default_multiplier": "3.0",
        }))
        .unwrap();
        assert!(matches!(shop.replace_program(program).await, Err(ShopError::InvalidProgram(_))));
        assert_eq!(*shop.program().await, LoyaltyProgram::default());
    }

    #[tokio::test]
    async fn test_new_rejects_program_without_tiers() {
        let program = serde_json::from_value::<LoyaltyProgram>(serde_json::json!({
            "tiers": [],
            "multipliers": [],
            "default_multiplier": "3.0",
        }))
        .unwrap();
        let result = ShopService::new(
            Arc::new(InMemoryRepository::new()),
            Arc::new(RecordingPublisher::new()),
            program,
            ServiceSettings::default(),
        );
        assert!(matches!(result, Err(ShopError::InvalidProgram(_))));
    }

    /// A stored price beyond what `Product` accepts today.
    fn stored_with_price(price: &str) -> Product {
        let mut doc = serde_json::to_value(Product::simple("gomitas", "Gomitas", Money::from(60), 5).unwrap()).unwrap();
        doc["pricing"]["price"] = serde_json::json!(price);
        serde_json::from_value(doc).unwrap()
    }

    #[tokio::test]
    async fn test_amounts_out_of_range_fail_without_writing() {
        let (shop, publisher) = service(vec![stored_with_price("30000000000000000000000000000")]);

        let err = shop.checkout(CheckoutRequest::new("ana", cart(&[("gomitas", 3)]))).await.unwrap_err();
        assert!(matches!(err, ShopError::AmountOverflow));
        // subtotal fits, points do not
        let err = shop.checkout(CheckoutRequest::new("ana", cart(&[("gomitas", 1)]))).await.unwrap_err();
        assert!(matches!(err, ShopError::AmountOverflow));
        assert!(matches!(shop.cart_summary(&cart(&[("gomitas", 3)])).await, Err(ShopError::AmountOverflow)));

        assert_eq!(shop.get_product("gomitas").await.unwrap().simple_stock().unwrap().value(), 5);
        assert!(shop.list_orders(None).await.unwrap().is_empty());
        assert!(publisher.events().is_empty());
    }
}
