//! Stock ledger
//!
//! Checkout stock handling is two-phase. [`StockPlan::validate`] checks the whole cart and
//! computes every decrement without touching the catalog; [`StockPlan::apply`] then produces
//! the updated products. A cart with one short line changes nothing.

use std::collections::BTreeMap;

use crate::domain::aggregates::{CartLine, PricingMode, Product};
use crate::domain::services::catalog::{variant_display_name, Catalog};
use crate::{Result, ShopError};

/// A single stock counter in the catalog.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StockCounter {
    Simple(String),
    Variant(String, String),
}

impl StockCounter {
    pub fn product_id(&self) -> &str {
        match self {
            Self::Simple(id) | Self::Variant(id, _) => id,
        }
    }

    fn variant(&self) -> Option<&str> {
        match self {
            Self::Simple(_) => None,
            Self::Variant(_, v) => Some(v),
        }
    }

    fn available(&self, catalog: &Catalog) -> u32 {
        match self {
            Self::Simple(id) => catalog.simple_stock(id),
            Self::Variant(id, v) => catalog.get(id).and_then(|p| p.variant(v)).map_or(0, |o| o.stock.value()),
        }
    }
}

/// Validated decrements for one checkout.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StockPlan {
    decrements: BTreeMap<StockCounter, u32>,
}

impl StockPlan {
    /// Checks every line against current stock. Demand is accumulated per counter, so a
    /// bundle and one of its components in the same cart compete for the same units.
    pub fn validate(catalog: &Catalog, lines: &[CartLine]) -> Result<Self> {
        let mut decrements: BTreeMap<StockCounter, u32> = BTreeMap::new();
        for line in lines {
            if line.quantity == 0 { return Err(ShopError::InvalidQuantity); }
            let base_id = line.key.base_id();
            let product = catalog.get(base_id).ok_or_else(|| ShopError::ProductNotFound(base_id.to_string()))?;
            let demands: Vec<(StockCounter, Option<u32>)> = match product.pricing() {
                PricingMode::Bundle { components, .. } => components
                    .iter()
                    .map(|(id, required)| (StockCounter::Simple(id.clone()), required.checked_mul(line.quantity)))
                    .collect(),
                PricingMode::Variant { .. } => match line.key.variant() {
                    Some(v) => vec![(StockCounter::Variant(base_id.to_string(), v.to_string()), Some(line.quantity))],
                    None => return Err(insufficient(product, None)),
                },
                PricingMode::Simple { .. } => vec![(StockCounter::Simple(base_id.to_string()), Some(line.quantity))],
            };
            for (counter, need) in demands {
                let entry = decrements.entry(counter.clone()).or_insert(0);
                let total = need.and_then(|n| entry.checked_add(n));
                match total {
                    Some(total) if total <= counter.available(catalog) => *entry = total,
                    _ => return Err(insufficient(product, line.key.variant())),
                }
            }
        }
        Ok(Self { decrements })
    }

    pub fn decrements(&self) -> &BTreeMap<StockCounter, u32> { &self.decrements }
    pub fn is_empty(&self) -> bool { self.decrements.is_empty() }

    /// Copies of every affected product with the decrements applied. The catalog is left
    /// untouched; callers install the returned products once they are persisted.
    pub fn apply(&self, catalog: &Catalog) -> Result<Vec<Product>> {
        let mut updated: BTreeMap<&str, Product> = BTreeMap::new();
        for (counter, qty) in &self.decrements {
            let id = counter.product_id();
            if !updated.contains_key(id) {
                let product = catalog.get(id).ok_or_else(|| ShopError::ProductNotFound(id.to_string()))?;
                updated.insert(id, product.clone());
            }
            if let Some(product) = updated.get_mut(id) {
                product
                    .remove_stock(counter.variant(), *qty)
                    .map_err(|_| insufficient(product, counter.variant()))?;
            }
        }
        Ok(updated.into_values().collect())
    }
}

fn insufficient(product: &Product, variant: Option<&str>) -> ShopError {
    let product_name = if product.is_bundle() { product.name().to_string() } else { variant_display_name(product, variant) };
    ShopError::InsufficientStock { product_name }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::VariantOffer;
    use crate::domain::value_objects::{LineKey, Money};

    fn catalog() -> Catalog {
        Catalog::new([
            Product::simple("gomitas", "Gomitas", Money::from(60), 5).unwrap(),
            Product::simple("pelon", "Pelon", Money::from(60), 6).unwrap(),
            Product::with_variants(
                "vapes",
                "Vapes",
                BTreeMap::from([("mango".to_string(), VariantOffer::new(Money::from(1200), 2))]),
            )
            .unwrap(),
            Product::bundle(
                "combo",
                "Combo",
                BTreeMap::from([("gomitas".to_string(), 2), ("pelon".to_string(), 3)]),
                Money::from(150),
            )
            .unwrap(),
        ])
    }

    fn line(key: &str, quantity: u32) -> CartLine {
        CartLine { key: LineKey::parse(key), quantity }
    }

    #[test]
    fn test_plan_and_apply() {
        let catalog = catalog();
        let plan = StockPlan::validate(&catalog, &[line("combo", 1), line("vapes-mango", 2)]).unwrap();
        let updated = plan.apply(&catalog).unwrap();
        let by_id: BTreeMap<_, _> = updated.iter().map(|p| (p.id(), p)).collect();
        assert_eq!(by_id["gomitas"].simple_stock().unwrap().value(), 3);
        assert_eq!(by_id["pelon"].simple_stock().unwrap().value(), 3);
        assert_eq!(by_id["vapes"].variant("mango").unwrap().stock.value(), 0);
        // catalog itself unchanged
        assert_eq!(catalog.simple_stock("gomitas"), 5);
    }

    #[test]
    fn test_later_short_line_aborts_everything() {
        let catalog = catalog();
        let err = StockPlan::validate(&catalog, &[line("gomitas", 1), line("vapes-mango", 3)]).unwrap_err();
        assert!(matches!(err, ShopError::InsufficientStock { product_name } if product_name == "Vapes (mango)"));
    }

    #[test]
    fn test_bundle_and_component_share_stock() {
        // combo x2 needs 4 gomitas, plus 2 loose gomitas = 6 > 5
        let err = StockPlan::validate(&catalog(), &[line("combo", 2), line("gomitas", 2)]).unwrap_err();
        assert!(matches!(err, ShopError::InsufficientStock { product_name } if product_name == "Gomitas"));
        let err = StockPlan::validate(&catalog(), &[line("gomitas", 2), line("combo", 2)]).unwrap_err();
        assert!(matches!(err, ShopError::InsufficientStock { product_name } if product_name == "Combo"));
    }

    #[test]
    fn test_variant_product_requires_variant_key() {
        assert!(matches!(
            StockPlan::validate(&catalog(), &[line("vapes", 1)]),
            Err(ShopError::InsufficientStock { .. })
        ));
        assert!(matches!(
            StockPlan::validate(&catalog(), &[line("nope", 1)]),
            Err(ShopError::ProductNotFound(_))
        ));
    }
}
