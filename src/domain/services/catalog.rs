//! Catalog resolver
//!
//! Turns a cart line key into a unit price, an available quantity and a display name.
//! Resolution never mutates the catalog.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::aggregates::{slug_from_name, PricingMode, Product};
use crate::domain::value_objects::{LineKey, Money};
use crate::{Result, ShopError};

/// In-memory snapshot of every product, keyed by id.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    products: BTreeMap<String, Product>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Simple,
    Variant,
    Bundle,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedLine {
    pub key: LineKey,
    pub kind: LineKind,
    pub unit_price: Money,
    pub available: u32,
    pub display_name: String,
}

impl Catalog {
    pub fn new(products: impl IntoIterator<Item = Product>) -> Self {
        Self { products: products.into_iter().map(|p| (p.id().to_string(), p)).collect() }
    }

    pub fn get(&self, id: &str) -> Option<&Product> { self.products.get(id) }
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Product> { self.products.get_mut(id) }
    pub fn contains(&self, id: &str) -> bool { self.products.contains_key(id) }
    pub fn len(&self) -> usize { self.products.len() }
    pub fn is_empty(&self) -> bool { self.products.is_empty() }
    pub fn products(&self) -> impl Iterator<Item = &Product> { self.products.values() }

    pub fn insert(&mut self, product: Product) -> Option<Product> {
        self.products.insert(product.id().to_string(), product)
    }

    pub fn remove(&mut self, id: &str) -> Option<Product> { self.products.remove(id) }

    /// Products in display order, ties broken by id.
    pub fn sorted(&self) -> Vec<&Product> {
        let mut products: Vec<&Product> = self.products.values().collect();
        products.sort_by(|a, b| a.display_order().cmp(&b.display_order()).then_with(|| a.id().cmp(b.id())));
        products
    }

    pub fn bundles_containing(&self, product_id: &str) -> Vec<&Product> {
        self.products.values().filter(|p| p.contains_component(product_id)).collect()
    }

    /// First free id derived from `name`: the slug itself, then `slug_1`, `slug_2`, ...
    pub fn unique_id_for(&self, name: &str) -> String {
        let base = slug_from_name(name);
        let mut candidate = base.clone();
        let mut counter = 1;
        while self.contains(&candidate) {
            candidate = format!("{base}_{counter}");
            counter += 1;
        }
        candidate
    }

    /// Scalar stock of a simple product; anything else counts as empty.
    pub fn simple_stock(&self, product_id: &str) -> u32 {
        self.get(product_id).and_then(Product::simple_stock).map_or(0, |q| q.value())
    }

    /// How many whole bundles the current component stock can assemble.
    pub fn bundle_availability(&self, components: &BTreeMap<String, u32>) -> u32 {
        components
            .iter()
            .map(|(id, required)| self.simple_stock(id).checked_div(*required).unwrap_or(0))
            .min()
            .unwrap_or(0)
    }

    pub fn resolve(&self, key: &LineKey) -> Result<ResolvedLine> {
        let product = self.get(key.base_id()).ok_or_else(|| ShopError::ProductNotFound(key.base_id().to_string()))?;
        let resolved = match (product.pricing(), key.variant()) {
            (PricingMode::Bundle { components, price }, _) => ResolvedLine {
                key: key.clone(),
                kind: LineKind::Bundle,
                unit_price: *price,
                available: self.bundle_availability(components),
                display_name: product.name().to_string(),
            },
            (PricingMode::Variant { variants }, variant) => {
                let offer = variant.and_then(|v| variants.get(v));
                ResolvedLine {
                    key: key.clone(),
                    kind: LineKind::Variant,
                    unit_price: offer.map_or(Money::zero(), |o| o.price),
                    available: offer.map_or(0, |o| o.stock.value()),
                    display_name: variant_display_name(product, variant),
                }
            }
            (PricingMode::Simple { price, stock }, _) => ResolvedLine {
                key: key.clone(),
                kind: LineKind::Simple,
                unit_price: *price,
                available: stock.value(),
                display_name: product.name().to_string(),
            },
        };
        Ok(resolved)
    }
}

pub(crate) fn variant_display_name(product: &Product, variant: Option<&str>) -> String {
    match variant {
        Some(v) => format!("{} ({})", product.name(), v),
        None => product.name().to_string(),
    }
}

/// Resolves a raw cart line key against a catalog snapshot.
pub fn resolve_cart_line(line_key: &str, catalog: &Catalog) -> Result<ResolvedLine> {
    catalog.resolve(&LineKey::parse(line_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::VariantOffer;

    fn catalog() -> Catalog {
        let vapes = Product::with_variants(
            "vapes",
            "Vapes",
            BTreeMap::from([
                ("mango".to_string(), VariantOffer::new(Money::from(1200), 4)),
                ("uva".to_string(), VariantOffer::new(Money::from(1100), 0)),
            ]),
        )
        .unwrap();
        let combo = Product::bundle(
            "combo",
            "Combo Dulce",
            BTreeMap::from([("gomitas".to_string(), 2), ("pelon".to_string(), 3)]),
            Money::from(150),
        )
        .unwrap();
        Catalog::new([
            Product::simple("gomitas", "Gomitas", Money::from(60), 9).unwrap(),
            Product::simple("pelon", "Pelon", Money::from(60), 7).unwrap(),
            vapes,
            combo,
        ])
    }

    #[test]
    fn test_resolve_simple() {
        let line = resolve_cart_line("gomitas", &catalog()).unwrap();
        assert_eq!(line.kind, LineKind::Simple);
        assert_eq!(line.unit_price, Money::from(60));
        assert_eq!(line.available, 9);
        assert_eq!(line.display_name, "Gomitas");
    }

    #[test]
    fn test_resolve_variant() {
        let line = resolve_cart_line("vapes-mango", &catalog()).unwrap();
        assert_eq!(line.unit_price, Money::from(1200));
        assert_eq!(line.available, 4);
        assert_eq!(line.display_name, "Vapes (mango)");

        let unknown = resolve_cart_line("vapes-fresa", &catalog()).unwrap();
        assert_eq!(unknown.unit_price, Money::zero());
        assert_eq!(unknown.available, 0);
    }

    #[test]
    fn test_resolve_bundle_uses_min_component_capacity() {
        // gomitas 9/2 = 4, pelon 7/3 = 2
        let line = resolve_cart_line("combo", &catalog()).unwrap();
        assert_eq!(line.kind, LineKind::Bundle);
        assert_eq!(line.unit_price, Money::from(150));
        assert_eq!(line.available, 2);
    }

    #[test]
    fn test_bundle_with_low_or_missing_component_is_unavailable() {
        let mut catalog = catalog();
        catalog.get_mut("pelon").unwrap().set_stock(None, 2);
        assert_eq!(resolve_cart_line("combo", &catalog).unwrap().available, 0);

        let mut catalog = self::catalog();
        catalog.remove("gomitas");
        assert_eq!(resolve_cart_line("combo", &catalog).unwrap().available, 0);
    }

    #[test]
    fn test_missing_product() {
        assert!(matches!(resolve_cart_line("ruffles", &catalog()), Err(ShopError::ProductNotFound(id)) if id == "ruffles"));
    }

    #[test]
    fn test_unique_id_and_sorting() {
        let mut catalog = catalog();
        assert_eq!(catalog.unique_id_for("Gomitas"), "gomitas_1");
        assert_eq!(catalog.unique_id_for("Brownie"), "brownie");
        catalog.get_mut("vapes").unwrap().set_display_order(Some(1));
        assert_eq!(catalog.sorted()[0].id(), "vapes");
        assert_eq!(catalog.bundles_containing("pelon").len(), 1);
    }
}
