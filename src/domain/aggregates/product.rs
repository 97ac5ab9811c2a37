//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::value_objects::{Money, Quantity};

/// Display position for products without an explicit one.
pub const DEFAULT_DISPLAY_ORDER: i32 = 999;

/// A product is priced in exactly one of three ways.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PricingMode {
    Simple { price: Money, stock: Quantity },
    Variant { variants: BTreeMap<String, VariantOffer> },
    Bundle { components: BTreeMap<String, u32>, price: Money },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantOffer {
    pub price: Money,
    pub stock: Quantity,
}

impl VariantOffer {
    pub fn new(price: Money, stock: u32) -> Self { Self { price, stock: Quantity::new(stock) } }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: String,
    name: String,
    description: Option<String>,
    pricing: PricingMode,
    display_order: i32,
    promotion: bool,
    revision: u64,
    updated_at: DateTime<Utc>,
}

impl Product {
    pub fn simple(id: impl Into<String>, name: impl Into<String>, price: Money, stock: u32) -> Result<Self, ProductError> {
        Self::create(id, name, PricingMode::Simple { price, stock: Quantity::new(stock) })
    }

    pub fn with_variants(
        id: impl Into<String>,
        name: impl Into<String>,
        variants: BTreeMap<String, VariantOffer>,
    ) -> Result<Self, ProductError> {
        Self::create(id, name, PricingMode::Variant { variants })
    }

    pub fn bundle(
        id: impl Into<String>,
        name: impl Into<String>,
        components: BTreeMap<String, u32>,
        price: Money,
    ) -> Result<Self, ProductError> {
        let mut product = Self::create(id, name, PricingMode::Bundle { components, price })?;
        product.promotion = true;
        Ok(product)
    }

    /// Validates and builds a product from any pricing mode.
    pub fn create(id: impl Into<String>, name: impl Into<String>, pricing: PricingMode) -> Result<Self, ProductError> {
        let id = id.into();
        let name = name.into();
        if id.trim().is_empty() { return Err(ProductError::MissingId); }
        if id.contains('-') { return Err(ProductError::InvalidId(id)); }
        if name.trim().is_empty() { return Err(ProductError::MissingName); }
        validate_pricing(&pricing)?;
        Ok(Self {
            id, name, description: None, pricing, display_order: DEFAULT_DISPLAY_ORDER,
            promotion: false, revision: 0, updated_at: Utc::now(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn description(&self) -> Option<&str> { self.description.as_deref() }
    pub fn pricing(&self) -> &PricingMode { &self.pricing }
    pub fn display_order(&self) -> i32 { self.display_order }
    pub fn is_promotion(&self) -> bool { self.promotion }
    pub fn revision(&self) -> u64 { self.revision }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn is_bundle(&self) -> bool { matches!(self.pricing, PricingMode::Bundle { .. }) }

    /// Scalar stock, present only for simple products.
    pub fn simple_stock(&self) -> Option<Quantity> {
        match &self.pricing {
            PricingMode::Simple { stock, .. } => Some(*stock),
            _ => None,
        }
    }

    pub fn variant(&self, key: &str) -> Option<&VariantOffer> {
        match &self.pricing {
            PricingMode::Variant { variants } => variants.get(key),
            _ => None,
        }
    }

    pub fn bundle_components(&self) -> Option<&BTreeMap<String, u32>> {
        match &self.pricing {
            PricingMode::Bundle { components, .. } => Some(components),
            _ => None,
        }
    }

    pub fn contains_component(&self, product_id: &str) -> bool {
        self.bundle_components().is_some_and(|c| c.contains_key(product_id))
    }

    pub fn rename(&mut self, name: impl Into<String>, description: Option<String>) -> Result<(), ProductError> {
        let name = name.into();
        if name.trim().is_empty() { return Err(ProductError::MissingName); }
        self.name = name;
        self.description = description;
        self.touch();
        Ok(())
    }

    /// Replaces price and/or stock of a simple product.
    pub fn update_simple(&mut self, new_price: Option<Money>, new_stock: Option<u32>) -> Result<(), ProductError> {
        let PricingMode::Simple { price, stock } = &mut self.pricing else {
            return Err(ProductError::NotSimple(self.id.clone()));
        };
        if let Some(p) = new_price {
            check_price(&p)?;
            *price = p;
        }
        if let Some(s) = new_stock { *stock = Quantity::new(s); }
        self.touch();
        Ok(())
    }

    /// Overwrites a stock counter: the scalar one when `variant` is `None`, else that variant's.
    /// Returns `false` when the product has no such counter.
    pub fn set_stock(&mut self, variant: Option<&str>, value: u32) -> bool {
        let updated = match (&mut self.pricing, variant) {
            (PricingMode::Simple { stock, .. }, None) => { *stock = Quantity::new(value); true }
            (PricingMode::Variant { variants }, Some(key)) => match variants.get_mut(key) {
                Some(offer) => { offer.stock = Quantity::new(value); true }
                None => false,
            },
            _ => false,
        };
        if updated { self.touch(); }
        updated
    }

    /// Decrements a stock counter. Callers validate sufficiency beforehand.
    pub(crate) fn remove_stock(&mut self, variant: Option<&str>, qty: u32) -> Result<(), ProductError> {
        let counter = match (&mut self.pricing, variant) {
            (PricingMode::Simple { stock, .. }, None) => stock,
            (PricingMode::Variant { variants }, Some(key)) => {
                &mut variants.get_mut(key).ok_or(ProductError::InsufficientInventory)?.stock
            }
            _ => return Err(ProductError::InsufficientInventory),
        };
        *counter = counter.subtract(qty).ok_or(ProductError::InsufficientInventory)?;
        self.touch();
        Ok(())
    }

    pub fn set_display_order(&mut self, order: Option<i32>) {
        self.display_order = order.unwrap_or(DEFAULT_DISPLAY_ORDER);
        self.touch();
    }

    pub fn toggle_promotion(&mut self) -> bool {
        self.promotion = !self.promotion;
        self.touch();
        self.promotion
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = Utc::now();
    }
}

fn check_price(price: &Money) -> Result<(), ProductError> {
    if price.is_negative() { return Err(ProductError::NegativePrice); }
    if price.exceeds_max_price() { return Err(ProductError::PriceTooHigh); }
    Ok(())
}

fn validate_pricing(pricing: &PricingMode) -> Result<(), ProductError> {
    match pricing {
        PricingMode::Simple { price, .. } => check_price(price)?,
        PricingMode::Variant { variants } => {
            if variants.is_empty() { return Err(ProductError::NoVariants); }
            variants.values().try_for_each(|v| check_price(&v.price))?;
        }
        PricingMode::Bundle { components, price } => {
            if components.is_empty() { return Err(ProductError::EmptyBundle); }
            if let Some((id, _)) = components.iter().find(|(_, qty)| **qty == 0) {
                return Err(ProductError::InvalidComponentQuantity(id.clone()));
            }
            check_price(price)?;
        }
    }
    Ok(())
}

/// Derives a product id from a display name: lowercase, spaces become `_`, only
/// alphanumerics and `_` survive.
pub fn slug_from_name(name: &str) -> String {
    let slug: String = name
        .trim()
        .to_lowercase()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if slug.is_empty() { "producto".to_string() } else { slug }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("Missing product id")]
    MissingId,
    #[error("Product id {0} must not contain '-'")]
    InvalidId(String),
    #[error("Missing name")]
    MissingName,
    #[error("Negative price")]
    NegativePrice,
    #[error("Price above the limit of 1000000000")]
    PriceTooHigh,
    #[error("Variant product without variants")]
    NoVariants,
    #[error("A bundle must contain at least one product")]
    EmptyBundle,
    #[error("Bundle component {0} must be required at least once")]
    InvalidComponentQuantity(String),
    #[error("Bundle component {0} is not a simple product")]
    InvalidComponent(String),
    #[error("Product {0} is not a simple product")]
    NotSimple(String),
    #[error("Insufficient inventory")]
    InsufficientInventory,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::MAX_PRICE;

    #[test]
    fn test_product_create() {
        let p = Product::simple("gomitas", "Gomitas", Money::from(60), 10).unwrap();
        assert_eq!(p.name(), "Gomitas");
        assert_eq!(p.display_order(), DEFAULT_DISPLAY_ORDER);
        assert_eq!(p.simple_stock(), Some(Quantity::new(10)));
    }

    #[test]
    fn test_price_limit() {
        let over = Money::from(MAX_PRICE + 1);
        assert_eq!(Product::simple("gomitas", "Gomitas", over, 5).unwrap_err(), ProductError::PriceTooHigh);
        let variants = BTreeMap::from([("mango".to_string(), VariantOffer::new(over, 1))]);
        assert_eq!(Product::with_variants("vapes", "Vapes", variants).unwrap_err(), ProductError::PriceTooHigh);

        let mut p = Product::simple("gomitas", "Gomitas", Money::from(MAX_PRICE), 5).unwrap();
        assert_eq!(p.update_simple(Some(over), None), Err(ProductError::PriceTooHigh));
        assert!(matches!(p.pricing(), PricingMode::Simple { price, .. } if *price == Money::from(MAX_PRICE)));
    }

    #[test]
    fn test_inventory() {
        let mut p = Product::simple("pelon", "Pelon", Money::from(60), 10).unwrap();
        p.remove_stock(None, 5).unwrap();
        assert_eq!(p.simple_stock().unwrap().value(), 5);
        assert_eq!(p.remove_stock(None, 6), Err(ProductError::InsufficientInventory));
        assert_eq!(p.revision(), 1);
    }

    #[test]
    fn test_bundle_rules() {
        assert_eq!(
            Product::bundle("combo", "Combo", BTreeMap::new(), Money::from(100)).unwrap_err(),
            ProductError::EmptyBundle
        );
        let zero = BTreeMap::from([("gomitas".to_string(), 0)]);
        assert!(matches!(
            Product::bundle("combo", "Combo", zero, Money::from(100)),
            Err(ProductError::InvalidComponentQuantity(_))
        ));
        let ok = BTreeMap::from([("gomitas".to_string(), 2)]);
        let combo = Product::bundle("combo", "Combo", ok, Money::from(100)).unwrap();
        assert!(combo.is_promotion());
        assert!(combo.contains_component("gomitas"));
    }

    #[test]
    fn test_set_stock_targets_counter() {
        let variants = BTreeMap::from([("mango".to_string(), VariantOffer::new(Money::from(1200), 3))]);
        let mut vape = Product::with_variants("vapes", "Vapes", variants).unwrap();
        assert!(vape.set_stock(Some("mango"), 9));
        assert_eq!(vape.variant("mango").unwrap().stock.value(), 9);
        assert!(!vape.set_stock(Some("uva"), 9));
        assert!(!vape.set_stock(None, 9));
    }

    #[test]
    fn test_slug_from_name() {
        assert_eq!(slug_from_name("Nerds Rope!"), "nerds_rope");
        assert_eq!(slug_from_name("  "), "producto");
        assert!(Product::simple("a-b", "A", Money::zero(), 0).is_err());
    }
}
