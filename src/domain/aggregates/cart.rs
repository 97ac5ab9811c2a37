//! Cart Aggregate

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::value_objects::LineKey;

/// Customer cart: line keys with quantities, in the order they were first added.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartLine>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub key: LineKey,
    pub quantity: u32,
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    /// Builds a cart from raw lines, merging repeated keys.
    pub fn from_lines(lines: impl IntoIterator<Item = (LineKey, u32)>) -> Result<Self, CartError> {
        let mut cart = Self::new();
        for (key, quantity) in lines {
            if quantity == 0 { return Err(CartError::InvalidQuantity(key.to_string())); }
            match cart.items.iter_mut().find(|i| i.key == key) {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(quantity),
                None => cart.items.push(CartLine { key, quantity }),
            }
        }
        Ok(cart)
    }

    pub fn items(&self) -> &[CartLine] { &self.items }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn quantity_of(&self, key: &LineKey) -> u32 {
        self.items.iter().find(|i| &i.key == key).map_or(0, |i| i.quantity)
    }

    /// Adds one unit while the line stays within `available`. Returns whether the cart changed.
    pub fn add_one(&mut self, key: LineKey, available: u32) -> bool {
        let current = self.quantity_of(&key);
        if current >= available { return false; }
        match self.items.iter_mut().find(|i| i.key == key) {
            Some(existing) => existing.quantity += 1,
            None => self.items.push(CartLine { key, quantity: 1 }),
        }
        true
    }

    /// Removes one unit, dropping the line when it reaches zero.
    pub fn remove_one(&mut self, key: &LineKey) -> Result<(), CartError> {
        let pos = self.items.iter().position(|i| &i.key == key).ok_or_else(|| CartError::ItemNotFound(key.to_string()))?;
        if self.items[pos].quantity > 1 {
            self.items[pos].quantity -= 1;
        } else {
            self.items.remove(pos);
        }
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Item not found: {0}")]
    ItemNotFound(String),
    #[error("Invalid quantity for {0}")]
    InvalidQuantity(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_operations() {
        let mut cart = Cart::new();
        let key = LineKey::parse("gomitas");
        assert!(cart.add_one(key.clone(), 2));
        assert!(cart.add_one(key.clone(), 2));
        assert!(!cart.add_one(key.clone(), 2)); // capped by stock
        assert_eq!(cart.quantity_of(&key), 2);
        cart.remove_one(&key).unwrap();
        cart.remove_one(&key).unwrap();
        assert!(cart.is_empty());
        assert!(matches!(cart.remove_one(&key), Err(CartError::ItemNotFound(_))));
    }

    #[test]
    fn test_from_lines_merges_and_rejects_zero() {
        let cart = Cart::from_lines([(LineKey::parse("a"), 1), (LineKey::parse("b-x"), 2), (LineKey::parse("a"), 3)]).unwrap();
        assert_eq!(cart.item_count(), 2);
        assert_eq!(cart.items()[0].quantity, 4); // Merged
        assert!(Cart::from_lines([(LineKey::parse("a"), 0)]).is_err());
    }

    #[test]
    fn test_clear_empties_cart() {
        let mut cart = Cart::from_lines([(LineKey::with_variant("vapes", "mango"), 1)]).unwrap();
        assert_eq!(cart.items()[0].key.to_string(), "vapes-mango");
        cart.clear();
        assert!(cart.is_empty());
    }
}
