//! Value Objects for the storefront

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

const STAMP_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Highest unit price the catalog accepts.
pub const MAX_PRICE: i64 = 1_000_000_000;

/// Length of an issued reward code.
pub const REWARD_CODE_LEN: usize = 8;

/// Money value object. The store sells in a single currency, so only the amount is carried.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub fn new(amount: Decimal) -> Self { Self(amount) }
    pub fn zero() -> Self { Self(Decimal::ZERO) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }
    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }
    pub fn exceeds_max_price(&self) -> bool { self.0 > Decimal::from(MAX_PRICE) }
    pub fn checked_add(&self, other: &Money) -> Option<Money> { self.0.checked_add(other.0).map(Money) }
    pub fn checked_multiply(&self, qty: u32) -> Option<Money> { self.0.checked_mul(Decimal::from(qty)).map(Money) }

    /// `None` when the sum leaves the representable range.
    pub fn checked_sum<'a>(amounts: impl IntoIterator<Item = &'a Money>) -> Option<Money> {
        amounts.into_iter().try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self { Self(Decimal::from(value)) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "${:.2}", self.0) }
}

/// Stock counter value object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn subtract(&self, other: u32) -> Option<Self> {
        if other > self.0 { None } else { Some(Self(self.0 - other)) }
    }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
}

/// Cart line key: a base product id optionally followed by `-` and a variant key.
///
/// Only the first `-` separates; the variant key may itself contain dashes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineKey {
    base_id: String,
    variant: Option<String>,
}

impl LineKey {
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('-') {
            Some((base, variant)) => Self::with_variant(base, variant),
            None => Self::simple(raw),
        }
    }

    pub fn simple(base_id: impl Into<String>) -> Self { Self { base_id: base_id.into(), variant: None } }

    pub fn with_variant(base_id: impl Into<String>, variant: impl Into<String>) -> Self {
        Self { base_id: base_id.into(), variant: Some(variant.into()) }
    }

    pub fn base_id(&self) -> &str { &self.base_id }
    pub fn variant(&self) -> Option<&str> { self.variant.as_deref() }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(v) => write!(f, "{}-{}", self.base_id, v),
            None => write!(f, "{}", self.base_id),
        }
    }
}

impl From<&str> for LineKey {
    fn from(raw: &str) -> Self { Self::parse(raw) }
}

impl Serialize for LineKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LineKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Base-26 letter cycle: `A`..`Z` for 0..25, then the letter followed by the cycle count (`A1` is 26).
pub fn encode_number(n: u64) -> String {
    let letter = char::from(b'A' + (n % 26) as u8);
    match n / 26 {
        0 => letter.to_string(),
        cycle => format!("{letter}{cycle}"),
    }
}

fn random_stamp<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(STAMP_ALPHABET[rng.gen_range(0..STAMP_ALPHABET.len())]))
        .collect()
}

/// Human-scannable order id: `{date}-{time}-{sequence}-{stamp}`.
///
/// The date part encodes day and month and appends the two-digit year verbatim.
///
/// Not globally unique: the sequence comes from the order count at generation time and only
/// the three-character random stamp separates two orders placed in the same second.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn generate<Tz, R>(now: &DateTime<Tz>, order_count: u64, rng: &mut R) -> Self
    where
        Tz: TimeZone,
        R: Rng + ?Sized,
    {
        let date = format!(
            "{}{}{:02}",
            encode_number(u64::from(now.day0())),
            encode_number(u64::from(now.month0())),
            now.year().rem_euclid(100),
        );
        let time = format!(
            "{}{}{}",
            encode_number(u64::from(now.hour())),
            encode_number(u64::from(now.minute())),
            encode_number(u64::from(now.second())),
        );
        let sequence = encode_number(100 + order_count);
        Self(format!("{date}-{time}-{sequence}-{}", random_stamp(rng, 3)))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for OrderId {
    fn from(raw: &str) -> Self { Self(raw.to_string()) }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Reward code handed to a customer when a tier is claimed. Collisions are not checked.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardCode(String);

impl RewardCode {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self { Self(random_stamp(rng, REWARD_CODE_LEN)) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for RewardCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_money_arithmetic_reports_overflow() {
        let huge = Money::new(Decimal::MAX);
        assert_eq!(Money::from(60).checked_multiply(3), Some(Money::from(180)));
        assert_eq!(huge.checked_multiply(2), None);
        assert_eq!(huge.checked_add(&Money::from(1)), None);
        assert_eq!(Money::checked_sum(&[Money::from(60), Money::from(25)]), Some(Money::from(85)));
        assert!(Money::from(MAX_PRICE + 1).exceeds_max_price());
        assert!(!Money::from(MAX_PRICE).exceeds_max_price());
    }

    #[test]
    fn test_encode_number() {
        assert_eq!(encode_number(0), "A");
        assert_eq!(encode_number(25), "Z");
        assert_eq!(encode_number(26), "A1");
        assert_eq!(encode_number(100), "W3");
        assert_eq!(encode_number(125), "V4");
    }

    #[test]
    fn test_line_key_splits_on_first_dash() {
        let key = LineKey::parse("vapes-mango-ice");
        assert_eq!(key.base_id(), "vapes");
        assert_eq!(key.variant(), Some("mango-ice"));
        assert_eq!(key.to_string(), "vapes-mango-ice");
        assert_eq!(LineKey::parse("gomitas").variant(), None);
    }

    #[test]
    fn test_order_id_layout() {
        let tz = FixedOffset::west_opt(6 * 3600).unwrap();
        let naive = NaiveDate::from_ymd_opt(2025, 3, 27).unwrap().and_hms_opt(14, 5, 59).unwrap();
        let now = tz.from_local_datetime(&naive).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let id = OrderId::generate(&now, 3, &mut rng);
        let parts: Vec<&str> = id.as_str().split('-').collect();
        assert_eq!(parts.len(), 4);
        // day 27 -> 26 -> A1, month 3 -> 2 -> C, year kept as two digits
        assert_eq!(parts[0], "A1C25");
        // 14 -> O, 5 -> F, 59 -> H2
        assert_eq!(parts[1], "OFH2");
        // 103 -> Z3
        assert_eq!(parts[2], "Z3");
        assert_eq!(parts[3].len(), 3);
        assert!(parts[3].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_reward_code_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let code = RewardCode::generate(&mut rng);
        assert_eq!(code.as_str().len(), REWARD_CODE_LEN);
        assert!(code.as_str().chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_quantity_subtract() {
        assert_eq!(Quantity::new(5).subtract(3), Some(Quantity::new(2)));
        assert_eq!(Quantity::new(2).subtract(3), None);
    }
}
