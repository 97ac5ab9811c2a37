//! Loyalty engine: aura points, tiers and reward claims.

use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::aggregates::{CartLine, LoyaltyAccount};
use crate::domain::services::catalog::Catalog;
use crate::domain::value_objects::{Money, RewardCode};
use crate::{Result, ShopError};

/// Minimum points for a tier. Tier 0 is `Unbounded`, so every balance maps to some tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "ThresholdRepr", into = "ThresholdRepr")]
pub enum Threshold {
    Unbounded,
    AtLeast(i64),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ThresholdRepr {
    Points(i64),
    Marker(String),
}

const NEGATIVE_INFINITY: &str = "negative_infinity";

impl TryFrom<ThresholdRepr> for Threshold {
    type Error = String;

    fn try_from(repr: ThresholdRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            ThresholdRepr::Points(p) => Ok(Self::AtLeast(p)),
            ThresholdRepr::Marker(m) if m == NEGATIVE_INFINITY => Ok(Self::Unbounded),
            ThresholdRepr::Marker(m) => Err(format!("unknown threshold {m:?}")),
        }
    }
}

impl From<Threshold> for ThresholdRepr {
    fn from(t: Threshold) -> Self {
        match t {
            Threshold::Unbounded => Self::Marker(NEGATIVE_INFINITY.to_string()),
            Threshold::AtLeast(p) => Self::Points(p),
        }
    }
}

impl Threshold {
    pub fn is_reached(&self, points: i64) -> bool {
        match self {
            Self::Unbounded => true,
            Self::AtLeast(min) => points >= *min,
        }
    }

    /// Lower edge used for progress maths; an unbounded floor counts as zero.
    pub fn floor(&self) -> i64 {
        match self {
            Self::Unbounded => 0,
            Self::AtLeast(min) => *min,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuraTier {
    pub level: u32,
    pub threshold: Threshold,
    pub name: String,
    pub flame_color: String,
    pub reward: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsMultiplier {
    pub keyword: String,
    pub multiplier: Decimal,
}

/// Tiers plus the per-product multiplier table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyProgram {
    tiers: Vec<AuraTier>,
    multipliers: Vec<PointsMultiplier>,
    default_multiplier: Decimal,
}

/// Progress from the tier below `level` up to `level`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LevelProgress {
    pub level: u32,
    pub points_into_level: i64,
    pub points_needed: i64,
    pub complete: bool,
    pub claimable: bool,
}

impl LevelProgress {
    pub fn percent(&self) -> u8 {
        if self.complete || self.points_needed <= 0 { return 100; }
        let pct = self.points_into_level.clamp(0, self.points_needed) * 100 / self.points_needed;
        pct as u8
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoyaltyStatus {
    pub owner_id: String,
    pub points: i64,
    pub tier: AuraTier,
    pub progress: Option<LevelProgress>,
    pub pending_claimable_tiers: Vec<u32>,
    pub claimed_tiers: Vec<u32>,
    pub reward_codes: BTreeMap<u32, RewardCode>,
}

impl LoyaltyProgram {
    pub fn new(tiers: Vec<AuraTier>, multipliers: Vec<PointsMultiplier>, default_multiplier: Decimal) -> Result<Self> {
        let program = Self { tiers, multipliers, default_multiplier };
        program.validate()?;
        Ok(program)
    }

    /// Tier 0 must be the unbounded floor, levels run 0..n without gaps and thresholds
    /// strictly increase with the level.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ShopError::InvalidProgram(msg));
        match self.tiers.first() {
            Some(t) if t.level == 0 && t.threshold == Threshold::Unbounded => {}
            _ => return invalid("tier 0 with an unbounded threshold must come first".into()),
        }
        for (idx, pair) in self.tiers.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.level as usize != idx + 1 {
                return invalid(format!("tier levels must be contiguous, found {} after {}", next.level, prev.level));
            }
            if !matches!(next.threshold, Threshold::AtLeast(_)) || next.threshold <= prev.threshold {
                return invalid(format!("threshold of tier {} must exceed tier {}", next.level, prev.level));
            }
        }
        if self.default_multiplier.is_sign_negative() || self.multipliers.iter().any(|m| m.multiplier.is_sign_negative()) {
            return invalid("multipliers must not be negative".into());
        }
        if self.multipliers.iter().any(|m| m.keyword.trim().is_empty()) {
            return invalid("multiplier keywords must not be empty".into());
        }
        Ok(())
    }

    pub fn tiers(&self) -> &[AuraTier] { &self.tiers }
    pub fn multipliers(&self) -> &[PointsMultiplier] { &self.multipliers }
    pub fn default_multiplier(&self) -> Decimal { self.default_multiplier }
    pub fn tier(&self, level: u32) -> Option<&AuraTier> { self.tiers.get(level as usize) }

    /// Exact id match first, then the longest keyword contained in the id (earlier entries
    /// win ties), then the default.
    pub fn multiplier_for(&self, product_id: &str) -> Decimal {
        let id = product_id.to_lowercase();
        if let Some(exact) = self.multipliers.iter().find(|m| m.keyword.to_lowercase() == id) {
            return exact.multiplier;
        }
        let mut best: Option<&PointsMultiplier> = None;
        for m in &self.multipliers {
            if id.contains(&m.keyword.to_lowercase()) && best.map_or(true, |b| m.keyword.len() > b.keyword.len()) {
                best = Some(m);
            }
        }
        best.map_or(self.default_multiplier, |m| m.multiplier)
    }

    /// `floor(unit_price * multiplier) * quantity`, or `None` when that leaves the `i64` range.
    pub fn points_for(&self, unit_price: Money, base_product_id: &str, quantity: u32) -> Option<i64> {
        let per_unit = unit_price.amount().checked_mul(self.multiplier_for(base_product_id))?.floor().to_i64()?;
        per_unit.checked_mul(i64::from(quantity))
    }

    /// Points for a set of lines priced against `catalog`. Lines that no longer resolve earn nothing.
    pub fn points_for_lines(&self, catalog: &Catalog, lines: &[CartLine]) -> Result<i64> {
        lines.iter().try_fold(0i64, |total, line| {
            let Ok(resolved) = catalog.resolve(&line.key) else { return Ok(total) };
            self.points_for(resolved.unit_price, line.key.base_id(), line.quantity)
                .and_then(|points| total.checked_add(points))
                .ok_or(ShopError::AmountOverflow)
        })
    }

    /// Highest tier whose threshold the balance reaches.
    pub fn tier_for(&self, points: i64) -> &AuraTier {
        self.tiers
            .iter()
            .rev()
            .find(|t| t.threshold.is_reached(points))
            .unwrap_or(&self.tiers[0])
    }

    pub fn progress_toward(&self, level: u32, points: i64, account: Option<&LoyaltyAccount>) -> Option<LevelProgress> {
        if level == 0 { return None; }
        let target = self.tier(level)?;
        let base = self.tier(level - 1)?.threshold.floor();
        let complete = target.threshold.is_reached(points);
        Some(LevelProgress {
            level,
            points_into_level: points - base,
            points_needed: target.threshold.floor() - base,
            complete,
            claimable: complete && !account.is_some_and(|a| a.is_closed(level)),
        })
    }

    /// Reached tiers whose reward has been neither claimed nor rejected.
    pub fn pending_claimable(&self, account: &LoyaltyAccount) -> Vec<u32> {
        self.tiers
            .iter()
            .filter(|t| t.level > 0 && t.threshold.is_reached(account.points()) && !account.is_closed(t.level))
            .map(|t| t.level)
            .collect()
    }

    pub fn status(&self, account: &LoyaltyAccount) -> LoyaltyStatus {
        let tier = self.tier_for(account.points()).clone();
        LoyaltyStatus {
            owner_id: account.owner_id().to_string(),
            points: account.points(),
            progress: self.progress_toward(tier.level + 1, account.points(), Some(account)),
            tier,
            pending_claimable_tiers: self.pending_claimable(account),
            claimed_tiers: account.claimed_tiers().iter().copied().collect(),
            reward_codes: account.reward_codes().clone(),
        }
    }

    fn claimable_tier(&self, level: u32) -> Result<&AuraTier> {
        match self.tier(level) {
            Some(t) if level > 0 => Ok(t),
            _ => Err(ShopError::TierNotFound(level)),
        }
    }

    pub fn claim<R: Rng + ?Sized>(&self, account: &mut LoyaltyAccount, level: u32, rng: &mut R) -> Result<RewardCode> {
        let tier = self.claimable_tier(level)?;
        if account.is_closed(level) { return Err(ShopError::AlreadyClaimed(level)); }
        if !tier.threshold.is_reached(account.points()) {
            return Err(ShopError::InsufficientPoints { tier: level, points: account.points(), required: tier.threshold.floor() });
        }
        let code = RewardCode::generate(rng);
        account.record_claim(level, code.clone());
        Ok(code)
    }

    pub fn reject(&self, account: &mut LoyaltyAccount, level: u32) -> Result<()> {
        self.claimable_tier(level)?;
        if !account.record_rejection(level) { return Err(ShopError::AlreadyClaimed(level)); }
        Ok(())
    }
}

fn tier(level: u32, threshold: Threshold, name: &str, flame_color: &str, reward: &str) -> AuraTier {
    AuraTier { level, threshold, name: name.into(), flame_color: flame_color.into(), reward: reward.into() }
}

impl Default for LoyaltyProgram {
    fn default() -> Self {
        use Threshold::{AtLeast, Unbounded};
        let tiers = vec![
            tier(0, Unbounded, "Sin Rango", "black", "Sin Rango"),
            tier(1, AtLeast(0), "Chispa", "white", "Gomita + Pelón"),
            tier(2, AtLeast(8_000), "Brasa", "blue", "Cupón 10%"),
            tier(3, AtLeast(20_000), "Llama", "green", "Producto Sorpresa"),
            tier(4, AtLeast(50_000), "Fuego", "yellow", "Cupón 15%"),
            tier(5, AtLeast(100_000), "Hoguera", "orange", "1 : : + Salvia"),
            tier(6, AtLeast(250_000), "Incendio", "red", "Cupón del 20%"),
            tier(7, AtLeast(500_000), "Supernova", "purple", "Regalo Misterioso"),
        ];
        let multipliers = [
            ("vapes", 30), ("vape_1000", 35), ("gotero", 60), ("caps", 55), ("olla4", 50),
            ("olla3", 50), ("oll2", 50), ("ruffles", 60), ("brownie", 55), ("nerd", 55),
            ("nerdsrope", 55), ("barrita", 55), ("salvia", 60), ("galleta", 50), ("bombon", 50),
            ("nerdbit", 50), ("pelon", 45), ("gomitas", 40),
        ]
        .into_iter()
        .map(|(keyword, tenths)| PointsMultiplier { keyword: keyword.into(), multiplier: Decimal::new(tenths, 1) })
        .collect();
        Self { tiers, multipliers, default_multiplier: Decimal::new(30, 1) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Product;
    use crate::domain::value_objects::{LineKey, MAX_PRICE};
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_default_program_is_valid() {
        LoyaltyProgram::default().validate().unwrap();
    }

    #[test]
    fn test_points_formula() {
        let program = LoyaltyProgram::default();
        assert_eq!(program.points_for(Money::from(60), "gomitas", 1), Some(240));
        assert_eq!(program.points_for(Money::from(60), "gomitas", 3), Some(720));
        // 60 * 4.5 = 270
        assert_eq!(program.points_for(Money::from(60), "pelon", 1), Some(270));
        // fractional part floored per unit: 99.99 * 3.0 = 299.97 -> 299
        assert_eq!(program.points_for(Money::new(Decimal::new(9999, 2)), "unknown", 2), Some(598));
    }

    #[test]
    fn test_points_out_of_range() {
        let program = LoyaltyProgram::default();
        assert_eq!(program.points_for(Money::new(Decimal::MAX), "gomitas", 1), None);
        assert_eq!(program.points_for(Money::from(MAX_PRICE), "ruffles", u32::MAX), None);
    }

    #[test]
    fn test_multiplier_priority() {
        let program = LoyaltyProgram::default();
        assert_eq!(program.multiplier_for("GOMITAS"), Decimal::new(40, 1));
        // "nerdsrope" and "nerd" both match, the longer keyword wins
        assert_eq!(program.multiplier_for("nerdsrope_azul"), Decimal::new(55, 1));
        // "nerdbit" (5.0) beats "nerd" (5.5)
        assert_eq!(program.multiplier_for("nerdbits_mix"), Decimal::new(50, 1));
        assert_eq!(program.multiplier_for("vape_1000_menta"), Decimal::new(35, 1));
        assert_eq!(program.multiplier_for("chocolate"), Decimal::new(30, 1));
    }

    #[test]
    fn test_tie_broken_by_declaration_order() {
        let program = LoyaltyProgram::new(
            LoyaltyProgram::default().tiers().to_vec(),
            vec![
                PointsMultiplier { keyword: "mint".into(), multiplier: Decimal::new(2, 0) },
                PointsMultiplier { keyword: "choc".into(), multiplier: Decimal::new(5, 0) },
            ],
            Decimal::ONE,
        )
        .unwrap();
        assert_eq!(program.multiplier_for("choc_mint"), Decimal::new(2, 0));
    }

    #[test]
    fn test_tier_lookup_is_monotonic() {
        let program = LoyaltyProgram::default();
        assert_eq!(program.tier_for(-5).level, 0);
        assert_eq!(program.tier_for(0).level, 1);
        assert_eq!(program.tier_for(7_999).level, 1);
        assert_eq!(program.tier_for(8_000).level, 2);
        assert_eq!(program.tier_for(10_000_000).level, 7);
        let mut last = 0;
        for points in (0..600_000).step_by(997) {
            let level = program.tier_for(points).level;
            assert!(level >= last);
            last = level;
        }
    }

    #[test]
    fn test_progress_and_claimable() {
        let program = LoyaltyProgram::default();
        let mut account = LoyaltyAccount::open("owner");
        account.grant(10_000);
        let status = program.status(&account);
        assert_eq!(status.tier.level, 2);
        let progress = status.progress.unwrap();
        assert_eq!(progress.level, 3);
        assert_eq!(progress.points_into_level, 2_000);
        assert_eq!(progress.points_needed, 12_000);
        assert!(!progress.complete);
        assert_eq!(progress.percent(), 16);
        assert_eq!(status.pending_claimable_tiers, vec![1, 2]);

        let reached = program.progress_toward(2, account.points(), Some(&account)).unwrap();
        assert!(reached.complete && reached.claimable);
        program.reject(&mut account, 2).unwrap();
        let reached = program.progress_toward(2, account.points(), Some(&account)).unwrap();
        assert!(reached.complete && !reached.claimable);
    }

    #[test]
    fn test_claim_rules() {
        let program = LoyaltyProgram::default();
        let mut rng = StdRng::seed_from_u64(11);
        let mut account = LoyaltyAccount::open("owner");
        // tier 1 threshold is 0: claimable right away
        let code = program.claim(&mut account, 1, &mut rng).unwrap();
        assert_eq!(account.reward_codes().get(&1), Some(&code));
        assert!(matches!(program.claim(&mut account, 1, &mut rng), Err(ShopError::AlreadyClaimed(1))));
        assert!(matches!(
            program.claim(&mut account, 2, &mut rng),
            Err(ShopError::InsufficientPoints { tier: 2, points: 0, required: 8_000 })
        ));
        assert!(matches!(program.claim(&mut account, 0, &mut rng), Err(ShopError::TierNotFound(0))));
        assert!(matches!(program.reject(&mut account, 9), Err(ShopError::TierNotFound(9))));
        // rejection closes a tier even before it is reached
        program.reject(&mut account, 5).unwrap();
        assert!(matches!(program.reject(&mut account, 5), Err(ShopError::AlreadyClaimed(5))));
        account.grant(200_000);
        assert!(matches!(program.claim(&mut account, 5, &mut rng), Err(ShopError::AlreadyClaimed(5))));
        assert_eq!(account.claimed_tiers().iter().copied().collect::<Vec<_>>(), vec![1, 5]);
    }

    #[test]
    fn test_invalid_programs() {
        let tiers = LoyaltyProgram::default().tiers().to_vec();
        let mut unordered = tiers.clone();
        unordered[3].threshold = Threshold::AtLeast(1);
        assert!(LoyaltyProgram::new(unordered, vec![], Decimal::ONE).is_err());
        assert!(LoyaltyProgram::new(tiers[1..].to_vec(), vec![], Decimal::ONE).is_err());
        assert!(LoyaltyProgram::new(tiers, vec![], Decimal::NEGATIVE_ONE).is_err());
    }

    #[test]
    fn test_threshold_serde() {
        let json = serde_json::to_string(&[Threshold::Unbounded, Threshold::AtLeast(5)]).unwrap();
        assert_eq!(json, r#"["negative_infinity",5]"#);
        let back: Vec<Threshold> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Threshold::Unbounded, Threshold::AtLeast(5)]);
    }

    #[test]
    fn test_points_for_lines_skips_vanished_products() {
        let program = LoyaltyProgram::default();
        let catalog = Catalog::new([Product::simple("gomitas", "Gomitas", Money::from(60), 1).unwrap()]);
        let lines = vec![
            CartLine { key: LineKey::parse("gomitas"), quantity: 3 },
            CartLine { key: LineKey::parse("ruffles"), quantity: 1 },
        ];
        assert_eq!(program.points_for_lines(&catalog, &lines).unwrap(), 720);
    }
}
