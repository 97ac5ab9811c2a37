//! Loyalty Account Aggregate
//!
//! Per tier the account moves `Unclaimed -> Claimed` (a code is issued) or
//! `Unclaimed -> Rejected` (no code). Both are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::events::{DomainEvent, LoyaltyEvent};
use crate::domain::value_objects::RewardCode;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyAccount {
    owner_id: String,
    points: i64,
    claimed_tiers: BTreeSet<u32>,
    reward_codes: BTreeMap<u32, RewardCode>,
    updated_at: DateTime<Utc>,
    revision: u64,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "code", rename_all = "snake_case")]
pub enum TierState {
    Unclaimed,
    Claimed(RewardCode),
    Rejected,
}

impl LoyaltyAccount {
    pub fn open(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(), points: 0, claimed_tiers: BTreeSet::new(),
            reward_codes: BTreeMap::new(), updated_at: Utc::now(), revision: 0, events: vec![],
        }
    }

    pub fn owner_id(&self) -> &str { &self.owner_id }
    pub fn points(&self) -> i64 { self.points }
    pub fn claimed_tiers(&self) -> &BTreeSet<u32> { &self.claimed_tiers }
    pub fn reward_codes(&self) -> &BTreeMap<u32, RewardCode> { &self.reward_codes }
    pub fn revision(&self) -> u64 { self.revision }
    pub fn is_closed(&self, tier: u32) -> bool { self.claimed_tiers.contains(&tier) }

    pub fn tier_state(&self, tier: u32) -> TierState {
        match (self.claimed_tiers.contains(&tier), self.reward_codes.get(&tier)) {
            (false, _) => TierState::Unclaimed,
            (true, Some(code)) => TierState::Claimed(code.clone()),
            (true, None) => TierState::Rejected,
        }
    }

    pub fn grant(&mut self, points: i64) {
        self.points = self.points.saturating_add(points.max(0));
        self.touch();
    }

    /// Subtracts points, never going below zero.
    pub fn revoke(&mut self, points: i64) {
        self.points = self.points.saturating_sub(points.max(0)).max(0);
        self.touch();
    }

    /// Closes the tier with a code. Eligibility is checked by the loyalty engine.
    pub(crate) fn record_claim(&mut self, tier: u32, code: RewardCode) -> bool {
        if !self.claimed_tiers.insert(tier) { return false; }
        self.reward_codes.insert(tier, code.clone());
        self.touch();
        self.raise_event(DomainEvent::Loyalty(LoyaltyEvent::TierClaimed {
            owner_id: self.owner_id.clone(),
            tier,
            code: code.to_string(),
        }));
        true
    }

    pub(crate) fn record_rejection(&mut self, tier: u32) -> bool {
        if !self.claimed_tiers.insert(tier) { return false; }
        self.touch();
        self.raise_event(DomainEvent::Loyalty(LoyaltyEvent::TierRejected { owner_id: self.owner_id.clone(), tier }));
        true
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_revoke_floors_at_zero() {
        let mut account = LoyaltyAccount::open("owner");
        account.grant(500);
        account.revoke(720);
        assert_eq!(account.points(), 0);
    }

    #[test]
    fn test_claim_and_reject_are_terminal() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut account = LoyaltyAccount::open("owner");
        assert!(account.record_claim(1, RewardCode::generate(&mut rng)));
        assert!(!account.record_claim(1, RewardCode::generate(&mut rng)));
        assert!(!account.record_rejection(1));
        assert!(account.record_rejection(2));
        assert!(!account.record_claim(2, RewardCode::generate(&mut rng)));
        assert!(matches!(account.tier_state(1), TierState::Claimed(_)));
        assert_eq!(account.tier_state(2), TierState::Rejected);
        assert_eq!(account.tier_state(3), TierState::Unclaimed);
        assert_eq!(account.take_events().len(), 2);
    }
}
