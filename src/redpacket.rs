//! Redpacket Engine (§4.7): claim arithmetic over the structured JSON
//! blob embedded in a `GroupMessage.content` column.
//!
//! This module is pure — it has no I/O and takes no lock. Callers
//! (`handlers::redpacket`) are responsible for serializing claims per
//! `messageId` via the lock table in [`crate::state::AppState`] before
//! reloading, mutating, and persisting this structure; see §4.7's
//! concurrency requirement.

use crate::error::{AppError, AppResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedpacketType {
    Lucky,
    Average,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedpacketContent {
    pub total_amount: f64,
    pub count: i64,
    pub redpacket_type: RedpacketType,
    pub claimed: Vec<String>,
    pub claimed_amounts: HashMap<String, f64>,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

impl RedpacketContent {
    pub fn new(total_amount: f64, count: i64, redpacket_type: RedpacketType) -> Self {
        Self {
            total_amount,
            count,
            redpacket_type,
            claimed: Vec::new(),
            claimed_amounts: HashMap::new(),
        }
    }

    pub fn parse(content: &str) -> AppResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| AppError::Internal(format!("malformed redpacket content: {e}")))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("redpacket content always serializes")
    }

    pub fn already_amount(&self) -> f64 {
        self.claimed_amounts.values().sum()
    }

    pub fn remaining_count(&self) -> i64 {
        self.count - self.claimed.len() as i64
    }

    /// Apply the §4.7 claim protocol (steps 3-7). Mutates `claimed` /
    /// `claimed_amounts` on success and returns the amount awarded.
    pub fn claim(&mut self, account: &str) -> AppResult<f64> {
        if self.claimed.iter().any(|a| a == account) {
            return Err(AppError::AlreadyClaimed);
        }

        let remaining_count = self.remaining_count();
        if remaining_count <= 0 {
            return Err(AppError::Exhausted);
        }

        let already_amount = self.already_amount();
        let remaining_amount = self.total_amount - already_amount;

        let claim_amount = if remaining_count == 1 {
            // Last claimant takes the exact remainder so the sum equals
            // totalAmount exactly regardless of prior rounding (§8
            // "conservation at closure").
            remaining_amount
        } else {
            match self.redpacket_type {
                RedpacketType::Average => round2(remaining_amount / remaining_count as f64),
                RedpacketType::Lucky => {
                    let max_draw = remaining_amount - (remaining_count - 1) as f64 * 0.01;
                    let drawn = rand::thread_rng().gen_range(0.01..=max_draw.max(0.01));
                    round2((drawn * 0.8).min(max_draw))
                }
            }
        };

        if !(claim_amount > 0.0 && claim_amount <= remaining_amount + 1e-9) {
            return Err(AppError::Inconsistent);
        }

        self.claimed.push(account.to_string());
        self.claimed_amounts.insert(account.to_string(), claim_amount);
        Ok(claim_amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_conserves_total_exactly_at_closure() {
        let mut rp = RedpacketContent::new(10.0, 3, RedpacketType::Average);
        let mut total = 0.0;
        for account in ["a", "b", "c"] {
            total += rp.claim(account).unwrap();
        }
        assert!((total - 10.0).abs() < 1e-9);
        assert_eq!(rp.claimed.len(), 3);
    }

    #[test]
    fn lucky_conserves_within_rounding_tolerance() {
        for _ in 0..200 {
            let mut rp = RedpacketContent::new(1.0, 3, RedpacketType::Lucky);
            let mut total = 0.0;
            for account in ["a", "b", "c"] {
                total += rp.claim(account).unwrap();
            }
            assert!(total <= 1.0 + 1e-9, "sum {total} exceeded total");
            assert!(total >= 1.0 - 0.01 * 3.0, "sum {total} under tolerance");
        }
    }

    #[test]
    fn double_claim_by_same_account_fails() {
        let mut rp = RedpacketContent::new(10.0, 3, RedpacketType::Average);
        rp.claim("a").unwrap();
        let err = rp.claim("a").unwrap_err();
        assert!(matches!(err, AppError::AlreadyClaimed));
    }

    #[test]
    fn exhausted_after_count_claims() {
        let mut rp = RedpacketContent::new(10.0, 2, RedpacketType::Average);
        rp.claim("a").unwrap();
        rp.claim("b").unwrap();
        let err = rp.claim("c").unwrap_err();
        assert!(matches!(err, AppError::Exhausted));
    }

    #[test]
    fn claimed_never_exceeds_count_across_many_claims() {
        let mut rp = RedpacketContent::new(5.0, 5, RedpacketType::Lucky);
        for i in 0..5 {
            rp.claim(&format!("acct{i}")).unwrap();
        }
        assert_eq!(rp.claimed.len(), 5);
        assert!(rp.claim("acct_extra").is_err());
    }
}
