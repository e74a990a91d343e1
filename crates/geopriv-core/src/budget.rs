//! Privacy Budget Accounting
//!
//! Each released statistic consumes part of a total ε. Under basic
//! (sequential) composition, answering queries with ε₁..ε_k costs Σε_i in
//! total, so a release that computes mean, standard deviation and max over
//! the same column must split its budget between them.
//!
//! When the budget is exhausted, no more queries can be answered.

use crate::validation::validate_epsilon;
use crate::{GeoPrivError, Result};
use serde::{Deserialize, Serialize};

/// Relative slack so that splitting ε into equal parts never overspends by rounding
const ROUNDING_SLACK: f64 = 1e-12;

/// Privacy budget account under basic composition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetAccount {
    /// Total epsilon budget allocated
    total_epsilon: f64,
    /// Epsilon consumed so far
    consumed_epsilon: f64,
    /// Individual epsilon values, in spending order
    history: Vec<f64>,
}

impl BudgetAccount {
    /// Create a new budget account
    pub fn new(total_epsilon: f64) -> Result<Self> {
        validate_epsilon(total_epsilon)?;
        Ok(Self {
            total_epsilon,
            consumed_epsilon: 0.0,
            history: Vec::new(),
        })
    }

    pub fn total_epsilon(&self) -> f64 {
        self.total_epsilon
    }

    pub fn consumed_epsilon(&self) -> f64 {
        self.consumed_epsilon
    }

    /// Remaining epsilon, never negative
    pub fn remaining(&self) -> f64 {
        (self.total_epsilon - self.consumed_epsilon).max(0.0)
    }

    /// Fraction of the budget used
    pub fn utilization(&self) -> f64 {
        self.consumed_epsilon / self.total_epsilon
    }

    /// Number of queries charged
    pub fn queries(&self) -> usize {
        self.history.len()
    }

    pub fn history(&self) -> &[f64] {
        &self.history
    }

    /// Check if a query with given epsilon can be made
    pub fn can_spend(&self, epsilon: f64) -> bool {
        self.consumed_epsilon + epsilon <= self.total_epsilon * (1.0 + ROUNDING_SLACK)
    }

    /// Check and consume budget for a query
    pub fn spend(&mut self, epsilon: f64) -> Result<()> {
        validate_epsilon(epsilon)?;

        if !self.can_spend(epsilon) {
            return Err(GeoPrivError::BudgetExhausted {
                required: epsilon,
                remaining: self.remaining(),
            });
        }

        self.consumed_epsilon += epsilon;
        self.history.push(epsilon);
        tracing::debug!(
            epsilon,
            remaining = self.remaining(),
            queries = self.queries(),
            "privacy budget charged"
        );
        Ok(())
    }

    /// Split the remaining budget evenly across `parts` queries
    pub fn even_share(&self, parts: usize) -> Result<f64> {
        if parts == 0 {
            return Err(GeoPrivError::InvalidParameter(
                "cannot split the budget into zero parts".to_string(),
            ));
        }
        let share = self.remaining() / parts as f64;
        validate_epsilon(share)?;
        Ok(share)
    }
}

/// Total privacy loss under basic composition
pub fn basic_composition(epsilons: &[f64]) -> f64 {
    epsilons.iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_account() {
        let mut budget = BudgetAccount::new(5.0).unwrap();

        assert!(budget.can_spend(1.0));
        budget.spend(1.0).unwrap();
        assert_eq!(budget.remaining(), 4.0);

        budget.spend(2.0).unwrap();
        budget.spend(1.5).unwrap();

        assert!(!budget.can_spend(1.0));
        assert!(matches!(
            budget.spend(1.0),
            Err(GeoPrivError::BudgetExhausted { .. })
        ));
        assert_eq!(budget.queries(), 3);
        assert!((budget.utilization() - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_even_share_spends_exactly() {
        let mut budget = BudgetAccount::new(1.0).unwrap();
        let share = budget.even_share(3).unwrap();
        for _ in 0..3 {
            budget.spend(share).unwrap();
        }
        assert!(budget.remaining() < 1e-9);
        assert!((basic_composition(budget.history()) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_budget() {
        assert!(matches!(BudgetAccount::new(0.0), Err(GeoPrivError::InvalidBudget(_))));
        let mut budget = BudgetAccount::new(1.0).unwrap();
        assert!(budget.spend(-0.5).is_err());
        assert!(budget.even_share(0).is_err());
    }
}
