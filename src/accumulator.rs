// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Calorimeter Stack Simulation Suite ("The Stack") - Energy Accumulator

//! Per-volume energy counter.
//!
//! One [`EnergyCounter`] is bound to each sensitive volume. The event
//! lifecycle resets it before the first hit, feeds it deposits, and reads it
//! once the event closes. Reading never resets: reset is its own step.

use serde::{Deserialize, Serialize};

use crate::types::VolumeId;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AccumulatorError {
    #[error("deposit into {volume} without a reset for the open event")]
    NotReset { volume: VolumeId },

    #[error("negative deposit {energy} into {volume}")]
    NegativeDeposit { volume: VolumeId, energy: f64 },

    #[error("non-finite deposit {energy} into {volume}")]
    NonFiniteDeposit { volume: VolumeId, energy: f64 },
}

// ---------------------------------------------------------------------------
// EnergyCounter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyCounter {
    id: VolumeId,
    name: String,
    total: f64,
    armed: bool,
}

impl EnergyCounter {
    pub fn new(id: VolumeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            total: 0.0,
            armed: false,
        }
    }

    pub fn id(&self) -> VolumeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Zero the running total. Safe to call repeatedly.
    pub fn reset(&mut self) {
        self.total = 0.0;
        self.armed = true;
    }

    /// Stop accepting deposits. The total stays readable.
    pub fn close(&mut self) {
        self.armed = false;
    }

    /// Add one hit's deposit to the running total.
    pub fn add_deposit(&mut self, energy: f64) -> Result<(), AccumulatorError> {
        if !self.armed {
            return Err(AccumulatorError::NotReset { volume: self.id });
        }
        if !energy.is_finite() {
            return Err(AccumulatorError::NonFiniteDeposit { volume: self.id, energy });
        }
        if energy < 0.0 {
            return Err(AccumulatorError::NegativeDeposit { volume: self.id, energy });
        }
        self.total += energy;
        Ok(())
    }

    /// Current total, left in place until the next [`reset`](Self::reset).
    pub fn read_and_keep(&self) -> f64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> EnergyCounter {
        EnergyCounter::new(VolumeId(3), "Detector1")
    }

    #[test]
    fn reset_then_read_is_zero() {
        let mut c = counter();
        c.reset();
        assert_eq!(c.read_and_keep(), 0.0);
    }

    #[test]
    fn double_reset_is_noop() {
        let mut c = counter();
        c.reset();
        c.reset();
        assert_eq!(c.read_and_keep(), 0.0);
        assert!(c.add_deposit(1.0).is_ok());
    }

    #[test]
    fn deposits_sum_exactly() {
        let mut c = counter();
        c.reset();
        for e in [0.5, 1.25, 0.0, 2.25] {
            c.add_deposit(e).expect("test: deposit should be accepted");
        }
        assert_eq!(c.read_and_keep(), 4.0);
    }

    #[test]
    fn deposit_order_does_not_matter() {
        let deposits = [0.125, 3.5, 0.25, 7.0, 0.0625];
        let mut forward = counter();
        let mut backward = counter();
        forward.reset();
        backward.reset();
        for &e in &deposits {
            forward.add_deposit(e).expect("test: forward deposit");
        }
        for &e in deposits.iter().rev() {
            backward.add_deposit(e).expect("test: backward deposit");
        }
        assert_eq!(forward.read_and_keep(), backward.read_and_keep());
        assert_eq!(forward.read_and_keep(), deposits.iter().sum::<f64>());
    }

    #[test]
    fn read_does_not_reset() {
        let mut c = counter();
        c.reset();
        c.add_deposit(2.0).expect("test: deposit");
        assert_eq!(c.read_and_keep(), 2.0);
        assert_eq!(c.read_and_keep(), 2.0);
        c.reset();
        assert_eq!(c.read_and_keep(), 0.0);
    }

    #[test]
    fn deposit_before_reset_rejected() {
        let mut c = counter();
        let err = c.add_deposit(1.0).expect_err("test: unarmed counter must reject");
        assert_eq!(err, AccumulatorError::NotReset { volume: VolumeId(3) });
    }

    #[test]
    fn closed_counter_rejects_until_next_reset() {
        let mut c = counter();
        c.reset();
        c.add_deposit(2.5).expect("test: deposit");
        c.close();
        assert_eq!(c.read_and_keep(), 2.5);
        assert_eq!(c.add_deposit(1.0), Err(AccumulatorError::NotReset { volume: VolumeId(3) }));
        c.reset();
        assert!(c.add_deposit(1.0).is_ok());
    }

    #[test]
    fn negative_deposit_rejected_and_total_untouched() {
        let mut c = counter();
        c.reset();
        c.add_deposit(1.0).expect("test: deposit");
        assert!(matches!(
            c.add_deposit(-0.5),
            Err(AccumulatorError::NegativeDeposit { .. })
        ));
        assert_eq!(c.read_and_keep(), 1.0);
    }

    #[test]
    fn non_finite_deposit_rejected() {
        let mut c = counter();
        c.reset();
        assert!(matches!(
            c.add_deposit(f64::NAN),
            Err(AccumulatorError::NonFiniteDeposit { .. })
        ));
        assert!(matches!(
            c.add_deposit(f64::INFINITY),
            Err(AccumulatorError::NonFiniteDeposit { .. })
        ));
        assert_eq!(c.read_and_keep(), 0.0);
    }
}
