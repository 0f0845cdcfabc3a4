//! Four-phase HTLC timelock schedule.
//!
//! Every HTLC carries four absolute Unix-second deadlines partitioning its
//! life: finality (F), resolver-exclusive withdrawal (R), public withdrawal
//! (P), and cancellation (C), with `now < F < R < P < C` strictly.

use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};

/// Relative phase durations in seconds, applied cumulatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelockDurations {
    pub finality: u64,
    pub resolver_exclusive: u64,
    pub public_withdrawal: u64,
    pub cancellation: u64,
}

impl Default for TimelockDurations {
    fn default() -> Self {
        Self {
            finality: 30,
            resolver_exclusive: 60,
            public_withdrawal: 300,
            cancellation: 600,
        }
    }
}

impl TimelockDurations {
    /// Every phase must have a positive duration for the absolute deadlines
    /// to be strictly increasing.
    pub fn validate(&self) -> Result<()> {
        if self.finality == 0
            || self.resolver_exclusive == 0
            || self.public_withdrawal == 0
            || self.cancellation == 0
        {
            return Err(eyre!("timelock durations must all be positive"));
        }
        Ok(())
    }
}

/// Which window of the HTLC's life a timestamp falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// `[creation, F)` — no withdrawal permitted yet.
    Finality,
    /// `[F, R)` — only the resolver may withdraw.
    ResolverExclusive,
    /// `[R, P)` — anyone holding the preimage may withdraw.
    PublicWithdrawal,
    /// `[P, C)` — resolver-exclusive cancellation window.
    ResolverCancellation,
    /// `[C, ∞)` — anyone may refund.
    PublicCancellation,
}

/// Absolute deadlines for one HTLC. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelockSchedule {
    finality: u64,
    resolver: u64,
    public: u64,
    cancellation: u64,
}

impl TimelockSchedule {
    /// Build the absolute schedule from `now` and cumulative durations.
    pub fn starting_at(now: u64, durations: &TimelockDurations) -> Self {
        let finality = now + durations.finality;
        let resolver = finality + durations.resolver_exclusive;
        let public = resolver + durations.public_withdrawal;
        let cancellation = public + durations.cancellation;
        Self {
            finality,
            resolver,
            public,
            cancellation,
        }
    }

    /// Construct from raw absolute deadlines; callers must `validate`.
    pub fn from_deadlines(finality: u64, resolver: u64, public: u64, cancellation: u64) -> Self {
        Self {
            finality,
            resolver,
            public,
            cancellation,
        }
    }

    pub fn finality(&self) -> u64 {
        self.finality
    }

    pub fn resolver(&self) -> u64 {
        self.resolver
    }

    pub fn public(&self) -> u64 {
        self.public
    }

    pub fn cancellation(&self) -> u64 {
        self.cancellation
    }

    /// Enforce `now < F < R < P < C` strictly.
    pub fn validate(&self, now: u64) -> Result<()> {
        if now < self.finality
            && self.finality < self.resolver
            && self.resolver < self.public
            && self.public < self.cancellation
        {
            Ok(())
        } else {
            Err(eyre!(
                "invalid timelock ordering: now={} F={} R={} P={} C={}",
                now,
                self.finality,
                self.resolver,
                self.public,
                self.cancellation
            ))
        }
    }

    pub fn phase(&self, now: u64) -> Phase {
        if now < self.finality {
            Phase::Finality
        } else if now < self.resolver {
            Phase::ResolverExclusive
        } else if now < self.public {
            Phase::PublicWithdrawal
        } else if now < self.cancellation {
            Phase::ResolverCancellation
        } else {
            Phase::PublicCancellation
        }
    }

    /// Whether a withdrawal is admissible at `now` (finality has passed and
    /// the cancellation deadline has not been reached).
    pub fn can_withdraw_at(&self, now: u64) -> bool {
        now >= self.finality && now < self.cancellation
    }

    /// Whether a refund is admissible at `now`.
    pub fn can_refund_at(&self, now: u64) -> bool {
        now >= self.cancellation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_durations() {
        let d = TimelockDurations::default();
        assert_eq!(d.finality, 30);
        assert_eq!(d.resolver_exclusive, 60);
        assert_eq!(d.public_withdrawal, 300);
        assert_eq!(d.cancellation, 600);
    }

    #[test]
    fn test_schedule_is_cumulative() {
        let schedule = TimelockSchedule::starting_at(1000, &TimelockDurations::default());
        assert_eq!(schedule.finality(), 1030);
        assert_eq!(schedule.resolver(), 1090);
        assert_eq!(schedule.public(), 1390);
        assert_eq!(schedule.cancellation(), 1990);
        schedule.validate(1000).unwrap();
    }

    #[test]
    fn test_validate_rejects_past_finality() {
        let schedule = TimelockSchedule::from_deadlines(100, 200, 300, 400);
        assert!(schedule.validate(100).is_err());
        assert!(schedule.validate(99).is_ok());
    }

    #[test]
    fn test_validate_rejects_unordered() {
        let schedule = TimelockSchedule::from_deadlines(200, 200, 300, 400);
        assert!(schedule.validate(100).is_err());
        let schedule = TimelockSchedule::from_deadlines(200, 300, 300, 400);
        assert!(schedule.validate(100).is_err());
    }

    #[test]
    fn test_phases() {
        let schedule = TimelockSchedule::from_deadlines(100, 200, 300, 400);
        assert_eq!(schedule.phase(50), Phase::Finality);
        assert_eq!(schedule.phase(100), Phase::ResolverExclusive);
        assert_eq!(schedule.phase(250), Phase::PublicWithdrawal);
        assert_eq!(schedule.phase(350), Phase::ResolverCancellation);
        assert_eq!(schedule.phase(400), Phase::PublicCancellation);
        assert_eq!(schedule.phase(10_000), Phase::PublicCancellation);
    }

    #[test]
    fn test_withdraw_and_refund_windows() {
        let schedule = TimelockSchedule::from_deadlines(100, 200, 300, 400);
        assert!(!schedule.can_withdraw_at(99));
        assert!(schedule.can_withdraw_at(100));
        assert!(schedule.can_withdraw_at(399));
        assert!(!schedule.can_withdraw_at(400));
        assert!(!schedule.can_refund_at(399));
        assert!(schedule.can_refund_at(400));
    }

    #[test]
    fn test_zero_duration_rejected() {
        let d = TimelockDurations {
            finality: 0,
            ..TimelockDurations::default()
        };
        assert!(d.validate().is_err());
        assert!(TimelockDurations::default().validate().is_ok());
    }
}
