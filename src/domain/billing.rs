//! Per-visit billing rules for single-visit-pass members
//!
//! A `1day` member gets `threshold - 1` free visits per calendar month. The
//! visit at 1-based position `threshold` (in chronological order within the
//! month) and every later visit are billable. General members are never
//! billed per visit.

use crate::domain::types::{Highlight, MemberType};

/// Default visit number at which payment applies
pub const DEFAULT_THRESHOLD: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPolicy {
    threshold: u32,
}

impl Default for BillingPolicy {
    fn default() -> Self {
        Self { threshold: DEFAULT_THRESHOLD }
    }
}

impl BillingPolicy {
    /// A threshold of 0 is treated as 1 (every visit billable)
    pub fn new(threshold: u32) -> Self {
        Self { threshold: threshold.max(1) }
    }

    #[inline]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Whether the visit at 1-based `position` within the month is billable
    #[inline]
    pub fn needs_payment(&self, member_type: MemberType, position: u32) -> bool {
        member_type == MemberType::OneDay && position >= self.threshold
    }

    /// Whether a member with `monthly_count` visits gets a payment highlight
    #[inline]
    pub fn applies(&self, member_type: MemberType, monthly_count: u32) -> bool {
        member_type == MemberType::OneDay && monthly_count >= self.threshold
    }

    /// Scan paid flags in chronological order and stop at the first unpaid
    /// billable visit. Fewer than `threshold` visits is trivially settled.
    pub fn all_billable_paid<I>(&self, paid_in_order: I) -> bool
    where
        I: IntoIterator<Item = bool>,
    {
        let mut position = 0u32;
        for paid in paid_in_order {
            position += 1;
            if position >= self.threshold && !paid {
                return false;
            }
        }
        true
    }

    /// Highlight for a member given their monthly count and, when billable,
    /// whether all billable visits are settled
    pub fn highlight(&self, member_type: MemberType, monthly_count: u32, settled: bool) -> Highlight {
        if self.applies(member_type, monthly_count) {
            Highlight::from_settled(settled)
        } else {
            Highlight::None
        }
    }
}
