use serde::{Deserialize, Serialize};

/// Unique key of a ledger row: one row per (user, leave type, year).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct BalanceKey {
    pub user_id: u64,
    pub leave_type_id: u64,
    pub year: i32,
}

/// Per-user, per-leave-type, per-year balance ledger row.
///
/// `used + pending <= allocated` must hold after every mutation. The
/// quantities are day units; half-day requests consume 0.5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveBalance {
    pub user_id: u64,
    pub leave_type_id: u64,
    pub year: i32,
    pub allocated: f64,
    pub used: f64,
    pub pending: f64,
    /// Bumped on every write; concurrent mutators are detected by
    /// compare-and-swap against it.
    pub version: u64,
}

impl LeaveBalance {
    pub fn new(key: BalanceKey, allocated: f64) -> Self {
        Self {
            user_id: key.user_id,
            leave_type_id: key.leave_type_id,
            year: key.year,
            allocated,
            used: 0.0,
            pending: 0.0,
            version: 0,
        }
    }

    pub fn key(&self) -> BalanceKey {
        BalanceKey {
            user_id: self.user_id,
            leave_type_id: self.leave_type_id,
            year: self.year,
        }
    }

    pub fn available(&self) -> f64 {
        self.allocated - self.used - self.pending
    }
}
