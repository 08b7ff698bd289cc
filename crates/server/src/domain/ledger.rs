use serde::{Deserialize, Serialize};

use super::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Pending,
    InProgress,
    Completed,
}

impl MilestoneStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MilestoneStatus::Pending => "pending",
            MilestoneStatus::InProgress => "in_progress",
            MilestoneStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PaymentStatus {
    PendingApproval,
    PendingRelease,
    Released,
    Disputed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::PendingApproval => "pending_approval",
            PaymentStatus::PendingRelease => "pending_release",
            PaymentStatus::Released => "released",
            PaymentStatus::Disputed => "disputed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PaymentKind {
    MilestoneCompletion,
    PartialDelivery,
    FullProject,
}

/// Escrow totals for one project. `total_budget` is the amount agreed with
/// the freelancer at award time.
///
/// Invariants: `0 <= spent <= allocated <= total_budget` and
/// `released + pending <= allocated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ledger {
    pub total_budget: i64,
    pub allocated: i64,
    pub spent: i64,
    pub released: i64,
    pub pending: i64,
}

impl Ledger {
    /// Budget not yet carved into milestones.
    pub fn remaining(&self) -> i64 {
        self.total_budget - self.allocated
    }

    /// Held funds not yet released to the freelancer.
    pub fn escrow(&self) -> i64 {
        self.allocated - self.released
    }

    pub fn check_allocate(&self, amount: i64) -> Result<(), DomainError> {
        if amount <= 0 {
            return Err(DomainError::InvalidAmount);
        }
        if self.allocated + amount > self.total_budget {
            return Err(DomainError::OverBudget);
        }
        Ok(())
    }

    pub fn check_payment_request(&self, amount: i64) -> Result<(), DomainError> {
        if amount <= 0 {
            return Err(DomainError::InvalidAmount);
        }
        if self.released + self.pending + amount > self.allocated {
            return Err(DomainError::OverBudget);
        }
        Ok(())
    }
}

pub fn start_milestone(status: MilestoneStatus) -> Result<MilestoneStatus, DomainError> {
    match status {
        MilestoneStatus::Pending => Ok(MilestoneStatus::InProgress),
        other => Err(DomainError::InvalidTransition(format!(
            "Cannot start a milestone that is {}",
            other.as_str()
        ))),
    }
}

pub fn complete_milestone(status: MilestoneStatus) -> Result<MilestoneStatus, DomainError> {
    match status {
        MilestoneStatus::InProgress => Ok(MilestoneStatus::Completed),
        other => Err(DomainError::InvalidTransition(format!(
            "Cannot complete a milestone that is {}",
            other.as_str()
        ))),
    }
}

/// Spend is recorded against a milestone when payment is requested and never
/// decreases; refunds are handled on the payment side by dispute resolution.
pub fn check_spend(budget: i64, spent: i64, amount: i64) -> Result<(), DomainError> {
    if amount <= 0 {
        return Err(DomainError::InvalidAmount);
    }
    if spent + amount > budget {
        return Err(DomainError::OverBudget);
    }
    Ok(())
}

/// What a payment request against a milestone in the given state means.
pub fn payment_kind(milestone: Option<MilestoneStatus>) -> Result<PaymentKind, DomainError> {
    match milestone {
        None => Ok(PaymentKind::FullProject),
        Some(MilestoneStatus::Completed) => Ok(PaymentKind::MilestoneCompletion),
        Some(MilestoneStatus::InProgress) => Ok(PaymentKind::PartialDelivery),
        Some(MilestoneStatus::Pending) => Err(DomainError::Conflict(
            "Milestone has not been started".to_string(),
        )),
    }
}

pub fn approve_payment(status: PaymentStatus) -> Result<PaymentStatus, DomainError> {
    match status {
        PaymentStatus::PendingApproval => Ok(PaymentStatus::PendingRelease),
        other => Err(DomainError::InvalidTransition(format!(
            "Cannot approve a payment that is {}",
            other.as_str()
        ))),
    }
}

/// Release is irreversible and only legal once approved. A disputed payment
/// stays frozen until the dispute resolves.
pub fn release_payment(status: PaymentStatus) -> Result<PaymentStatus, DomainError> {
    match status {
        PaymentStatus::PendingRelease => Ok(PaymentStatus::Released),
        PaymentStatus::Disputed => Err(DomainError::Conflict(
            "Payment is frozen while a dispute is open".to_string(),
        )),
        other => Err(DomainError::InvalidTransition(format!(
            "Cannot release a payment that is {}",
            other.as_str()
        ))),
    }
}

pub fn dispute_payment(status: PaymentStatus) -> Result<PaymentStatus, DomainError> {
    match status {
        PaymentStatus::PendingApproval | PaymentStatus::PendingRelease | PaymentStatus::Released => {
            Ok(PaymentStatus::Disputed)
        }
        PaymentStatus::Disputed => Err(DomainError::Conflict(
            "Payment is already disputed".to_string(),
        )),
        PaymentStatus::Refunded => Err(DomainError::InvalidTransition(
            "A refunded payment can no longer be disputed".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> Ledger {
        Ledger {
            total_budget: 10_000,
            allocated: 7_000,
            spent: 5_000,
            released: 3_000,
            pending: 2_000,
        }
    }

    #[test]
    fn allocation_up_to_the_total_budget_succeeds() {
        assert!(ledger().check_allocate(3_000).is_ok());
    }

    #[test]
    fn one_unit_over_the_total_budget_fails() {
        assert_eq!(ledger().check_allocate(3_001), Err(DomainError::OverBudget));
    }

    #[test]
    fn non_positive_amounts_are_invalid() {
        assert_eq!(ledger().check_allocate(0), Err(DomainError::InvalidAmount));
        assert_eq!(ledger().check_allocate(-50), Err(DomainError::InvalidAmount));
        assert_eq!(
            ledger().check_payment_request(0),
            Err(DomainError::InvalidAmount)
        );
        assert_eq!(check_spend(1_000, 0, -1), Err(DomainError::InvalidAmount));
    }

    #[test]
    fn requests_are_bounded_by_the_allocation() {
        // released 3000 + pending 2000 leaves 2000 of the 7000 allocation.
        assert!(ledger().check_payment_request(2_000).is_ok());
        assert_eq!(
            ledger().check_payment_request(2_001),
            Err(DomainError::OverBudget)
        );
    }

    #[test]
    fn milestone_spend_is_capped_by_its_budget() {
        assert!(check_spend(3_000, 2_000, 1_000).is_ok());
        assert_eq!(check_spend(3_000, 2_000, 1_001), Err(DomainError::OverBudget));
    }

    #[test]
    fn milestones_progress_forward_only() {
        assert_eq!(
            start_milestone(MilestoneStatus::Pending),
            Ok(MilestoneStatus::InProgress)
        );
        assert!(start_milestone(MilestoneStatus::Completed).is_err());
        assert_eq!(
            complete_milestone(MilestoneStatus::InProgress),
            Ok(MilestoneStatus::Completed)
        );
        assert!(complete_milestone(MilestoneStatus::Pending).is_err());
    }

    #[test]
    fn payment_walks_approval_then_release() {
        let approved = approve_payment(PaymentStatus::PendingApproval).unwrap();
        assert_eq!(approved, PaymentStatus::PendingRelease);
        assert_eq!(release_payment(approved), Ok(PaymentStatus::Released));
    }

    #[test]
    fn release_requires_prior_approval_and_is_final() {
        assert!(release_payment(PaymentStatus::PendingApproval).is_err());
        assert!(release_payment(PaymentStatus::Released).is_err());
        assert!(approve_payment(PaymentStatus::Released).is_err());
    }

    #[test]
    fn a_disputed_payment_is_frozen() {
        assert_eq!(
            release_payment(PaymentStatus::Disputed),
            Err(DomainError::Conflict(
                "Payment is frozen while a dispute is open".to_string()
            ))
        );
    }

    #[test]
    fn disputes_may_target_any_live_payment_exactly_once() {
        for status in [
            PaymentStatus::PendingApproval,
            PaymentStatus::PendingRelease,
            PaymentStatus::Released,
        ] {
            assert_eq!(dispute_payment(status), Ok(PaymentStatus::Disputed));
        }
        assert!(dispute_payment(PaymentStatus::Disputed).is_err());
        assert!(dispute_payment(PaymentStatus::Refunded).is_err());
    }

    #[test]
    fn payment_kind_follows_the_milestone_state() {
        assert_eq!(payment_kind(None), Ok(PaymentKind::FullProject));
        assert_eq!(
            payment_kind(Some(MilestoneStatus::InProgress)),
            Ok(PaymentKind::PartialDelivery)
        );
        assert_eq!(
            payment_kind(Some(MilestoneStatus::Completed)),
            Ok(PaymentKind::MilestoneCompletion)
        );
        assert!(payment_kind(Some(MilestoneStatus::Pending)).is_err());
    }

    #[test]
    fn derived_totals() {
        assert_eq!(ledger().remaining(), 3_000);
        assert_eq!(ledger().escrow(), 4_000);
    }
}
