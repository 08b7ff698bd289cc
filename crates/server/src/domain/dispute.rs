use serde::{Deserialize, Serialize};

use super::ledger::PaymentStatus;
use super::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    InProgress,
    Resolved,
    Dismissed,
}

impl DisputeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DisputeStatus::Open => "open",
            DisputeStatus::InProgress => "in_progress",
            DisputeStatus::Resolved => "resolved",
            DisputeStatus::Dismissed => "dismissed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DisputeStatus::Resolved | DisputeStatus::Dismissed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum DisputePriority {
    High,
    Medium,
    Low,
}

impl DisputePriority {
    pub fn as_str(self) -> &'static str {
        match self {
            DisputePriority::High => "high",
            DisputePriority::Medium => "medium",
            DisputePriority::Low => "low",
        }
    }
}

/// Stored tag of the ruling an admin chose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ResolutionKind {
    ClientFavor,
    FreelancerFavor,
    Refund,
    Dismiss,
}

/// The ruling itself; refunds carry the amount to claw back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    ClientFavor,
    FreelancerFavor,
    Refund(i64),
    Dismiss,
}

impl Resolution {
    pub fn kind(&self) -> ResolutionKind {
        match self {
            Resolution::ClientFavor => ResolutionKind::ClientFavor,
            Resolution::FreelancerFavor => ResolutionKind::FreelancerFavor,
            Resolution::Refund(_) => ResolutionKind::Refund,
            Resolution::Dismiss => ResolutionKind::Dismiss,
        }
    }
}

/// Everything a ruling changes: the dispute's terminal state, the disputed
/// payment's next state (when one is attached and frozen), and the refund to
/// record against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub dispute_status: DisputeStatus,
    pub payment_status: Option<PaymentStatus>,
    pub refund: i64,
}

/// An admin takes an open dispute under review.
pub fn begin_review(status: DisputeStatus) -> Result<DisputeStatus, DomainError> {
    match status {
        DisputeStatus::Open => Ok(DisputeStatus::InProgress),
        DisputeStatus::InProgress => Err(DomainError::Conflict(
            "Dispute is already under review".to_string(),
        )),
        DisputeStatus::Resolved | DisputeStatus::Dismissed => Err(DomainError::AlreadyResolved),
    }
}

/// Applies an admin ruling. `payment` is the attached payment's effective
/// amount (original minus prior refunds) and current status, when one exists.
pub fn resolve(
    status: DisputeStatus,
    resolution: &Resolution,
    payment: Option<(i64, PaymentStatus)>,
) -> Result<ResolveOutcome, DomainError> {
    if status.is_terminal() {
        return Err(DomainError::AlreadyResolved);
    }

    let refund = match resolution {
        Resolution::Refund(amount) => {
            let payable = match payment {
                Some((payable, _)) => payable,
                None => return Err(DomainError::InvalidAmount),
            };
            if *amount <= 0 || *amount > payable {
                return Err(DomainError::InvalidAmount);
            }
            *amount
        }
        _ => 0,
    };

    let dispute_status = match resolution {
        Resolution::Dismiss => DisputeStatus::Dismissed,
        _ => DisputeStatus::Resolved,
    };

    // A frozen payment thaws back to released on favor or dismissal rulings;
    // refunds close it out entirely.
    let payment_status = match payment {
        Some((_, PaymentStatus::Disputed)) => Some(match resolution {
            Resolution::Refund(_) => PaymentStatus::Refunded,
            _ => PaymentStatus::Released,
        }),
        _ => None,
    };

    Ok(ResolveOutcome {
        dispute_status,
        payment_status,
        refund,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refund_resolution_claws_back_and_closes_the_payment() {
        let outcome = resolve(
            DisputeStatus::Open,
            &Resolution::Refund(1_000),
            Some((2_500, PaymentStatus::Disputed)),
        )
        .unwrap();

        assert_eq!(outcome.dispute_status, DisputeStatus::Resolved);
        assert_eq!(outcome.payment_status, Some(PaymentStatus::Refunded));
        assert_eq!(outcome.refund, 1_000);
    }

    #[test]
    fn resolving_twice_fails() {
        let err = resolve(
            DisputeStatus::Resolved,
            &Resolution::ClientFavor,
            Some((2_500, PaymentStatus::Refunded)),
        );
        assert_eq!(err, Err(DomainError::AlreadyResolved));

        let err = resolve(DisputeStatus::Dismissed, &Resolution::Dismiss, None);
        assert_eq!(err, Err(DomainError::AlreadyResolved));
    }

    #[test]
    fn refunds_are_bounded_by_the_payment() {
        for amount in [0, -100, 2_501] {
            let err = resolve(
                DisputeStatus::InProgress,
                &Resolution::Refund(amount),
                Some((2_500, PaymentStatus::Disputed)),
            );
            assert_eq!(err, Err(DomainError::InvalidAmount));
        }
    }

    #[test]
    fn refund_requires_an_attached_payment() {
        let err = resolve(DisputeStatus::Open, &Resolution::Refund(100), None);
        assert_eq!(err, Err(DomainError::InvalidAmount));
    }

    #[test]
    fn favor_rulings_thaw_the_payment() {
        for resolution in [Resolution::ClientFavor, Resolution::FreelancerFavor] {
            let outcome = resolve(
                DisputeStatus::InProgress,
                &resolution,
                Some((2_500, PaymentStatus::Disputed)),
            )
            .unwrap();
            assert_eq!(outcome.dispute_status, DisputeStatus::Resolved);
            assert_eq!(outcome.payment_status, Some(PaymentStatus::Released));
            assert_eq!(outcome.refund, 0);
        }
    }

    #[test]
    fn dismissal_is_its_own_terminal_state() {
        let outcome = resolve(
            DisputeStatus::Open,
            &Resolution::Dismiss,
            Some((2_500, PaymentStatus::Disputed)),
        )
        .unwrap();
        assert_eq!(outcome.dispute_status, DisputeStatus::Dismissed);
        assert_eq!(outcome.payment_status, Some(PaymentStatus::Released));
    }

    #[test]
    fn untouched_payments_stay_untouched() {
        // Dispute filed against the project without freezing a payment.
        let outcome = resolve(
            DisputeStatus::Open,
            &Resolution::ClientFavor,
            Some((2_500, PaymentStatus::Released)),
        )
        .unwrap();
        assert_eq!(outcome.payment_status, None);
    }

    #[test]
    fn review_starts_once() {
        assert_eq!(
            begin_review(DisputeStatus::Open),
            Ok(DisputeStatus::InProgress)
        );
        assert!(matches!(
            begin_review(DisputeStatus::InProgress),
            Err(DomainError::Conflict(_))
        ));
        assert_eq!(
            begin_review(DisputeStatus::Resolved),
            Err(DomainError::AlreadyResolved)
        );
    }
}
