//! Payment lifecycle state machine.
//!
//! Transitions are computed by the pure [`decide`] function from the *current*
//! persisted status and a trigger. Callers must re-read the status inside the
//! transaction that applies the decision.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment status of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Free event. Terminal; the ticket is issued at creation.
    NotRequired,
    /// Checkout initiated, awaiting confirmation.
    Pending,
    /// Confirmed by the provider.
    Paid,
    /// Checkout failed or expired. A new checkout resets to `Pending`.
    Failed,
    /// Cancelled after payment. Terminal; the ticket is invalidated.
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::NotRequired => "not_required",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Statuses that entitle the registration to a valid ticket.
    pub fn is_ticketable(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::NotRequired)
    }

    /// Initial status for a new registration given its total price.
    pub fn initial(requires_payment: bool) -> Self {
        if requires_payment {
            PaymentStatus::Pending
        } else {
            PaymentStatus::NotRequired
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened that may move a registration's payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentTrigger {
    CheckoutInitiated,
    CheckoutCompleted,
    CheckoutExpired,
    CheckoutFailed,
    Refunded,
}

impl fmt::Display for PaymentTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentTrigger::CheckoutInitiated => "checkout_initiated",
            PaymentTrigger::CheckoutCompleted => "checkout_completed",
            PaymentTrigger::CheckoutExpired => "checkout_expired",
            PaymentTrigger::CheckoutFailed => "checkout_failed",
            PaymentTrigger::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

/// Side effect bound to a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    None,
    IssueTicket,
    InvalidateTicket,
}

/// Outcome of applying a trigger to the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionDecision {
    /// Persist `to` and perform `effect`.
    Apply {
        from: PaymentStatus,
        to: PaymentStatus,
        effect: SideEffect,
    },
    /// The trigger has already been applied. Re-asserting `effect` is a no-op
    /// by construction (ticket issuance reports `AlreadyIssued`).
    AlreadyApplied {
        state: PaymentStatus,
        effect: SideEffect,
    },
    /// Stale, out-of-order or nonsensical trigger. Leave state untouched.
    Illegal {
        from: PaymentStatus,
        trigger: PaymentTrigger,
    },
}

impl TransitionDecision {
    pub fn effect(&self) -> SideEffect {
        match self {
            TransitionDecision::Apply { effect, .. }
            | TransitionDecision::AlreadyApplied { effect, .. } => *effect,
            TransitionDecision::Illegal { .. } => SideEffect::None,
        }
    }

    pub fn is_illegal(&self) -> bool {
        matches!(self, TransitionDecision::Illegal { .. })
    }
}

/// Computes the transition for `trigger` from `current`.
pub fn decide(current: PaymentStatus, trigger: PaymentTrigger) -> TransitionDecision {
    use PaymentStatus as S;
    use PaymentTrigger as T;

    let apply = |to, effect| TransitionDecision::Apply {
        from: current,
        to,
        effect,
    };
    let replay = |effect| TransitionDecision::AlreadyApplied {
        state: current,
        effect,
    };

    match (current, trigger) {
        (S::Failed, T::CheckoutInitiated) => apply(S::Pending, SideEffect::None),
        (S::Pending, T::CheckoutInitiated) => replay(SideEffect::None),

        (S::Pending, T::CheckoutCompleted) => apply(S::Paid, SideEffect::IssueTicket),
        (S::Paid, T::CheckoutCompleted) => replay(SideEffect::IssueTicket),

        (S::Pending, T::CheckoutExpired | T::CheckoutFailed) => apply(S::Failed, SideEffect::None),
        (S::Failed, T::CheckoutExpired | T::CheckoutFailed) => replay(SideEffect::None),

        (S::Paid, T::Refunded) => apply(S::Refunded, SideEffect::InvalidateTicket),
        (S::Refunded, T::Refunded) => replay(SideEffect::InvalidateTicket),

        (from, trigger) => TransitionDecision::Illegal { from, trigger },
    }
}
