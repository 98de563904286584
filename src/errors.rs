use serde::Serialize;
use strum::Display;

use crate::services::checkout_session::CheckoutPhase;

/// Failure reported by an external collaborator (order, settlement, cart,
/// discount or address service). Never handed to the state machine as-is:
/// the orchestrator translates it into a [`CheckoutError`].
#[derive(Debug, Clone, thiserror::Error, Serialize, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Payment declined: {0}")]
    Declined(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ServiceError {
    /// The human-readable reason shown to the shopper.
    pub fn reason(&self) -> String {
        match self {
            Self::Transport(msg)
            | Self::Timeout(msg)
            | Self::Rejected(msg)
            | Self::Declined(msg)
            | Self::InvalidResponse(msg)
            | Self::NotFound(msg) => msg.clone(),
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout(err.to_string())
        } else if err.is_decode() {
            ServiceError::InvalidResponse(err.to_string())
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

/// How a [`CheckoutError`] is presented and whether it can be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Needs shopper correction; shown next to the offending step, no network involved.
    Precondition,
    /// Service failure; shown as a dismissible banner on review with a retry action.
    Transient,
    /// Action not valid in the current phase.
    Flow,
}

#[derive(Debug, Clone, thiserror::Error, Serialize, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("Sign in to continue checkout")]
    Unauthenticated,

    #[error("Your cart is empty")]
    EmptyCart,

    #[error("A shipping address is required")]
    MissingAddress,

    #[error("A payment method is required")]
    MissingPaymentMethod,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Order could not be created: {0}")]
    OrderCreationFailed(String),

    #[error("Payment could not be completed: {0}")]
    SettlementFailed(String),

    #[error("Cannot {action} from the {from} step")]
    InvalidTransition { from: CheckoutPhase, action: String },

    #[error("Checkout is already processing")]
    AlreadyProcessing,

    #[error("Checkout session is closed")]
    SessionClosed,

    #[error("Checkout could not be loaded: {0}")]
    Upstream(String),
}

impl CheckoutError {
    pub fn invalid_transition(from: CheckoutPhase, action: &str) -> Self {
        Self::InvalidTransition {
            from,
            action: action.to_string(),
        }
    }

    /// Single source of truth for the error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated
            | Self::EmptyCart
            | Self::MissingAddress
            | Self::MissingPaymentMethod
            | Self::Validation(_) => ErrorKind::Precondition,
            Self::OrderCreationFailed(_) | Self::SettlementFailed(_) | Self::Upstream(_) => {
                ErrorKind::Transient
            }
            Self::InvalidTransition { .. } | Self::AlreadyProcessing | Self::SessionClosed => {
                ErrorKind::Flow
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<validator::ValidationErrors> for CheckoutError {
    fn from(err: validator::ValidationErrors) -> Self {
        CheckoutError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CheckoutError::Unauthenticated, ErrorKind::Precondition)]
    #[case(CheckoutError::EmptyCart, ErrorKind::Precondition)]
    #[case(CheckoutError::MissingAddress, ErrorKind::Precondition)]
    #[case(CheckoutError::Validation("x".into()), ErrorKind::Precondition)]
    #[case(CheckoutError::OrderCreationFailed("x".into()), ErrorKind::Transient)]
    #[case(CheckoutError::SettlementFailed("x".into()), ErrorKind::Transient)]
    #[case(CheckoutError::AlreadyProcessing, ErrorKind::Flow)]
    #[case(CheckoutError::SessionClosed, ErrorKind::Flow)]
    fn checkout_error_kind_mapping(#[case] error: CheckoutError, #[case] expected: ErrorKind) {
        assert_eq!(error.kind(), expected);
    }

    #[test]
    fn only_service_failures_are_retryable() {
        assert!(CheckoutError::SettlementFailed("card_declined".into()).is_retryable());
        assert!(CheckoutError::OrderCreationFailed("timeout".into()).is_retryable());
        assert!(!CheckoutError::EmptyCart.is_retryable());
        assert!(!CheckoutError::invalid_transition(CheckoutPhase::Shipping, "finalize").is_retryable());
    }

    #[test]
    fn invalid_transition_message_names_phase() {
        let err = CheckoutError::invalid_transition(CheckoutPhase::PaymentProcessing, "go back");
        assert_eq!(err.to_string(), "Cannot go back from the payment_processing step");
    }

    #[test]
    fn service_error_reason_strips_prefix() {
        let err = ServiceError::Declined("card_declined".into());
        assert_eq!(err.reason(), "card_declined");
        assert_eq!(err.to_string(), "Payment declined: card_declined");
    }
}
