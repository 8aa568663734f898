use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order state as reported by the external accrual service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderState {
    /// Order registered, calculation not started
    New,
    /// Calculation in progress
    Processing,
    /// Order rejected, no points will be accrued
    Invalid,
    /// Calculation finished, accrual is final
    Processed,
}

impl OrderState {
    /// Terminal states stop the polling loop
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Invalid | OrderState::Processed)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, OrderState::New | OrderState::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::New => "NEW",
            OrderState::Processing => "PROCESSING",
            OrderState::Invalid => "INVALID",
            OrderState::Processed => "PROCESSED",
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status payload decoded from the accrual service's 200 response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatus {
    pub order: String,
    pub status: OrderState,
    /// Accrued points; the service omits the field while nothing is accrued
    #[serde(default)]
    pub accrual: Decimal,
}

/// One pending reconciliation: an order and the login that owns it.
/// Duplicates are possible if the same order is re-submitted; the queue
/// does not deduplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub login: String,
    pub order_number: String,
}

impl Task {
    pub fn new(login: impl Into<String>, order_number: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            order_number: order_number.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_terminal_states() {
        assert!(OrderState::Invalid.is_terminal());
        assert!(OrderState::Processed.is_terminal());
        assert!(!OrderState::New.is_terminal());
        assert!(!OrderState::Processing.is_terminal());
    }

    #[test]
    fn test_decode_full_body() {
        let body = r#"{"order":"123","status":"PROCESSED","accrual":500.00}"#;
        let status: OrderStatus = serde_json::from_str(body).unwrap();
        assert_eq!(status.order, "123");
        assert_eq!(status.status, OrderState::Processed);
        assert_eq!(status.accrual, dec!(500.00));
    }

    #[test]
    fn test_decode_missing_accrual_defaults_to_zero() {
        let body = r#"{"order":"123","status":"PROCESSING"}"#;
        let status: OrderStatus = serde_json::from_str(body).unwrap();
        assert_eq!(status.status, OrderState::Processing);
        assert_eq!(status.accrual, Decimal::ZERO);
    }

    #[test]
    fn test_decode_rejects_unknown_status() {
        let body = r#"{"order":"123","status":"UNKNOWN"}"#;
        assert!(serde_json::from_str::<OrderStatus>(body).is_err());
    }
}
