use serde::Deserialize;

/// Current fare and refund policy. Refunds are a flat amount, not a share of
/// the amount paid.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingPolicy {
    #[serde(default = "default_fare")]
    pub fare_amount: f64,
    #[serde(default = "default_refund")]
    pub refund_amount: f64,
    #[serde(default = "default_payment_method")]
    pub default_payment_method: String,
    #[serde(default = "default_cancel_reason")]
    pub default_cancel_reason: String,
}

fn default_fare() -> f64 { 100.0 }
fn default_refund() -> f64 { 50.0 }
fn default_payment_method() -> String { "CASH".to_string() }
fn default_cancel_reason() -> String { "No reason provided".to_string() }

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            fare_amount: default_fare(),
            refund_amount: default_refund(),
            default_payment_method: default_payment_method(),
            default_cancel_reason: default_cancel_reason(),
        }
    }
}

impl BookingPolicy {
    /// The caller's payment method, or the default when absent or blank.
    pub fn payment_method(&self, supplied: Option<&str>) -> String {
        supplied
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_payment_method)
            .to_string()
    }

    pub fn cancel_reason(&self, supplied: Option<&str>) -> String {
        supplied
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(&self.default_cancel_reason)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = BookingPolicy::default();
        assert_eq!(policy.fare_amount, 100.0);
        assert_eq!(policy.refund_amount, 50.0);
        assert_eq!(policy.payment_method(None), "CASH");
        assert_eq!(policy.payment_method(Some("  ")), "CASH");
        assert_eq!(policy.payment_method(Some("CARD")), "CARD");
        assert_eq!(policy.cancel_reason(None), "No reason provided");
        assert_eq!(policy.cancel_reason(Some("schedule change")), "schedule change");
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let policy: BookingPolicy = serde_json::from_str(r#"{"fare_amount": 120.0}"#).unwrap();
        assert_eq!(policy.fare_amount, 120.0);
        assert_eq!(policy.refund_amount, 50.0);
        assert_eq!(policy.default_payment_method, "CASH");
    }
}
