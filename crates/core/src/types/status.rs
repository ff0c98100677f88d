//! Status enums for orders and payments.

use serde::{Deserialize, Serialize};

/// How the diner intends to pay for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    /// Pay at the counter in cash.
    Cash,
    /// Card payment brought to the table.
    Card,
    /// UPI payment via QR code.
    Upi,
}

impl PaymentMode {
    /// Every payment mode offered at the table, in display order.
    pub const ALL: [Self; 3] = [Self::Cash, Self::Card, Self::Upi];

    /// Label shown to the diner.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Cash => "Cash",
            Self::Card => "Card",
            Self::Upi => "UPI",
        }
    }
}

impl std::fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cash => write!(f, "cash"),
            Self::Card => write!(f, "card"),
            Self::Upi => write!(f, "upi"),
        }
    }
}

impl std::str::FromStr for PaymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(Self::Cash),
            "card" => Ok(Self::Card),
            "upi" => Ok(Self::Upi),
            other => Err(format!("invalid payment mode: {other}")),
        }
    }
}

/// Kitchen-side lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Submitted from the table, not yet picked up by the kitchen.
    #[default]
    Pending,
    Preparing,
    Served,
    /// Paid and closed.
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Whether the order still needs attention from staff.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Preparing | Self::Served)
    }

    /// Label shown to the diner.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Preparing => "Preparing",
            Self::Served => "Served",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_mode_round_trips_through_str() {
        for mode in PaymentMode::ALL {
            assert_eq!(mode.to_string().parse::<PaymentMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_payment_mode_parse_is_case_insensitive() {
        assert_eq!("UPI".parse::<PaymentMode>().unwrap(), PaymentMode::Upi);
        assert!("cheque".parse::<PaymentMode>().is_err());
    }

    #[test]
    fn test_payment_mode_serde_matches_display() {
        let json = serde_json::to_string(&PaymentMode::Card).unwrap();
        assert_eq!(json, "\"card\"");
    }

    #[test]
    fn test_order_status_open() {
        assert!(OrderStatus::Pending.is_open());
        assert!(OrderStatus::Served.is_open());
        assert!(!OrderStatus::Completed.is_open());
        assert!(!OrderStatus::Cancelled.is_open());
    }

    #[test]
    fn test_order_status_default_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }
}
