use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::booking::BookingId;

/// Share of the price collected before the kit ships.
pub const DEPOSIT_FRACTION: Decimal = Decimal::from_parts(20, 0, 0, false, 2);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderCode(#[serde(deserialize_with = "crate::domain::string_or_number")] pub String);

impl OrderCode {
    /// Store key of the marker left once this order has been settled.
    pub fn processed_key(&self) -> String {
        format!("payment_processed_{}", self.0)
    }
}

impl fmt::Display for OrderCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Deposit,
    Remainder,
}

impl PaymentKind {
    pub fn is_remainder(self) -> bool {
        matches!(self, Self::Remainder)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Remainder => "remainder",
        }
    }
}

impl fmt::Display for PaymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn deposit_amount(price: Decimal) -> Decimal {
    price * DEPOSIT_FRACTION
}

pub fn remainder_amount(price: Decimal) -> Decimal {
    price - deposit_amount(price)
}

/// Pending payment persisted locally while the customer is at the gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentIntent {
    pub order_code: OrderCode,
    pub booking_id: BookingId,
    pub kind: PaymentKind,
    pub created_at: DateTime<Utc>,
}

/// Stored layout: `{ orderCode, bookingId, isRemainingPayment, timestamp }`
/// with `timestamp` in epoch milliseconds.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredPaymentIntent {
    #[serde(deserialize_with = "crate::domain::string_or_number")]
    order_code: String,
    #[serde(deserialize_with = "crate::domain::string_or_number")]
    booking_id: String,
    #[serde(default)]
    is_remaining_payment: bool,
    #[serde(default)]
    timestamp: i64,
}

impl PaymentIntent {
    pub const STORAGE_KEY: &'static str = "paymentData";

    pub fn new(order_code: OrderCode, booking_id: BookingId, kind: PaymentKind) -> Self {
        Self { order_code, booking_id, kind, created_at: Utc::now() }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&StoredPaymentIntent {
            order_code: self.order_code.0.clone(),
            booking_id: self.booking_id.0.clone(),
            is_remaining_payment: self.kind.is_remainder(),
            timestamp: self.created_at.timestamp_millis(),
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let stored: StoredPaymentIntent = serde_json::from_str(raw)?;
        let kind =
            if stored.is_remaining_payment { PaymentKind::Remainder } else { PaymentKind::Deposit };
        let created_at =
            Utc.timestamp_millis_opt(stored.timestamp).single().unwrap_or_else(Utc::now);
        Ok(Self {
            order_code: OrderCode(stored.order_code),
            booking_id: BookingId(stored.booking_id),
            kind,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{deposit_amount, remainder_amount, PaymentIntent, PaymentKind, DEPOSIT_FRACTION};

    #[test]
    fn deposit_fraction_is_exactly_twenty_percent() {
        assert_eq!(DEPOSIT_FRACTION, Decimal::new(2, 1));
    }

    #[test]
    fn split_amounts_add_back_to_price() {
        let price = Decimal::from(1_000_000);
        assert_eq!(deposit_amount(price), Decimal::from(200_000));
        assert_eq!(remainder_amount(price), Decimal::from(800_000));

        let odd = Decimal::new(1_999_999, 2);
        assert_eq!(deposit_amount(odd) + remainder_amount(odd), odd);
    }

    #[test]
    fn intent_reads_browser_style_blob() {
        let raw = r#"{"orderCode":"1717","bookingId":"BK-3","isRemainingPayment":true,"timestamp":1767225600000}"#;
        let intent = PaymentIntent::from_json(raw).expect("intent should parse");

        assert_eq!(intent.order_code.0, "1717");
        assert_eq!(intent.booking_id.0, "BK-3");
        assert_eq!(intent.kind, PaymentKind::Remainder);
        assert_eq!(intent.created_at.timestamp_millis(), 1_767_225_600_000);
    }
}
