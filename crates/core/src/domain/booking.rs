use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::feedback::{TestServiceId, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(#[serde(deserialize_with = "crate::domain::string_or_number")] pub String);

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical booking status. The first nine variants are ordered along the
/// fulfillment pipeline; `Cancelled` is an absorbing side-state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    PreparingKit,
    DeliveringKit,
    KitDelivered,
    WaitingForSample,
    ReturningSample,
    SampleReceived,
    Testing,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub const PIPELINE: [BookingStatus; 9] = [
        Self::Pending,
        Self::PreparingKit,
        Self::DeliveringKit,
        Self::KitDelivered,
        Self::WaitingForSample,
        Self::ReturningSample,
        Self::SampleReceived,
        Self::Testing,
        Self::Completed,
    ];

    /// Position along the pipeline; `None` for `Cancelled`.
    pub fn rank(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::PreparingKit => Some(1),
            Self::DeliveringKit => Some(2),
            Self::KitDelivered => Some(3),
            Self::WaitingForSample => Some(4),
            Self::ReturningSample => Some(5),
            Self::SampleReceived => Some(6),
            Self::Testing => Some(7),
            Self::Completed => Some(8),
            Self::Cancelled => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Forward moves along the pipeline and cancellation from any non-terminal
    /// status. Re-observing the same status is not a transition.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(current), Some(target)) => target > current,
            (None, Some(_)) => false,
        }
    }

    /// Numeric code understood by the backend `updateStatus` endpoint.
    pub fn backend_code(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::PreparingKit => 1,
            Self::DeliveringKit => 2,
            Self::KitDelivered => 3,
            Self::WaitingForSample => 4,
            Self::ReturningSample => 5,
            Self::SampleReceived => 6,
            Self::Testing => 7,
            Self::Completed => 8,
            Self::Cancelled => 9,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::PreparingKit => "PreparingKit",
            Self::DeliveringKit => "DeliveringKit",
            Self::KitDelivered => "KitDelivered",
            Self::WaitingForSample => "WaitingForSample",
            Self::ReturningSample => "ReturningSample",
            Self::SampleReceived => "SampleReceived",
            Self::Testing => "Testing",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw status values the backend may emit, including the two legacy aliases
/// that never surface as canonical output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendStatus {
    Pending,
    PreparingKit,
    DeliveringKit,
    KitDelivered,
    WaitingForSample,
    ReturningSample,
    SampleReceived,
    Testing,
    Completed,
    Cancelled,
    StaffGettingSample,
    CheckIn,
}

impl BackendStatus {
    pub fn from_code(code: i64) -> Option<Self> {
        let status = match code {
            0 => Self::Pending,
            1 => Self::PreparingKit,
            2 => Self::DeliveringKit,
            3 => Self::KitDelivered,
            4 => Self::WaitingForSample,
            5 => Self::ReturningSample,
            6 => Self::SampleReceived,
            7 => Self::Testing,
            8 => Self::Completed,
            9 => Self::Cancelled,
            10 => Self::StaffGettingSample,
            11 => Self::CheckIn,
            _ => return None,
        };
        Some(status)
    }

    pub fn fold(self) -> BookingStatus {
        match self {
            Self::Pending => BookingStatus::Pending,
            Self::PreparingKit | Self::CheckIn => BookingStatus::PreparingKit,
            Self::DeliveringKit => BookingStatus::DeliveringKit,
            Self::KitDelivered => BookingStatus::KitDelivered,
            Self::WaitingForSample | Self::StaffGettingSample => BookingStatus::WaitingForSample,
            Self::ReturningSample => BookingStatus::ReturningSample,
            Self::SampleReceived => BookingStatus::SampleReceived,
            Self::Testing => BookingStatus::Testing,
            Self::Completed => BookingStatus::Completed,
            Self::Cancelled => BookingStatus::Cancelled,
        }
    }
}

/// Status exactly as it arrives on the wire: a numeric code or free text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawStatus {
    Code(i64),
    Text(String),
}

impl fmt::Display for RawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{code}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for RawStatus {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for RawStatus {
    fn from(value: i64) -> Self {
        Self::Code(value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMethod {
    SelfSample,
    AtFacility,
}

impl CollectionMethod {
    pub fn parse(value: &str) -> Option<Self> {
        let compact: String = value
            .trim()
            .to_lowercase()
            .chars()
            .filter(|ch| !ch.is_whitespace() && *ch != '_' && *ch != '-')
            .collect();
        match compact.as_str() {
            "self" | "selfsample" | "selfcollection" | "home" | "tạinhà" => Some(Self::SelfSample),
            "facility" | "atfacility" | "center" | "clinic" | "tạicơsở" => Some(Self::AtFacility),
            _ => None,
        }
    }
}

/// Monetary value as the backend sends it: a JSON number or a numeric string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawAmount {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl RawAmount {
    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Integer(value) => Some(Decimal::from(*value)),
            Self::Float(value) => Decimal::try_from(*value).ok(),
            Self::Text(text) => {
                let cleaned: String = text
                    .trim()
                    .chars()
                    .filter(|ch| !ch.is_whitespace() && *ch != ',' && *ch != '_')
                    .collect();
                Decimal::from_str(&cleaned).ok()
            }
        }
    }
}

/// Booking record exactly as returned by the remote booking service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRecord {
    #[serde(alias = "bookingId")]
    pub id: BookingId,
    pub status: RawStatus,
    #[serde(default, alias = "totalPrice")]
    pub price: Option<RawAmount>,
    #[serde(default)]
    pub collection_method: Option<String>,
    #[serde(default, alias = "appointmentTime")]
    pub appointment_date: Option<String>,
    #[serde(default, alias = "fullName")]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, alias = "note")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "crate::domain::optional_string_or_number")]
    pub user_id: Option<String>,
    #[serde(
        default,
        alias = "serviceId",
        deserialize_with = "crate::domain::optional_string_or_number"
    )]
    pub test_service_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerContact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Normalized booking used by the derivation engine and the session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub status: BookingStatus,
    pub collection_method: Option<CollectionMethod>,
    pub price: Option<Decimal>,
    pub appointment_at: Option<DateTime<Utc>>,
    pub contact: CustomerContact,
    pub notes: Option<String>,
    pub user_id: Option<UserId>,
    pub test_service_id: Option<TestServiceId>,
}

impl Booking {
    /// Builds the normalized view. Classification failures never fail the
    /// load: they are logged by the normalizer and resolve to `Pending`.
    pub fn from_record(record: BookingRecord) -> Self {
        let status = crate::status::normalize_or_default(&record.status);
        let non_empty = |value: Option<String>| value.filter(|value| !value.trim().is_empty());

        Self {
            status,
            collection_method: record.collection_method.as_deref().and_then(CollectionMethod::parse),
            price: record.price.as_ref().and_then(RawAmount::to_decimal),
            appointment_at: record.appointment_date.as_deref().and_then(parse_timestamp),
            contact: CustomerContact {
                name: non_empty(record.customer_name),
                email: non_empty(record.email),
                phone: non_empty(record.phone),
            },
            notes: non_empty(record.notes),
            user_id: non_empty(record.user_id).map(UserId),
            test_service_id: non_empty(record.test_service_id).map(TestServiceId),
            id: record.id,
        }
    }
}

/// Accepts RFC 3339 or a naive `YYYY-MM-DDTHH:MM:SS[.fff]` timestamp (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{
        BackendStatus, Booking, BookingId, BookingRecord, BookingStatus, CollectionMethod,
        RawAmount, RawStatus,
    };

    fn record(status: RawStatus) -> BookingRecord {
        BookingRecord {
            id: BookingId("BK-1".to_string()),
            status,
            price: Some(RawAmount::Integer(1_000_000)),
            collection_method: Some("SelfSample".to_string()),
            appointment_date: Some("2026-03-01T09:30:00".to_string()),
            customer_name: Some("Nguyen Van A".to_string()),
            email: Some(" ".to_string()),
            phone: None,
            notes: None,
            user_id: Some("U-1".to_string()),
            test_service_id: Some("S-1".to_string()),
        }
    }

    #[test]
    fn pipeline_moves_forward_only() {
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::PreparingKit));
        assert!(BookingStatus::KitDelivered.can_transition_to(BookingStatus::Testing));
        assert!(!BookingStatus::Testing.can_transition_to(BookingStatus::KitDelivered));
        assert!(!BookingStatus::Testing.can_transition_to(BookingStatus::Testing));
    }

    #[test]
    fn cancelled_is_reachable_from_non_terminal_and_absorbing() {
        for status in BookingStatus::PIPELINE.iter().filter(|status| !status.is_terminal()) {
            assert!(status.can_transition_to(BookingStatus::Cancelled), "{status}");
        }
        for next in BookingStatus::PIPELINE {
            assert!(!BookingStatus::Cancelled.can_transition_to(next));
        }
        assert!(!BookingStatus::Completed.can_transition_to(BookingStatus::Cancelled));
    }

    #[test]
    fn backend_codes_round_trip_through_the_code_table() {
        for status in BookingStatus::PIPELINE.into_iter().chain([BookingStatus::Cancelled]) {
            let backend = BackendStatus::from_code(i64::from(status.backend_code()))
                .expect("every canonical status has a code");
            assert_eq!(backend.fold(), status);
        }
    }

    #[test]
    fn legacy_aliases_fold_onto_canonical_statuses() {
        assert_eq!(BackendStatus::StaffGettingSample.fold(), BookingStatus::WaitingForSample);
        assert_eq!(BackendStatus::CheckIn.fold(), BookingStatus::PreparingKit);
    }

    #[test]
    fn record_normalizes_into_booking() {
        let booking = Booking::from_record(record(RawStatus::Code(6)));

        assert_eq!(booking.status, BookingStatus::SampleReceived);
        assert_eq!(booking.price, Some(Decimal::from(1_000_000)));
        assert_eq!(booking.collection_method, Some(CollectionMethod::SelfSample));
        assert!(booking.appointment_at.is_some());
        assert_eq!(booking.contact.email, None);
        assert_eq!(booking.user_id.as_ref().map(|id| id.0.as_str()), Some("U-1"));
    }

    #[test]
    fn unknown_numeric_code_defaults_to_pending_on_load() {
        let booking = Booking::from_record(record(RawStatus::Code(42)));
        assert_eq!(booking.status, BookingStatus::Pending);
    }

    #[test]
    fn record_accepts_backend_json_shapes() {
        let parsed: BookingRecord = serde_json::from_value(serde_json::json!({
            "bookingId": "BK-9",
            "status": "Đã xác nhận",
            "totalPrice": "2,500,000",
            "collectionMethod": "AtFacility",
        }))
        .expect("record should deserialize");

        let booking = Booking::from_record(parsed);
        assert_eq!(booking.id, BookingId("BK-9".to_string()));
        assert_eq!(booking.status, BookingStatus::PreparingKit);
        assert_eq!(booking.price, Some(Decimal::from(2_500_000)));
        assert_eq!(booking.collection_method, Some(CollectionMethod::AtFacility));
    }

    #[test]
    fn raw_amount_parses_numbers_and_strings() {
        assert_eq!(RawAmount::Float(1500.5).to_decimal(), Some(Decimal::new(15005, 1)));
        assert_eq!(RawAmount::Text("abc".to_string()).to_decimal(), None);
    }
}
