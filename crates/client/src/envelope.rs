//! The backend answers either with the payload itself or wrapped as `{ "data": ... }`.

use helixbook_core::errors::{RemoteError, RemoteErrorKind};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, RemoteError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|error| RemoteError::new(RemoteErrorKind::Decode, error.to_string()))?;
    decode_value(value)
}

/// Prefers the `data` member when present, falling back to the whole body.
/// A `null` member decodes as `None` for optional payloads.
pub fn decode_value<T: DeserializeOwned>(value: Value) -> Result<T, RemoteError> {
    if let Some(inner) = value.get("data") {
        if let Ok(decoded) = serde_json::from_value::<T>(inner.clone()) {
            return Ok(decoded);
        }
    }
    serde_json::from_value::<T>(value)
        .map_err(|error| RemoteError::new(RemoteErrorKind::Decode, error.to_string()))
}

/// Identifier fields arrive as strings or bare numbers.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use helixbook_core::domain::booking::{BookingRecord, RawStatus};
    use helixbook_core::domain::sample::TestKit;
    use helixbook_core::errors::RemoteErrorKind;
    use helixbook_core::ports::Acknowledgement;
    use serde_json::json;

    use super::{decode, decode_value, id_string};

    #[test]
    fn wrapped_and_bare_bookings_decode_the_same() {
        let bare = json!({ "bookingId": "BK-1", "status": 3, "totalPrice": 1500000 });
        let wrapped = json!({ "success": true, "data": bare.clone() });

        let from_bare: BookingRecord = decode_value(bare).expect("bare");
        let from_wrapped: BookingRecord = decode_value(wrapped).expect("wrapped");

        assert_eq!(from_bare, from_wrapped);
        assert_eq!(from_bare.status, RawStatus::Code(3));
    }

    #[test]
    fn numeric_booking_ids_decode() {
        let record: BookingRecord =
            decode_value(json!({ "data": { "id": 1024, "status": 2 } })).expect("record");

        assert_eq!(record.id.0, "1024");
        assert_eq!(record.status, RawStatus::Code(2));
    }

    #[test]
    fn null_data_is_an_absent_optional_payload() {
        let decoded: Option<TestKit> =
            decode_value(json!({ "success": true, "data": null })).expect("decodes");
        assert_eq!(decoded, None);
    }

    #[test]
    fn acknowledgement_is_read_from_the_body_when_data_does_not_fit() {
        let ack: Acknowledgement =
            decode_value(json!({ "success": false, "message": "late", "data": { "id": 1 } }))
                .expect("decodes");
        assert_eq!(ack, Acknowledgement::rejected("late"));
    }

    #[test]
    fn invalid_json_is_a_decode_failure() {
        let error = decode::<BookingRecord>(b"<html>").expect_err("not json");
        assert_eq!(error.kind, RemoteErrorKind::Decode);
    }

    #[test]
    fn numeric_and_string_ids_are_accepted() {
        assert_eq!(id_string(&json!(123456)), Some("123456".to_string()));
        assert_eq!(id_string(&json!(" ORD-9 ")), Some("ORD-9".to_string()));
        assert_eq!(id_string(&json!("")), None);
        assert_eq!(id_string(&json!(null)), None);
    }
}
