use helixbook_core::domain::booking::{BookingStatus, RawStatus};
use helixbook_core::status::normalize;
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct Normalized {
    raw: RawStatus,
    status: BookingStatus,
    backend_code: u8,
}

/// Digits are read as a backend code, anything else as status text.
pub fn parse_raw(raw: &str) -> RawStatus {
    match raw.trim().parse::<i64>() {
        Ok(code) => RawStatus::Code(code),
        Err(_) => RawStatus::Text(raw.to_string()),
    }
}

pub fn run(raw: &str) -> CommandResult {
    let raw = parse_raw(raw);
    match normalize(&raw) {
        Ok(status) => CommandResult::success_with(
            "normalize",
            format!("{raw} -> {status}"),
            &Normalized { raw, status, backend_code: status.backend_code() },
        ),
        Err(error) => CommandResult::failure("normalize", "unknown_status", error.to_string(), 2),
    }
}
