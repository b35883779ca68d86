//! Maps the backend's heterogeneous status representations onto [`BookingStatus`].
//!
//! Numeric codes go through a fixed table. Text goes through [`STATUS_PATTERNS`],
//! an ordered list evaluated top to bottom where the first matching row wins.
//! Rows for specific Vietnamese glosses sit above the generic ones they contain
//! (`đang chờ lấy mẫu` must resolve before the bare `đang chờ`).

use tracing::warn;

use crate::domain::booking::{BackendStatus, BookingStatus, RawStatus};
use crate::errors::StatusError;

pub struct StatusPattern {
    pub tokens: &'static [&'static str],
    pub status: BackendStatus,
}

pub const STATUS_PATTERNS: &[StatusPattern] = &[
    StatusPattern { tokens: &["cancel", "đã hủy", "đã huỷ", "hủy", "huỷ"], status: BackendStatus::Cancelled },
    StatusPattern {
        tokens: &["completed", "complete", "hoàn thành", "hoàn tất", "có kết quả", "đã trả kết quả"],
        status: BackendStatus::Completed,
    },
    StatusPattern {
        tokens: &["samplereceived", "đã nhận mẫu", "đã nhận được mẫu"],
        status: BackendStatus::SampleReceived,
    },
    StatusPattern {
        tokens: &["returningsample", "returning", "đang gửi mẫu", "đang trả mẫu", "gửi mẫu về"],
        status: BackendStatus::ReturningSample,
    },
    StatusPattern {
        tokens: &["staffgettingsample", "nhân viên lấy mẫu", "đang lấy mẫu"],
        status: BackendStatus::StaffGettingSample,
    },
    StatusPattern {
        tokens: &["waitingforsample", "chờ lấy mẫu", "chờ nhận mẫu", "chờ mẫu"],
        status: BackendStatus::WaitingForSample,
    },
    StatusPattern {
        tokens: &["kitdelivered", "delivered", "đã giao kit", "đã nhận kit", "đã giao"],
        status: BackendStatus::KitDelivered,
    },
    StatusPattern {
        tokens: &["deliveringkit", "delivering", "đang giao kit", "đang giao", "đang vận chuyển"],
        status: BackendStatus::DeliveringKit,
    },
    StatusPattern { tokens: &["checkin", "đã check-in", "check in"], status: BackendStatus::CheckIn },
    StatusPattern {
        tokens: &["preparingkit", "preparing", "confirmed", "đã xác nhận", "chuẩn bị kit", "đang chuẩn bị"],
        status: BackendStatus::PreparingKit,
    },
    StatusPattern {
        tokens: &["testing", "đang xét nghiệm", "xét nghiệm", "đang phân tích"],
        status: BackendStatus::Testing,
    },
    StatusPattern {
        tokens: &["pending", "chờ xác nhận", "đang chờ", "chờ xử lý"],
        status: BackendStatus::Pending,
    },
];

/// Phrases denying completion. They are removed before matching so the
/// Completed row never sees them; longer forms come first.
const NEGATED_COMPLETION: &[&str] = &[
    "not completed",
    "not complete",
    "uncompleted",
    "incomplete",
    "chưa hoàn thành",
    "chưa hoàn tất",
    "chưa có kết quả",
    "chưa trả kết quả",
];

pub fn normalize(raw: &RawStatus) -> Result<BookingStatus, StatusError> {
    match raw {
        RawStatus::Code(code) => normalize_code(*code),
        RawStatus::Text(text) => Ok(normalize_text(text)),
    }
}

/// Like [`normalize`] but never fails: an unknown code is logged and resolves to `Pending`.
pub fn normalize_or_default(raw: &RawStatus) -> BookingStatus {
    normalize(raw).unwrap_or_else(|error| {
        warn!(
            event_name = "status.unknown_code",
            raw_status = %raw,
            error = %error,
            "unknown booking status code, defaulting to Pending"
        );
        BookingStatus::Pending
    })
}

pub fn normalize_code(code: i64) -> Result<BookingStatus, StatusError> {
    BackendStatus::from_code(code)
        .map(BackendStatus::fold)
        .ok_or(StatusError::UnknownStatusCode(code))
}

pub fn normalize_text(raw: &str) -> BookingStatus {
    let trimmed = raw.trim();
    if let Ok(code) = trimmed.parse::<i64>() {
        return normalize_or_default(&RawStatus::Code(code));
    }

    match match_pattern(trimmed) {
        Some(status) => status.fold(),
        None => {
            warn!(
                event_name = "status.unrecognized",
                raw_status = raw,
                "unrecognized booking status text, defaulting to Pending"
            );
            BookingStatus::Pending
        }
    }
}

/// First row of [`STATUS_PATTERNS`] matching `raw`, before alias folding.
pub fn match_pattern(raw: &str) -> Option<BackendStatus> {
    let mut lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }
    let mut negated = false;
    for phrase in NEGATED_COMPLETION {
        if lowered.contains(phrase) {
            lowered = lowered.replace(phrase, " ");
            negated = true;
        }
    }
    if negated && lowered.trim().is_empty() {
        return Some(BackendStatus::Pending);
    }
    let compact: String = lowered
        .chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '_' && *ch != '-')
        .collect();

    STATUS_PATTERNS
        .iter()
        .find(|pattern| {
            pattern.tokens.iter().any(|token| lowered.contains(token) || compact.contains(token))
        })
        .map(|pattern| pattern.status)
}
