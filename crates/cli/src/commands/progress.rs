use helixbook_core::progress::{derive, ProgressFacts};
use helixbook_core::status::normalize;
use rust_decimal::Decimal;

use crate::commands::normalize::parse_raw;
use crate::commands::CommandResult;

#[derive(Debug, Clone, Default)]
pub struct ProgressArgs {
    pub raw_status: String,
    pub price: Option<Decimal>,
    pub has_sample_info: Option<bool>,
    pub delivery_confirmed: bool,
    pub collection_confirmed: bool,
}

pub fn run(args: ProgressArgs) -> CommandResult {
    let raw = parse_raw(&args.raw_status);
    let status = match normalize(&raw) {
        Ok(status) => status,
        Err(error) => {
            return CommandResult::failure("progress", "unknown_status", error.to_string(), 2);
        }
    };

    let facts = ProgressFacts {
        price: args.price,
        has_sample_info: args.has_sample_info,
        delivery_confirmed: args.delivery_confirmed,
        collection_confirmed: args.collection_confirmed,
        appointment_at: None,
    };
    let progress = derive(status, &facts);

    CommandResult::success_with(
        "progress",
        format!("{status}: current step {}", progress.current_step),
        &progress,
    )
}
