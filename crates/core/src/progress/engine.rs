use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::booking::BookingStatus;
use crate::domain::payment::{deposit_amount, remainder_amount};
use crate::progress::steps::{Progress, ProgressStep, RequiredAction, StepKind, StepStatus};

pub const SAMPLE_MISSING_DETAIL: &str = "please submit your sample";
pub const SAMPLE_RECORDED_DETAIL: &str = "sample info recorded";

/// Auxiliary facts the engine needs besides the canonical status.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressFacts {
    pub price: Option<Decimal>,
    /// `None` means the caller has not determined it yet; never read as `false`.
    pub has_sample_info: Option<bool>,
    pub delivery_confirmed: bool,
    pub collection_confirmed: bool,
    pub appointment_at: Option<DateTime<Utc>>,
}

struct StepRule {
    kind: StepKind,
    completed_if: &'static [BookingStatus],
    current_if: &'static [BookingStatus],
}

use BookingStatus::{
    Completed, DeliveringKit, KitDelivered, Pending, PreparingKit, ReturningSample,
    SampleReceived, Testing, WaitingForSample,
};

// Steps 2..=7. The two sets of a row are disjoint, and a step is completed
// exactly when the status is past its current-if set.
const STEP_RULES: [StepRule; 6] = [
    StepRule {
        kind: StepKind::DepositPayment,
        completed_if: &[
            PreparingKit,
            DeliveringKit,
            KitDelivered,
            WaitingForSample,
            ReturningSample,
            SampleReceived,
            Testing,
            Completed,
        ],
        current_if: &[Pending],
    },
    StepRule {
        kind: StepKind::KitReceipt,
        completed_if: &[WaitingForSample, ReturningSample, SampleReceived, Testing, Completed],
        current_if: &[PreparingKit, DeliveringKit, KitDelivered],
    },
    StepRule {
        kind: StepKind::SampleTransfer,
        completed_if: &[SampleReceived, Testing, Completed],
        current_if: &[WaitingForSample, ReturningSample],
    },
    StepRule {
        kind: StepKind::RemainderPayment,
        completed_if: &[Testing, Completed],
        current_if: &[SampleReceived],
    },
    StepRule { kind: StepKind::LabAnalysis, completed_if: &[Completed], current_if: &[Testing] },
    StepRule { kind: StepKind::ResultDelivery, completed_if: &[Completed], current_if: &[] },
];

pub fn derive(status: BookingStatus, facts: &ProgressFacts) -> Progress {
    derive_at(status, facts, Utc::now())
}

/// Pure derivation: the same inputs always yield the same steps.
pub fn derive_at(status: BookingStatus, facts: &ProgressFacts, now: DateTime<Utc>) -> Progress {
    if status == BookingStatus::Cancelled {
        return cancelled_progress(facts, now);
    }

    let mut steps = Vec::with_capacity(StepKind::CATALOGUE.len());
    steps.push(registration_step(facts));

    for (index, rule) in STEP_RULES.iter().enumerate() {
        let id = index as u8 + 2;
        let step_status = if rule.completed_if.contains(&status) {
            StepStatus::Completed
        } else if rule.current_if.contains(&status) {
            StepStatus::Current
        } else {
            StepStatus::Pending
        };

        let mut step = ProgressStep::new(id, rule.kind, step_status);
        decorate(&mut step, status, facts);
        steps.push(step);
    }

    let current_step = steps
        .iter()
        .find(|step| step.status == StepStatus::Current)
        .or_else(|| steps.last())
        .map(|step| step.id)
        .unwrap_or(1);

    Progress { steps, current_step }
}

fn registration_step(facts: &ProgressFacts) -> ProgressStep {
    let mut step = ProgressStep::new(1, StepKind::Registration, StepStatus::Completed);
    step.occurred_at = facts.appointment_at;
    step
}

fn cancelled_progress(facts: &ProgressFacts, now: DateTime<Utc>) -> Progress {
    let mut cancelled = ProgressStep::new(2, StepKind::Cancelled, StepStatus::Current);
    cancelled.occurred_at = Some(now);
    Progress { steps: vec![registration_step(facts), cancelled], current_step: 2 }
}

/// Amounts, details and the single required action. Actions only ever land on
/// the current step, which keeps at most one step actionable.
fn decorate(step: &mut ProgressStep, status: BookingStatus, facts: &ProgressFacts) {
    let is_current = step.status == StepStatus::Current;

    match step.kind {
        StepKind::DepositPayment => {
            step.amount = facts.price.map(deposit_amount);
            if is_current {
                step.action = Some(RequiredAction::PayDeposit);
            }
        }
        StepKind::KitReceipt => {
            let awaiting_receipt = matches!(status, DeliveringKit | KitDelivered);
            if is_current && awaiting_receipt && !facts.delivery_confirmed {
                step.action = Some(RequiredAction::ConfirmKitReceipt);
            }
        }
        StepKind::SampleTransfer => {
            if status == WaitingForSample {
                step.detail = match facts.has_sample_info {
                    Some(false) => Some(SAMPLE_MISSING_DETAIL.to_string()),
                    Some(true) => Some(SAMPLE_RECORDED_DETAIL.to_string()),
                    None => None,
                };
                if is_current && !facts.collection_confirmed {
                    step.action = Some(RequiredAction::ScheduleCollection);
                }
            }
        }
        StepKind::RemainderPayment => {
            step.amount = facts.price.map(remainder_amount);
            if is_current {
                step.action = Some(RequiredAction::PayRemainder);
            }
        }
        StepKind::Registration
        | StepKind::LabAnalysis
        | StepKind::ResultDelivery
        | StepKind::Cancelled => {}
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use crate::domain::booking::BookingStatus;
    use crate::progress::engine::{
        derive, derive_at, ProgressFacts, SAMPLE_MISSING_DETAIL, SAMPLE_RECORDED_DETAIL,
    };
    use crate::progress::steps::{RequiredAction, StepKind, StepStatus};

    fn all_fact_combinations() -> Vec<ProgressFacts> {
        let mut combinations = Vec::new();
        for has_sample_info in [None, Some(false), Some(true)] {
            for delivery_confirmed in [false, true] {
                for collection_confirmed in [false, true] {
                    for price in [None, Some(Decimal::from(1_000_000))] {
                        combinations.push(ProgressFacts {
                            price,
                            has_sample_info,
                            delivery_confirmed,
                            collection_confirmed,
                            appointment_at: None,
                        });
                    }
                }
            }
        }
        combinations
    }

    #[test]
    fn non_cancelled_statuses_yield_seven_monotonic_steps() {
        for status in BookingStatus::PIPELINE {
            let progress = derive(status, &ProgressFacts::default());
            assert_eq!(progress.steps.len(), 7, "{status}");

            let ids: Vec<u8> = progress.steps.iter().map(|step| step.id).collect();
            assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7]);

            let rank = |status: StepStatus| match status {
                StepStatus::Completed => 0,
                StepStatus::Current => 1,
                StepStatus::Pending => 2,
            };
            let ranks: Vec<u8> = progress.steps.iter().map(|step| rank(step.status)).collect();
            assert!(ranks.windows(2).all(|pair| pair[0] <= pair[1]), "{status}: {ranks:?}");

            let current = progress.steps.iter().filter(|step| step.status == StepStatus::Current);
            assert!(current.count() <= 1, "{status}");
        }
    }

    #[test]
    fn cancelled_yields_two_steps_stamped_with_derivation_time() {
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).single().expect("valid timestamp");
        let progress = derive_at(BookingStatus::Cancelled, &ProgressFacts::default(), now);

        assert_eq!(progress.steps.len(), 2);
        assert_eq!(progress.steps[0].status, StepStatus::Completed);
        assert_eq!(progress.steps[1].status, StepStatus::Current);
        assert_eq!(progress.steps[1].kind, StepKind::Cancelled);
        assert_eq!(progress.steps[1].occurred_at, Some(now));
        assert_eq!(progress.current_step, 2);
        assert!(progress.is_cancelled());
    }

    #[test]
    fn at_most_one_step_is_actionable_for_any_input() {
        let statuses = BookingStatus::PIPELINE.into_iter().chain([BookingStatus::Cancelled]);
        for status in statuses {
            for facts in all_fact_combinations() {
                let progress = derive(status, &facts);
                let actionable = progress.steps.iter().filter(|step| step.action_required());
                assert!(actionable.count() <= 1, "{status} with {facts:?}");
                if let Some(step) = progress.actionable_step() {
                    assert_eq!(step.status, StepStatus::Current);
                }
            }
        }
    }

    #[test]
    fn sample_received_makes_remainder_current_with_exact_amount() {
        let facts =
            ProgressFacts { price: Some(Decimal::from(1_000_000)), ..ProgressFacts::default() };
        let progress = derive(BookingStatus::SampleReceived, &facts);

        let deposit = progress.step(2).expect("deposit step");
        assert_eq!(deposit.status, StepStatus::Completed);
        assert_eq!(deposit.action, None);

        let remainder = progress.step(5).expect("remainder step");
        assert_eq!(remainder.status, StepStatus::Current);
        assert_eq!(remainder.action, Some(RequiredAction::PayRemainder));
        assert_eq!(remainder.amount, Some(Decimal::from(800_000)));
        assert_eq!(progress.current_step, 5);
    }

    #[test]
    fn pending_asks_for_deposit() {
        let facts =
            ProgressFacts { price: Some(Decimal::from(1_000_000)), ..ProgressFacts::default() };
        let progress = derive(BookingStatus::Pending, &facts);

        let deposit = progress.step(2).expect("deposit step");
        assert_eq!(deposit.action, Some(RequiredAction::PayDeposit));
        assert_eq!(deposit.amount, Some(Decimal::from(200_000)));
        assert_eq!(progress.current_step, 2);
    }

    #[test]
    fn missing_price_leaves_amounts_unset() {
        let progress = derive(BookingStatus::Pending, &ProgressFacts::default());
        assert_eq!(progress.step(2).and_then(|step| step.amount), None);
        assert_eq!(progress.step(5).and_then(|step| step.amount), None);
    }

    #[test]
    fn sample_detail_distinguishes_unknown_from_missing() {
        let detail = |has_sample_info| {
            let facts = ProgressFacts { has_sample_info, ..ProgressFacts::default() };
            derive(BookingStatus::WaitingForSample, &facts)
                .step(4)
                .and_then(|step| step.detail.clone())
        };

        assert_eq!(detail(Some(false)).as_deref(), Some(SAMPLE_MISSING_DETAIL));
        assert_eq!(detail(Some(true)).as_deref(), Some(SAMPLE_RECORDED_DETAIL));
        assert_eq!(detail(None), None);
    }

    #[test]
    fn sample_detail_only_applies_while_waiting_for_sample() {
        let facts = ProgressFacts { has_sample_info: Some(false), ..ProgressFacts::default() };
        let progress = derive(BookingStatus::ReturningSample, &facts);
        assert_eq!(progress.step(4).and_then(|step| step.detail.clone()), None);
    }

    #[test]
    fn schedule_collection_disappears_once_confirmed() {
        let open = derive(BookingStatus::WaitingForSample, &ProgressFacts::default());
        assert_eq!(
            open.actionable_step().map(|step| (step.id, step.action)),
            Some((4, Some(RequiredAction::ScheduleCollection)))
        );

        let confirmed = ProgressFacts { collection_confirmed: true, ..ProgressFacts::default() };
        let progress = derive(BookingStatus::WaitingForSample, &confirmed);
        assert!(progress.actionable_step().is_none());
        assert_eq!(progress.current_step, 4);
    }

    #[test]
    fn kit_receipt_action_requires_delivery_in_progress_and_unconfirmed() {
        let preparing = derive(BookingStatus::PreparingKit, &ProgressFacts::default());
        assert!(preparing.actionable_step().is_none());

        let delivered = derive(BookingStatus::KitDelivered, &ProgressFacts::default());
        assert_eq!(
            delivered.actionable_step().and_then(|step| step.action),
            Some(RequiredAction::ConfirmKitReceipt)
        );

        let confirmed = ProgressFacts { delivery_confirmed: true, ..ProgressFacts::default() };
        assert!(derive(BookingStatus::KitDelivered, &confirmed).actionable_step().is_none());
    }

    #[test]
    fn completed_points_cursor_at_last_step() {
        let progress = derive(BookingStatus::Completed, &ProgressFacts::default());
        assert!(progress.steps.iter().all(|step| step.status == StepStatus::Completed));
        assert_eq!(progress.current_step, 7);
    }

    #[test]
    fn derivation_is_idempotent() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("valid timestamp");
        let facts = ProgressFacts {
            price: Some(Decimal::new(1_234_567, 2)),
            has_sample_info: Some(true),
            ..ProgressFacts::default()
        };
        for status in BookingStatus::PIPELINE {
            assert_eq!(derive_at(status, &facts, now), derive_at(status, &facts, now));
        }
    }
}
