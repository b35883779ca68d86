use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Registration,
    DepositPayment,
    KitReceipt,
    SampleTransfer,
    RemainderPayment,
    LabAnalysis,
    ResultDelivery,
    Cancelled,
}

impl StepKind {
    pub const CATALOGUE: [StepKind; 7] = [
        Self::Registration,
        Self::DepositPayment,
        Self::KitReceipt,
        Self::SampleTransfer,
        Self::RemainderPayment,
        Self::LabAnalysis,
        Self::ResultDelivery,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::Registration => "Registration confirmed",
            Self::DepositPayment => "Deposit payment",
            Self::KitReceipt => "Kit receipt",
            Self::SampleTransfer => "Sample transfer",
            Self::RemainderPayment => "Remainder payment",
            Self::LabAnalysis => "Lab analysis",
            Self::ResultDelivery => "Result delivery",
            Self::Cancelled => "Booking cancelled",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Current,
    Pending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredAction {
    PayDeposit,
    ConfirmKitReceipt,
    ScheduleCollection,
    PayRemainder,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressStep {
    pub id: u8,
    pub kind: StepKind,
    pub title: String,
    pub status: StepStatus,
    pub action: Option<RequiredAction>,
    pub detail: Option<String>,
    /// Amount the customer owes at this step, when the price is known.
    pub amount: Option<Decimal>,
    pub occurred_at: Option<DateTime<Utc>>,
}

impl ProgressStep {
    pub fn new(id: u8, kind: StepKind, status: StepStatus) -> Self {
        Self {
            id,
            kind,
            title: kind.title().to_string(),
            status,
            action: None,
            detail: None,
            amount: None,
            occurred_at: None,
        }
    }

    pub fn action_required(&self) -> bool {
        self.action.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub steps: Vec<ProgressStep>,
    pub current_step: u8,
}

impl Progress {
    pub fn step(&self, id: u8) -> Option<&ProgressStep> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn actionable_step(&self) -> Option<&ProgressStep> {
        self.steps.iter().find(|step| step.action_required())
    }

    pub fn is_cancelled(&self) -> bool {
        self.steps.iter().any(|step| step.kind == StepKind::Cancelled)
    }
}
