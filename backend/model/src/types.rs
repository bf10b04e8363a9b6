//! Domain entities from spec.md §3. These mirror the persisted shape; the
//! `batch`/`bank` crates own the `sqlx` mapping, this crate owns the shape
//! and its invariants.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::money::{Money, Percent, Units};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub status: ClientStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    Personal,
    Pooled,
    Joint,
    Linked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountCategory {
    General,
    Family,
    InvestmentClubs,
    RetirementsBenefitScheme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub client_id: Uuid,
    pub account_number: String,
    pub account_type: AccountType,
    pub category: AccountCategory,
    pub sponsor_code: Option<String>,
    pub status: AccountStatus,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalType {
    Other,
    Education,
    Retirement,
    Emergency,
    Wealth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskTolerance {
    Conservative,
    Moderate,
    Aggressive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: Uuid,
    pub account_id: Uuid,
    pub goal_number: String,
    pub title: String,
    pub goal_type: GoalType,
    pub risk_tolerance: RiskTolerance,
    pub fund_distribution: HashMap<FundCode, Percent>,
    pub status: GoalStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FundCode {
    Xummf,
    Xubf,
    Xudef,
    Xuref,
}

impl FundCode {
    pub const ALL: [FundCode; 4] = [
        FundCode::Xummf,
        FundCode::Xubf,
        FundCode::Xudef,
        FundCode::Xuref,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FundCode::Xummf => "XUMMF",
            FundCode::Xubf => "XUBF",
            FundCode::Xudef => "XUDEF",
            FundCode::Xuref => "XUREF",
        }
    }

    pub fn parse(raw: &str) -> Option<FundCode> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "XUMMF" => Some(FundCode::Xummf),
            "XUBF" => Some(FundCode::Xubf),
            "XUDEF" => Some(FundCode::Xudef),
            "XUREF" => Some(FundCode::Xuref),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fund {
    pub id: Uuid,
    pub fund_code: FundCode,
    pub name: String,
    pub status: FundStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundPrice {
    pub fund_id: Uuid,
    pub price_date: NaiveDate,
    pub bid: rust_decimal::Decimal,
    pub mid: rust_decimal::Decimal,
    pub offer: rust_decimal::Decimal,
}

impl FundPrice {
    pub fn prices_ordered(&self) -> bool {
        self.bid <= self.mid && self.mid <= self.offer
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Redemption,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionSource {
    Bank,
    Mobile,
    Web,
    UssD,
    BranchCash,
    StandingOrder,
}

impl TransactionSource {
    pub fn parse(raw: &str) -> Option<TransactionSource> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BANK" => Some(TransactionSource::Bank),
            "MOBILE" | "MPESA" | "M-PESA" => Some(TransactionSource::Mobile),
            "WEB" | "PORTAL" => Some(TransactionSource::Web),
            "USSD" => Some(TransactionSource::UssD),
            "BRANCH" | "BRANCH_CASH" | "CASH" => Some(TransactionSource::BranchCash),
            "STANDING_ORDER" | "STANDING ORDER" | "SO" => Some(TransactionSource::StandingOrder),
            _ => None,
        }
    }
}

/// A leaf fact: one fund's leg of a goal movement. Immutable once written;
/// deleted only by batch rollback (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundTransaction {
    pub id: Uuid,
    pub fund_transaction_id: String,
    pub goal_transaction_code: String,
    pub transaction_id: String,
    pub source: TransactionSource,
    pub client_id: Uuid,
    pub account_id: Uuid,
    pub goal_id: Uuid,
    pub fund_id: Uuid,
    pub upload_batch_id: Uuid,
    pub transaction_date: NaiveDate,
    pub date_created: DateTime<Utc>,
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub units: Units,
    pub bid: rust_decimal::Decimal,
    pub mid: rust_decimal::Decimal,
    pub offer: rust_decimal::Decimal,
    pub price_date: NaiveDate,
    pub row_number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingStatus {
    Queued,
    Parsing,
    Validating,
    Processing,
    Completed,
    Failed,
    WaitingForApproval,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Pending,
    Passed,
    PassedWithWarnings,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NewEntitiesStatus {
    None,
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowError {
    pub row_number: u64,
    pub field: Option<String>,
    pub error_code: String,
    pub severity: ErrorSeverity,
    pub message: String,
    pub suggested_action: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadBatch {
    pub id: Uuid,
    pub batch_number: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_path: String,
    pub processing_status: ProcessingStatus,
    pub validation_status: ValidationStatus,
    pub total_records: u64,
    pub processed_records: u64,
    pub failed_records: u64,
    pub validation_errors: Vec<RowError>,
    pub validation_warnings: Vec<RowError>,
    pub new_entities_report: Option<serde_json::Value>,
    pub new_entities_status: NewEntitiesStatus,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
    pub uploaded_by: String,
    pub approved_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidFundTransaction {
    pub upload_batch_id: Uuid,
    pub row_number: u64,
    pub raw_data: serde_json::Value,
    pub errors: Vec<RowError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconciliationStatus {
    Unmatched,
    MatchedExact,
    MatchedAmount,
    MatchedSplit,
    MissingInFund,
    ReversalNetted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankUploadBatch {
    pub id: Uuid,
    pub batch_number: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_path: String,
    pub processing_status: ProcessingStatus,
    pub validation_status: ValidationStatus,
    pub total_records: u64,
    pub processed_records: u64,
    pub failed_records: u64,
    pub validation_errors: Vec<RowError>,
    pub validation_warnings: Vec<RowError>,
    pub created_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
    pub uploaded_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankGoalTransaction {
    pub id: Uuid,
    pub bank_upload_batch_id: Uuid,
    pub transaction_id: String,
    pub goal_number: String,
    pub account_number: String,
    pub client_name: String,
    pub transaction_date: NaiveDate,
    pub transaction_type: TransactionType,
    pub total_amount: Money,
    pub fund_percentages: HashMap<FundCode, Percent>,
    pub fund_amounts: HashMap<FundCode, Money>,
    pub reconciliation_status: ReconciliationStatus,
    pub matched_goal_transaction_code: Option<String>,
    pub matching_score: Option<f64>,
    pub review_tag: Option<String>,
    pub row_number: u64,
}

impl BankGoalTransaction {
    /// `sum(per-fund amounts) = totalAmount ± 1`
    pub fn fund_amounts_sum_to_total(&self) -> bool {
        let sum: Money = self
            .fund_amounts
            .values()
            .copied()
            .fold(Money::zero(), |a, b| a + b);
        (sum.raw() - self.total_amount.raw()).abs() <= rust_decimal::Decimal::ONE
    }

    /// `per-fund percentages sum to 1.00 ± 0.01` when any are non-zero.
    pub fn percentages_sum_valid(&self) -> bool {
        let any_nonzero = self.fund_percentages.values().any(|p| !p.value().is_zero());
        if !any_nonzero {
            return true;
        }
        let sum: rust_decimal::Decimal = self.fund_percentages.values().map(|p| p.value()).sum();
        (sum - rust_decimal::Decimal::ONE).abs() <= rust_decimal::Decimal::new(1, 2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarianceType {
    TotalAmountMismatch,
    FundDistributionMismatch,
    DateMismatch,
    MissingInBank,
    MissingInFundSystem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VarianceSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionStatus {
    Open,
    AutoApproved,
    Approved,
    Disputed,
    Investigating,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationVariance {
    pub id: Uuid,
    pub bank_goal_transaction_id: Uuid,
    pub fund_goal_transaction_code: Option<String>,
    pub variance_type: VarianceType,
    pub severity: VarianceSeverity,
    pub amount_delta: Option<Money>,
    pub date_delta_days: Option<i64>,
    pub fund_code: Option<FundCode>,
    pub fund_delta: Option<Money>,
    pub resolution_status: ResolutionStatus,
    pub auto_approved: bool,
    pub reviewer: Option<String>,
    pub notes: Option<String>,
}
