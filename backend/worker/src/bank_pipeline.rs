//! Bank statement pipeline: the `process-bank-upload` job handler
//! (spec.md §4.K), then an immediate best-effort matcher pass (§4.L) over
//! the goals this batch touched, so an operator doesn't have to separately
//! trigger `smartMatch.run` right after every bank upload.

use std::path::PathBuf;
use std::sync::Arc;

use bank::{BankRepository, MasterLookup};
use model::{ErrorSeverity, ProcessingStatus, RowError, ValidationStatus};
use queue::Job;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::AppContext;

fn extract_batch_id(job: &Job) -> anyhow::Result<Uuid> {
    job.payload
        .get("batchId")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| anyhow::anyhow!("job {} payload missing batch_id", job.id))
}

async fn collect_rows(mut rx: tokio::sync::mpsc::Receiver<parser::RowEvent>) -> (Vec<parser::ParsedRow>, Vec<RowError>) {
    let mut rows = Vec::new();
    let mut errors = Vec::new();
    while let Some(event) = rx.recv().await {
        match event {
            parser::RowEvent::Row(row) => rows.push(row),
            parser::RowEvent::Error(e) => errors.push(RowError {
                row_number: e.row_number,
                field: None,
                error_code: "ROW_PARSE_ERROR".to_string(),
                severity: ErrorSeverity::Critical,
                message: e.message,
                suggested_action: None,
                value: None,
            }),
        }
    }
    (rows, errors)
}

pub async fn process_bank_upload(ctx: Arc<AppContext>, job: Job) -> anyhow::Result<()> {
    let batch_id = extract_batch_id(&job)?;
    let batch = ctx.bank_repo.get(batch_id).await?;

    ctx.bank_repo.set_status(batch_id, ProcessingStatus::Parsing).await?;
    let rx = parser::stream_rows(PathBuf::from(&batch.file_path), bank::BANK_HEADER_SPECS)?;
    let (parsed_rows, parse_errors) = collect_rows(rx).await;

    ctx.bank_repo.set_status(batch_id, ProcessingStatus::Validating).await?;

    let mut valid_rows = Vec::with_capacity(parsed_rows.len());
    let mut all_errors = parse_errors;
    for raw in &parsed_rows {
        let (row, errors) = bank::validate_bank_row(raw);
        all_errors.extend(errors);
        if let Some(row) = row {
            valid_rows.push(row);
        }
    }

    let (critical, warnings): (Vec<RowError>, Vec<RowError>) =
        all_errors.into_iter().partition(|e| e.severity == ErrorSeverity::Critical);
    let validation_status = if !critical.is_empty() {
        ValidationStatus::Failed
    } else if !warnings.is_empty() {
        ValidationStatus::PassedWithWarnings
    } else {
        ValidationStatus::Passed
    };

    ctx.bank_repo
        .record_validation_result(
            batch_id,
            (valid_rows.len() + critical.len()) as u64,
            valid_rows.len() as u64,
            critical.len() as u64,
            &critical,
            &warnings,
            validation_status,
        )
        .await?;

    if validation_status == ValidationStatus::Failed {
        ctx.bank_repo.set_status(batch_id, ProcessingStatus::Failed).await?;
        warn!(batch_id = %batch_id, errors = critical.len(), "bank batch failed validation");
        return Ok(());
    }

    ctx.bank_repo.set_status(batch_id, ProcessingStatus::Processing).await?;

    let account_ids_by_number = ctx.bank_repo.account_ids_by_number().await?;
    let goals_by_key = ctx.bank_repo.goals_by_key().await?;
    let lookup = MasterLookup { account_ids_by_number: &account_ids_by_number, goals_by_key: &goals_by_key };

    let linked: Vec<model::BankGoalTransaction> =
        valid_rows.iter().map(|row| bank::link_row(batch_id, row, &lookup)).collect();
    ctx.bank_repo.insert_goal_transactions(&linked).await?;
    ctx.bank_repo.set_status(batch_id, ProcessingStatus::Completed).await?;

    info!(batch_id = %batch_id, rows = linked.len(), "bank batch processing complete");

    if let Some((start, end)) = date_window(&linked) {
        let (_tx, cancel) = watch::channel(false);
        let request = matcher::BatchMatchRequest { start_date: start, end_date: end, batch_size: 500, offset: 0, apply_updates: true };
        match matcher::run_batch(&ctx.match_source, request, &ctx.config, cancel).await {
            Ok(report) => info!(batch_id = %batch_id, processed = report.processed, "post-upload matcher pass complete"),
            Err(e) => warn!(batch_id = %batch_id, error = %e, "post-upload matcher pass failed"),
        }
    }

    Ok(())
}

fn date_window(rows: &[model::BankGoalTransaction]) -> Option<(chrono::NaiveDate, chrono::NaiveDate)> {
    let mut dates = rows.iter().map(|r| r.transaction_date);
    let first = dates.next()?;
    let (min, max) = dates.fold((first, first), |(min, max), d| (min.min(d), max.max(d)));
    Some((min, max))
}
