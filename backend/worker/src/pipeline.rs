//! Fund upload pipeline: the `process-new-upload` and
//! `resume-after-approval` job handlers (spec.md §4.B-§4.J), driving
//! parse -> validate -> detect -> (pause for approval, or) create ->
//! write -> refresh.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use batch::BatchRepository;
use model::{ErrorSeverity, Money, ProcessingStatus, RowError, ValidationStatus};
use queue::Job;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::AppContext;

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

fn extract_batch_id(job: &Job) -> anyhow::Result<Uuid> {
    job.payload
        .get("batchId")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| anyhow::anyhow!("job {} payload missing batch_id", job.id))
}

fn extract_resume_payload(job: &Job) -> anyhow::Result<(Uuid, bool, String)> {
    let batch_id = extract_batch_id(job)?;
    let approved = job.payload.get("approved").and_then(|v| v.as_bool()).unwrap_or(false);
    let actor = job.payload.get("actor").and_then(|v| v.as_str()).unwrap_or("operator").to_string();
    Ok((batch_id, approved, actor))
}

async fn parse_and_validate(
    ctx: &AppContext,
    file_path: &str,
) -> anyhow::Result<(Vec<validate::FundRow>, Vec<RowError>, Vec<RowError>)> {
    let rx = parser::stream_rows(PathBuf::from(file_path), validate::FUND_HEADER_SPECS)?;
    let (parsed_rows, parse_errors) = collect_rows(rx).await;

    let existing_goals = ctx.fund_repo.existing_goals_by_key().await?;
    let today = chrono::Utc::now().date_naive();
    let (valid_rows, validation_errors) = validate::validate_batch(parsed_rows, &ctx.config, today, &existing_goals);

    Ok((valid_rows, parse_errors, validation_errors))
}

async fn create_new_entities(
    ctx: &AppContext,
    rows: &[validate::FundRow],
    report: &entities::NewEntitiesReport,
) -> anyhow::Result<()> {
    for goal_summary in &report.new_goals {
        let Some((account_number, goal_number)) = goal_summary.key.split_once('|') else {
            continue;
        };
        let Some(sample) = rows.iter().find(|r| r.account_number == account_number && r.goal_number == goal_number) else {
            warn!(key = %goal_summary.key, "new-goal summary has no matching row on resume, skipping");
            continue;
        };
        entities::ensure_client_account_goal(
            &ctx.entity_repo,
            &sample.client_name,
            &sample.account_number,
            sample.account_type,
            sample.account_category,
            sample.sponsor_code.as_deref(),
            &sample.goal_number,
            &sample.goal_title,
            goal_summary.fund_distribution.clone(),
        )
        .await?;
    }
    Ok(())
}

async fn resolve_and_write(ctx: &AppContext, batch_id: Uuid, valid_rows: &[validate::FundRow]) -> anyhow::Result<()> {
    let lookup = ctx.fund_repo.entity_lookup().await?;
    let (resolved, unresolved) = batch::resolve_transactions(valid_rows, batch_id, &lookup);
    if !unresolved.is_empty() {
        warn!(batch_id = %batch_id, unresolved = unresolved.len(), "rows skipped: entities still unresolved after approval");
    }

    let written = batch::write_all(&ctx.batch_repo, &resolved, batch_id, ctx.config.batch.write_chunk_size).await?;
    let total_amount = resolved.iter().fold(Money::zero(), |acc, t| acc + t.amount);
    ctx.fund_repo.record_total_amount(batch_id, total_amount).await?;

    let manager = batch::BatchManager::new(&ctx.batch_repo, Duration::from_secs(ctx.config.batch.rollback_timeout_seconds));
    manager.transition(batch_id, ProcessingStatus::Completed).await?;
    ctx.refresh_aggregates().await?;

    info!(batch_id = %batch_id, written, "fund batch processing complete");
    Ok(())
}

pub async fn process_new_upload(ctx: Arc<AppContext>, job: Job) -> anyhow::Result<()> {
    let batch_id = extract_batch_id(&job)?;
    let manager = batch::BatchManager::new(&ctx.batch_repo, Duration::from_secs(ctx.config.batch.rollback_timeout_seconds));
    let batch = ctx.batch_repo.get(batch_id).await?;

    manager.transition(batch_id, ProcessingStatus::Parsing).await?;
    let rx = parser::stream_rows(PathBuf::from(&batch.file_path), validate::FUND_HEADER_SPECS)?;
    let (parsed_rows, parse_errors) = collect_rows(rx).await;

    manager.transition(batch_id, ProcessingStatus::Validating).await?;
    let existing_goals = ctx.fund_repo.existing_goals_by_key().await?;
    let today = chrono::Utc::now().date_naive();
    let (valid_rows, validation_errors) = validate::validate_batch(parsed_rows, &ctx.config, today, &existing_goals);

    let mut all_errors = parse_errors;
    all_errors.extend(validation_errors);
    let (critical, warnings): (Vec<RowError>, Vec<RowError>) =
        all_errors.into_iter().partition(|e| e.severity == ErrorSeverity::Critical);

    let validation_status = if !critical.is_empty() {
        ValidationStatus::Failed
    } else if !warnings.is_empty() {
        ValidationStatus::PassedWithWarnings
    } else {
        ValidationStatus::Passed
    };

    ctx.fund_repo
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
        manager.transition(batch_id, ProcessingStatus::Failed).await?;
        warn!(batch_id = %batch_id, errors = critical.len(), "fund batch failed validation");
        return Ok(());
    }

    let known = ctx.fund_repo.known_entities().await?;
    let report = entities::detect_new_entities(&valid_rows, &known);

    if report.is_empty() {
        ctx.fund_repo.record_new_entities(batch_id, None, model::NewEntitiesStatus::None).await?;
        manager.transition(batch_id, ProcessingStatus::Processing).await?;
        resolve_and_write(&ctx, batch_id, &valid_rows).await?;
    } else {
        let report_json = serde_json::to_value(&report)?;
        ctx.fund_repo.record_new_entities(batch_id, Some(report_json), model::NewEntitiesStatus::Pending).await?;
        manager.transition(batch_id, ProcessingStatus::WaitingForApproval).await?;
        info!(batch_id = %batch_id, "fund batch waiting for new-entity approval");
    }

    Ok(())
}

/// The file is re-parsed and re-validated here rather than carrying the
/// first pass's rows across jobs: `NewGoalSummary` only keeps the
/// aggregated fund distribution, not the per-row account type, category,
/// sponsor code, or goal title that entity creation still needs.
pub async fn resume_after_approval(ctx: Arc<AppContext>, job: Job) -> anyhow::Result<()> {
    let (batch_id, approved, actor) = extract_resume_payload(&job)?;
    ctx.fund_repo.record_approval(batch_id, &actor, approved).await?;

    let manager = batch::BatchManager::new(&ctx.batch_repo, Duration::from_secs(ctx.config.batch.rollback_timeout_seconds));

    if !approved {
        manager.resume_after_approval(batch_id, false).await?;
        info!(batch_id = %batch_id, actor, "fund batch new entities rejected, marked failed");
        return Ok(());
    }

    manager.resume_after_approval(batch_id, true).await?;

    let batch = ctx.batch_repo.get(batch_id).await?;
    let (valid_rows, _parse_errors, _validation_errors) = parse_and_validate(&ctx, &batch.file_path).await?;

    let known = ctx.fund_repo.known_entities().await?;
    let report = entities::detect_new_entities(&valid_rows, &known);
    create_new_entities(&ctx, &valid_rows, &report).await?;

    resolve_and_write(&ctx, batch_id, &valid_rows).await?;
    Ok(())
}
