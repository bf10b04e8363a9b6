//! Job shapes (spec.md §4.I).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobName {
    ProcessNewUpload,
    ResumeAfterApproval,
    ProcessBankUpload,
}

impl JobName {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobName::ProcessNewUpload => "process-new-upload",
            JobName::ResumeAfterApproval => "resume-after-approval",
            JobName::ProcessBankUpload => "process-bank-upload",
        }
    }

    pub fn parse(raw: &str) -> Option<JobName> {
        match raw {
            "process-new-upload" => Some(JobName::ProcessNewUpload),
            "resume-after-approval" => Some(JobName::ResumeAfterApproval),
            "process-bank-upload" => Some(JobName::ProcessBankUpload),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Locked,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub name: JobName,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub locked_by: Option<String>,
    pub locked_until: Option<DateTime<Utc>>,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
