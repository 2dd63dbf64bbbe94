//! Scan job state and the immutable snapshots published while it runs.

use super::ports::PortProfile;
use super::range::AddressRange;
use super::record::{DeviceRecord, ResultSink};
use crate::error::{Result, ScanError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of one discovery pass.
///
/// `Pending -> Running -> {Completed | Cancelled}`; a range that fails to
/// parse moves `Pending -> Failed` without ever running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Cancelled,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Cancelled | JobState::Completed | JobState::Failed)
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Running)
                | (JobState::Pending, JobState::Failed)
                | (JobState::Running, JobState::Completed)
                | (JobState::Running, JobState::Cancelled)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Cancelled => write!(f, "cancelled"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// Mutable state of one discovery pass, owned by the scan worker.
#[derive(Debug, Clone)]
pub struct ScanJob {
    id: Uuid,
    input: String,
    profile: PortProfile,
    range: Option<AddressRange>,
    progress: u64,
    state: JobState,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl ScanJob {
    pub fn new(input: impl Into<String>, profile: PortProfile) -> Self {
        Self {
            id: Uuid::new_v4(),
            input: input.into(),
            profile,
            range: None,
            progress: 0,
            state: JobState::Pending,
            started_at: None,
            finished_at: None,
        }
    }

    /// Validate the range and enter `Running`. A parse failure leaves the job `Failed`.
    pub fn start(&mut self) -> Result<AddressRange> {
        self.ensure_transition(JobState::Running)?;

        match AddressRange::parse(&self.input) {
            Ok(range) => {
                self.range = Some(range);
                self.state = JobState::Running;
                self.started_at = Some(Utc::now());
                Ok(range)
            }
            Err(e) => {
                self.state = JobState::Failed;
                self.finished_at = Some(Utc::now());
                Err(e)
            }
        }
    }

    /// Count one more address as done.
    pub fn advance(&mut self) {
        self.progress += 1;
    }

    pub fn complete(&mut self) -> Result<()> {
        self.finish(JobState::Completed)
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.finish(JobState::Cancelled)
    }

    fn finish(&mut self, state: JobState) -> Result<()> {
        self.ensure_transition(state)?;
        self.state = state;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn ensure_transition(&self, next: JobState) -> Result<()> {
        if self.state.can_transition_to(next) {
            Ok(())
        } else {
            Err(ScanError::InvalidTransition {
                from: self.state,
                to: next,
            })
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn profile(&self) -> &PortProfile {
        &self.profile
    }

    pub fn range(&self) -> Option<AddressRange> {
        self.range
    }

    pub fn progress(&self) -> u64 {
        self.progress
    }

    /// Address count, or 0 before the range is parsed.
    pub fn total(&self) -> u64 {
        self.range.map(|r| r.len()).unwrap_or(0)
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }
}

/// A complete, self-consistent view of a scan at one point in time.
///
/// This is what subscribers receive and what the durable store holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    pub job_id: Uuid,
    pub range: String,
    pub profile: String,
    pub state: JobState,
    pub progress: u64,
    pub total: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub records: Vec<DeviceRecord>,
}

impl ScanSnapshot {
    pub fn capture(job: &ScanJob, sink: &ResultSink) -> Self {
        Self {
            job_id: job.id(),
            range: job.input().to_string(),
            profile: job.profile().name().to_string(),
            state: job.state(),
            progress: job.progress(),
            total: job.total(),
            started_at: job.started_at(),
            finished_at: job.finished_at(),
            updated_at: Utc::now(),
            records: sink.records().to_vec(),
        }
    }

    /// Percentage of addresses processed (0-100).
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return if self.state == JobState::Completed { 100 } else { 0 };
        }
        ((self.progress.min(self.total) * 100) / self.total) as u8
    }

    pub fn reachable_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_reachable()).count()
    }
}
