use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    ToSheets,
    FromSheets,
    Bidirectional,
}

impl SyncDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::ToSheets => "to_sheets",
            SyncDirection::FromSheets => "from_sheets",
            SyncDirection::Bidirectional => "bidirectional",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "to_sheets" => Some(SyncDirection::ToSheets),
            "from_sheets" => Some(SyncDirection::FromSheets),
            "bidirectional" => Some(SyncDirection::Bidirectional),
            _ => None,
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Idle → Running → {Succeeded, Failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Running => "running",
            SyncStatus::Succeeded => "succeeded",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "idle" => Some(SyncStatus::Idle),
            "running" => Some(SyncStatus::Running),
            "succeeded" => Some(SyncStatus::Succeeded),
            "failed" => Some(SyncStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SyncCounts {
    pub store_created: usize,
    pub store_updated: usize,
    pub sheet_appended: usize,
    pub sheet_updated: usize,
}

impl SyncCounts {
    pub fn total(&self) -> usize {
        self.store_created + self.store_updated + self.sheet_appended + self.sheet_updated
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SyncErrorDetail {
    pub kind: String,
    pub message: String,
}

/// Outcome of the most recent synchronization attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SyncState {
    pub status: SyncStatus,
    pub direction: Option<SyncDirection>,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub records_affected: usize,
    pub counts: SyncCounts,
    pub error: Option<SyncErrorDetail>,
}

impl SyncState {
    pub fn idle() -> Self {
        SyncState {
            status: SyncStatus::Idle,
            direction: None,
            started_at: None,
            finished_at: None,
            records_affected: 0,
            counts: SyncCounts::default(),
            error: None,
        }
    }

    pub fn running(direction: SyncDirection, started_at: i64) -> Self {
        SyncState {
            status: SyncStatus::Running,
            direction: Some(direction),
            started_at: Some(started_at),
            ..SyncState::idle()
        }
    }

    pub fn succeed(mut self, counts: SyncCounts, finished_at: i64) -> Self {
        self.status = SyncStatus::Succeeded;
        self.finished_at = Some(finished_at);
        self.records_affected = counts.total();
        self.counts = counts;
        self
    }

    pub fn fail(mut self, counts: SyncCounts, error: SyncErrorDetail, finished_at: i64) -> Self {
        self.status = SyncStatus::Failed;
        self.finished_at = Some(finished_at);
        self.records_affected = counts.total();
        self.counts = counts;
        self.error = Some(error);
        self
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, SyncStatus::Succeeded | SyncStatus::Failed)
    }
}

/// Row of the durable sync audit trail.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SyncLogEntry {
    pub id: i64,
    pub direction: SyncDirection,
    pub status: SyncStatus,
    pub started_at: i64,
    pub finished_at: i64,
    pub records_affected: usize,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}
