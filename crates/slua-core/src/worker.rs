use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Canonical liveness states for a worker. `Other` carries the uppercase
/// passthrough of a roster status outside the canonical vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WorkerStatus {
    Working,
    Waiting,
    Finished,
    Error,
    Sleeping,
    Unreachable,
    Creating,
    Destroying,
    Other(String),
}

impl WorkerStatus {
    pub fn as_str(&self) -> &str {
        match self {
            WorkerStatus::Working => "WORKING",
            WorkerStatus::Waiting => "WAITING",
            WorkerStatus::Finished => "FINISHED",
            WorkerStatus::Error => "ERROR",
            WorkerStatus::Sleeping => "SLEEPING",
            WorkerStatus::Unreachable => "UNREACHABLE",
            WorkerStatus::Creating => "CREATING",
            WorkerStatus::Destroying => "DESTROYING",
            WorkerStatus::Other(s) => s.as_str(),
        }
    }

    /// States that should interrupt the operator.
    pub fn is_attention(&self) -> bool {
        matches!(self, WorkerStatus::Waiting | WorkerStatus::Error)
    }

    /// Whether the poller should probe a worker the roster reports in this
    /// state. Raw `RUNNING`/`STARTED` passthroughs are accepted alongside the
    /// normalized form.
    pub fn is_probeable(&self) -> bool {
        match self {
            WorkerStatus::Working => true,
            WorkerStatus::Other(s) => s == "RUNNING" || s == "STARTED",
            _ => false,
        }
    }

    fn from_canonical(s: &str) -> Option<Self> {
        match s {
            "WORKING" => Some(WorkerStatus::Working),
            "WAITING" => Some(WorkerStatus::Waiting),
            "FINISHED" => Some(WorkerStatus::Finished),
            "ERROR" => Some(WorkerStatus::Error),
            "SLEEPING" => Some(WorkerStatus::Sleeping),
            "UNREACHABLE" => Some(WorkerStatus::Unreachable),
            "CREATING" => Some(WorkerStatus::Creating),
            "DESTROYING" => Some(WorkerStatus::Destroying),
            _ => None,
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerStatus {
    type Err = String;

    /// Accepts only the canonical state names (used to validate config).
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_uppercase();
        WorkerStatus::from_canonical(&normalized)
            .ok_or_else(|| format!("unknown worker state: {input}"))
    }
}

impl Serialize for WorkerStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for WorkerStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(WorkerStatus::from_canonical(&s).unwrap_or(WorkerStatus::Other(s)))
    }
}

/// Maps a status string reported by the worker source to the canonical
/// vocabulary. Unknown values pass through uppercased.
pub fn normalize_status(raw: &str) -> WorkerStatus {
    match raw.to_lowercase().as_str() {
        "running" | "started" => WorkerStatus::Working,
        "stopped" | "suspended" | "sleeping" => WorkerStatus::Sleeping,
        "destroyed" | "destroying" => WorkerStatus::Destroying,
        "creating" => WorkerStatus::Creating,
        "" => WorkerStatus::Sleeping,
        _ => WorkerStatus::Other(raw.to_uppercase()),
    }
}

/// A remote worker instance as reported by the worker source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub name: String,
    pub status: WorkerStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub region: String,
}

impl Worker {
    pub fn uptime(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let created = self.created_at?;
        Some(now.signed_duration_since(created).max(chrono::Duration::zero()))
    }

    /// Human-readable uptime like "2h 15m"; "—" when creation time is unknown.
    pub fn format_uptime(&self, now: DateTime<Utc>) -> String {
        let Some(uptime) = self.uptime(now) else {
            return "—".to_string();
        };
        let hours = uptime.num_hours();
        let minutes = uptime.num_minutes() % 60;
        if hours > 0 {
            format!("{hours}h {minutes:02}m")
        } else {
            format!("{minutes}m")
        }
    }
}
