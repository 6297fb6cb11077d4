//! Case and task data model.
//!
//! A case is a simulation run configuration owned by the remote service. It
//! carries two independent tasks: the one that creates (builds) the case and
//! the one that runs it. Status strings the client does not know about are
//! kept verbatim so comparisons against fresh snapshots stay exact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub u64);

impl std::fmt::Display for CaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CaseId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Lifecycle status of a case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CaseStatus {
    Configured,
    Submitted,
    Building,
    Built,
    Other(String),
}

impl CaseStatus {
    pub fn as_str(&self) -> &str {
        match self {
            CaseStatus::Configured => "CONFIGURED",
            CaseStatus::Submitted => "SUBMITTED",
            CaseStatus::Building => "BUILDING",
            CaseStatus::Built => "BUILT",
            CaseStatus::Other(s) => s,
        }
    }

    /// Statuses in which the run task is the one that matters.
    pub fn awaits_run(&self) -> bool {
        matches!(self, CaseStatus::Building | CaseStatus::Built)
    }
}

impl From<String> for CaseStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "CONFIGURED" => CaseStatus::Configured,
            "SUBMITTED" => CaseStatus::Submitted,
            "BUILDING" => CaseStatus::Building,
            "BUILT" => CaseStatus::Built,
            _ => CaseStatus::Other(s),
        }
    }
}

impl From<CaseStatus> for String {
    fn from(status: CaseStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a background task on the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Pending,
    Started,
    Success,
    Failure,
    Revoked,
    Other(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Started => "STARTED",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failure => "FAILURE",
            TaskStatus::Revoked => "REVOKED",
            TaskStatus::Other(s) => s,
        }
    }

    /// Terminal tasks never change again until a new run is triggered.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failure | TaskStatus::Revoked
        )
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PENDING" => TaskStatus::Pending,
            "STARTED" => TaskStatus::Started,
            "SUCCESS" => TaskStatus::Success,
            "FAILURE" => TaskStatus::Failure,
            "REVOKED" => TaskStatus::Revoked,
            _ => TaskStatus::Other(s),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    pub fn with_status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            error: None,
        }
    }

    /// An unset status counts as not terminal.
    pub fn is_terminal(&self) -> bool {
        self.status.as_ref().is_some_and(TaskStatus::is_terminal)
    }

    pub fn label(&self) -> &str {
        self.status.as_ref().map(TaskStatus::as_str).unwrap_or("-")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    #[serde(default)]
    pub name: Option<String>,
    pub status: CaseStatus,
    #[serde(default)]
    pub create_task: Task,
    #[serde(default)]
    pub run_task: Task,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub res: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compset: Option<String>,
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
}

/// The three fields whose change means the view must be updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedFields {
    pub status: CaseStatus,
    pub create_status: Option<TaskStatus>,
    pub run_status: Option<TaskStatus>,
}

impl Case {
    pub fn new(id: CaseId, status: CaseStatus) -> Self {
        Self {
            id,
            name: None,
            status,
            create_task: Task::default(),
            run_task: Task::default(),
            create_task_id: None,
            date_created: None,
            res: None,
            compset: None,
            variables: serde_json::Map::new(),
        }
    }

    pub fn watched(&self) -> WatchedFields {
        WatchedFields {
            status: self.status.clone(),
            create_status: self.create_task.status.clone(),
            run_status: self.run_task.status.clone(),
        }
    }

    /// Settled cases have nothing left to wait for, so polling may stop.
    pub fn is_settled(&self) -> bool {
        self.create_task.is_terminal() && (!self.status.awaits_run() || self.run_task.is_terminal())
    }

    pub fn is_unsettled(&self) -> bool {
        !self.is_settled()
    }

    pub fn can_run(&self) -> bool {
        matches!(self.status, CaseStatus::Configured | CaseStatus::Submitted)
    }

    /// Results are offered after a successful run, and for submitted cases.
    pub fn can_download(&self) -> bool {
        self.run_task.status == Some(TaskStatus::Success) || self.status == CaseStatus::Submitted
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().filter(|n| !n.is_empty()).unwrap_or("-")
    }
}

/// Free function form of [`Case::is_unsettled`], the poller's activation predicate.
pub fn is_unsettled(case: &Case) -> bool {
    case.is_unsettled()
}

/// Request body for creating a case on a site.
#[derive(Debug, Clone, Serialize)]
pub struct NewCase {
    pub site: String,
    pub name: String,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub variables: serde_json::Map<String, serde_json::Value>,
}

/// Request body for editing a case. Unset fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CaseUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Map<String, serde_json::Value>>,
}

impl CaseUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.variables.is_none()
    }
}

#[cfg(test)]
pub(crate) fn case_with(
    id: u64,
    status: &str,
    create: Option<&str>,
    run: Option<&str>,
) -> Case {
    let mut case = Case::new(CaseId(id), CaseStatus::from(status.to_string()));
    case.create_task.status = create.map(|s| TaskStatus::from(s.to_string()));
    case.run_task.status = run.map(|s| TaskStatus::from(s.to_string()));
    case
}
