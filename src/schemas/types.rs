use serde::{Deserialize, Serialize};

/// Coarse lifecycle of one exam attempt. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptStatus {
    NotStarted,
    InProgress,
    Submitting,
    Submitted,
}

impl AttemptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::NotStarted => "not-started",
            AttemptStatus::InProgress => "in-progress",
            AttemptStatus::Submitting => "submitting",
            AttemptStatus::Submitted => "submitted",
        }
    }

    fn rank(self) -> u8 {
        match self {
            AttemptStatus::NotStarted => 0,
            AttemptStatus::InProgress => 1,
            AttemptStatus::Submitting => 2,
            AttemptStatus::Submitted => 3,
        }
    }

    pub fn can_advance_to(self, next: AttemptStatus) -> bool {
        next.rank() >= self.rank()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptStatus::Submitted)
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one subject-exam inside a contest, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContestExamStatus {
    Locked,
    Ready,
    Ongoing,
    Completed,
}

impl ContestExamStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ContestExamStatus::Locked => "locked",
            ContestExamStatus::Ready => "ready",
            ContestExamStatus::Ongoing => "ongoing",
            ContestExamStatus::Completed => "completed",
        }
    }

    pub(crate) fn rank(self) -> u8 {
        match self {
            ContestExamStatus::Locked => 0,
            ContestExamStatus::Ready => 1,
            ContestExamStatus::Ongoing => 2,
            ContestExamStatus::Completed => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    Manual,
    TimerExpired,
}

impl SubmitTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmitTrigger::Manual => "manual",
            SubmitTrigger::TimerExpired => "timer_expired",
        }
    }
}
