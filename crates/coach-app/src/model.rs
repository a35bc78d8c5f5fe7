// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::ids::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalStatus {
    Active,
    Completed,
    Abandoned,
}

impl GoalStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Completed => "Completed",
            Self::Abandoned => "Abandoned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Active" => Some(Self::Active),
            "Completed" => Some(Self::Completed),
            "Abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskStatus {
    Planned,
    Completed,
    Missed,
}

impl TaskStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "Planned",
            Self::Completed => "Completed",
            Self::Missed => "Missed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Planned" => Some(Self::Planned),
            "Completed" => Some(Self::Completed),
            "Missed" => Some(Self::Missed),
            _ => None,
        }
    }

    /// Maps the action segment of `/task/<id>/<action>`.
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "complete" => Some(Self::Completed),
            "missed" => Some(Self::Missed),
            "reset" => Some(Self::Planned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: OwnerId,
    pub username: String,
    pub preferences: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub id: GoalId,
    pub owner_id: OwnerId,
    pub description: String,
    pub target_date: Option<Date>,
    pub positive_reasons: String,
    pub consequences: String,
    pub status: GoalStatus,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub goal_id: GoalId,
    pub description: String,
    pub due_date: Date,
    pub status: TaskStatus,
    pub completed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// Completed and missed task counts for the current Monday-to-Sunday week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WeeklyProgress {
    pub completed: u32,
    pub missed: u32,
}

impl WeeklyProgress {
    pub const fn is_doing_well(self) -> bool {
        self.completed > self.missed
    }

    pub const fn label(self) -> &'static str {
        if self.is_doing_well() {
            "doing well"
        } else {
            "building consistency"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalSource {
    Ai,
    Template,
}

/// A task suggestion that has not been saved yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProposal {
    pub description: String,
    #[serde(with = "crate::validation::iso_date")]
    pub due_date: Date,
    pub source: ProposalSource,
}

#[cfg(test)]
mod tests {
    use super::{GoalStatus, TaskStatus, WeeklyProgress};

    #[test]
    fn task_status_parse_and_storage_round_trip() {
        for status in [TaskStatus::Planned, TaskStatus::Completed, TaskStatus::Missed] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("planned"), None);
    }

    #[test]
    fn task_actions_map_to_statuses() {
        assert_eq!(TaskStatus::from_action("complete"), Some(TaskStatus::Completed));
        assert_eq!(TaskStatus::from_action("missed"), Some(TaskStatus::Missed));
        assert_eq!(TaskStatus::from_action("reset"), Some(TaskStatus::Planned));
        assert_eq!(TaskStatus::from_action("delete"), None);
    }

    #[test]
    fn goal_status_rejects_unknown_values() {
        assert_eq!(GoalStatus::parse("Active"), Some(GoalStatus::Active));
        assert_eq!(GoalStatus::parse("Archived"), None);
    }

    #[test]
    fn progress_label_requires_strictly_more_completions() {
        let even = WeeklyProgress {
            completed: 2,
            missed: 2,
        };
        assert_eq!(even.label(), "building consistency");

        let ahead = WeeklyProgress {
            completed: 3,
            missed: 1,
        };
        assert_eq!(ahead.label(), "doing well");
    }
}
