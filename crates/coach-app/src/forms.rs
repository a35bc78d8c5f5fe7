// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use time::Date;

use crate::validation::{parse_optional_date, parse_required_date};
use crate::{CoachError, CoachResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalFormInput {
    pub description: String,
    pub target_date: Option<Date>,
    pub positive_reasons: String,
    pub consequences: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFormInput {
    pub description: String,
    pub due_date: Date,
}

impl GoalFormInput {
    /// Builds a goal from raw form fields; a blank target date means none.
    pub fn parse(
        description: &str,
        target_date: &str,
        positive_reasons: &str,
        consequences: &str,
    ) -> CoachResult<Self> {
        let input = Self {
            description: description.trim().to_owned(),
            target_date: None,
            positive_reasons: positive_reasons.trim().to_owned(),
            consequences: consequences.trim().to_owned(),
        };
        input.validate()?;
        Ok(Self {
            target_date: parse_optional_date("target date", target_date)?,
            ..input
        })
    }

    pub fn validate(&self) -> CoachResult<()> {
        if self.description.trim().is_empty() {
            return Err(CoachError::validation(
                "goal description is required -- describe the goal and retry",
            ));
        }
        if self.positive_reasons.trim().is_empty() {
            return Err(CoachError::validation(
                "positive reasons are required -- say why this goal matters",
            ));
        }
        if self.consequences.trim().is_empty() {
            return Err(CoachError::validation(
                "consequences of inaction are required -- say what happens if you skip it",
            ));
        }
        Ok(())
    }
}

impl TaskFormInput {
    pub fn parse(description: &str, due_date: &str) -> CoachResult<Self> {
        let input = Self {
            description: description.trim().to_owned(),
            due_date: parse_required_date("task due date", due_date)?,
        };
        input.validate()?;
        Ok(input)
    }

    pub fn validate(&self) -> CoachResult<()> {
        if self.description.trim().is_empty() {
            return Err(CoachError::validation(
                "task description is required -- describe the task and retry",
            ));
        }
        Ok(())
    }
}
