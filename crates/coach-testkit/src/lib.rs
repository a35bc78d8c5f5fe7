// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use coach_app::{GoalFormInput, TaskFormInput};
use coach_llm::{Generation, GenerationFailure, TextGenerator};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::PathBuf;
use time::macros::time;
use time::{Date, Month, OffsetDateTime};

/// A [`TextGenerator`] that replays canned answers and records every prompt.
///
/// Once the script runs out, further calls answer
/// [`GenerationFailure::Empty`].
#[derive(Debug)]
pub struct ScriptedGenerator {
    configured: bool,
    replies: RefCell<VecDeque<Generation>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Generation>,
    {
        Self {
            configured: true,
            replies: RefCell::new(replies.into_iter().collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new([Generation::Text(text.to_owned())])
    }

    pub fn failing(failure: GenerationFailure) -> Self {
        Self::new([Generation::Unavailable(failure)])
    }

    /// Behaves like a generator with no credential.
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new(Vec::<Generation>::new())
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.borrow().len()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn generate(&self, prompt: &str) -> Generation {
        self.prompts.borrow_mut().push(prompt.to_owned());
        if !self.configured {
            return Generation::Unavailable(GenerationFailure::NotConfigured);
        }
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or(Generation::Unavailable(GenerationFailure::Empty))
    }
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("coach.db");
    Ok((dir, db_path))
}

/// October 2026 has Monday the 12th through Sunday the 18th.
pub fn monday() -> Date {
    october(12)
}

pub fn wednesday() -> Date {
    october(14)
}

pub fn sunday() -> Date {
    october(18)
}

pub fn fixture_now() -> OffsetDateTime {
    wednesday().with_time(time!(12:00)).assume_utc()
}

pub fn goal_input(description: &str) -> GoalFormInput {
    GoalFormInput {
        description: description.to_owned(),
        target_date: None,
        positive_reasons: format!("{description} makes the week better"),
        consequences: format!("skipping {description} means falling behind"),
    }
}

pub fn task_input(description: &str, due_date: Date) -> TaskFormInput {
    TaskFormInput {
        description: description.to_owned(),
        due_date,
    }
}

fn october(day: u8) -> Date {
    Date::from_calendar_date(2026, Month::October, day).expect("valid October 2026 date")
}
