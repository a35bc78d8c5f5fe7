// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use time::Date;
use time::macros::format_description;

/// The parts of a goal a prompt needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoalBrief<'a> {
    pub description: &'a str,
    pub positive_reasons: &'a str,
    pub consequences: &'a str,
    pub target_date: Option<Date>,
}

/// Completed and missed counts for the current week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressBrief {
    pub completed: u32,
    pub missed: u32,
}

impl ProgressBrief {
    pub const fn is_ahead(self) -> bool {
        self.completed > self.missed
    }
}

pub const WEEKLY_GOAL_COUNT: usize = 3;

pub fn build_weekly_goals_prompt(last_week: &str, today: Date) -> String {
    let mut out = String::new();
    out.push_str("You are a personal goal coach.\n");
    out.push_str(&format!("Today is {}.\n\n", format_human_date(today)));
    out.push_str("## Goals from last week\n\n");
    out.push_str(last_week.trim());
    out.push_str("\n\n## Instructions\n\n");
    out.push_str(&format!(
        "Propose exactly {WEEKLY_GOAL_COUNT} SMART goals for the coming week that build on last week's goals.\n"
    ));
    out.push_str("Each goal must be specific, measurable, achievable, relevant and time-bound.\n");
    out.push_str(
        "Reply with the goals on a single line separated by commas. Do not use commas inside a goal.\n",
    );
    out.push_str("Do not number the goals or add any other text.\n");
    out
}

pub fn build_task_prompt(
    goal: &GoalBrief<'_>,
    progress: ProgressBrief,
    due_date: Date,
    today: Date,
) -> String {
    let mut out = String::new();
    out.push_str("You are a personal goal coach.\n");
    out.push_str(&format!("Today is {}.\n\n", format_human_date(today)));
    push_goal(&mut out, goal);
    push_progress(&mut out, progress);
    out.push_str("\n## Instructions\n\n");
    out.push_str(&format!(
        "Suggest exactly one concrete, actionable task to do on {}.\n",
        format_human_date(due_date)
    ));
    if progress.is_ahead() {
        out.push_str("The user is doing well this week, so make the task a little more ambitious.\n");
    } else {
        out.push_str(
            "The user is building consistency, so keep the task modest and easy to finish.\n",
        );
    }
    out.push_str("Reply with the task description only, in one sentence.\n");
    out
}

pub fn build_encouragement_prompt(
    goal: &GoalBrief<'_>,
    progress: ProgressBrief,
    today: Date,
) -> String {
    let mut out = String::new();
    out.push_str("You are a warm, honest personal goal coach.\n");
    out.push_str(&format!("Today is {}.\n\n", format_human_date(today)));
    push_goal(&mut out, goal);
    push_progress(&mut out, progress);
    out.push_str("\n## Instructions\n\n");
    out.push_str("Write two or three sentences of encouragement for this goal.\n");
    out.push_str("Refer to the user's own reasons and acknowledge this week's progress.\n");
    out.push_str("Do not invent facts that are not listed above.\n");
    out
}

fn push_goal(out: &mut String, goal: &GoalBrief<'_>) {
    out.push_str("## Goal\n\n");
    out.push_str(&format!("- Description: {}\n", goal.description.trim()));
    out.push_str(&format!("- Why it matters: {}\n", goal.positive_reasons.trim()));
    out.push_str(&format!(
        "- What happens if it is skipped: {}\n",
        goal.consequences.trim()
    ));
    if let Some(target) = goal.target_date {
        out.push_str(&format!("- Target date: {}\n", format_human_date(target)));
    }
}

fn push_progress(out: &mut String, progress: ProgressBrief) {
    out.push_str("\n## This week\n\n");
    out.push_str(&format!(
        "- Tasks completed: {}\n- Tasks missed: {}\n",
        progress.completed, progress.missed
    ));
}

fn format_human_date(date: Date) -> String {
    date.format(&format_description!(
        "[weekday repr:long], [month repr:long] [day padding:none], [year]"
    ))
    .unwrap_or_else(|_| date.to_string())
}

#[cfg(test)]
mod tests {
    use super::{
        GoalBrief, ProgressBrief, build_encouragement_prompt, build_task_prompt,
        build_weekly_goals_prompt,
    };
    use time::{Date, Month};

    fn wednesday() -> Date {
        Date::from_calendar_date(2026, Month::October, 14).expect("valid date")
    }

    fn goal() -> GoalBrief<'static> {
        GoalBrief {
            description: "Run a 10k",
            positive_reasons: "more energy",
            consequences: "stay winded on stairs",
            target_date: None,
        }
    }

    #[test]
    fn weekly_prompt_asks_for_three_comma_separated_goals() {
        let prompt = build_weekly_goals_prompt("Read daily; Sleep by 11", wednesday());
        assert!(prompt.contains("Wednesday, October 14, 2026"));
        assert!(prompt.contains("Read daily; Sleep by 11"));
        assert!(prompt.contains("exactly 3 SMART goals"));
        assert!(prompt.contains("separated by commas"));
    }

    #[test]
    fn task_prompt_calibrates_to_progress() {
        let ahead = build_task_prompt(
            &goal(),
            ProgressBrief {
                completed: 3,
                missed: 1,
            },
            wednesday(),
            wednesday(),
        );
        assert!(ahead.contains("more ambitious"));
        assert!(ahead.contains("Tasks completed: 3"));
        assert!(ahead.contains("more energy"));

        let even = build_task_prompt(
            &goal(),
            ProgressBrief {
                completed: 1,
                missed: 1,
            },
            wednesday(),
            wednesday(),
        );
        assert!(even.contains("keep the task modest"));
    }

    #[test]
    fn encouragement_prompt_lists_target_date_when_set() {
        let brief = GoalBrief {
            target_date: Some(Date::from_calendar_date(2026, Month::December, 1).expect("valid")),
            ..goal()
        };
        let prompt = build_encouragement_prompt(&brief, ProgressBrief::default(), wednesday());
        assert!(prompt.contains("Target date: Tuesday, December 1, 2026"));
        assert!(prompt.contains("stay winded on stairs"));
    }
}
