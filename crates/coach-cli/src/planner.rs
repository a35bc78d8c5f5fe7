// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use coach_app::calendar::Horizon;
use coach_app::{
    CoachError, CoachResult, Goal, GoalFormInput, GoalId, OwnerId, ProposalSource, TaskFormInput,
    TaskId, TaskProposal, WeeklyProgress,
};
use coach_db::Store;
use coach_llm::prompts::{
    GoalBrief, ProgressBrief, build_encouragement_prompt, build_task_prompt,
    build_weekly_goals_prompt,
};
use coach_llm::{Generation, GenerationFailure, TextGenerator, is_unavailable_text};
use time::Date;
use tracing::{info, warn};

/// Used when there is nothing from last week to build on.
pub const GENERIC_WEEKLY_GOALS: [&str; 5] = [
    "Exercise for 30 minutes on at least 4 days this week",
    "Read 20 pages of a book every day this week",
    "Drink 8 glasses of water every day for the next 7 days",
    "Spend 15 minutes each evening planning the next day",
    "Get at least 7 hours of sleep on 5 nights this week",
];

pub const GENERATED_GOAL_REASONS: &str =
    "Suggested during weekly planning to keep your momentum going.";
pub const GENERATED_GOAL_CONSEQUENCES: &str =
    "Without a plan for the week, progress tends to stall.";

/// Picks the goal descriptions for a weekly batch without saving them.
pub fn weekly_goal_descriptions(
    generator: &dyn TextGenerator,
    last_week: Option<&str>,
    today: Date,
) -> CoachResult<Vec<String>> {
    let Some(context) = last_week.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(GENERIC_WEEKLY_GOALS
            .iter()
            .map(|goal| (*goal).to_owned())
            .collect());
    };

    let prompt = build_weekly_goals_prompt(context, today);
    let text = usable_text(generator.generate(&prompt)).map_err(|failure| {
        CoachError::generation(format!("could not generate new goals: {failure}"))
    })?;

    let descriptions = split_goal_list(&text);
    if descriptions.is_empty() {
        return Err(CoachError::generation(
            "the AI reply contained no usable goals -- try again or add goals by hand",
        ));
    }
    Ok(descriptions)
}

/// Saves a weekly batch of goals, all or nothing.
pub fn generate_weekly_goals(
    store: &Store,
    owner: OwnerId,
    generator: &dyn TextGenerator,
    last_week: Option<&str>,
    today: Date,
) -> CoachResult<Vec<GoalId>> {
    let descriptions = weekly_goal_descriptions(generator, last_week, today)?;
    let inputs: Vec<GoalFormInput> = descriptions
        .into_iter()
        .map(|description| GoalFormInput {
            description,
            target_date: None,
            positive_reasons: GENERATED_GOAL_REASONS.to_owned(),
            consequences: GENERATED_GOAL_CONSEQUENCES.to_owned(),
        })
        .collect();

    let ids = store.create_goals(owner, &inputs)?;
    info!(count = ids.len(), "weekly goals generated");
    Ok(ids)
}

pub fn split_goal_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Suggests one task for `due_date`. Falls back to a template whenever the
/// generator has nothing usable; never saves.
pub fn propose_task(
    generator: &dyn TextGenerator,
    goal: &Goal,
    progress: WeeklyProgress,
    due_date: Date,
    today: Date,
) -> TaskProposal {
    if generator.is_configured() {
        let prompt = build_task_prompt(&brief(goal), progress_brief(progress), due_date, today);
        match usable_text(generator.generate(&prompt)) {
            Ok(description) => {
                return TaskProposal {
                    description,
                    due_date,
                    source: ProposalSource::Ai,
                };
            }
            Err(failure) => {
                warn!(goal_id = goal.id.get(), %failure, "using template task instead of ai suggestion");
            }
        }
    }

    TaskProposal {
        description: template_task_description(goal, progress),
        due_date,
        source: ProposalSource::Template,
    }
}

pub fn template_task_description(goal: &Goal, progress: WeeklyProgress) -> String {
    if progress.is_doing_well() {
        format!(
            "Spend 30 focused minutes on \"{}\" -- you are {} this week, so push a little further.",
            goal.description,
            progress.label()
        )
    } else {
        format!(
            "Spend 15 focused minutes on \"{}\" -- you are {} this week, so keep it small and finish it.",
            goal.description,
            progress.label()
        )
    }
}

/// One templated task per day of `horizon`, starting today.
pub fn templated_proposals(goal: &Goal, today: Date, horizon: Horizon) -> Vec<TaskProposal> {
    let dates = horizon.dates(today);
    let total = dates.len();
    dates
        .into_iter()
        .enumerate()
        .map(|(index, due_date)| TaskProposal {
            description: format!(
                "Day {} of {total}: take one concrete step toward \"{}\"",
                index + 1,
                goal.description
            ),
            due_date,
            source: ProposalSource::Template,
        })
        .collect()
}

pub fn generate_templated_tasks(
    store: &Store,
    owner: OwnerId,
    goal_id: GoalId,
    today: Date,
    horizon: Horizon,
) -> CoachResult<Vec<TaskId>> {
    let goal = store.require_goal(owner, goal_id)?;
    let inputs: Vec<TaskFormInput> = templated_proposals(&goal, today, horizon)
        .into_iter()
        .map(|proposal| TaskFormInput {
            description: proposal.description,
            due_date: proposal.due_date,
        })
        .collect();

    let ids = store.create_tasks(owner, goal_id, &inputs)?;
    info!(goal_id = goal_id.get(), count = ids.len(), "templated tasks created");
    Ok(ids)
}

pub fn encouragement(
    generator: &dyn TextGenerator,
    goal: &Goal,
    progress: WeeklyProgress,
    today: Date,
) -> String {
    if generator.is_configured() {
        let prompt = build_encouragement_prompt(&brief(goal), progress_brief(progress), today);
        match usable_text(generator.generate(&prompt)) {
            Ok(message) => return message,
            Err(failure) => warn!(goal_id = goal.id.get(), %failure, "using fallback encouragement"),
        }
    }

    format!(
        "Keep going with \"{}\". You said it matters because: {} You are {} this week.",
        goal.description,
        goal.positive_reasons.trim_end(),
        progress.label()
    )
}

fn usable_text(generation: Generation) -> Result<String, GenerationFailure> {
    match generation {
        Generation::Text(text) if is_unavailable_text(&text) => Err(GenerationFailure::Empty),
        Generation::Text(text) if text.trim().is_empty() => Err(GenerationFailure::Empty),
        Generation::Text(text) => Ok(text.trim().to_owned()),
        Generation::Unavailable(failure) => Err(failure),
    }
}

fn brief(goal: &Goal) -> GoalBrief<'_> {
    GoalBrief {
        description: &goal.description,
        positive_reasons: &goal.positive_reasons,
        consequences: &goal.consequences,
        target_date: goal.target_date,
    }
}

fn progress_brief(progress: WeeklyProgress) -> ProgressBrief {
    ProgressBrief {
        completed: progress.completed,
        missed: progress.missed,
    }
}
