// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use coach_app::validation::format_date;
use coach_app::{Goal, Task, TaskStatus, WeeklyProgress};

use crate::flash::{Notice, NoticeLevel};

/// Raw form values echoed back when a goal submission is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoalDraft {
    pub description: String,
    pub target_date: String,
    pub positive_reasons: String,
    pub consequences: String,
}

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn dashboard(goals: &[Goal], notice: Option<&Notice>) -> String {
    let mut body = String::new();
    body.push_str("<h1>Your goals</h1>\n");
    body.push_str("<p><a href=\"/setup_goal\">Set up a new goal</a></p>\n");

    if goals.is_empty() {
        body.push_str("<p>No active goals yet.</p>\n");
    } else {
        body.push_str("<ul class=\"goals\">\n");
        for goal in goals {
            body.push_str(&format!(
                "<li><a href=\"/goal/{}\">{}</a>{}</li>\n",
                goal.id,
                escape(&goal.description),
                goal.target_date
                    .map(|date| format!(" <small>by {}</small>", format_date(date)))
                    .unwrap_or_default()
            ));
        }
        body.push_str("</ul>\n");
    }

    body.push_str(concat!(
        "<h2>Plan the week</h2>\n",
        "<form method=\"post\" action=\"/generate_new_goals\">\n",
        "<label for=\"last_week_goals\">Last week's goals (leave blank to use recent goals)</label>\n",
        "<textarea id=\"last_week_goals\" name=\"last_week_goals\"></textarea>\n",
        "<button type=\"submit\">Generate goals</button>\n",
        "</form>\n",
    ));

    page("Goals", notice, &body)
}

pub fn setup_goal(draft: &GoalDraft, error: Option<&str>) -> String {
    let notice = error.map(Notice::error);
    let body = format!(
        concat!(
            "<h1>Set up a goal</h1>\n",
            "<form method=\"post\" action=\"/setup_goal\">\n",
            "<label>Goal <input name=\"description\" value=\"{}\"></label>\n",
            "<label>Target date <input type=\"date\" name=\"target_date\" value=\"{}\"></label>\n",
            "<label>Why it matters <textarea name=\"positive_reasons\">{}</textarea></label>\n",
            "<label>What happens if you skip it <textarea name=\"consequences\">{}</textarea></label>\n",
            "<button type=\"submit\">Save goal</button>\n",
            "</form>\n",
            "<p><a href=\"/\">Back</a></p>\n",
        ),
        escape(&draft.description),
        escape(&draft.target_date),
        escape(&draft.positive_reasons),
        escape(&draft.consequences),
    );
    page("Set up a goal", notice.as_ref(), &body)
}

pub struct GoalPage<'a> {
    pub goal: &'a Goal,
    pub tasks: &'a [Task],
    pub progress: WeeklyProgress,
    pub encouragement: &'a str,
    pub today: time::Date,
}

pub fn goal_detail(view: &GoalPage<'_>, notice: Option<&Notice>) -> String {
    let goal = view.goal;
    let mut body = String::new();
    body.push_str(&format!("<h1>{}</h1>\n", escape(&goal.description)));
    body.push_str("<dl>\n");
    if let Some(target) = goal.target_date {
        body.push_str(&format!("<dt>Target date</dt><dd>{}</dd>\n", format_date(target)));
    }
    body.push_str(&format!(
        "<dt>Why it matters</dt><dd>{}</dd>\n<dt>If skipped</dt><dd>{}</dd>\n",
        escape(&goal.positive_reasons),
        escape(&goal.consequences)
    ));
    body.push_str("</dl>\n");

    body.push_str(&format!(
        "<p class=\"progress\">This week: {} completed, {} missed ({}).</p>\n",
        view.progress.completed,
        view.progress.missed,
        view.progress.label()
    ));
    body.push_str(&format!(
        "<blockquote class=\"encouragement\">{}</blockquote>\n",
        escape(view.encouragement)
    ));

    body.push_str("<h2>Tasks</h2>\n");
    if view.tasks.is_empty() {
        body.push_str("<p>No tasks yet.</p>\n");
    } else {
        body.push_str("<table class=\"tasks\">\n<tr><th>Due</th><th>Task</th><th>Status</th><th></th></tr>\n");
        for task in view.tasks {
            body.push_str(&task_row(task));
        }
        body.push_str("</table>\n");
    }

    body.push_str(&format!(
        concat!(
            "<h2>Add a task</h2>\n",
            "<form method=\"post\" action=\"/goal/{id}\">\n",
            "<input name=\"description\" placeholder=\"What will you do?\">\n",
            "<input type=\"date\" name=\"due_date\" value=\"{today}\">\n",
            "<button type=\"submit\">Add task</button>\n",
            "</form>\n",
            "<form method=\"post\" action=\"/generate_tasks\">",
            "<input type=\"hidden\" name=\"goal_id\" value=\"{id}\">",
            "<button type=\"submit\">Plan the next 7 days</button></form>\n",
            "<form method=\"post\" action=\"/generate_tasks_until_sunday\">",
            "<input type=\"hidden\" name=\"goal_id\" value=\"{id}\">",
            "<button type=\"submit\">Plan until Sunday</button></form>\n",
            "<p><a href=\"/\">Back to goals</a></p>\n",
        ),
        id = goal.id,
        today = format_date(view.today),
    ));

    page(&goal.description, notice, &body)
}

pub fn error_page(status: u16, message: &str) -> String {
    let body = format!(
        "<h1>Something went wrong ({status})</h1>\n<p>{}</p>\n<p><a href=\"/\">Back to goals</a></p>\n",
        escape(message)
    );
    page("Error", None, &body)
}

fn task_row(task: &Task) -> String {
    let actions = [
        ("complete", "Done", TaskStatus::Completed),
        ("missed", "Missed", TaskStatus::Missed),
        ("reset", "Reset", TaskStatus::Planned),
    ]
    .into_iter()
    .filter(|(_, _, target)| *target != task.status)
    .map(|(action, label, _)| {
        format!(
            "<form method=\"post\" action=\"/task/{}/{action}\"><button type=\"submit\">{label}</button></form>",
            task.id
        )
    })
    .collect::<String>();

    format!(
        "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{actions}</td></tr>\n",
        task.status.as_str().to_ascii_lowercase(),
        format_date(task.due_date),
        escape(&task.description),
        task.status.as_str(),
    )
}

fn page(title: &str, notice: Option<&Notice>, body: &str) -> String {
    let notice_html = notice
        .map(|notice| {
            let class = match notice.level {
                NoticeLevel::Success => "notice success",
                NoticeLevel::Error => "notice error",
            };
            format!("<p class=\"{class}\">{}</p>\n", escape(&notice.message))
        })
        .unwrap_or_default();

    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{} - coach</title>\n</head>\n<body>\n{notice_html}{body}</body>\n</html>\n",
        escape(title)
    )
}

#[cfg(test)]
mod tests {
    use super::{GoalDraft, dashboard, escape, setup_goal};
    use crate::flash::Notice;

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(
            escape("<a href=\"x\">Tom & Jerry's</a>"),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
    }

    #[test]
    fn setup_form_echoes_draft_and_error() {
        let draft = GoalDraft {
            description: "<script>".to_owned(),
            ..GoalDraft::default()
        };
        let html = setup_goal(&draft, Some("positive reasons are required"));
        assert!(html.contains("value=\"&lt;script&gt;\""));
        assert!(html.contains("notice error"));
        assert!(html.contains("positive reasons are required"));
    }

    #[test]
    fn empty_dashboard_still_offers_weekly_planning() {
        let html = dashboard(&[], Some(&Notice::success("Saved")));
        assert!(html.contains("No active goals yet."));
        assert!(html.contains("action=\"/generate_new_goals\""));
        assert!(html.contains("notice success"));
    }
}
