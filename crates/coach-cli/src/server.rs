// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use coach_app::calendar::{Horizon, WEEK_DAYS};
use coach_app::validation::parse_optional_date;
use coach_app::{
    CoachError, CoachResult, ErrorKind, GoalFormInput, GoalId, OwnerId, TaskFormInput, TaskId,
    TaskProposal, TaskStatus,
};
use coach_db::{RequestScope, Store};
use coach_llm::TextGenerator;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use time::{Date, OffsetDateTime};
use tiny_http::{Header, Response, Server, StatusCode};
use tracing::{error, info, warn};

use crate::flash::{FlashSigner, Notice};
use crate::planner;
use crate::views::{self, GoalDraft, GoalPage};

const MAX_BODY_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other,
}

/// An HTTP request reduced to what the handlers read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[cfg(test)]
impl Request {
    pub fn get(target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method: Method::Get,
            path,
            query,
            content_type: None,
            body: Vec::new(),
        }
    }

    pub fn form(path: &str, body: &str) -> Self {
        Self {
            method: Method::Post,
            path: path.to_owned(),
            query: String::new(),
            content_type: Some("application/x-www-form-urlencoded".to_owned()),
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn json(path: &str, body: &serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.to_owned(),
            query: String::new(),
            content_type: Some("application/json".to_owned()),
            body: body.to_string().into_bytes(),
        }
    }
}

impl Request {
    fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|value| value.split(';').next())
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("application/json"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Html { status: u16, body: String },
    Json { status: u16, value: serde_json::Value },
    Redirect { location: String },
}

impl Reply {
    pub fn status(&self) -> u16 {
        match self {
            Self::Html { status, .. } | Self::Json { status, .. } => *status,
            Self::Redirect { .. } => 303,
        }
    }

    fn html(body: String) -> Self {
        Self::Html { status: 200, body }
    }

    fn json(value: serde_json::Value) -> Self {
        Self::Json { status: 200, value }
    }

    fn into_response(self) -> Response<Cursor<Vec<u8>>> {
        match self {
            Self::Html { status, body } => with_header(
                Response::from_string(body).with_status_code(StatusCode(status)),
                "Content-Type",
                "text/html; charset=utf-8",
            ),
            Self::Json { status, value } => with_header(
                Response::from_string(value.to_string()).with_status_code(StatusCode(status)),
                "Content-Type",
                "application/json",
            ),
            Self::Redirect { location } => with_header(
                Response::from_string(String::new()).with_status_code(StatusCode(303)),
                "Location",
                &location,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Dashboard,
    SetupGoal,
    Goal(GoalId),
    TaskAction(TaskId, TaskStatus),
    GenerateNewGoals,
    GenerateTasks(Horizon),
    GenerateTasksDialog,
    ProposeTask,
    SaveTask,
    SaveTasks,
}

impl Route {
    pub fn parse(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match segments.as_slice() {
            [""] => Some(Self::Dashboard),
            ["setup_goal"] => Some(Self::SetupGoal),
            ["goal", id] => id.parse().ok().map(|id| Self::Goal(GoalId::new(id))),
            ["task", id, action] => {
                let id = id.parse().ok()?;
                let status = TaskStatus::from_action(action)?;
                Some(Self::TaskAction(TaskId::new(id), status))
            }
            ["generate_new_goals"] => Some(Self::GenerateNewGoals),
            ["generate_tasks"] => Some(Self::GenerateTasks(Horizon::Week)),
            ["generate_tasks_until_sunday"] => Some(Self::GenerateTasks(Horizon::UntilSunday)),
            ["generate_tasks_dialog"] => Some(Self::GenerateTasksDialog),
            ["regenerate_task"] | ["generate_task_for_today"] => Some(Self::ProposeTask),
            ["save_task"] => Some(Self::SaveTask),
            ["save_tasks"] => Some(Self::SaveTasks),
            _ => None,
        }
    }

    fn allows(self, method: Method) -> bool {
        match self {
            Self::Dashboard => method == Method::Get,
            Self::SetupGoal | Self::Goal(_) => matches!(method, Method::Get | Method::Post),
            _ => method == Method::Post,
        }
    }

    fn is_json(self) -> bool {
        matches!(
            self,
            Self::GenerateTasksDialog | Self::ProposeTask | Self::SaveTask | Self::SaveTasks
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    System,
    Fixed(OffsetDateTime),
}

impl Clock {
    pub fn now(self) -> OffsetDateTime {
        match self {
            Self::System => {
                OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
            }
            Self::Fixed(now) => now,
        }
    }

    pub fn today(self) -> Date {
        self.now().date()
    }
}

pub struct App {
    db_path: PathBuf,
    owner: OwnerId,
    generator: Box<dyn TextGenerator>,
    signer: FlashSigner,
    clock: Clock,
}

impl App {
    pub fn new(
        db_path: PathBuf,
        owner: OwnerId,
        generator: Box<dyn TextGenerator>,
        signer: FlashSigner,
        clock: Clock,
    ) -> Self {
        Self {
            db_path,
            owner,
            generator,
            signer,
            clock,
        }
    }

    pub fn handle(&self, request: &Request) -> Reply {
        let Some(route) = Route::parse(&request.path) else {
            return Reply::Html {
                status: 404,
                body: views::error_page(404, "That page does not exist."),
            };
        };
        if !route.allows(request.method) {
            return Reply::Html {
                status: 405,
                body: views::error_page(405, "That action is not available here."),
            };
        }

        let mut scope = RequestScope::new(&self.db_path);
        let result = self.dispatch(&mut scope, route, request);
        scope.release();

        match result {
            Ok(reply) => reply,
            Err(error) if route.is_json() => json_error(&error),
            Err(error) => self.html_error(&error),
        }
    }

    fn dispatch(
        &self,
        scope: &mut RequestScope,
        route: Route,
        request: &Request,
    ) -> CoachResult<Reply> {
        let store = scope.acquire()?;
        match (route, request.method) {
            (Route::Dashboard, _) => self.dashboard(store, request),
            (Route::SetupGoal, Method::Get) => Ok(Reply::html(views::setup_goal(
                &GoalDraft::default(),
                None,
            ))),
            (Route::SetupGoal, _) => self.create_goal(store, request),
            (Route::Goal(goal_id), Method::Get) => self.goal_detail(store, goal_id, request),
            (Route::Goal(goal_id), _) => self.create_task(store, goal_id, request),
            (Route::TaskAction(task_id, status), _) => self.change_status(store, task_id, status),
            (Route::GenerateNewGoals, _) => self.generate_new_goals(store, request),
            (Route::GenerateTasks(horizon), _) => self.generate_tasks(store, horizon, request),
            (Route::GenerateTasksDialog, _) => self.tasks_dialog(store, request),
            (Route::ProposeTask, _) => self.propose_task(store, request),
            (Route::SaveTask, _) => self.save_task(store, request),
            (Route::SaveTasks, _) => self.save_tasks(store, request),
        }
    }

    fn dashboard(&self, store: &Store, request: &Request) -> CoachResult<Reply> {
        let goals = store.list_active_goals(self.owner)?;
        let notice = self.signer.decode(&request.query);
        Ok(Reply::html(views::dashboard(&goals, notice.as_ref())))
    }

    fn create_goal(&self, store: &Store, request: &Request) -> CoachResult<Reply> {
        let form: GoalForm = parse_body(request)?;
        let draft = GoalDraft {
            description: form.description.unwrap_or_default(),
            target_date: form.target_date.unwrap_or_default(),
            positive_reasons: form.positive_reasons.unwrap_or_default(),
            consequences: form.consequences.unwrap_or_default(),
        };

        let created = GoalFormInput::parse(
            &draft.description,
            &draft.target_date,
            &draft.positive_reasons,
            &draft.consequences,
        )
        .and_then(|input| store.create_goal(self.owner, &input));

        match created {
            Ok(_) => self.redirect("/", Notice::success("Goal created.")),
            Err(CoachError::Validation(message)) => {
                warn!(%message, "goal form rejected");
                Ok(Reply::html(views::setup_goal(&draft, Some(&message))))
            }
            Err(error) => Err(error),
        }
    }

    fn goal_detail(&self, store: &Store, goal_id: GoalId, request: &Request) -> CoachResult<Reply> {
        let Some(goal) = store.get_goal(self.owner, goal_id)? else {
            return self.redirect(
                "/",
                Notice::error(format!("Goal {goal_id} was not found.")),
            );
        };

        let today = self.clock.today();
        let tasks = store.list_tasks(self.owner, goal_id)?;
        let progress = store.weekly_progress(self.owner, goal_id, today)?;
        let encouragement = planner::encouragement(self.generator.as_ref(), &goal, progress, today);
        let notice = self.signer.decode(&request.query);

        let page = GoalPage {
            goal: &goal,
            tasks: &tasks,
            progress,
            encouragement: &encouragement,
            today,
        };
        Ok(Reply::html(views::goal_detail(&page, notice.as_ref())))
    }

    fn create_task(&self, store: &Store, goal_id: GoalId, request: &Request) -> CoachResult<Reply> {
        let form: TaskForm = parse_body(request)?;
        let created = TaskFormInput::parse(
            form.description.as_deref().unwrap_or_default(),
            form.due_date.as_deref().unwrap_or_default(),
        )
        .and_then(|input| store.create_task(self.owner, goal_id, &input));

        let target = goal_path(goal_id);
        match created {
            Ok(_) => self.redirect(&target, Notice::success("Task added.")),
            Err(CoachError::Validation(message)) => {
                warn!(%message, goal_id = goal_id.get(), "task form rejected");
                self.redirect(&target, Notice::error(message))
            }
            Err(error) => Err(error),
        }
    }

    fn change_status(
        &self,
        store: &Store,
        task_id: TaskId,
        status: TaskStatus,
    ) -> CoachResult<Reply> {
        let goal_id = store.set_task_status(self.owner, task_id, status)?;
        let message = match status {
            TaskStatus::Completed => "Task marked complete.",
            TaskStatus::Missed => "Task marked missed.",
            TaskStatus::Planned => "Task reset.",
        };
        self.redirect(&goal_path(goal_id), Notice::success(message))
    }

    fn generate_new_goals(&self, store: &Store, request: &Request) -> CoachResult<Reply> {
        let form: WeeklyForm = parse_body(request)?;
        let typed = form
            .last_week_goals
            .filter(|value| !value.trim().is_empty());
        // Recent goals only make sense as context for a configured generator.
        let context = match typed {
            Some(value) => Some(value),
            None if self.generator.is_configured() => {
                store.goals_created_last_week(self.owner, self.clock.now())?
            }
            None => None,
        };

        match planner::generate_weekly_goals(
            store,
            self.owner,
            self.generator.as_ref(),
            context.as_deref(),
            self.clock.today(),
        ) {
            Ok(ids) => self.redirect(
                "/",
                Notice::success(format!("Generated {} new goals for the week.", ids.len())),
            ),
            Err(CoachError::Generation(message)) => {
                warn!(%message, "weekly goal generation failed");
                self.redirect("/", Notice::error(message))
            }
            Err(error) => Err(error),
        }
    }

    fn generate_tasks(
        &self,
        store: &Store,
        horizon: Horizon,
        request: &Request,
    ) -> CoachResult<Reply> {
        let form: GoalRef = parse_body(request)?;
        let goal_id = required_goal_id(form.goal_id)?;
        let ids = planner::generate_templated_tasks(
            store,
            self.owner,
            goal_id,
            self.clock.today(),
            horizon,
        )?;
        self.redirect(
            &goal_path(goal_id),
            Notice::success(format!("Planned {} tasks.", ids.len())),
        )
    }

    fn tasks_dialog(&self, store: &Store, request: &Request) -> CoachResult<Reply> {
        let form: DialogForm = parse_body(request)?;
        let goal_id = required_goal_id(form.goal_id)?;
        let days = match form.days {
            Some(raw) => raw.as_u32("days")?,
            None => WEEK_DAYS,
        };

        let goal = store.require_goal(self.owner, goal_id)?;
        let proposals = planner::templated_proposals(&goal, self.clock.today(), Horizon::Days(days));
        let tasks: Vec<ProposedTask> = proposals.into_iter().map(ProposedTask::from).collect();
        Ok(Reply::json(json!({ "goal_id": goal_id, "tasks": tasks })))
    }

    fn propose_task(&self, store: &Store, request: &Request) -> CoachResult<Reply> {
        let form: ProposalForm = parse_body(request)?;
        let goal_id = required_goal_id(form.goal_id)?;
        let today = self.clock.today();
        let due_date = parse_optional_date("due date", form.due_date.as_deref().unwrap_or_default())?
            .unwrap_or(today);

        let goal = store.require_goal(self.owner, goal_id)?;
        let progress = store.weekly_progress(self.owner, goal_id, today)?;
        let proposal =
            planner::propose_task(self.generator.as_ref(), &goal, progress, due_date, today);
        Ok(Reply::json(json!({
            "goal_id": goal_id,
            "description": proposal.description,
            "due_date": coach_app::validation::format_date(proposal.due_date),
            "source": proposal.source,
        })))
    }

    fn save_task(&self, store: &Store, request: &Request) -> CoachResult<Reply> {
        let form: SaveTaskForm = parse_body(request)?;
        let goal_id = required_goal_id(form.goal_id)?;
        let input = TaskFormInput::parse(
            form.description.as_deref().unwrap_or_default(),
            form.due_date.as_deref().unwrap_or_default(),
        )?;
        let task_id = store.create_task(self.owner, goal_id, &input)?;
        Ok(Reply::json(json!({ "task_id": task_id })))
    }

    fn save_tasks(&self, store: &Store, request: &Request) -> CoachResult<Reply> {
        let form: SaveTasksForm = parse_body(request)?;
        let goal_id = required_goal_id(form.goal_id)?;
        if form.tasks.is_empty() {
            return Err(CoachError::validation("tasks must not be empty"));
        }
        let inputs = form
            .tasks
            .iter()
            .map(|task| TaskFormInput::parse(&task.description, &task.due_date))
            .collect::<CoachResult<Vec<_>>>()?;
        let task_ids = store.create_tasks(self.owner, goal_id, &inputs)?;
        Ok(Reply::json(json!({ "task_ids": task_ids })))
    }

    fn redirect(&self, path: &str, notice: Notice) -> CoachResult<Reply> {
        let location = self
            .signer
            .redirect_target(path, &notice)
            .map_err(CoachError::Storage)?;
        Ok(Reply::Redirect { location })
    }

    fn html_error(&self, error: &CoachError) -> Reply {
        log_failure(error);
        match error.kind() {
            ErrorKind::NotFound | ErrorKind::Validation | ErrorKind::Generation => {
                match self.redirect("/", Notice::error(error.to_string())) {
                    Ok(reply) => reply,
                    Err(_) => Reply::Html {
                        status: status_for(error),
                        body: views::error_page(status_for(error), &error.to_string()),
                    },
                }
            }
            ErrorKind::StorageUnavailable | ErrorKind::Storage => Reply::Html {
                status: status_for(error),
                body: views::error_page(status_for(error), &error.to_string()),
            },
        }
    }
}

/// Accepts requests one at a time until the listener fails.
pub fn serve(app: &App, listen: &str) -> Result<()> {
    let server = Server::http(listen).map_err(|error| anyhow!("listen on {listen}: {error}"))?;
    info!(%listen, "coach is listening");

    for mut incoming in server.incoming_requests() {
        let request = match read_request(&mut incoming) {
            Ok(Some(request)) => request,
            Ok(None) => {
                warn!(url = %incoming.url(), limit = MAX_BODY_BYTES, "request body too large");
                if let Err(error) = incoming.respond(body_too_large().into_response()) {
                    warn!(%error, "failed to answer oversized request");
                }
                continue;
            }
            Err(error) => {
                warn!(error = %format!("{error:#}"), "unreadable request");
                let response =
                    Response::from_string("bad request").with_status_code(StatusCode(400));
                if let Err(error) = incoming.respond(response) {
                    warn!(%error, "failed to answer unreadable request");
                }
                continue;
            }
        };

        let reply = app.handle(&request);
        info!(
            method = ?request.method,
            path = %request.path,
            status = reply.status(),
            "request handled"
        );
        if let Err(error) = incoming.respond(reply.into_response()) {
            warn!(%error, path = %request.path, "failed to send response");
        }
    }

    Ok(())
}

/// `None` when the body is larger than [`MAX_BODY_BYTES`].
fn read_request(incoming: &mut tiny_http::Request) -> Result<Option<Request>> {
    let method = match incoming.method() {
        tiny_http::Method::Get => Method::Get,
        tiny_http::Method::Post => Method::Post,
        _ => Method::Other,
    };
    let (path, query) = split_target(incoming.url());
    let content_type = incoming
        .headers()
        .iter()
        .find(|header| header.field.equiv("Content-Type"))
        .map(|header| header.value.as_str().to_owned());

    let Some(body) = read_body(incoming.as_reader(), MAX_BODY_BYTES)
        .map_err(|error| anyhow!("read request body: {error}"))?
    else {
        return Ok(None);
    };

    Ok(Some(Request {
        method,
        path,
        query,
        content_type,
        body,
    }))
}

/// Reads at most `limit` bytes; `None` when the reader holds more.
fn read_body(reader: impl Read, limit: u64) -> std::io::Result<Option<Vec<u8>>> {
    let mut body = Vec::new();
    reader.take(limit + 1).read_to_end(&mut body)?;
    if body.len() as u64 > limit {
        return Ok(None);
    }
    Ok(Some(body))
}

fn body_too_large() -> Reply {
    Reply::Html {
        status: 413,
        body: views::error_page(413, "That request is too large."),
    }
}

fn split_target(target: &str) -> (String, String) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_owned(), query.to_owned()),
        None => (target.to_owned(), String::new()),
    }
}

fn with_header(
    response: Response<Cursor<Vec<u8>>>,
    name: &str,
    value: &str,
) -> Response<Cursor<Vec<u8>>> {
    match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
        Ok(header) => response.with_header(header),
        Err(()) => {
            warn!(%name, "dropping invalid response header");
            response
        }
    }
}

fn goal_path(goal_id: GoalId) -> String {
    format!("/goal/{goal_id}")
}

fn parse_body<T: DeserializeOwned>(request: &Request) -> CoachResult<T> {
    if request.is_json() {
        serde_json::from_slice(&request.body)
            .map_err(|error| CoachError::validation(format!("invalid JSON body: {error}")))
    } else {
        serde_urlencoded::from_bytes(&request.body)
            .map_err(|error| CoachError::validation(format!("invalid form body: {error}")))
    }
}

fn status_for(error: &CoachError) -> u16 {
    match error.kind() {
        ErrorKind::Validation => 400,
        ErrorKind::NotFound => 404,
        ErrorKind::Generation => 502,
        ErrorKind::StorageUnavailable => 503,
        ErrorKind::Storage => 500,
    }
}

fn json_error(error: &CoachError) -> Reply {
    log_failure(error);
    Reply::Json {
        status: status_for(error),
        value: json!({ "error": error.to_string() }),
    }
}

fn log_failure(error: &CoachError) {
    match error.kind() {
        ErrorKind::Storage | ErrorKind::StorageUnavailable => {
            error!(error = %error, "request failed");
        }
        ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Generation => {
            warn!(error = %error, "request rejected");
        }
    }
}

/// A number that may arrive as JSON number or as form text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum NumberField {
    Number(i64),
    Text(String),
}

impl NumberField {
    fn as_i64(&self, field: &str) -> CoachResult<i64> {
        match self {
            Self::Number(value) => Ok(*value),
            Self::Text(raw) => raw
                .trim()
                .parse()
                .map_err(|_| CoachError::validation(format!("{field} must be a whole number"))),
        }
    }

    fn as_u32(&self, field: &str) -> CoachResult<u32> {
        let value = self.as_i64(field)?;
        u32::try_from(value)
            .map_err(|_| CoachError::validation(format!("{field} must not be negative")))
    }
}

fn required_goal_id(raw: Option<NumberField>) -> CoachResult<GoalId> {
    let raw = raw.ok_or_else(|| CoachError::validation("goal_id is required"))?;
    Ok(GoalId::new(raw.as_i64("goal_id")?))
}

#[derive(Debug, Deserialize)]
struct GoalForm {
    description: Option<String>,
    target_date: Option<String>,
    positive_reasons: Option<String>,
    consequences: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskForm {
    description: Option<String>,
    due_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WeeklyForm {
    last_week_goals: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoalRef {
    goal_id: Option<NumberField>,
}

#[derive(Debug, Deserialize)]
struct DialogForm {
    goal_id: Option<NumberField>,
    days: Option<NumberField>,
}

#[derive(Debug, Deserialize)]
struct ProposalForm {
    goal_id: Option<NumberField>,
    due_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SaveTaskForm {
    goal_id: Option<NumberField>,
    description: Option<String>,
    due_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SaveTasksForm {
    goal_id: Option<NumberField>,
    #[serde(default)]
    tasks: Vec<ProposedTask>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ProposedTask {
    description: String,
    due_date: String,
}

impl From<TaskProposal> for ProposedTask {
    fn from(proposal: TaskProposal) -> Self {
        Self {
            description: proposal.description,
            due_date: coach_app::validation::format_date(proposal.due_date),
        }
    }
}
