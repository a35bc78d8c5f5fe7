// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod scope;

pub use scope::RequestScope;

use anyhow::{anyhow, bail};
use coach_app::validation::format_date;
use coach_app::{
    CoachError, CoachResult, DEFAULT_OWNER, Goal, GoalFormInput, GoalId, GoalStatus, OwnerId,
    StorageContext, Task, TaskFormInput, TaskId, TaskStatus, User, WeeklyProgress,
    calendar::week_bounds,
};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, info};

pub const APP_NAME: &str = "coach";
pub const DEFAULT_USERNAME: &str = "default_user";

const SCHEMA_SQL: &str = include_str!("sql/schema.sql");

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[
    ("users", &["user_id", "username", "preferences"]),
    (
        "goals",
        &[
            "goal_id",
            "user_id",
            "description",
            "target_date",
            "positive_reasons",
            "consequences_of_inaction",
            "status",
            "creation_date",
        ],
    ),
    (
        "tasks",
        &[
            "task_id",
            "goal_id",
            "description",
            "due_date",
            "status",
            "completion_date",
            "creation_date",
        ],
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequiredIndex {
    name: &'static str,
    create_sql: &'static str,
}

const REQUIRED_INDEXES: &[RequiredIndex] = &[
    RequiredIndex {
        name: "idx_goals_user_status",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_goals_user_status ON goals (user_id, status);",
    },
    RequiredIndex {
        name: "idx_tasks_goal_due_date",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_tasks_goal_due_date ON tasks (goal_id, due_date);",
    },
];

const GOAL_COLUMNS: &str = "
    g.goal_id, g.user_id, g.description, g.target_date, g.positive_reasons,
    g.consequences_of_inaction, g.status, g.creation_date
";

const TASK_COLUMNS: &str = "
    t.task_id, t.goal_id, t.description, t.due_date, t.status,
    t.completion_date, t.creation_date
";

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> CoachResult<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable).map_err(CoachError::StorageUnavailable)?;
        let conn = Connection::open(path).map_err(|error| {
            CoachError::StorageUnavailable(
                anyhow::Error::new(error).context(format!("open database at {}", path.display())),
            )
        })?;
        configure_connection(&conn).map_err(|error| match error {
            CoachError::Storage(inner) => CoachError::StorageUnavailable(inner),
            other => other,
        })?;
        debug!(path = %path.display(), "database connection opened");
        Ok(Self { conn })
    }

    pub fn open_memory() -> CoachResult<Self> {
        let conn = Connection::open_in_memory().map_err(|error| {
            CoachError::StorageUnavailable(
                anyhow::Error::new(error).context("open in-memory database"),
            )
        })?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn close(self) -> CoachResult<()> {
        self.conn
            .close()
            .map_err(|(_, error)| error)
            .storage("close database")
    }

    /// Creates missing tables, checks the layout of existing ones and makes
    /// sure the default user exists. Never touches goal or task rows.
    pub fn ensure_ready(&self) -> CoachResult<()> {
        let missing = missing_tables(&self.conn)?;
        if !missing.is_empty() {
            info!(tables = %missing.join(", "), "creating missing tables");
            let tx = self
                .conn
                .unchecked_transaction()
                .storage("begin schema transaction")?;
            tx.execute_batch(SCHEMA_SQL).storage("create schema")?;
            tx.commit().storage("commit schema")?;
        }

        validate_schema(&self.conn)?;
        ensure_required_indexes(&self.conn)?;

        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO users (user_id, username, preferences) VALUES (?, ?, ?)",
                params![DEFAULT_OWNER.get(), DEFAULT_USERNAME, "{}"],
            )
            .storage("ensure default user")?;
        if inserted > 0 {
            info!(user_id = DEFAULT_OWNER.get(), "created default user");
        }
        Ok(())
    }

    pub fn table_names(&self) -> CoachResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT name
                FROM sqlite_master
                WHERE type = 'table'
                  AND name NOT LIKE 'sqlite_%'
                ORDER BY name ASC
                ",
            )
            .storage("prepare table names query")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>("name"))
            .storage("query table names")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .storage("collect table names")
    }

    pub fn get_user(&self, owner: OwnerId) -> CoachResult<User> {
        self.conn
            .query_row(
                "SELECT user_id, username, preferences FROM users WHERE user_id = ?",
                params![owner.get()],
                |row| {
                    Ok(User {
                        id: OwnerId::new(row.get("user_id")?),
                        username: row.get("username")?,
                        preferences: row.get("preferences")?,
                    })
                },
            )
            .optional()
            .storage_with(|| format!("load user {owner}"))?
            .ok_or_else(|| CoachError::not_found(format!("user {owner} does not exist")))
    }

    pub fn list_active_goals(&self, owner: OwnerId) -> CoachResult<Vec<Goal>> {
        let sql = format!(
            "
            SELECT {GOAL_COLUMNS}
            FROM goals g
            WHERE g.user_id = ? AND g.status = ?
            ORDER BY julianday(g.creation_date) DESC, g.goal_id DESC
            "
        );
        let mut stmt = self.conn.prepare(&sql).storage("prepare active goals query")?;
        let rows = stmt
            .query_map(params![owner.get(), GoalStatus::Active.as_str()], goal_from_row)
            .storage("query active goals")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .storage("collect active goals")
    }

    pub fn create_goal(&self, owner: OwnerId, input: &GoalFormInput) -> CoachResult<GoalId> {
        input.validate()?;
        let now = now_rfc3339()?;
        let goal_id = insert_goal(&self.conn, owner, input, &now)?;
        info!(goal_id = goal_id.get(), owner = owner.get(), "goal created");
        Ok(goal_id)
    }

    /// Inserts every goal or none of them.
    pub fn create_goals(
        &self,
        owner: OwnerId,
        inputs: &[GoalFormInput],
    ) -> CoachResult<Vec<GoalId>> {
        for input in inputs {
            input.validate()?;
        }

        let now = now_rfc3339()?;
        let tx = self
            .conn
            .unchecked_transaction()
            .storage("begin goal batch")?;
        let mut ids = Vec::with_capacity(inputs.len());
        for input in inputs {
            ids.push(insert_goal(&tx, owner, input, &now)?);
        }
        tx.commit().storage("commit goal batch")?;
        info!(count = ids.len(), owner = owner.get(), "goal batch created");
        Ok(ids)
    }

    pub fn get_goal(&self, owner: OwnerId, goal_id: GoalId) -> CoachResult<Option<Goal>> {
        let sql = format!(
            "
            SELECT {GOAL_COLUMNS}
            FROM goals g
            WHERE g.goal_id = ? AND g.user_id = ?
            "
        );
        self.conn
            .query_row(&sql, params![goal_id.get(), owner.get()], goal_from_row)
            .optional()
            .storage_with(|| format!("load goal {goal_id}"))
    }

    pub fn require_goal(&self, owner: OwnerId, goal_id: GoalId) -> CoachResult<Goal> {
        self.get_goal(owner, goal_id)?.ok_or_else(|| goal_not_found(goal_id))
    }

    pub fn list_tasks(&self, owner: OwnerId, goal_id: GoalId) -> CoachResult<Vec<Task>> {
        let sql = format!(
            "
            SELECT {TASK_COLUMNS}
            FROM tasks t
            JOIN goals g ON g.goal_id = t.goal_id
            WHERE t.goal_id = ? AND g.user_id = ?
            ORDER BY t.due_date ASC, t.status ASC, julianday(t.creation_date) ASC, t.task_id ASC
            "
        );
        let mut stmt = self.conn.prepare(&sql).storage("prepare tasks query")?;
        let rows = stmt
            .query_map(params![goal_id.get(), owner.get()], task_from_row)
            .storage_with(|| format!("query tasks for goal {goal_id}"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .storage("collect tasks")
    }

    pub fn get_task(&self, owner: OwnerId, task_id: TaskId) -> CoachResult<Option<Task>> {
        let sql = format!(
            "
            SELECT {TASK_COLUMNS}
            FROM tasks t
            JOIN goals g ON g.goal_id = t.goal_id
            WHERE t.task_id = ? AND g.user_id = ?
            "
        );
        self.conn
            .query_row(&sql, params![task_id.get(), owner.get()], task_from_row)
            .optional()
            .storage_with(|| format!("load task {task_id}"))
    }

    pub fn create_task(
        &self,
        owner: OwnerId,
        goal_id: GoalId,
        input: &TaskFormInput,
    ) -> CoachResult<TaskId> {
        input.validate()?;
        self.require_goal(owner, goal_id)?;
        let now = now_rfc3339()?;
        let task_id = insert_task(&self.conn, goal_id, input, &now)?;
        info!(task_id = task_id.get(), goal_id = goal_id.get(), "task created");
        Ok(task_id)
    }

    /// Inserts every task or none of them.
    pub fn create_tasks(
        &self,
        owner: OwnerId,
        goal_id: GoalId,
        inputs: &[TaskFormInput],
    ) -> CoachResult<Vec<TaskId>> {
        for input in inputs {
            input.validate()?;
        }
        self.require_goal(owner, goal_id)?;

        let now = now_rfc3339()?;
        let tx = self
            .conn
            .unchecked_transaction()
            .storage("begin task batch")?;
        let mut ids = Vec::with_capacity(inputs.len());
        for input in inputs {
            ids.push(insert_task(&tx, goal_id, input, &now)?);
        }
        tx.commit().storage("commit task batch")?;
        info!(count = ids.len(), goal_id = goal_id.get(), "task batch created");
        Ok(ids)
    }

    /// Moves a task to `status`, stamping or clearing its completion time,
    /// and returns the goal it belongs to.
    pub fn set_task_status(
        &self,
        owner: OwnerId,
        task_id: TaskId,
        status: TaskStatus,
    ) -> CoachResult<GoalId> {
        let completed_at = match status {
            TaskStatus::Completed => Some(now_rfc3339()?),
            TaskStatus::Planned | TaskStatus::Missed => None,
        };

        let goal_id: Option<i64> = self
            .conn
            .query_row(
                "
                UPDATE tasks
                SET status = ?, completion_date = ?
                WHERE task_id = ?
                  AND goal_id IN (SELECT goal_id FROM goals WHERE user_id = ?)
                RETURNING goal_id
                ",
                params![status.as_str(), completed_at, task_id.get(), owner.get()],
                |row| row.get("goal_id"),
            )
            .optional()
            .storage_with(|| format!("update status of task {task_id}"))?;

        let goal_id = goal_id.map(GoalId::new).ok_or_else(|| {
            CoachError::not_found(format!(
                "task {task_id} not found or access denied -- reload the goal and retry"
            ))
        })?;
        info!(
            task_id = task_id.get(),
            goal_id = goal_id.get(),
            status = status.as_str(),
            "task status changed"
        );
        Ok(goal_id)
    }

    pub fn weekly_progress(
        &self,
        owner: OwnerId,
        goal_id: GoalId,
        today: Date,
    ) -> CoachResult<WeeklyProgress> {
        let (week_start, week_end) = week_bounds(today);
        let (completed, missed): (i64, i64) = self
            .conn
            .query_row(
                "
                SELECT
                  COALESCE(SUM(CASE WHEN t.status = 'Completed' THEN 1 ELSE 0 END), 0) AS completed,
                  COALESCE(SUM(CASE WHEN t.status = 'Missed' THEN 1 ELSE 0 END), 0) AS missed
                FROM tasks t
                JOIN goals g ON g.goal_id = t.goal_id
                WHERE t.goal_id = ?
                  AND g.user_id = ?
                  AND t.due_date BETWEEN ? AND ?
                ",
                params![
                    goal_id.get(),
                    owner.get(),
                    format_date(week_start),
                    format_date(week_end),
                ],
                |row| Ok((row.get("completed")?, row.get("missed")?)),
            )
            .storage_with(|| format!("count weekly progress for goal {goal_id}"))?;

        Ok(WeeklyProgress {
            completed: u32::try_from(completed).unwrap_or(0),
            missed: u32::try_from(missed).unwrap_or(0),
        })
    }

    /// Descriptions of goals created in the seven days before `now`, oldest
    /// first, joined with `"; "`.
    pub fn goals_created_last_week(
        &self,
        owner: OwnerId,
        now: OffsetDateTime,
    ) -> CoachResult<Option<String>> {
        let cutoff = format_timestamp(now - Duration::days(7))?;
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT description
                FROM goals
                WHERE user_id = ?
                  AND julianday(creation_date) >= julianday(?)
                ORDER BY julianday(creation_date) ASC, goal_id ASC
                ",
            )
            .storage("prepare recent goals query")?;
        let rows = stmt
            .query_map(params![owner.get(), cutoff], |row| {
                row.get::<_, String>("description")
            })
            .storage("query recent goals")?;
        let descriptions = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .storage("collect recent goals")?;

        if descriptions.is_empty() {
            return Ok(None);
        }
        Ok(Some(descriptions.join("; ")))
    }
}

pub fn default_db_path() -> anyhow::Result<PathBuf> {
    if let Some(override_path) = env::var_os("COACH_DB_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set COACH_DB_PATH to a writable database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .map_err(|error| anyhow!("create data directory {}: {error}", app_dir.display()))?;
    Ok(app_dir.join("coach.db"))
}

pub fn validate_db_path(path: &str) -> anyhow::Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

fn goal_not_found(goal_id: GoalId) -> CoachError {
    CoachError::not_found(format!("goal {goal_id} not found or access denied"))
}

fn insert_goal(
    conn: &Connection,
    owner: OwnerId,
    input: &GoalFormInput,
    now: &str,
) -> CoachResult<GoalId> {
    conn.execute(
        "
        INSERT INTO goals (
          user_id, description, target_date, positive_reasons,
          consequences_of_inaction, status, creation_date
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ",
        params![
            owner.get(),
            input.description.trim(),
            input.target_date.map(format_date),
            input.positive_reasons.trim(),
            input.consequences.trim(),
            GoalStatus::Active.as_str(),
            now,
        ],
    )
    .storage("insert goal")?;
    Ok(GoalId::new(conn.last_insert_rowid()))
}

fn insert_task(
    conn: &Connection,
    goal_id: GoalId,
    input: &TaskFormInput,
    now: &str,
) -> CoachResult<TaskId> {
    conn.execute(
        "
        INSERT INTO tasks (goal_id, description, due_date, status, creation_date)
        VALUES (?, ?, ?, ?, ?)
        ",
        params![
            goal_id.get(),
            input.description.trim(),
            format_date(input.due_date),
            TaskStatus::Planned.as_str(),
            now,
        ],
    )
    .storage("insert task")?;
    Ok(TaskId::new(conn.last_insert_rowid()))
}

fn goal_from_row(row: &Row<'_>) -> rusqlite::Result<Goal> {
    let status_raw: String = row.get("status")?;
    let status = GoalStatus::parse(&status_raw)
        .ok_or_else(|| invalid_column(format!("unknown goal status {status_raw}")))?;
    let target_date_raw: Option<String> = row.get("target_date")?;
    let created_raw: String = row.get("creation_date")?;

    Ok(Goal {
        id: GoalId::new(row.get("goal_id")?),
        owner_id: OwnerId::new(row.get("user_id")?),
        description: row.get("description")?,
        target_date: parse_opt_date(target_date_raw).map_err(to_sql_error)?,
        positive_reasons: row.get("positive_reasons")?,
        consequences: row.get("consequences_of_inaction")?,
        status,
        created_at: parse_datetime(&created_raw).map_err(to_sql_error)?,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status_raw: String = row.get("status")?;
    let status = TaskStatus::parse(&status_raw)
        .ok_or_else(|| invalid_column(format!("unknown task status {status_raw}")))?;
    let due_date_raw: String = row.get("due_date")?;
    let completed_raw: Option<String> = row.get("completion_date")?;
    let created_raw: String = row.get("creation_date")?;

    Ok(Task {
        id: TaskId::new(row.get("task_id")?),
        goal_id: GoalId::new(row.get("goal_id")?),
        description: row.get("description")?,
        due_date: parse_date(&due_date_raw).map_err(to_sql_error)?,
        status,
        completed_at: completed_raw
            .as_deref()
            .map(parse_datetime)
            .transpose()
            .map_err(to_sql_error)?,
        created_at: parse_datetime(&created_raw).map_err(to_sql_error)?,
    })
}

fn missing_tables(conn: &Connection) -> CoachResult<Vec<&'static str>> {
    let mut missing = Vec::new();
    for (table, _) in REQUIRED_SCHEMA {
        if !table_exists(conn, table)? {
            missing.push(*table);
        }
    }
    Ok(missing)
}

fn validate_schema(conn: &Connection) -> CoachResult<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        let columns = table_columns(conn, table)?;
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();

        if !missing.is_empty() {
            return Err(CoachError::Storage(anyhow!(
                "table `{table}` is missing required columns: {}; point [storage].db_path at a coach database",
                missing.join(", ")
            )));
        }
    }

    Ok(())
}

fn ensure_required_indexes(conn: &Connection) -> CoachResult<()> {
    for index in REQUIRED_INDEXES {
        conn.execute_batch(index.create_sql)
            .storage_with(|| format!("ensure required index `{}`", index.name))?;
    }

    let existing_indexes = index_names(conn)?;
    let missing = REQUIRED_INDEXES
        .iter()
        .filter(|index| !existing_indexes.contains(index.name))
        .map(|index| index.name)
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(CoachError::Storage(anyhow!(
            "database is missing required indexes: {}",
            missing.join(", ")
        )));
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> CoachResult<bool> {
    let exists = conn
        .query_row(
            "
            SELECT EXISTS(
              SELECT 1
              FROM sqlite_master
              WHERE type = 'table' AND name = ?
            ) AS present
            ",
            params![table],
            |row| row.get::<_, i64>("present"),
        )
        .storage_with(|| format!("check table existence for {table}"))?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> CoachResult<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .storage_with(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>("name"))
        .storage_with(|| format!("query column info for {table}"))?;

    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .storage_with(|| format!("collect columns for {table}"))
}

fn index_names(conn: &Connection) -> CoachResult<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(
            "
            SELECT name
            FROM sqlite_master
            WHERE type = 'index'
              AND name NOT LIKE 'sqlite_%'
            ORDER BY name ASC
            ",
        )
        .storage("prepare index names query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>("name"))
        .storage("query index names")?;
    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .storage("collect index names")
}

fn configure_connection(conn: &Connection) -> CoachResult<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .storage("configure sqlite pragmas")
}

fn now_rfc3339() -> CoachResult<String> {
    format_timestamp(OffsetDateTime::now_utc())
}

fn format_timestamp(value: OffsetDateTime) -> CoachResult<String> {
    value.format(&Rfc3339).storage("format timestamp")
}

fn parse_datetime(raw: &str) -> anyhow::Result<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(value);
    }

    // SQLite's CURRENT_TIMESTAMP default.
    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    ) {
        return Ok(value.assume_utc());
    }

    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    ) {
        return Ok(value.assume_utc());
    }

    bail!("unsupported datetime format {raw:?}")
}

fn parse_date(raw: &str) -> anyhow::Result<Date> {
    if let Ok(value) = Date::parse(raw, &format_description!("[year]-[month]-[day]")) {
        return Ok(value);
    }

    let date_time = parse_datetime(raw)?;
    Ok(date_time.date())
}

fn parse_opt_date(raw: Option<String>) -> anyhow::Result<Option<Date>> {
    raw.as_deref()
        .filter(|value| !value.trim().is_empty())
        .map(parse_date)
        .transpose()
}

fn invalid_column(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn to_sql_error(error: anyhow::Error) -> rusqlite::Error {
    invalid_column(error.to_string())
}
