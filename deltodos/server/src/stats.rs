//! Dashboard and statistics pages computed from an owner's todo list.

use askama::Template;
use axum::Router;
use axum::extract::{Extension, State};
use axum::response::Html;
use axum::routing::get;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::CurrentUser;
use crate::entities::todo::{Priority, Status};
use crate::todo::web::{TodoState, TodoWebError};
use crate::todo::Todo;

/// Number of todos listed under "recent activity" on the dashboard.
pub const RECENT_ACTIVITY_LIMIT: u64 = 5;

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Todos created on one weekday, split by whether they are complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DayActivity {
    pub day: String,
    pub completed: u64,
    pub open: u64,
}

/// How many todos carry one priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PriorityCount {
    pub priority: String,
    pub count: u64,
    /// Share of all todos, rounded to a whole percent.
    pub percentage: u64,
}

/// Summary of an owner's todos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TodoStats {
    pub total: u64,
    pub pending: u64,
    pub in_progress: u64,
    pub complete: u64,
    /// Percentage of complete todos with one decimal, "0" without todos.
    pub completion_rate: String,
    pub priorities: Vec<PriorityCount>,
    pub weekly: Vec<DayActivity>,
}

impl TodoStats {
    pub fn from_todos(todos: &[Todo]) -> Self {
        let total = todos.len() as u64;
        let count_status = |status: Status| {
            todos
                .iter()
                .filter(|todo| todo.status() == status)
                .count() as u64
        };
        let complete = count_status(Status::Complete);

        let completion_rate = if total == 0 {
            "0".to_string()
        } else {
            format!("{:.1}", complete as f64 * 100.0 / total as f64)
        };

        let priorities = [
            ("low", Some(Priority::Low)),
            ("medium", Some(Priority::Medium)),
            ("high", Some(Priority::High)),
            ("none", None),
        ]
        .into_iter()
        .map(|(name, priority)| {
            let count = todos
                .iter()
                .filter(|todo| todo.priority() == priority)
                .count() as u64;
            PriorityCount {
                priority: name.to_string(),
                count,
                percentage: percentage_of(count, total),
            }
        })
        .collect();

        let mut weekly: Vec<DayActivity> = WEEKDAYS
            .iter()
            .map(|day| DayActivity {
                day: day.to_string(),
                completed: 0,
                open: 0,
            })
            .collect();
        for todo in todos {
            let day = &mut weekly[todo.created_at().weekday().num_days_from_sunday() as usize];
            if todo.status() == Status::Complete {
                day.completed += 1;
            } else {
                day.open += 1;
            }
        }

        Self {
            total,
            pending: count_status(Status::Pending),
            in_progress: count_status(Status::InProgress),
            complete,
            completion_rate,
            priorities,
            weekly,
        }
    }

    /// Largest number of todos created on a single weekday, at least 1.
    pub fn busiest_day_total(&self) -> u64 {
        self.weekly
            .iter()
            .map(|day| day.completed + day.open)
            .max()
            .unwrap_or(0)
            .max(1)
    }

    /// Height of a weekday bar relative to the busiest day, in percent.
    pub fn bar_height(&self, day: &DayActivity) -> u64 {
        (day.completed + day.open) * 100 / self.busiest_day_total()
    }
}

fn percentage_of(count: u64, total: u64) -> u64 {
    if total == 0 {
        0
    } else {
        (count as f64 * 100.0 / total as f64).round() as u64
    }
}

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    title: &'static str,
    user: CurrentUser,
    stats: TodoStats,
    recent: Vec<Todo>,
}

#[derive(Template)]
#[template(path = "stats.html")]
struct StatsTemplate {
    title: &'static str,
    user: CurrentUser,
    stats: TodoStats,
}

/// Handler for GET / that shows the dashboard of the current user.
#[tracing::instrument(skip(state))]
pub async fn home_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Html<String>, TodoWebError> {
    let store = state.store();
    let todos = store.all_for_owner(&user.id).await?;
    let recent = store
        .recent_activity(&user.id, RECENT_ACTIVITY_LIMIT)
        .await?;
    let template = HomeTemplate {
        title: "Dashboard",
        stats: TodoStats::from_todos(&todos),
        user,
        recent,
    };
    template.render().map(Html).map_err(TodoWebError::from)
}

/// Handler for GET /stats that shows the statistics of the current user.
#[tracing::instrument(skip(state))]
pub async fn stats_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Html<String>, TodoWebError> {
    let todos = state.store().all_for_owner(&user.id).await?;
    let template = StatsTemplate {
        title: "Statistics",
        stats: TodoStats::from_todos(&todos),
        user,
    };
    template.render().map(Html).map_err(TodoWebError::from)
}

/// Creates the router for the dashboard and statistics pages.
pub fn create_dashboard_router(state: Arc<TodoState>) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}
