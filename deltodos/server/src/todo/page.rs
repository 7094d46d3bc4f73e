use serde::{Deserialize, Serialize};

use crate::todo::Todo;

/// Number of todos shown per page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Query string accepted by the todo list endpoints.
///
/// `page` is kept as text so that a malformed value falls back to the first
/// page instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
}

impl ListQuery {
    /// The requested page, never lower than 1.
    pub fn page_number(&self) -> u64 {
        self.page
            .as_deref()
            .and_then(|page| page.trim().parse::<u64>().ok())
            .unwrap_or(1)
            .max(1)
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }
}

#[derive(Serialize)]
struct PageLink<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<&'a str>,
    page: u64,
}

/// One page of an owner's todos plus what is needed to link to the neighbours.
#[derive(Debug, Clone, PartialEq)]
pub struct TodoPage {
    todos: Vec<Todo>,
    total: u64,
    page: u64,
    page_size: u64,
    last_page: u64,
    search: Option<String>,
}

impl TodoPage {
    pub fn new(
        todos: Vec<Todo>,
        total: u64,
        page: u64,
        page_size: u64,
        search: Option<String>,
    ) -> Self {
        let page_size = page_size.max(1);
        let last_page = total.div_ceil(page_size).max(1);
        Self {
            todos,
            total,
            page: page.max(1),
            page_size,
            last_page,
            search,
        }
    }

    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn into_todos(self) -> Vec<Todo> {
        self.todos
    }

    /// Number of matching todos across all pages.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn last_page(&self) -> u64 {
        self.last_page
    }

    /// The search filter the page was produced with.
    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.todos.is_empty()
    }

    /// 1-based position of the first todo on this page, 0 when empty.
    pub fn first_item(&self) -> u64 {
        if self.todos.is_empty() {
            0
        } else {
            (self.page - 1) * self.page_size + 1
        }
    }

    /// 1-based position of the last todo on this page, 0 when empty.
    pub fn last_item(&self) -> u64 {
        if self.todos.is_empty() {
            0
        } else {
            self.first_item() + self.todos.len() as u64 - 1
        }
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.last_page
    }

    /// Query string of the previous page, keeping the search filter.
    pub fn previous_query(&self) -> Option<String> {
        self.has_previous().then(|| self.query_for(self.page - 1))
    }

    /// Query string of the next page, keeping the search filter.
    pub fn next_query(&self) -> Option<String> {
        self.has_next().then(|| self.query_for(self.page + 1))
    }

    pub fn query_for(&self, page: u64) -> String {
        let link = PageLink {
            search: self.search(),
            page,
        };
        serde_urlencoded::to_string(&link).unwrap_or_else(|_| format!("page={}", page))
    }
}
