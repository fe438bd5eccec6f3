//! Retrieval types.
//!
//! Provides the request and response shapes of the resource engine:
//! - QueryContext: who is asking, in which language, how deeply nested
//! - FetchRequest: the three rich parameters plus paging
//! - Page / SingleResult: post-processed rows with their metadata
//! - NestedParams: include modifiers turned into a nested fetch request

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reshape::Meta;
use crate::reshape::cast::to_integer;
use crate::richparam::Modifiers;

/// Caller context for one retrieval.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryContext {
    /// Authenticated user, if any.
    pub current_user: Option<Uuid>,

    /// Requested language; empty means the resource default.
    pub language: String,

    /// Nesting depth; 0 for the outermost retrieval.
    pub depth: u8,
}

impl QueryContext {
    /// Context of an anonymous caller.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Context of an authenticated caller.
    pub fn for_user(user: Uuid) -> Self {
        Self {
            current_user: Some(user),
            ..Self::default()
        }
    }

    /// Set the language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Context for a fetch nested one level below this one.
    pub fn nested(&self, current_user: Option<Uuid>) -> Self {
        Self {
            current_user,
            language: self.language.clone(),
            depth: self.depth.saturating_add(1),
        }
    }
}

/// How top-level filters are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinMode {
    #[default]
    And,
    Or,
}

impl FromStr for JoinMode {
    type Err = std::convert::Infallible;

    /// `OR` in any case selects [`JoinMode::Or`]; anything else is `AND`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s.trim().eq_ignore_ascii_case("or") {
            JoinMode::Or
        } else {
            JoinMode::And
        })
    }
}

impl fmt::Display for JoinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinMode::And => "AND",
            JoinMode::Or => "OR",
        })
    }
}

/// A multi-row retrieval request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchRequest {
    /// Filter rich parameter.
    pub filter: String,

    /// Include rich parameter.
    pub include: String,

    /// Order rich parameter.
    pub order: String,

    /// Page size; 0 means unlimited.
    pub limit: u64,

    /// 1-based page number; 0 is treated as 1.
    pub page: u64,

    /// How the top-level filters are joined.
    pub join_mode: JoinMode,
}

impl Default for FetchRequest {
    fn default() -> Self {
        Self {
            filter: String::new(),
            include: String::new(),
            order: String::new(),
            limit: 0,
            page: 1,
            join_mode: JoinMode::And,
        }
    }
}

impl FetchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn include(mut self, include: impl Into<String>) -> Self {
        self.include = include.into();
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = order.into();
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn page(mut self, page: u64) -> Self {
        self.page = page;
        self
    }

    pub fn join_mode(mut self, join_mode: JoinMode) -> Self {
        self.join_mode = join_mode;
        self
    }
}

/// One page of post-processed rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// `ceil(rows / pageSize)`, or 1 when unlimited.
    pub total_pages: u64,

    /// Filter string the page was produced with.
    pub filter: String,

    /// Include string the page was produced with.
    pub include: String,

    /// 1-based page number.
    pub page: u64,

    /// Page size; 0 means unlimited.
    pub page_size: u64,

    /// Post-processed rows.
    pub data: Vec<serde_json::Value>,

    /// Where each resource kind appears in `data` items.
    pub meta: Meta,
}

/// A single post-processed row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleResult {
    /// The row.
    pub data: serde_json::Value,

    /// Where each resource kind appears in `data`.
    pub meta: Meta,
}

impl SingleResult {
    /// The row with its metadata attached under `meta`.
    pub fn into_value(self) -> serde_json::Value {
        let mut data = self.data;
        if let serde_json::Value::Object(map) = &mut data {
            map.insert(
                "meta".to_string(),
                serde_json::to_value(&self.meta).unwrap_or_default(),
            );
        }
        data
    }
}

/// Include modifiers that steer a nested fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedParams {
    pub filter: String,
    pub include: String,
    pub order: String,
    pub limit: u64,
    pub page: u64,
    pub filter_mode: JoinMode,
}

impl Default for NestedParams {
    fn default() -> Self {
        Self {
            filter: String::new(),
            include: String::new(),
            order: String::new(),
            limit: 0,
            page: 1,
            filter_mode: JoinMode::And,
        }
    }
}

impl NestedParams {
    /// Read `filter`, `include`, `order` (arguments joined with `,`), `limit`,
    /// `page` and `filterMode` (first argument) from include modifiers.
    pub fn from_modifiers(modifiers: &Modifiers) -> Self {
        let joined = |name: &str| {
            modifiers
                .get(name)
                .map(|arguments| arguments.join(","))
                .unwrap_or_default()
        };
        let number = |name: &str, default: u64| match modifiers.get(name) {
            None => default,
            Some(arguments) => arguments.first().map_or(0, |argument| {
                u64::try_from(to_integer(&serde_json::Value::String(argument.clone())))
                    .unwrap_or(0)
            }),
        };

        Self {
            filter: joined("filter"),
            include: joined("include"),
            order: joined("order"),
            limit: number("limit", 0),
            page: number("page", 1),
            filter_mode: modifiers
                .get("filterMode")
                .and_then(|arguments| arguments.first())
                .and_then(|mode| mode.parse().ok())
                .unwrap_or_default(),
        }
    }

    /// A fetch request for the nested resource. `template_filter` is the
    /// rendered filter template; the caller's own filter is put in front.
    pub fn into_request(self, template_filter: &str) -> FetchRequest {
        let filter = if self.filter.is_empty() {
            template_filter.to_string()
        } else {
            format!("{},{template_filter}", self.filter)
        };
        FetchRequest {
            filter,
            include: self.include,
            order: self.order,
            limit: self.limit,
            page: self.page,
            join_mode: self.filter_mode,
        }
    }
}
