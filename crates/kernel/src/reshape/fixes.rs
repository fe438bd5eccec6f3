//! Deferred post-processing instructions.
//!
//! Handlers that shape a query also know how the raw rows must be reshaped
//! afterwards. They hand back [`ScheduledFix`]es, which collect in a
//! [`FixSchedule`] until the rows arrive.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cast::CastKind;
use super::path::require_valid_path;
use crate::error::Result;
use crate::richparam::Modifiers;

/// Path → fix, in scheduling order.
pub type FixSet = IndexMap<String, FixDescriptor>;

/// What to do with the value at one row path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FixDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cast: Option<CastKind>,
    /// Destination path; the source is removed when it differs.
    #[serde(rename = "move", skip_serializing_if = "Option::is_none")]
    pub move_to: Option<String>,
    /// Remove the path. A deleting fix does nothing else.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub delete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nest_collection: Option<NestSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nest_single: Option<NestSpec>,
    /// Named value filter applied to the value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Named value filter applied after `filter`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_filter: Option<String>,
    /// Named value filter that receives the whole row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub m_filter: Option<String>,
    /// Extra paths whose values join the primary value as template arguments.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub additional_filter_values: Vec<String>,
}

impl FixDescriptor {
    pub fn cast(kind: CastKind) -> Self {
        Self {
            cast: Some(kind),
            ..Self::default()
        }
    }

    pub fn delete() -> Self {
        Self {
            delete: true,
            ..Self::default()
        }
    }

    pub fn moved_to(path: impl Into<String>) -> Self {
        Self::default().with_move(path)
    }

    pub fn nest_collection(spec: NestSpec) -> Self {
        Self {
            nest_collection: Some(spec),
            ..Self::default()
        }
    }

    pub fn nest_single(spec: NestSpec) -> Self {
        Self {
            nest_single: Some(spec),
            ..Self::default()
        }
    }

    pub fn with_move(mut self, path: impl Into<String>) -> Self {
        self.move_to = Some(path.into());
        self
    }

    pub fn with_cast(mut self, kind: CastKind) -> Self {
        self.cast = Some(kind);
        self
    }

    pub fn with_filter(mut self, name: impl Into<String>) -> Self {
        self.filter = Some(name.into());
        self
    }

    pub fn with_c_filter(mut self, name: impl Into<String>) -> Self {
        self.c_filter = Some(name.into());
        self
    }

    pub fn with_m_filter(mut self, name: impl Into<String>) -> Self {
        self.m_filter = Some(name.into());
        self
    }

    pub fn with_additional_filter_values<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.additional_filter_values = paths.into_iter().map(Into::into).collect();
        self
    }
}

/// A nested fetch: which resource to ask and how to build its filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestSpec {
    /// Name the target resource is registered under.
    pub model: String,
    /// `printf`-style filter rendered with the row value, e.g. `project:is(%d)`.
    pub filter_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user: Option<Uuid>,
    /// Include modifiers forwarded to the nested fetch (`filter`, `include`,
    /// `order`, `limit`, `page`, `filterMode`).
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub params: Modifiers,
}

impl NestSpec {
    pub fn new(model: impl Into<String>, filter_template: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            filter_template: filter_template.into(),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user: Option<Uuid>) -> Self {
        self.current_user = user;
        self
    }

    pub fn with_params(mut self, params: Modifiers) -> Self {
        self.params = params;
        self
    }
}

/// A fix together with the row path it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledFix {
    pub path: String,
    pub fix: FixDescriptor,
}

impl ScheduledFix {
    pub fn new(path: impl Into<String>, fix: FixDescriptor) -> Self {
        Self {
            path: path.into(),
            fix,
        }
    }
}

/// Fixes accumulated while a request is resolved.
#[derive(Debug, Clone, Default)]
pub struct FixSchedule {
    fixes: FixSet,
}

impl FixSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fix. A later fix for the same path replaces the earlier one but
    /// keeps its position.
    pub fn schedule(&mut self, scheduled: ScheduledFix) -> Result<()> {
        require_valid_path(&scheduled.path)?;
        if let Some(destination) = &scheduled.fix.move_to {
            require_valid_path(destination)?;
        }
        self.fixes.insert(scheduled.path, scheduled.fix);
        Ok(())
    }

    pub fn schedule_all(&mut self, fixes: impl IntoIterator<Item = ScheduledFix>) -> Result<()> {
        fixes.into_iter().try_for_each(|fix| self.schedule(fix))
    }

    pub fn get(&self, path: &str) -> Option<&FixDescriptor> {
        self.fixes.get(path)
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    /// Take every scheduled fix, leaving the schedule empty.
    pub fn flush(&mut self) -> FixSet {
        std::mem::take(&mut self.fixes)
    }
}
