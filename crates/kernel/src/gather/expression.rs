//! Column expression builder.
//!
//! Turns the modifiers of one filter field into a SeaQuery [`Condition`].
//! Each column kind accepts a fixed modifier set; every modifier contributes
//! one sub-expression and the sub-expressions are ANDed. Fields backed by a
//! correlated subquery go through [`conditions_for_subquery`] instead.

use sea_query::{
    Cond, Condition, Expr, ExprTrait, Func, SelectStatement, SimpleExpr, SubQueryStatement,
    Value as SqlValue,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::QueryContext;
use crate::error::{Error, Result};
use crate::reshape::value_filters::parse_datetime;
use crate::richparam::Modifiers;

/// Type of the column a filter field maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Integer,
    String,
    Datetime,
    /// A reference to another record (uuid or integer key).
    Entity,
}

impl ColumnKind {
    /// Modifiers a filter on this kind of column may use.
    pub fn allowed_modifiers(self) -> &'static [&'static str] {
        match self {
            ColumnKind::Integer | ColumnKind::Datetime => {
                &["is", "not", "gt", "gte", "lt", "lte", "false", "true"]
            }
            ColumnKind::String => &["contain", "contains", "is", "not", "false", "true"],
            ColumnKind::Entity => &["false", "true", "is", "not", "me", "notme"],
        }
    }

    fn argument_value(self, field: &str, modifier: &str, argument: &str) -> Result<SqlValue> {
        let invalid = || Error::InvalidArgument {
            field: field.to_string(),
            modifier: modifier.to_string(),
            argument: argument.to_string(),
        };
        let trimmed = argument.trim();
        match self {
            ColumnKind::Integer => trimmed
                .parse::<i64>()
                .map(SqlValue::from)
                .map_err(|_| invalid()),
            ColumnKind::String => Ok(SqlValue::from(argument.to_string())),
            ColumnKind::Datetime => parse_datetime(trimmed)
                .map(|dt| SqlValue::from(dt.to_rfc3339()))
                .ok_or_else(invalid),
            ColumnKind::Entity => match trimmed.parse::<Uuid>() {
                Ok(id) => Ok(SqlValue::from(id)),
                Err(_) => trimmed
                    .parse::<i64>()
                    .map(SqlValue::from)
                    .map_err(|_| invalid()),
            },
        }
    }
}

/// Reject modifiers the column kind does not support.
pub fn check_modifiers(kind: ColumnKind, field: &str, modifiers: &Modifiers) -> Result<()> {
    check_allowed(kind.allowed_modifiers(), field, modifiers)
}

fn check_allowed(allowed: &[&str], field: &str, modifiers: &Modifiers) -> Result<()> {
    if modifiers.keys().all(|modifier| allowed.contains(&modifier.as_str())) {
        return Ok(());
    }
    Err(Error::InvalidModifierUsed {
        field: field.to_string(),
        allowed: allowed.iter().map(|m| (*m).to_string()).collect(),
    })
}

/// Build the condition for filtering `column` by `field:modifiers`.
pub fn conditions_for_column(
    kind: ColumnKind,
    column: SimpleExpr,
    field: &str,
    modifiers: &Modifiers,
    ctx: &QueryContext,
) -> Result<Condition> {
    check_modifiers(kind, field, modifiers)?;

    let mut condition = Cond::all();
    for (modifier, arguments) in modifiers {
        condition = condition.add(modifier_expression(
            kind,
            column.clone(),
            field,
            modifier,
            arguments,
            ctx,
        )?);
    }
    Ok(condition)
}

fn modifier_expression(
    kind: ColumnKind,
    column: SimpleExpr,
    field: &str,
    modifier: &str,
    arguments: &[String],
    ctx: &QueryContext,
) -> Result<SimpleExpr> {
    let values = || -> Result<Vec<SqlValue>> {
        arguments
            .iter()
            .map(|argument| kind.argument_value(field, modifier, argument))
            .collect()
    };

    Ok(match modifier {
        "is" => column.is_in(values()?),
        "not" => column.is_not_in(values()?),
        "gt" | "gte" | "lt" | "lte" => {
            let mut any = Cond::any();
            for value in values()? {
                any = any.add(match modifier {
                    "gt" => column.clone().gt(value),
                    "gte" => column.clone().gte(value),
                    "lt" => column.clone().lt(value),
                    _ => column.clone().lte(value),
                });
            }
            any.into()
        }
        "false" => empty_expression(kind, column),
        "true" => non_empty_expression(kind, column),
        "contain" | "contains" => {
            let mut any = Cond::any();
            for argument in arguments {
                any = any.add(
                    column
                        .clone()
                        .like(format!("%{}%", escape_like_wildcards(argument))),
                );
            }
            any.into()
        }
        "me" | "notme" => {
            let user = ctx
                .current_user
                .ok_or_else(|| Error::UserRequired(modifier.to_string()))?;
            if modifier == "me" {
                column.eq(user)
            } else {
                column.ne(user)
            }
        }
        other => {
            return Err(Error::InvalidModifierUsed {
                field: field.to_string(),
                allowed: vec![other.to_string()],
            });
        }
    })
}

fn empty_expression(kind: ColumnKind, column: SimpleExpr) -> SimpleExpr {
    match kind {
        ColumnKind::Integer => coalesce_zero(column).eq(0),
        ColumnKind::String => Cond::any()
            .add(column.clone().is_null())
            .add(column.eq(""))
            .into(),
        ColumnKind::Datetime | ColumnKind::Entity => column.is_null(),
    }
}

fn non_empty_expression(kind: ColumnKind, column: SimpleExpr) -> SimpleExpr {
    match kind {
        ColumnKind::Integer => coalesce_zero(column).ne(0),
        ColumnKind::String => Cond::all()
            .add(column.clone().is_not_null())
            .add(column.ne(""))
            .into(),
        ColumnKind::Datetime | ColumnKind::Entity => column.is_not_null(),
    }
}

fn coalesce_zero(column: SimpleExpr) -> Expr {
    Expr::expr(Func::coalesce([column, SimpleExpr::Value(SqlValue::from(0))]))
}

// ---------------------------------------------------------------------------
// Subqueries
// ---------------------------------------------------------------------------

/// Shape of the value a correlated subquery yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubqueryKind {
    /// At most one integer, e.g. a `COUNT(*)`.
    Integer,
    IntegerCollection,
    StringCollection,
    /// At most one timestamp, e.g. a `MAX(created)`.
    Datetime,
}

impl SubqueryKind {
    /// Modifiers a filter on this kind of subquery may use.
    pub fn allowed_modifiers(self) -> &'static [&'static str] {
        match self {
            SubqueryKind::Integer => &["false", "true", "gt", "gte", "lt", "lte", "eq", "null"],
            SubqueryKind::IntegerCollection | SubqueryKind::StringCollection => &["anyis"],
            SubqueryKind::Datetime => &["false", "true"],
        }
    }
}

/// Build the condition for filtering by the value `subquery` yields.
///
/// An integer subquery without rows counts as `0` for `false`, and fails
/// every comparison. `null` matches only when there are no rows at all.
pub fn conditions_for_subquery(
    kind: SubqueryKind,
    subquery: &SelectStatement,
    field: &str,
    modifiers: &Modifiers,
) -> Result<Condition> {
    check_allowed(kind.allowed_modifiers(), field, modifiers)?;

    let mut condition = Cond::all();
    for (modifier, arguments) in modifiers {
        condition = condition.add(subquery_expression(
            kind, subquery, field, modifier, arguments,
        )?);
    }
    Ok(condition)
}

fn subquery_expression(
    kind: SubqueryKind,
    subquery: &SelectStatement,
    field: &str,
    modifier: &str,
    arguments: &[String],
) -> Result<SimpleExpr> {
    let exists = || Expr::exists(subquery.clone());
    let scalar = || {
        SimpleExpr::SubQuery(
            None,
            Box::new(SubQueryStatement::SelectStatement(subquery.clone())),
        )
    };
    let invalid = |argument: &str| Error::InvalidArgument {
        field: field.to_string(),
        modifier: modifier.to_string(),
        argument: argument.to_string(),
    };

    Ok(match (kind, modifier) {
        (SubqueryKind::Integer, "false") => Cond::any()
            .add(exists().not())
            .add(scalar().eq(0))
            .into(),
        (SubqueryKind::Integer, "true") => {
            Cond::all().add(exists()).add(scalar().ne(0)).into()
        }
        (SubqueryKind::Integer, "null") => exists().not(),
        (SubqueryKind::Integer, "gt" | "gte" | "lt" | "lte" | "eq") => {
            let argument = arguments.first().map(String::as_str).unwrap_or_default();
            let bound = argument
                .trim()
                .parse::<i64>()
                .map_err(|_| invalid(argument))?;
            let comparison = match modifier {
                "gt" => scalar().gt(bound),
                "gte" => scalar().gte(bound),
                "lt" => scalar().lt(bound),
                "lte" => scalar().lte(bound),
                _ => scalar().eq(bound),
            };
            Cond::all().add(exists()).add(comparison).into()
        }
        (SubqueryKind::IntegerCollection | SubqueryKind::StringCollection, "anyis") => {
            let mut any = Cond::any();
            for argument in arguments {
                let value = if kind == SubqueryKind::IntegerCollection {
                    argument
                        .trim()
                        .parse::<i64>()
                        .map(SqlValue::from)
                        .map_err(|_| invalid(argument))?
                } else {
                    SqlValue::from(argument.to_string())
                };
                any = any.add(SimpleExpr::Value(value).eq(Expr::any(subquery.clone())));
            }
            any.into()
        }
        (SubqueryKind::Datetime, "false") => Cond::any()
            .add(exists().not())
            .add(scalar().is_null())
            .into(),
        (SubqueryKind::Datetime, "true") => Cond::all()
            .add(exists())
            .add(scalar().is_not_null())
            .into(),
        (_, other) => {
            return Err(Error::InvalidModifierUsed {
                field: field.to_string(),
                allowed: vec![other.to_string()],
            });
        }
    })
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
pub fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
