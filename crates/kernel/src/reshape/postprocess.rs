//! Row post-processing.
//!
//! Applies a flushed [`FixSet`] to raw rows: casts, nested fetches, value
//! filters and moves run per fix in scheduling order; deletions run once the
//! whole set is through.

use serde_json::{Map, Value};

use super::cast::{to_integer, to_string};
use super::fixes::{FixDescriptor, FixSet, NestSpec};
use super::meta::Meta;
use super::path;
use super::reorganizer::{Reorganizer, Task};
use super::value_filters::ValueFilterRegistry;
use crate::error::{Error, Result};
use crate::gather::registry::FetcherProvider;
use crate::gather::types::{NestedParams, QueryContext};

/// Whether nested fetches of a row contribute to the metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaMode {
    Merge,
    Skip,
}

/// Reshapes raw rows of one retrieval.
pub struct PostProcessor<'a> {
    fetchers: &'a dyn FetcherProvider,
    filters: &'a ValueFilterRegistry,
    ctx: &'a QueryContext,
}

impl<'a> PostProcessor<'a> {
    pub fn new(
        fetchers: &'a dyn FetcherProvider,
        filters: &'a ValueFilterRegistry,
        ctx: &'a QueryContext,
    ) -> Self {
        Self {
            fetchers,
            filters,
            ctx,
        }
    }

    /// Apply `fixes` to every row.
    ///
    /// Rows share one shape, so only the first row's nested fetches are
    /// merged into `meta`.
    pub fn apply(&self, rows: &mut [Value], fixes: &FixSet, meta: &mut Meta) -> Result<()> {
        for (index, row) in rows.iter_mut().enumerate() {
            let mode = if index == 0 {
                MetaMode::Merge
            } else {
                MetaMode::Skip
            };
            self.apply_to_row(row, fixes, mode, meta)?;
        }
        Ok(())
    }

    /// Apply `fixes` to a single row.
    pub fn apply_to_row(
        &self,
        row: &mut Value,
        fixes: &FixSet,
        mode: MetaMode,
        meta: &mut Meta,
    ) -> Result<()> {
        flatten_row(row);
        let mut reorganizer = Reorganizer::new();

        for (source, fix) in fixes {
            if fix.delete {
                reorganizer.schedule_deletion(source.clone());
                continue;
            }
            self.apply_fix(row, source, fix, mode, meta, &mut reorganizer)?;
        }

        reorganizer.flush_deletions(row);
        Ok(())
    }

    fn apply_fix(
        &self,
        row: &mut Value,
        source: &str,
        fix: &FixDescriptor,
        mode: MetaMode,
        meta: &mut Meta,
        reorganizer: &mut Reorganizer,
    ) -> Result<()> {
        if let Some(kind) = fix.cast {
            path::cast(row, source, kind);
        }

        let mut value = path::read(row, source).cloned().unwrap_or(Value::Null);
        let mut transformed = false;

        if !fix.additional_filter_values.is_empty() {
            let mut values = Vec::with_capacity(fix.additional_filter_values.len() + 1);
            values.push(value);
            for extra in &fix.additional_filter_values {
                values.push(path::read(row, extra).cloned().unwrap_or(Value::Null));
            }
            value = Value::Array(values);
        }

        let placement = fix.move_to.as_deref().unwrap_or(source);

        if let Some(spec) = &fix.nest_collection {
            value = self.nest_collection(&value, spec, placement, mode, meta)?;
            transformed = true;
        }
        if let Some(spec) = &fix.nest_single {
            value = self.nest_single(&value, spec, placement, mode, meta)?;
            transformed = true;
        }
        for name in [&fix.filter, &fix.c_filter].into_iter().flatten() {
            value = self.filters.apply(name, value, self.ctx.current_user)?;
            transformed = true;
        }
        if let Some(name) = &fix.m_filter {
            value = self
                .filters
                .apply(name, row.clone(), self.ctx.current_user)?;
            transformed = true;
        }

        match &fix.move_to {
            Some(destination) => {
                reorganizer.execute(row, &mut value, Task::write(destination.clone()))?;
                if destination != source {
                    reorganizer.schedule_deletion(source.to_string());
                }
            }
            None if transformed => path::write(row, source, value),
            None => {}
        }
        Ok(())
    }

    fn nest_collection(
        &self,
        value: &Value,
        spec: &NestSpec,
        placement: &str,
        mode: MetaMode,
        meta: &mut Meta,
    ) -> Result<Value> {
        let template_filter = format_filter_template(&spec.filter_template, value)?;
        let request = NestedParams::from_modifiers(&spec.params).into_request(&template_filter);
        let ctx = self.ctx.nested(spec.current_user);

        tracing::debug!(model = %spec.model, filter = %request.filter, depth = ctx.depth, "nested collection fetch");
        let page = self
            .fetchers
            .fetcher(&spec.model)?
            .find_multiple(&ctx, &request)?;

        if mode == MetaMode::Merge {
            meta.merge_nested(&page.meta, placement);
        }
        Ok(Value::Array(page.data))
    }

    fn nest_single(
        &self,
        value: &Value,
        spec: &NestSpec,
        placement: &str,
        mode: MetaMode,
        meta: &mut Meta,
    ) -> Result<Value> {
        let template_filter = format_filter_template(&spec.filter_template, value)?;
        let params = NestedParams::from_modifiers(&spec.params);
        let mut request = params.into_request(&template_filter);
        request.limit = 0;
        request.page = 1;
        let ctx = self.ctx.nested(spec.current_user);

        tracing::debug!(model = %spec.model, filter = %request.filter, depth = ctx.depth, "nested single fetch");
        let single = self.fetchers.fetcher(&spec.model)?.find_one(&ctx, &request)?;

        Ok(match single {
            Some(single) => {
                if mode == MetaMode::Merge {
                    meta.merge_nested(&single.meta, placement);
                }
                single.data
            }
            None => Value::Null,
        })
    }
}

/// Lift an extra result layer into the row.
///
/// Some backends return a row as `{"0": {...entity...}, "extra": 1}`. The
/// entity's entries become the row, and the other top-level entries are
/// merged over them.
pub fn flatten_row(row: &mut Value) {
    let needs_flattening = match row {
        Value::Object(map) => map.get("0").is_some_and(Value::is_object),
        Value::Array(items) => items.first().is_some_and(Value::is_object),
        _ => false,
    };
    if !needs_flattening {
        return;
    }

    let mut entries: Map<String, Value> = match row.take() {
        Value::Object(map) => map,
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, value)| (index.to_string(), value))
            .collect(),
        _ => Map::new(),
    };
    let mut flattened = match entries.remove("0") {
        Some(Value::Object(entity)) => entity,
        _ => Map::new(),
    };
    for (key, value) in entries {
        flattened.insert(key, value);
    }
    *row = Value::Object(flattened);
}

/// Render a `printf`-style filter template.
///
/// `%s` takes the next argument as text, `%d` as an integer and `%%` is a
/// literal percent sign. An array value supplies one argument per element;
/// any other value is the single argument.
pub fn format_filter_template(template: &str, value: &Value) -> Result<String> {
    let arguments: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let mut next_argument = arguments.iter();
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(conversion @ ('s' | 'd')) => {
                let argument = next_argument.next().ok_or_else(|| Error::TemplateArguments {
                    template: template.to_string(),
                    given: arguments.len(),
                })?;
                if conversion == 's' {
                    out.push_str(&to_string(argument));
                } else {
                    out.push_str(&to_integer(argument).to_string());
                }
            }
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    Ok(out)
}
