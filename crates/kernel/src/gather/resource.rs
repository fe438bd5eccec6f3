//! Resources: the unit the query language is spoken against.
//!
//! A [`Resource`] couples a base table with three whitelists (filter,
//! include, order), the handlers serving the whitelisted fields, defaults
//! and a [`RowSource`] that executes the generated statements.
//!
//! Retrieval runs in two passes over the statement:
//! - the *incomplete* statement carries only the filters and is reused for
//!   counting;
//! - the *complete* statement adds `DISTINCT <table>.*`, includes, order and
//!   paging, and collects the fixes applied to the returned rows.

use std::sync::Arc;

use sea_query::{
    Alias, Asterisk, Cond, Condition, Expr, Order, PostgresQueryBuilder, Query, SelectStatement,
};
use serde_json::Value;

use super::expression::{ColumnKind, SubqueryKind};
use super::handlers::{
    ColumnFilter, ColumnOrder, FilterHandler, HandlerArgs, HandlerRegistry, IncludeHandler,
    NestedInclude, OrderHandler, SubqueryFilter, TranslatedColumn,
};
use super::registry::ResourceRegistry;
use super::sequence::AliasSequence;
use super::types::{FetchRequest, JoinMode, Page, QueryContext, SingleResult};
use crate::config::EngineConfig;
use crate::error::{DirectiveKind, Error, Result};
use crate::reshape::fixes::{FixSchedule, FixSet, ScheduledFix};
use crate::reshape::meta::Meta;
use crate::reshape::postprocess::PostProcessor;
use crate::richparam::{
    Directive, Modifiers, Whitelist, WhitelistEntry, parse_rich_param, resolve_includes,
};

/// Modifier listing the fields an `any` / `all` filter spans.
pub const FIELDS_MODIFIER: &str = "fields";

static NO_CONFIG: Value = Value::Null;

/// Executes statements for a resource.
pub trait RowSource: Send + Sync {
    /// Rows selected by `statement`, one JSON object per row keyed by column.
    fn fetch(&self, statement: &SelectStatement) -> anyhow::Result<Vec<Value>>;

    /// The single number selected by `statement`.
    fn count(&self, statement: &SelectStatement) -> anyhow::Result<u64>;
}

/// A queryable resource. Build one with [`Resource::builder`].
pub struct Resource {
    model: String,
    table: String,
    primary_key: String,
    filter_whitelist: Whitelist,
    include_whitelist: Whitelist,
    order_whitelist: Whitelist,
    default_includes: Directive,
    default_order: Directive,
    default_fixes: Vec<ScheduledFix>,
    handlers: HandlerRegistry,
    source: Arc<dyn RowSource>,
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("model", &self.model)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

/// What the handlers of one retrieval share besides the request.
#[derive(Clone, Copy)]
struct Scope<'s> {
    config: &'s EngineConfig,
    aliases: &'s AliasSequence,
}

/// Statements and post-processing state of one retrieval.
struct Prepared {
    incomplete: SelectStatement,
    complete: SelectStatement,
    meta: Meta,
    fixes: FixSet,
}

impl Resource {
    pub fn builder(
        model: impl Into<String>,
        table: impl Into<String>,
        source: Arc<dyn RowSource>,
    ) -> ResourceBuilder {
        ResourceBuilder::new(model, table, source)
    }

    /// Name the resource is registered and reported under.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn filter_whitelist(&self) -> &Whitelist {
        &self.filter_whitelist
    }

    pub fn include_whitelist(&self) -> &Whitelist {
        &self.include_whitelist
    }

    pub fn order_whitelist(&self) -> &Whitelist {
        &self.order_whitelist
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Includes whose values depend on the request language.
    pub fn translatable_include_names(&self) -> Vec<&str> {
        self.include_whitelist.translatable_fields()
    }

    pub(crate) fn find_multiple(
        &self,
        registry: &ResourceRegistry,
        ctx: &QueryContext,
        request: &FetchRequest,
    ) -> Result<Page> {
        let page = request.page.max(1);
        let mut prepared = self.prepare(registry.config(), ctx, request)?;
        paginate(&mut prepared.complete, request);

        let total_pages = if request.limit > 0 {
            self.count(registry.config(), &prepared.incomplete)?
                .div_ceil(request.limit)
        } else {
            1
        };

        let mut rows = self.fetch(registry.config(), &prepared.complete)?;
        PostProcessor::new(registry, registry.value_filters(), ctx).apply(
            &mut rows,
            &prepared.fixes,
            &mut prepared.meta,
        )?;

        tracing::debug!(
            resource = %self.model,
            page,
            rows = rows.len(),
            total_pages,
            depth = ctx.depth,
            "page retrieved"
        );

        Ok(Page {
            total_pages,
            filter: request.filter.clone(),
            include: request.include.clone(),
            page,
            page_size: request.limit,
            data: rows,
            meta: prepared.meta,
        })
    }

    pub(crate) fn find_one(
        &self,
        registry: &ResourceRegistry,
        ctx: &QueryContext,
        request: &FetchRequest,
    ) -> Result<Option<SingleResult>> {
        let mut prepared = self.prepare(registry.config(), ctx, request)?;
        prepared.complete.limit(1);

        let mut rows = self.fetch(registry.config(), &prepared.complete)?;
        rows.truncate(1);
        if rows.is_empty() {
            return Ok(None);
        }

        PostProcessor::new(registry, registry.value_filters(), ctx).apply(
            &mut rows,
            &prepared.fixes,
            &mut prepared.meta,
        )?;
        Ok(rows.pop().map(|data| SingleResult {
            data,
            meta: prepared.meta,
        }))
    }

    pub(crate) fn count_rows(
        &self,
        registry: &ResourceRegistry,
        ctx: &QueryContext,
        filter: &str,
        join_mode: JoinMode,
    ) -> Result<u64> {
        self.check_depth(registry.config(), ctx)?;
        let aliases = AliasSequence::new();
        let scope = Scope {
            config: registry.config(),
            aliases: &aliases,
        };
        let incomplete = self.incomplete_statement(ctx, filter, join_mode, scope)?;
        self.count(registry.config(), &incomplete)
    }

    /// The complete statement `find_multiple` would run for `request`.
    pub(crate) fn statement_for_find_multiple(
        &self,
        config: &EngineConfig,
        ctx: &QueryContext,
        request: &FetchRequest,
    ) -> Result<SelectStatement> {
        let mut prepared = self.prepare(config, ctx, request)?;
        paginate(&mut prepared.complete, request);
        Ok(prepared.complete)
    }

    fn check_depth(&self, config: &EngineConfig, ctx: &QueryContext) -> Result<()> {
        if ctx.depth > config.max_nesting_depth {
            tracing::warn!(resource = %self.model, depth = ctx.depth, "nesting too deep");
            return Err(Error::RecursionTooDeep {
                depth: ctx.depth,
                limit: config.max_nesting_depth,
            });
        }
        Ok(())
    }

    fn prepare(
        &self,
        config: &EngineConfig,
        ctx: &QueryContext,
        request: &FetchRequest,
    ) -> Result<Prepared> {
        self.check_depth(config, ctx)?;

        let aliases = AliasSequence::new();
        let scope = Scope {
            config,
            aliases: &aliases,
        };
        let mut meta = Meta::new(&self.model, "", &ctx.language);
        let mut schedule = FixSchedule::new();

        let incomplete =
            self.incomplete_statement(ctx, &request.filter, request.join_mode, scope)?;
        let mut complete = incomplete.clone();
        complete
            .distinct()
            .column((Alias::new(&self.table), Asterisk));
        schedule.schedule_all(self.default_fixes.iter().cloned())?;
        self.add_includes(&mut complete, ctx, &request.include, &mut meta, &mut schedule, scope)?;
        self.add_order(&mut complete, ctx, &request.order, &mut schedule, scope)?;

        Ok(Prepared {
            incomplete,
            complete,
            meta,
            fixes: schedule.flush(),
        })
    }

    fn base_statement(&self) -> SelectStatement {
        let mut statement = Query::select();
        statement.from(Alias::new(&self.table));
        statement
    }

    fn incomplete_statement(
        &self,
        ctx: &QueryContext,
        filter: &str,
        join_mode: JoinMode,
        scope: Scope<'_>,
    ) -> Result<SelectStatement> {
        let mut statement = self.base_statement();
        let requested = parse_rich_param(filter).without_empty();
        if requested.is_empty() {
            return Ok(statement);
        }
        tracing::debug!(resource = %self.model, filter = ?requested, "applying filters");

        let mut condition = match join_mode {
            JoinMode::And => Cond::all(),
            JoinMode::Or => Cond::any(),
        };
        for (field, modifiers) in &requested {
            if !self.filter_whitelist.contains(field) {
                return Err(Error::UnknownField {
                    kind: DirectiveKind::Filter,
                    field: field.clone(),
                });
            }
            condition =
                condition.add(self.filter_condition(&mut statement, ctx, field, modifiers, scope)?);
        }
        statement.cond_where(condition);
        Ok(statement)
    }

    fn filter_condition(
        &self,
        statement: &mut SelectStatement,
        ctx: &QueryContext,
        field: &str,
        modifiers: &Modifiers,
        scope: Scope<'_>,
    ) -> Result<Condition> {
        match field {
            "any" if !self.handlers.contains(DirectiveKind::Filter, field) => {
                self.filter_across_fields(statement, ctx, field, modifiers, Cond::any(), scope)
            }
            "all" if !self.handlers.contains(DirectiveKind::Filter, field) => {
                self.filter_across_fields(statement, ctx, field, modifiers, Cond::all(), scope)
            }
            _ => {
                let args = HandlerArgs {
                    ctx,
                    field,
                    modifiers,
                    config: self.entry_config(&self.filter_whitelist, field),
                    table: &self.table,
                    primary_key: &self.primary_key,
                    aliases: scope.aliases,
                    languages: &scope.config.supported_languages,
                };
                self.handlers
                    .filter(field)?
                    .build_condition(statement, &args)
            }
        }
    }

    /// `any:fields(a|b):is(1)` → `a:is(1)` OR `b:is(1)`; `all` ANDs instead.
    fn filter_across_fields(
        &self,
        statement: &mut SelectStatement,
        ctx: &QueryContext,
        field: &str,
        modifiers: &Modifiers,
        mut combined: Condition,
        scope: Scope<'_>,
    ) -> Result<Condition> {
        let Some(fields) = modifiers.get(FIELDS_MODIFIER) else {
            return Err(Error::MissingDirective {
                filter: field.to_string(),
                directive: FIELDS_MODIFIER.to_string(),
                example: "fieldname1|fieldname2".to_string(),
            });
        };
        if let Some(unknown) = fields.iter().find(|f| !self.filter_whitelist.contains(f)) {
            return Err(Error::UnknownField {
                kind: DirectiveKind::Filter,
                field: unknown.clone(),
            });
        }

        let mut forwarded = modifiers.clone();
        forwarded.shift_remove(FIELDS_MODIFIER);
        for target in fields {
            combined =
                combined.add(self.filter_condition(statement, ctx, target, &forwarded, scope)?);
        }
        Ok(combined)
    }

    fn add_includes(
        &self,
        statement: &mut SelectStatement,
        ctx: &QueryContext,
        include: &str,
        meta: &mut Meta,
        schedule: &mut FixSchedule,
        scope: Scope<'_>,
    ) -> Result<()> {
        let requested =
            resolve_includes(include, &self.include_whitelist).union(&self.default_includes);
        if !requested.is_empty() {
            tracing::debug!(resource = %self.model, include = ?requested, "applying includes");
        }

        for (name, modifiers) in &requested {
            let Some(entry) = self.include_whitelist.get(name) else {
                tracing::warn!(resource = %self.model, include = %name, "skipping include that is not whitelisted");
                continue;
            };
            let args = HandlerArgs {
                ctx,
                field: name,
                modifiers,
                config: &entry.config,
                table: &self.table,
                primary_key: &self.primary_key,
                aliases: scope.aliases,
                languages: &scope.config.supported_languages,
            };
            let fixes = self.handlers.include(name)?.apply_include(statement, &args)?;
            schedule.schedule_all(fixes)?;
            if let Some(model) = &entry.model {
                meta.record(model, name);
            }
        }
        Ok(())
    }

    fn add_order(
        &self,
        statement: &mut SelectStatement,
        ctx: &QueryContext,
        order: &str,
        schedule: &mut FixSchedule,
        scope: Scope<'_>,
    ) -> Result<()> {
        let mut requested = parse_rich_param(order).without_empty();
        if requested.is_empty() {
            requested = self.default_order.clone();
        }

        for (field, modifiers) in &requested {
            if !self.order_whitelist.contains(field) {
                return Err(Error::UnknownField {
                    kind: DirectiveKind::Order,
                    field: field.clone(),
                });
            }
            let direction = if modifiers.contains_key("desc") {
                Order::Desc
            } else {
                Order::Asc
            };
            let args = HandlerArgs {
                ctx,
                field,
                modifiers,
                config: self.entry_config(&self.order_whitelist, field),
                table: &self.table,
                primary_key: &self.primary_key,
                aliases: scope.aliases,
                languages: &scope.config.supported_languages,
            };
            let fixes = self
                .handlers
                .order(field)?
                .apply_order(statement, &args, direction)?;
            schedule.schedule_all(fixes)?;
        }
        Ok(())
    }

    fn entry_config<'a>(&self, whitelist: &'a Whitelist, field: &str) -> &'a Value {
        whitelist
            .get(field)
            .map_or(&NO_CONFIG, |entry| &entry.config)
    }

    fn fetch(&self, config: &EngineConfig, statement: &SelectStatement) -> Result<Vec<Value>> {
        if config.log_sql {
            tracing::debug!(resource = %self.model, sql = %statement.to_string(PostgresQueryBuilder), "fetch");
        }
        Ok(self.source.fetch(statement)?)
    }

    fn count(&self, config: &EngineConfig, incomplete: &SelectStatement) -> Result<u64> {
        let mut statement = incomplete.clone();
        statement.clear_selects().expr(Expr::cust(format!(
            "COUNT(DISTINCT \"{}\".\"{}\")",
            self.table, self.primary_key
        )));
        if config.log_sql {
            tracing::debug!(resource = %self.model, sql = %statement.to_string(PostgresQueryBuilder), "count");
        }
        Ok(self.source.count(&statement)?)
    }
}

/// Assembles a [`Resource`].
///
/// Whitelists are composed from the resource's own entries followed by its
/// base whitelists; the first declaration of a field wins. `id`, `any` and
/// `all` are always filterable.
pub struct ResourceBuilder {
    model: String,
    table: String,
    primary_key: String,
    filters: Whitelist,
    filter_bases: Vec<Whitelist>,
    includes: Whitelist,
    include_bases: Vec<Whitelist>,
    orders: Whitelist,
    order_bases: Vec<Whitelist>,
    default_includes: String,
    default_order: String,
    default_fixes: Vec<ScheduledFix>,
    handlers: HandlerRegistry,
    source: Arc<dyn RowSource>,
}

impl ResourceBuilder {
    pub fn new(
        model: impl Into<String>,
        table: impl Into<String>,
        source: Arc<dyn RowSource>,
    ) -> Self {
        Self {
            model: model.into(),
            table: table.into(),
            primary_key: "id".to_string(),
            filters: Whitelist::new(),
            filter_bases: Vec::new(),
            includes: Whitelist::new(),
            include_bases: Vec::new(),
            orders: Whitelist::new(),
            order_bases: Vec::new(),
            default_includes: String::new(),
            default_order: String::new(),
            default_fixes: Vec::new(),
            handlers: HandlerRegistry::new(),
            source,
        }
    }

    /// Primary-key column (default `id`).
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn filter_whitelist(mut self, whitelist: Whitelist) -> Self {
        self.filters = whitelist;
        self
    }

    /// Add a base filter whitelist consulted after the resource's own.
    pub fn filter_base(mut self, whitelist: Whitelist) -> Self {
        self.filter_bases.push(whitelist);
        self
    }

    pub fn include_whitelist(mut self, whitelist: Whitelist) -> Self {
        self.includes = whitelist;
        self
    }

    pub fn include_base(mut self, whitelist: Whitelist) -> Self {
        self.include_bases.push(whitelist);
        self
    }

    pub fn order_whitelist(mut self, whitelist: Whitelist) -> Self {
        self.orders = whitelist;
        self
    }

    pub fn order_base(mut self, whitelist: Whitelist) -> Self {
        self.order_bases.push(whitelist);
        self
    }

    /// Whitelist `field` and filter it by `column`.
    pub fn filter_column(mut self, field: &str, column: &str, kind: ColumnKind) -> Self {
        self.filters.insert(field, WhitelistEntry::direct());
        self.handlers
            .register_filter(field, Box::new(ColumnFilter::new(column, kind)));
        self
    }

    /// Whitelist `field` and filter it by what `subquery` yields per row.
    pub fn filter_subquery<F>(mut self, field: &str, kind: SubqueryKind, subquery: F) -> Self
    where
        F: Fn(&HandlerArgs<'_>) -> SelectStatement + Send + Sync + 'static,
    {
        self.filters.insert(field, WhitelistEntry::direct());
        self.handlers
            .register_filter(field, Box::new(SubqueryFilter::new(kind, subquery)));
        self
    }

    /// Whitelist `field` as a translated string `column` for filtering and
    /// as a translatable include.
    pub fn translated_column(mut self, field: &str, column: TranslatedColumn) -> Self {
        self.filters.insert(field, WhitelistEntry::direct());
        self.includes
            .insert(field, WhitelistEntry::direct().translatable());
        self.handlers
            .register_filter(field, Box::new(column.clone()));
        self.handlers.register_include(field, Box::new(column));
        self
    }

    /// Serve the filter `field` with `handler`. Whitelisting is separate.
    pub fn filter_handler(mut self, field: &str, handler: impl FilterHandler + 'static) -> Self {
        self.handlers.register_filter(field, Box::new(handler));
        self
    }

    pub fn filter_fn<F>(mut self, field: &str, handler: F) -> Self
    where
        F: Fn(&mut SelectStatement, &HandlerArgs<'_>) -> Result<Condition> + Send + Sync + 'static,
    {
        self.handlers.register_filter_fn(field, handler);
        self
    }

    /// Whitelist `field` and order by `column`.
    pub fn order_column(mut self, field: &str, column: &str) -> Self {
        self.orders.insert(field, WhitelistEntry::direct());
        self.handlers
            .register_order(field, Box::new(ColumnOrder::new(column)));
        self
    }

    pub fn order_handler(mut self, field: &str, handler: impl OrderHandler + 'static) -> Self {
        self.handlers.register_order(field, Box::new(handler));
        self
    }

    /// Whitelist `field` with `entry` and serve it with `handler`.
    pub fn include(
        mut self,
        field: &str,
        entry: WhitelistEntry,
        handler: impl IncludeHandler + 'static,
    ) -> Self {
        self.includes.insert(field, entry);
        self.handlers.register_include(field, Box::new(handler));
        self
    }

    pub fn include_fn<F>(mut self, field: &str, entry: WhitelistEntry, handler: F) -> Self
    where
        F: Fn(&mut SelectStatement, &HandlerArgs<'_>) -> Result<Vec<ScheduledFix>>
            + Send
            + Sync
            + 'static,
    {
        self.includes.insert(field, entry);
        self.handlers.register_include_fn(field, handler);
        self
    }

    /// Include a list of `model` records matching `filter_template`, which
    /// is rendered with this resource's `key_column`. Sub-includes are
    /// handed to the nested resource.
    pub fn include_collection(
        self,
        field: &str,
        model: &str,
        key_column: &str,
        filter_template: &str,
    ) -> Self {
        self.include(
            field,
            WhitelistEntry::recursive().with_model(model),
            NestedInclude::collection(model, key_column, filter_template),
        )
    }

    /// Include the one `model` record matching `filter_template`.
    pub fn include_single(
        self,
        field: &str,
        model: &str,
        key_column: &str,
        filter_template: &str,
    ) -> Self {
        self.include(
            field,
            WhitelistEntry::recursive().with_model(model),
            NestedInclude::single(model, key_column, filter_template),
        )
    }

    /// Includes applied to every retrieval, e.g. `owner,tags:limit(3)`.
    pub fn default_includes(mut self, includes: impl Into<String>) -> Self {
        self.default_includes = includes.into();
        self
    }

    /// Order used when a request names none, e.g. `created:desc`.
    pub fn default_order(mut self, order: impl Into<String>) -> Self {
        self.default_order = order.into();
        self
    }

    /// Fix applied to every row of every retrieval.
    pub fn default_fix(mut self, fix: ScheduledFix) -> Self {
        self.default_fixes.push(fix);
        self
    }

    pub fn build(mut self) -> Resource {
        let builtin_filters = Whitelist::new().direct("id").direct("any").direct("all");
        self.filter_bases.push(builtin_filters);
        if !self.handlers.contains(DirectiveKind::Filter, "id") {
            self.handlers.register_filter(
                "id",
                Box::new(ColumnFilter::new(&self.primary_key, ColumnKind::Entity)),
            );
        }

        let filter_whitelist = compose(&self.filters, &self.filter_bases);
        let include_whitelist = compose(&self.includes, &self.include_bases);
        let order_whitelist = compose(&self.orders, &self.order_bases);

        let default_includes = resolve_includes(&self.default_includes, &include_whitelist);
        for name in default_includes.fields() {
            if !include_whitelist.contains(name) {
                tracing::warn!(resource = %self.model, include = %name, "default include is not whitelisted");
            }
        }

        Resource {
            model: self.model,
            table: self.table,
            primary_key: self.primary_key,
            filter_whitelist,
            include_whitelist,
            order_whitelist,
            default_includes,
            default_order: parse_rich_param(&self.default_order).without_empty(),
            default_fixes: self.default_fixes,
            handlers: self.handlers,
            source: self.source,
        }
    }
}

/// LIMIT/OFFSET for the requested page; an unlimited request selects everything.
fn paginate(statement: &mut SelectStatement, request: &FetchRequest) {
    if request.limit > 0 {
        let page = request.page.max(1);
        statement
            .limit(request.limit)
            .offset((page - 1).saturating_mul(request.limit));
    }
}

fn compose(own: &Whitelist, bases: &[Whitelist]) -> Whitelist {
    let bases: Vec<&Whitelist> = bases.iter().collect();
    Whitelist::compose(own, &bases)
}
