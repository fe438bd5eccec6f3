//! Directive handlers.
//!
//! Every filter, include and order field of a resource is served by a
//! handler registered under a name derived from the field (see
//! [`handler_name`]). Handlers shape the SELECT statement and may schedule
//! fixes for the rows it returns.

use std::borrow::Cow;
use std::collections::HashMap;

use sea_query::{
    Alias, Cond, Condition, Expr, ExprTrait, Func, JoinType, Order, SelectStatement, SimpleExpr,
};

use super::expression::{ColumnKind, SubqueryKind, conditions_for_column, conditions_for_subquery};
use super::sequence::AliasSequence;
use super::types::QueryContext;
use crate::error::{DirectiveKind, Error, Result};
use crate::reshape::cast::CastKind;
use crate::reshape::fixes::{FixDescriptor, NestSpec, ScheduledFix};
use crate::richparam::Modifiers;

/// Registry key for the handler serving `field`.
///
/// `filter` + `phase.title` → `filterPhaseTitle`,
/// `include` + `images[]` → `includeImages_cp`,
/// `order` + `created` → `orderByCreated`.
pub fn handler_name(kind: DirectiveKind, field: &str) -> String {
    let (prefix, field) = match kind {
        DirectiveKind::Filter => ("filter", Cow::Borrowed(field)),
        DirectiveKind::Include => ("include", Cow::Owned(field.replace("[]", "_cp"))),
        DirectiveKind::Order => ("orderBy", Cow::Borrowed(field)),
    };

    let mut name = String::from(prefix);
    for segment in field.split('.') {
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            name.extend(first.to_uppercase());
            name.push_str(chars.as_str());
        }
    }
    name
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything a handler gets to see about the field it serves.
#[derive(Debug, Clone, Copy)]
pub struct HandlerArgs<'a> {
    pub ctx: &'a QueryContext,
    /// Field name as written in the directive.
    pub field: &'a str,
    pub modifiers: &'a Modifiers,
    /// Handler configuration from the field's whitelist entry.
    pub config: &'a serde_json::Value,
    /// Base table of the resource.
    pub table: &'a str,
    pub primary_key: &'a str,
    pub aliases: &'a AliasSequence,
    /// Languages translations exist for.
    pub languages: &'a [String],
}

impl HandlerArgs<'_> {
    /// `column` of the base table.
    pub fn column(&self, column: &str) -> SimpleExpr {
        Expr::col((Alias::new(self.table), Alias::new(column))).into()
    }
}

// ---------------------------------------------------------------------------
// Handler traits
// ---------------------------------------------------------------------------

/// Serves a filter field.
pub trait FilterHandler: Send + Sync {
    /// Build the condition for the field. Joins may be added to `statement`.
    fn build_condition(
        &self,
        statement: &mut SelectStatement,
        args: &HandlerArgs<'_>,
    ) -> Result<Condition>;
}

/// Serves an include field.
pub trait IncludeHandler: Send + Sync {
    /// Select what the include needs and return the fixes that turn it into
    /// the included value.
    fn apply_include(
        &self,
        statement: &mut SelectStatement,
        args: &HandlerArgs<'_>,
    ) -> Result<Vec<ScheduledFix>>;
}

/// Serves an order field.
pub trait OrderHandler: Send + Sync {
    fn apply_order(
        &self,
        statement: &mut SelectStatement,
        args: &HandlerArgs<'_>,
        order: Order,
    ) -> Result<Vec<ScheduledFix>>;
}

/// Adapts a closure to the handler traits.
pub struct FnHandler<F>(pub F);

impl<F> FilterHandler for FnHandler<F>
where
    F: Fn(&mut SelectStatement, &HandlerArgs<'_>) -> Result<Condition> + Send + Sync,
{
    fn build_condition(
        &self,
        statement: &mut SelectStatement,
        args: &HandlerArgs<'_>,
    ) -> Result<Condition> {
        (self.0)(statement, args)
    }
}

impl<F> IncludeHandler for FnHandler<F>
where
    F: Fn(&mut SelectStatement, &HandlerArgs<'_>) -> Result<Vec<ScheduledFix>> + Send + Sync,
{
    fn apply_include(
        &self,
        statement: &mut SelectStatement,
        args: &HandlerArgs<'_>,
    ) -> Result<Vec<ScheduledFix>> {
        (self.0)(statement, args)
    }
}

impl<F> OrderHandler for FnHandler<F>
where
    F: Fn(&mut SelectStatement, &HandlerArgs<'_>, Order) -> Result<Vec<ScheduledFix>>
        + Send
        + Sync,
{
    fn apply_order(
        &self,
        statement: &mut SelectStatement,
        args: &HandlerArgs<'_>,
        order: Order,
    ) -> Result<Vec<ScheduledFix>> {
        (self.0)(statement, args, order)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// A registered handler.
pub enum Handler {
    Filter(Box<dyn FilterHandler>),
    Include(Box<dyn IncludeHandler>),
    Order(Box<dyn OrderHandler>),
}

/// Handlers of one resource, keyed by [`handler_name`].
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_filter(&mut self, field: &str, handler: Box<dyn FilterHandler>) {
        self.handlers.insert(
            handler_name(DirectiveKind::Filter, field),
            Handler::Filter(handler),
        );
    }

    pub fn register_include(&mut self, field: &str, handler: Box<dyn IncludeHandler>) {
        self.handlers.insert(
            handler_name(DirectiveKind::Include, field),
            Handler::Include(handler),
        );
    }

    pub fn register_order(&mut self, field: &str, handler: Box<dyn OrderHandler>) {
        self.handlers.insert(
            handler_name(DirectiveKind::Order, field),
            Handler::Order(handler),
        );
    }

    pub fn register_filter_fn<F>(&mut self, field: &str, handler: F)
    where
        F: Fn(&mut SelectStatement, &HandlerArgs<'_>) -> Result<Condition> + Send + Sync + 'static,
    {
        self.register_filter(field, Box::new(FnHandler(handler)));
    }

    pub fn register_include_fn<F>(&mut self, field: &str, handler: F)
    where
        F: Fn(&mut SelectStatement, &HandlerArgs<'_>) -> Result<Vec<ScheduledFix>>
            + Send
            + Sync
            + 'static,
    {
        self.register_include(field, Box::new(FnHandler(handler)));
    }

    pub fn register_order_fn<F>(&mut self, field: &str, handler: F)
    where
        F: Fn(&mut SelectStatement, &HandlerArgs<'_>, Order) -> Result<Vec<ScheduledFix>>
            + Send
            + Sync
            + 'static,
    {
        self.register_order(field, Box::new(FnHandler(handler)));
    }

    pub fn contains(&self, kind: DirectiveKind, field: &str) -> bool {
        self.handlers.contains_key(&handler_name(kind, field))
    }

    /// Registered handler names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn filter(&self, field: &str) -> Result<&dyn FilterHandler> {
        let name = handler_name(DirectiveKind::Filter, field);
        match self.handlers.get(&name) {
            Some(Handler::Filter(handler)) => Ok(handler.as_ref()),
            _ => Err(Error::UnresolvableHandler(name)),
        }
    }

    pub fn include(&self, field: &str) -> Result<&dyn IncludeHandler> {
        let name = handler_name(DirectiveKind::Include, field);
        match self.handlers.get(&name) {
            Some(Handler::Include(handler)) => Ok(handler.as_ref()),
            _ => Err(Error::UnresolvableHandler(name)),
        }
    }

    pub fn order(&self, field: &str) -> Result<&dyn OrderHandler> {
        let name = handler_name(DirectiveKind::Order, field);
        match self.handlers.get(&name) {
            Some(Handler::Order(handler)) => Ok(handler.as_ref()),
            _ => Err(Error::UnresolvableHandler(name)),
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in handlers
// ---------------------------------------------------------------------------

/// Filters a base-table column by its [`ColumnKind`] modifiers.
pub struct ColumnFilter {
    column: String,
    kind: ColumnKind,
}

impl ColumnFilter {
    pub fn new(column: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            column: column.into(),
            kind,
        }
    }
}

impl FilterHandler for ColumnFilter {
    fn build_condition(
        &self,
        _statement: &mut SelectStatement,
        args: &HandlerArgs<'_>,
    ) -> Result<Condition> {
        conditions_for_column(
            self.kind,
            args.column(&self.column),
            args.field,
            args.modifiers,
            args.ctx,
        )
    }
}

/// Builds the correlated subquery a [`SubqueryFilter`] compares against.
pub type SubqueryBuilder = Box<dyn Fn(&HandlerArgs<'_>) -> SelectStatement + Send + Sync>;

/// Filters by the value a correlated subquery yields for each row, e.g. the
/// number of likes of a project.
pub struct SubqueryFilter {
    kind: SubqueryKind,
    subquery: SubqueryBuilder,
}

impl SubqueryFilter {
    pub fn new<F>(kind: SubqueryKind, subquery: F) -> Self
    where
        F: Fn(&HandlerArgs<'_>) -> SelectStatement + Send + Sync + 'static,
    {
        Self {
            kind,
            subquery: Box::new(subquery),
        }
    }
}

impl FilterHandler for SubqueryFilter {
    fn build_condition(
        &self,
        _statement: &mut SelectStatement,
        args: &HandlerArgs<'_>,
    ) -> Result<Condition> {
        let subquery = (self.subquery)(args);
        conditions_for_subquery(self.kind, &subquery, args.field, args.modifiers)
    }
}

/// Filter modifier searching the translations of every supported language.
pub const OVER_ALL_TRANSLATIONS: &str = "overAllTranslations";

/// Table translations are looked up in unless configured otherwise.
pub const DEFAULT_TRANSLATION_TABLE: &str = "translation";

/// A string column with per-language translations.
///
/// Translations live in a separate table keyed by `name` (the translation
/// name followed by the record's primary key) and `target` (the language);
/// the `translation` column holds the text. The base column is the fallback
/// when a record has no translation for a language. Requests without a
/// language see the base column.
#[derive(Debug, Clone)]
pub struct TranslatedColumn {
    column: String,
    translation_name: String,
    translation_table: String,
}

impl TranslatedColumn {
    pub fn new(column: impl Into<String>, translation_name: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            translation_name: translation_name.into(),
            translation_table: DEFAULT_TRANSLATION_TABLE.to_string(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.translation_table = table.into();
        self
    }

    /// Left join the translations into `language` unless an earlier handler
    /// of this retrieval did. Returns the join alias.
    fn join_translation(
        &self,
        statement: &mut SelectStatement,
        args: &HandlerArgs<'_>,
        language: &str,
    ) -> String {
        let alias = format!("translation_{}_{}", self.translation_name, language);
        if args.aliases.claim_join(&alias) {
            let joined = |column: &str| -> SimpleExpr {
                Expr::col((Alias::new(&alias), Alias::new(column))).into()
            };
            let key = Func::cust(Alias::new("CONCAT"))
                .arg(self.translation_name.clone())
                .arg(args.column(args.primary_key));
            statement.join_as(
                JoinType::LeftJoin,
                Alias::new(&self.translation_table),
                Alias::new(&alias),
                Cond::all()
                    .add(joined("name").eq(key))
                    .add(joined("target").eq(language)),
            );
        }
        alias
    }

    /// The column's value in `language`.
    fn value(
        &self,
        statement: &mut SelectStatement,
        args: &HandlerArgs<'_>,
        language: &str,
    ) -> SimpleExpr {
        if language.is_empty() {
            return args.column(&self.column);
        }
        let alias = self.join_translation(statement, args, language);
        Func::coalesce([
            Expr::col((Alias::new(&alias), Alias::new("translation"))).into(),
            args.column(&self.column),
        ])
        .into()
    }
}

impl FilterHandler for TranslatedColumn {
    fn build_condition(
        &self,
        statement: &mut SelectStatement,
        args: &HandlerArgs<'_>,
    ) -> Result<Condition> {
        let mut modifiers = args.modifiers.clone();
        if modifiers.shift_remove(OVER_ALL_TRANSLATIONS).is_none() {
            let value = self.value(statement, args, &args.ctx.language);
            return conditions_for_column(
                ColumnKind::String,
                value,
                args.field,
                &modifiers,
                args.ctx,
            );
        }

        if args.languages.is_empty() {
            return Err(Error::SupportedLanguagesMissing(args.field.to_string()));
        }
        let mut any = Cond::any();
        for language in args.languages {
            let value = self.value(statement, args, language);
            any = any.add(conditions_for_column(
                ColumnKind::String,
                value,
                args.field,
                &modifiers,
                args.ctx,
            )?);
        }
        Ok(any)
    }
}

impl IncludeHandler for TranslatedColumn {
    fn apply_include(
        &self,
        statement: &mut SelectStatement,
        args: &HandlerArgs<'_>,
    ) -> Result<Vec<ScheduledFix>> {
        let alias = args.aliases.next(args.field);
        let value = self.value(statement, args, &args.ctx.language);
        statement.expr_as(value, Alias::new(&alias));
        Ok(vec![ScheduledFix::new(
            alias,
            FixDescriptor::moved_to(args.field),
        )])
    }
}

/// Orders by a base-table column.
pub struct ColumnOrder {
    column: String,
}

impl ColumnOrder {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }
}

impl OrderHandler for ColumnOrder {
    fn apply_order(
        &self,
        statement: &mut SelectStatement,
        args: &HandlerArgs<'_>,
        order: Order,
    ) -> Result<Vec<ScheduledFix>> {
        statement.order_by((Alias::new(args.table), Alias::new(&self.column)), order);
        Ok(Vec::new())
    }
}

/// Includes a computed SQL expression as a row value.
///
/// The expression is selected under a fresh alias and a fix moves it to the
/// include's path, optionally casting and filtering it on the way.
pub struct ExpressionInclude {
    sql: String,
    cast: Option<CastKind>,
    filter: Option<String>,
}

impl ExpressionInclude {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            cast: None,
            filter: None,
        }
    }

    pub fn with_cast(mut self, kind: CastKind) -> Self {
        self.cast = Some(kind);
        self
    }

    pub fn with_filter(mut self, name: impl Into<String>) -> Self {
        self.filter = Some(name.into());
        self
    }
}

impl IncludeHandler for ExpressionInclude {
    fn apply_include(
        &self,
        statement: &mut SelectStatement,
        args: &HandlerArgs<'_>,
    ) -> Result<Vec<ScheduledFix>> {
        let alias = args.aliases.next(args.field);
        statement.expr_as(Expr::cust(self.sql.as_str()), Alias::new(&alias));

        let mut fix = FixDescriptor::moved_to(args.field);
        fix.cast = self.cast;
        fix.c_filter = self.filter.clone();
        Ok(vec![ScheduledFix::new(alias, fix)])
    }
}

/// Includes records of another resource, fetched per row.
///
/// The key column is selected under a fresh alias; the nested filter is the
/// template rendered with that key, e.g. `project:is(%d)`. The include's own
/// modifiers (`filter`, `include`, `order`, `limit`, ...) steer the nested
/// fetch.
pub struct NestedInclude {
    model: String,
    key_column: String,
    filter_template: String,
    single: bool,
}

impl NestedInclude {
    /// Include a list of `model` records.
    pub fn collection(
        model: impl Into<String>,
        key_column: impl Into<String>,
        filter_template: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            key_column: key_column.into(),
            filter_template: filter_template.into(),
            single: false,
        }
    }

    /// Include one `model` record, or `null` when none matches.
    pub fn single(
        model: impl Into<String>,
        key_column: impl Into<String>,
        filter_template: impl Into<String>,
    ) -> Self {
        Self {
            single: true,
            ..Self::collection(model, key_column, filter_template)
        }
    }
}

impl IncludeHandler for NestedInclude {
    fn apply_include(
        &self,
        statement: &mut SelectStatement,
        args: &HandlerArgs<'_>,
    ) -> Result<Vec<ScheduledFix>> {
        let alias = args.aliases.next(args.field);
        statement.expr_as(args.column(&self.key_column), Alias::new(&alias));

        let spec = NestSpec::new(&self.model, &self.filter_template)
            .with_user(args.ctx.current_user)
            .with_params(args.modifiers.clone());
        let fix = if self.single {
            FixDescriptor::nest_single(spec)
        } else {
            FixDescriptor::nest_collection(spec)
        };
        Ok(vec![ScheduledFix::new(alias, fix.with_move(args.field))])
    }
}
