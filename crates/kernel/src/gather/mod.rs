//! Resource engine.
//!
//! This module provides:
//! - Resource / ResourceBuilder: whitelists, handlers and defaults of a table
//! - ResourceRegistry: model name → resource, the nested-fetch provider
//! - Handlers: filter, include and order handlers keyed by derived names
//! - Expression builder: column and subquery modifiers to SeaQuery conditions
//! - Types: QueryContext, FetchRequest, Page, SingleResult

pub mod expression;
pub mod handlers;
pub mod registry;
pub mod resource;
pub mod sequence;
pub mod types;

pub use expression::{
    ColumnKind, SubqueryKind, conditions_for_column, conditions_for_subquery,
    escape_like_wildcards,
};
pub use handlers::{
    ColumnFilter, ColumnOrder, ExpressionInclude, FilterHandler, FnHandler, Handler, HandlerArgs,
    HandlerRegistry, IncludeHandler, NestedInclude, OVER_ALL_TRANSLATIONS, OrderHandler,
    SubqueryFilter, TranslatedColumn, handler_name,
};
pub use registry::{
    BatchPages, Fetcher, FetcherProvider, NoFetchers, ResourceHandle, ResourceRegistry,
};
pub use resource::{FIELDS_MODIFIER, Resource, ResourceBuilder, RowSource};
pub use sequence::AliasSequence;
pub use types::{FetchRequest, JoinMode, NestedParams, Page, QueryContext, SingleResult};
