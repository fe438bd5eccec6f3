//! Setaccio test utilities.
//!
//! Helpers for integration testing: a recording row source, resource
//! fixtures, and assertion utilities for SQL and JSON payloads.

use std::sync::Arc;

use parking_lot::Mutex;
use sea_query::{PostgresQueryBuilder, SelectStatement};
use serde_json::Value;

use setaccio_kernel::gather::RowSource;

type Responder = Box<dyn Fn(&str) -> anyhow::Result<Vec<Value>> + Send + Sync>;

/// A row source answering from canned rows or a responder closure.
///
/// Every statement it is handed is rendered to Postgres SQL and recorded.
pub struct MockRowSource {
    responder: Responder,
    count: Mutex<Option<u64>>,
    fetched: Mutex<Vec<String>>,
    counted: Mutex<Vec<String>>,
}

impl MockRowSource {
    /// Always return `rows`; counts report `rows.len()` unless overridden.
    pub fn with_rows(rows: Vec<Value>) -> Arc<Self> {
        let total = rows.len() as u64;
        let source = Self::build(Box::new(move |_: &str| Ok(rows.clone())));
        *source.count.lock() = Some(total);
        Arc::new(source)
    }

    /// Answer each fetch with `responder(sql)`.
    pub fn responding<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&str) -> Vec<Value> + Send + Sync + 'static,
    {
        Arc::new(Self::build(Box::new(move |sql: &str| Ok(responder(sql)))))
    }

    /// Fail every fetch and count with `message`.
    pub fn failing(message: &str) -> Arc<Self> {
        let message = message.to_string();
        Arc::new(Self::build(Box::new(move |_: &str| {
            Err(anyhow::anyhow!(message.clone()))
        })))
    }

    fn build(responder: Responder) -> Self {
        Self {
            responder,
            count: Mutex::new(None),
            fetched: Mutex::new(Vec::new()),
            counted: Mutex::new(Vec::new()),
        }
    }

    /// Report `total` from every count statement.
    pub fn set_count(&self, total: u64) {
        *self.count.lock() = Some(total);
    }

    /// SQL of every fetch, oldest first.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }

    /// SQL of every count, oldest first.
    pub fn counted(&self) -> Vec<String> {
        self.counted.lock().clone()
    }

    /// SQL of the latest fetch, or an empty string.
    pub fn last_fetch(&self) -> String {
        self.fetched.lock().last().cloned().unwrap_or_default()
    }
}

impl RowSource for MockRowSource {
    fn fetch(&self, statement: &SelectStatement) -> anyhow::Result<Vec<Value>> {
        let sql = statement.to_string(PostgresQueryBuilder);
        self.fetched.lock().push(sql.clone());
        (self.responder)(&sql)
    }

    fn count(&self, statement: &SelectStatement) -> anyhow::Result<u64> {
        let sql = statement.to_string(PostgresQueryBuilder);
        self.counted.lock().push(sql.clone());
        match *self.count.lock() {
            Some(total) => Ok(total),
            None => (self.responder)(&sql).map(|rows| rows.len() as u64),
        }
    }
}

/// Resource fixtures shared by the integration tests.
pub mod fixtures {
    use std::sync::Arc;

    use sea_query::{Alias, Expr, Query};
    use setaccio_kernel::EngineConfig;
    use setaccio_kernel::gather::{
        ColumnKind, ExpressionInclude, QueryContext, Resource, ResourceRegistry, RowSource,
        SubqueryKind, TranslatedColumn,
    };
    use setaccio_kernel::reshape::CastKind;
    use setaccio_kernel::richparam::WhitelistEntry;
    use uuid::Uuid;

    /// `Project` over table `project`:
    /// - filters `title` (string), `likes` (integer), `created` (datetime),
    ///   `owner` (entity), `numberOfLikes` (counting subquery)
    /// - includes `tags` (list of `Tag`), `owner` (one `User`),
    ///   `numberOfLikes` (computed)
    /// - orders `title`, `created`; default order `created:desc`
    pub fn project(source: Arc<dyn RowSource>) -> Resource {
        Resource::builder("Project", "project", source)
            .filter_column("title", "title", ColumnKind::String)
            .filter_column("likes", "likes", ColumnKind::Integer)
            .filter_column("created", "created", ColumnKind::Datetime)
            .filter_column("owner", "owner_id", ColumnKind::Entity)
            .filter_subquery("numberOfLikes", SubqueryKind::Integer, |args| {
                Query::select()
                    .expr(Expr::cust("COUNT(*)"))
                    .from(Alias::new("likes"))
                    .and_where(
                        Expr::col((Alias::new("likes"), Alias::new("project_id")))
                            .equals((Alias::new(args.table), Alias::new(args.primary_key))),
                    )
                    .to_owned()
            })
            .order_column("title", "title")
            .order_column("created", "created")
            .default_order("created:desc")
            .include_collection("tags", "Tag", "id", "project:is(%d)")
            .include_single("owner", "User", "owner_id", "id:is(%s)")
            .include(
                "numberOfLikes",
                WhitelistEntry::direct(),
                ExpressionInclude::new("(SELECT COUNT(*) FROM likes WHERE likes.project_id = project.id)")
                    .with_cast(CastKind::Integer),
            )
            .build()
    }

    /// `Tag` over table `tag`: filters `project` (integer), `label` (string);
    /// includes `color` (computed); `name` is translated, filterable and
    /// includable.
    pub fn tag(source: Arc<dyn RowSource>) -> Resource {
        Resource::builder("Tag", "tag", source)
            .filter_column("project", "project_id", ColumnKind::Integer)
            .filter_column("label", "label", ColumnKind::String)
            .order_column("label", "label")
            .translated_column("name", TranslatedColumn::new("name", "tag_name"))
            .include(
                "color",
                WhitelistEntry::direct(),
                ExpressionInclude::new("tag.color_hex"),
            )
            .build()
    }

    /// `User` over table `app_user`: filters `name` (string).
    pub fn user(source: Arc<dyn RowSource>) -> Resource {
        Resource::builder("User", "app_user", source)
            .filter_column("name", "name", ColumnKind::String)
            .build()
    }

    /// A registry holding the three fixtures.
    pub fn registry(
        projects: Arc<dyn RowSource>,
        tags: Arc<dyn RowSource>,
        users: Arc<dyn RowSource>,
    ) -> ResourceRegistry {
        registry_with_config(EngineConfig::default(), projects, tags, users)
    }

    /// Like [`registry`], under `config`.
    pub fn registry_with_config(
        config: EngineConfig,
        projects: Arc<dyn RowSource>,
        tags: Arc<dyn RowSource>,
        users: Arc<dyn RowSource>,
    ) -> ResourceRegistry {
        let mut registry = ResourceRegistry::new(config);
        registry.register(project(projects));
        registry.register(tag(tags));
        registry.register(user(users));
        registry
    }

    /// Context of an anonymous caller.
    pub fn anonymous() -> QueryContext {
        QueryContext::anonymous()
    }

    /// Context of a freshly generated user.
    pub fn authenticated() -> QueryContext {
        QueryContext::for_user(Uuid::now_v7())
    }
}

/// Assertion helpers for SQL and JSON payloads.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a JSON value does not have a specific key.
    pub fn lacks_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_none(),
            "Expected JSON to lack key '{key}', got: {value}"
        );
    }

    /// Assert that a JSON value equals expected.
    pub fn json_eq(actual: &Value, expected: &Value) {
        assert_eq!(
            actual,
            expected,
            "JSON mismatch:\nactual: {}\nexpected: {}",
            serde_json::to_string_pretty(actual).unwrap_or_default(),
            serde_json::to_string_pretty(expected).unwrap_or_default()
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that a string does not contain a substring.
    pub fn not_contains(haystack: &str, needle: &str) {
        assert!(
            !haystack.contains(needle),
            "Expected string to NOT contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that the object keys of `value` come in exactly `keys` order.
    pub fn key_order(value: &Value, keys: &[&str]) {
        let actual: Vec<&str> = value
            .as_object()
            .map(|map| map.keys().map(String::as_str).collect())
            .unwrap_or_default();
        assert_eq!(actual, keys, "Key order mismatch in {value}");
    }
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use sea_query::{Alias, Query};
    use serde_json::json;

    fn statement() -> SelectStatement {
        Query::select()
            .column(Alias::new("id"))
            .from(Alias::new("project"))
            .to_owned()
    }

    #[test]
    fn canned_rows_are_recorded() {
        let source = MockRowSource::with_rows(vec![json!({"id": 1}), json!({"id": 2})]);
        let rows = source.fetch(&statement()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(source.count(&statement()).unwrap(), 2);
        assert_eq!(source.fetched(), vec!["SELECT \"id\" FROM \"project\"".to_string()]);
        assert_eq!(source.counted().len(), 1);
    }

    #[test]
    fn responder_sees_the_sql() {
        let source = MockRowSource::responding(|sql| vec![json!({ "sql": sql })]);
        let rows = source.fetch(&statement()).unwrap();
        assert::contains(rows[0]["sql"].as_str().unwrap(), "FROM \"project\"");
        source.set_count(40);
        assert_eq!(source.count(&statement()).unwrap(), 40);
    }

    #[test]
    fn failing_source_reports_errors() {
        let source = MockRowSource::failing("connection refused");
        let err = source.fetch(&statement()).unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
        assert::contains(&source.last_fetch(), "project");
    }

    #[test]
    fn test_assertions() {
        let json = json!({"name": "test", "value": 42});
        assert::has_key(&json, "name");
        assert::lacks_key(&json, "other");
        assert::key_order(&json, &["name", "value"]);
        assert::json_eq(&json, &json!({"name": "test", "value": 42}));
        assert::contains("hello world", "world");
        assert::not_contains("hello world", "foo");
    }
}
