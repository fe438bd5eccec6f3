//! Task interpreter for reshaping one row.
//!
//! A run walks an ordered list of [`Task`]s that share one scratch value and
//! the row under transformation. Deletions are only recorded while the tasks
//! run and are applied once all of them finished, in the order they were
//! first scheduled, so later tasks still see the fields they need.

use std::fmt;

use indexmap::IndexSet;
use serde_json::Value;

use super::cast::{CastKind, cast_value};
use super::path;
use crate::error::Result;

/// Caller-supplied transform of `(row, scratch, extra arguments)`.
pub type CustomTransform<'a> = Box<dyn FnMut(&mut Value, &mut Value, &[Value]) -> Result<()> + 'a>;

/// One reorganizer instruction.
pub enum Task<'a> {
    /// `scratch = row[path]`, `null` when the path is missing.
    Read(String),
    /// Integrate the scratch value into `row[path]`.
    Write(String),
    /// Coerce the scratch value.
    Cast(CastKind),
    /// Schedule `row[path]` for removal after the run.
    Delete(String),
    Custom(CustomTransform<'a>, Vec<Value>),
}

impl<'a> Task<'a> {
    pub fn read(path: impl Into<String>) -> Self {
        Task::Read(path.into())
    }

    pub fn write(path: impl Into<String>) -> Self {
        Task::Write(path.into())
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Task::Delete(path.into())
    }

    pub fn custom<F>(transform: F, args: Vec<Value>) -> Self
    where
        F: FnMut(&mut Value, &mut Value, &[Value]) -> Result<()> + 'a,
    {
        Task::Custom(Box::new(transform), args)
    }
}

impl fmt::Debug for Task<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Read(path) => f.debug_tuple("Read").field(path).finish(),
            Task::Write(path) => f.debug_tuple("Write").field(path).finish(),
            Task::Cast(kind) => f.debug_tuple("Cast").field(kind).finish(),
            Task::Delete(path) => f.debug_tuple("Delete").field(path).finish(),
            Task::Custom(_, args) => f.debug_tuple("Custom").field(args).finish(),
        }
    }
}

/// Applies task lists to rows. Holds the pending deletions between
/// [`Reorganizer::schedule_deletion`] and [`Reorganizer::flush_deletions`].
#[derive(Debug, Default)]
pub struct Reorganizer {
    scheduled: IndexSet<String>,
}

impl Reorganizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `tasks` against `row`, then apply the scheduled deletions.
    ///
    /// Returns the final scratch value. On error the row keeps whatever the
    /// tasks before the failing one did and nothing is deleted.
    pub fn run<'a>(
        &mut self,
        row: &mut Value,
        tasks: impl IntoIterator<Item = Task<'a>>,
    ) -> Result<Value> {
        let mut scratch = Value::Null;
        for task in tasks {
            if let Err(e) = self.execute(row, &mut scratch, task) {
                self.scheduled.clear();
                return Err(e);
            }
        }
        self.flush_deletions(row);
        Ok(scratch)
    }

    /// Execute a single task. Deletions stay pending.
    pub fn execute(&mut self, row: &mut Value, scratch: &mut Value, task: Task<'_>) -> Result<()> {
        match task {
            Task::Read(path) => {
                *scratch = path::read(row, &path).cloned().unwrap_or(Value::Null);
            }
            Task::Write(path) => path::integrate(row, &path, scratch.clone()),
            Task::Cast(kind) => cast_value(scratch, kind),
            Task::Delete(path) => self.schedule_deletion(path),
            Task::Custom(mut transform, args) => transform(row, scratch, &args)?,
        }
        Ok(())
    }

    /// Record `path` for removal. A path scheduled twice is removed once.
    pub fn schedule_deletion(&mut self, path: impl Into<String>) {
        self.scheduled.insert(path.into());
    }

    pub fn pending_deletions(&self) -> impl Iterator<Item = &str> {
        self.scheduled.iter().map(String::as_str)
    }

    /// Remove every scheduled path from `row` and forget them.
    pub fn flush_deletions(&mut self, row: &mut Value) {
        for path in self.scheduled.drain(..) {
            path::unset(row, &path);
        }
    }
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    fn run(mut row: Value, tasks: Vec<Task<'_>>) -> Value {
        Reorganizer::new().run(&mut row, tasks).unwrap();
        row
    }

    #[test]
    fn deletions_run_last() {
        let row = run(
            json!({"key1": 1}),
            vec![Task::delete("key1"), Task::read("key1"), Task::write("key2")],
        );
        assert_eq!(row, json!({"key2": 1}));
    }

    #[test]
    fn read_write_into_new_array() {
        let row = run(
            json!({"key1": [1, 2]}),
            vec![Task::read("key1.1"), Task::write("key2.0"), Task::read("key1.0")],
        );
        assert_eq!(row, json!({"key1": [1, 2], "key2": [2]}));
    }

    #[test]
    fn write_does_not_clobber_existing_positions() {
        let row = run(
            json!({"key1": [1], "key2": [2]}),
            vec![Task::read("key1"), Task::write("key2")],
        );
        assert_eq!(row, json!({"key1": [1], "key2": [2]}));
    }

    #[test]
    fn cast_scratch_before_write() {
        let row = run(
            json!({"key1": 1}),
            vec![Task::read("key1"), Task::Cast(CastKind::String), Task::write("key2")],
        );
        assert_eq!(row, json!({"key1": 1, "key2": "1"}));
    }

    #[test]
    fn custom_transform_receives_arguments() {
        let row = run(
            json!({"key1": 1}),
            vec![
                Task::read("key1"),
                Task::custom(
                    |_row, scratch, args| {
                        *scratch = args[0].clone();
                        Ok(())
                    },
                    vec![json!("customValue")],
                ),
                Task::write("key2"),
            ],
        );
        assert_eq!(row, json!({"key1": 1, "key2": "customValue"}));
    }

    #[test]
    fn custom_transform_can_capture_state() {
        let mut seen = Vec::new();
        let mut row = json!({"a": 1, "b": 2});
        Reorganizer::new()
            .run(
                &mut row,
                vec![
                    Task::read("a"),
                    Task::custom(
                        |row, scratch, _| {
                            seen.push(scratch.clone());
                            seen.push(row["b"].clone());
                            Ok(())
                        },
                        Vec::new(),
                    ),
                ],
            )
            .unwrap();
        assert_eq!(seen, vec![json!(1), json!(2)]);
    }

    #[test]
    fn delete_only() {
        assert_eq!(run(json!({"key1": 1}), vec![Task::delete("key1")]), json!({}));
    }

    #[test]
    fn deletions_keep_schedule_order_and_dedupe() {
        let mut reorganizer = Reorganizer::new();
        reorganizer.schedule_deletion("b");
        reorganizer.schedule_deletion("a");
        reorganizer.schedule_deletion("b");
        let pending: Vec<&str> = reorganizer.pending_deletions().collect();
        assert_eq!(pending, vec!["b", "a"]);

        let mut row = json!({"a": 1, "b": 2, "c": 3});
        reorganizer.flush_deletions(&mut row);
        assert_eq!(row, json!({"c": 3}));
        assert_eq!(reorganizer.pending_deletions().count(), 0);
    }

    #[test]
    fn run_returns_scratch() {
        let mut row = json!({"a": "7"});
        let scratch = Reorganizer::new()
            .run(&mut row, vec![Task::read("a"), Task::Cast(CastKind::Integer)])
            .unwrap();
        assert_eq!(scratch, json!(7));
    }

    #[test]
    fn failing_transform_skips_deletions() {
        let mut reorganizer = Reorganizer::new();
        let mut row = json!({"a": 1});
        let result = reorganizer.run(
            &mut row,
            vec![
                Task::delete("a"),
                Task::custom(
                    |_, _, _| Err(Error::UnresolvableHandler("boom".to_string())),
                    Vec::new(),
                ),
            ],
        );
        assert!(result.is_err());
        assert_eq!(row, json!({"a": 1}));
        assert_eq!(reorganizer.pending_deletions().count(), 0);
    }
}
