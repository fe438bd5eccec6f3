#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Row reshaping integration tests.
//!
//! Path access, the task interpreter, metadata merging, and the
//! post-processor driving nested fetches through a fake provider.

use parking_lot::Mutex;
use serde_json::{Value, json};
use setaccio_kernel::error::{Error, Result};
use setaccio_kernel::gather::registry::{Fetcher, FetcherProvider};
use setaccio_kernel::gather::types::{FetchRequest, Page, QueryContext, SingleResult};
use setaccio_kernel::reshape::{
    CastKind, FixDescriptor, FixSchedule, Meta, NestSpec, PostProcessor, Reorganizer,
    ScheduledFix, Task, ValueFilterRegistry, path,
};
use setaccio_kernel::richparam::parse_modifiers;
use setaccio_test_utils::assert;

// -------------------------------------------------------------------------
// Path access
// -------------------------------------------------------------------------

#[test]
fn written_values_read_back() {
    let mut row = json!({"id": 1});
    path::write(&mut row, "phase.owner.name", json!("Ada"));
    assert_eq!(path::read(&row, "phase.owner.name"), Some(&json!("Ada")));
    assert_eq!(path::read(&row, "id"), Some(&json!(1)));
}

#[test]
fn unset_paths_read_as_missing() {
    let mut row = json!({"phase": {"id": 4, "title": "Draft"}});
    path::unset(&mut row, "phase.title");
    assert_eq!(path::read(&row, "phase.title"), None);
    assert::json_eq(&row, &json!({"phase": {"id": 4}}));

    path::unset(&mut row, "nowhere.at.all");
    assert::json_eq(&row, &json!({"phase": {"id": 4}}));
}

#[test]
fn integrate_keeps_existing_keys() {
    let mut row = json!({"owner": {"id": 1, "name": "Ada"}});
    path::integrate(&mut row, "owner", json!({"id": 2, "email": "ada@example.org"}));
    assert::json_eq(
        &row,
        &json!({"owner": {"id": 1, "name": "Ada", "email": "ada@example.org"}}),
    );
}

#[test]
fn non_numeric_key_turns_array_into_object() {
    let mut row = json!({"items": ["a", "b"]});
    path::write(&mut row, "items.label", json!("x"));
    assert::json_eq(&row, &json!({"items": {"0": "a", "1": "b", "label": "x"}}));
}

// -------------------------------------------------------------------------
// Reorganizer
// -------------------------------------------------------------------------

#[test]
fn deletion_waits_for_the_end_of_the_run() {
    let mut row = json!({"k1": 1});
    Reorganizer::new()
        .run(
            &mut row,
            vec![Task::delete("k1"), Task::read("k1"), Task::write("k2")],
        )
        .unwrap();
    assert::json_eq(&row, &json!({"k2": 1}));
}

#[test]
fn custom_task_sees_scratch_and_arguments() {
    let mut row = json!({"count": "41"});
    let scratch = Reorganizer::new()
        .run(
            &mut row,
            vec![
                Task::read("count"),
                Task::Cast(CastKind::Integer),
                Task::custom(
                    |_, scratch, args| {
                        let step = args.first().and_then(Value::as_i64).unwrap_or(0);
                        *scratch = json!(scratch.as_i64().unwrap_or(0) + step);
                        Ok(())
                    },
                    vec![json!(1)],
                ),
                Task::write("total"),
            ],
        )
        .unwrap();
    assert_eq!(scratch, json!(42));
    assert_eq!(row["total"], json!(42));
}

#[test]
fn failing_task_deletes_nothing() {
    let mut row = json!({"k1": 1});
    let mut reorganizer = Reorganizer::new();
    let err = reorganizer
        .run(
            &mut row,
            vec![
                Task::delete("k1"),
                Task::custom(
                    |_, _, _| Err(Error::UnresolvableHandler("filterBroken".into())),
                    vec![],
                ),
            ],
        )
        .unwrap_err();
    assert!(matches!(err, Error::UnresolvableHandler(_)));
    assert::json_eq(&row, &json!({"k1": 1}));
    assert_eq!(reorganizer.pending_deletions().count(), 0);
}

// -------------------------------------------------------------------------
// Metadata
// -------------------------------------------------------------------------

#[test]
fn nested_meta_is_prefixed() {
    let mut nested = Meta::new("Phase", "", "");
    nested.record("User", "owner");

    let mut meta = Meta::new("Project", "", "en");
    meta.merge_nested(&nested, "phase");

    assert_eq!(
        serde_json::to_value(&meta).unwrap(),
        json!({
            "modelnameIndex": {"Project": [""], "Phase": ["phase"], "User": ["phase.owner"]},
            "language": "en"
        })
    );
}

// -------------------------------------------------------------------------
// Post-processing with nested fetches
// -------------------------------------------------------------------------

/// Answers `Phase` requests; the nested metadata names the filter it got,
/// so tests can tell which row's fetch contributed.
#[derive(Default)]
struct FakeFetchers {
    requests: Mutex<Vec<(String, FetchRequest, u8)>>,
}

struct FakeFetcher<'a> {
    provider: &'a FakeFetchers,
    model: String,
}

impl FetcherProvider for FakeFetchers {
    fn fetcher<'s>(&'s self, model: &str) -> Result<Box<dyn Fetcher + 's>> {
        if model != "Phase" {
            return Err(Error::UnknownResource(model.to_string()));
        }
        Ok(Box::new(FakeFetcher {
            provider: self,
            model: model.to_string(),
        }))
    }
}

impl FakeFetcher<'_> {
    fn answer(&self, ctx: &QueryContext, request: &FetchRequest) -> (Vec<Value>, Meta) {
        self.provider
            .requests
            .lock()
            .push((self.model.clone(), request.clone(), ctx.depth));
        let mut meta = Meta::new(&self.model, "", &ctx.language);
        meta.record(&format!("Seen[{}]", request.filter), "owner");
        (vec![json!({"filter": request.filter})], meta)
    }
}

impl Fetcher for FakeFetcher<'_> {
    fn find_multiple(&self, ctx: &QueryContext, request: &FetchRequest) -> Result<Page> {
        let (data, meta) = self.answer(ctx, request);
        Ok(Page {
            total_pages: 1,
            filter: request.filter.clone(),
            include: request.include.clone(),
            page: request.page,
            page_size: request.limit,
            data,
            meta,
        })
    }

    fn find_one(&self, ctx: &QueryContext, request: &FetchRequest) -> Result<Option<SingleResult>> {
        let (mut data, meta) = self.answer(ctx, request);
        if request.filter.contains("is(0)") {
            return Ok(None);
        }
        Ok(data.pop().map(|data| SingleResult { data, meta }))
    }
}

fn fixes(scheduled: Vec<ScheduledFix>) -> setaccio_kernel::reshape::FixSet {
    let mut schedule = FixSchedule::new();
    schedule.schedule_all(scheduled).unwrap();
    schedule.flush()
}

#[test]
fn only_the_first_row_merges_metadata() {
    let fetchers = FakeFetchers::default();
    let filters = ValueFilterRegistry::with_builtins();
    let ctx = QueryContext::anonymous().with_language("de");
    let fixes = fixes(vec![ScheduledFix::new(
        "phases_1",
        FixDescriptor::nest_collection(NestSpec::new("Phase", "project:is(%d)"))
            .with_move("phases"),
    )]);

    let mut rows = vec![json!({"id": 1, "phases_1": 1}), json!({"id": 2, "phases_1": "2"})];
    let mut meta = Meta::new("Project", "", "de");
    PostProcessor::new(&fetchers, &filters, &ctx)
        .apply(&mut rows, &fixes, &mut meta)
        .unwrap();

    assert::json_eq(
        &rows[0],
        &json!({"id": 1, "phases": [{"filter": "project:is(1)"}]}),
    );
    assert::json_eq(
        &rows[1],
        &json!({"id": 2, "phases": [{"filter": "project:is(2)"}]}),
    );

    assert_eq!(meta.paths("Phase"), ["phases".to_string()]);
    assert_eq!(
        meta.paths("Seen[project:is(1)]"),
        ["phases.owner".to_string()]
    );
    assert!(meta.paths("Seen[project:is(2)]").is_empty());
    assert_eq!(meta.language, "de");

    let requests = fetchers.requests.lock();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|(_, _, depth)| *depth == 1));
}

#[test]
fn include_modifiers_steer_the_nested_request() {
    let fetchers = FakeFetchers::default();
    let filters = ValueFilterRegistry::with_builtins();
    let user = uuid::Uuid::now_v7();
    let ctx = QueryContext::for_user(user);
    let spec = NestSpec::new("Phase", "project:is(%d)")
        .with_user(Some(user))
        .with_params(parse_modifiers("filter(title:contains(a)):order(title):limit(5)"));
    let fixes = fixes(vec![ScheduledFix::new(
        "phases",
        FixDescriptor::nest_collection(spec),
    )]);

    let mut row = json!({"phases": 9});
    let mut meta = Meta::new("Project", "", "");
    PostProcessor::new(&fetchers, &filters, &ctx)
        .apply(std::slice::from_mut(&mut row), &fixes, &mut meta)
        .unwrap();

    let requests = fetchers.requests.lock();
    let (_, request, _) = &requests[0];
    assert_eq!(request.filter, "title:contains(a),project:is(9)");
    assert_eq!(request.order, "title");
    assert_eq!(request.limit, 5);
    assert_eq!(row["phases"][0]["filter"], json!("title:contains(a),project:is(9)"));
}

#[test]
fn missing_single_becomes_null() {
    let fetchers = FakeFetchers::default();
    let filters = ValueFilterRegistry::with_builtins();
    let ctx = QueryContext::anonymous();
    let fixes = fixes(vec![
        ScheduledFix::new(
            "phase_1",
            FixDescriptor::nest_single(NestSpec::new("Phase", "id:is(%d)")).with_move("phase"),
        ),
        ScheduledFix::new("secret", FixDescriptor::delete()),
    ]);

    let mut rows = vec![
        json!({"phase_1": 0, "secret": "x"}),
        json!({"phase_1": 3, "secret": "y"}),
    ];
    let mut meta = Meta::new("Project", "", "");
    PostProcessor::new(&fetchers, &filters, &ctx)
        .apply(&mut rows, &fixes, &mut meta)
        .unwrap();

    assert::json_eq(&rows[0], &json!({"phase": null}));
    assert::json_eq(&rows[1], &json!({"phase": {"filter": "id:is(3)"}}));
    // Row 0 found nothing, so no nested metadata arrived.
    assert!(meta.paths("Phase").is_empty());
}

#[test]
fn unknown_nested_model_fails() {
    let fetchers = FakeFetchers::default();
    let filters = ValueFilterRegistry::with_builtins();
    let ctx = QueryContext::anonymous();
    let fixes = fixes(vec![ScheduledFix::new(
        "members",
        FixDescriptor::nest_collection(NestSpec::new("Member", "team:is(%d)")),
    )]);

    let mut rows = vec![json!({"members": 1})];
    let mut meta = Meta::new("Team", "", "");
    let err = PostProcessor::new(&fetchers, &filters, &ctx)
        .apply(&mut rows, &fixes, &mut meta)
        .unwrap_err();
    assert!(matches!(err, Error::UnknownResource(model) if model == "Member"));
}
