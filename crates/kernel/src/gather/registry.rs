//! Resource registry and the fetch seam used by nested includes.

use std::collections::HashMap;

use super::resource::Resource;
use super::types::{FetchRequest, JoinMode, Page, QueryContext, SingleResult};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::reshape::value_filters::ValueFilterRegistry;

/// Something that answers retrieval requests for one resource.
pub trait Fetcher {
    fn find_multiple(&self, ctx: &QueryContext, request: &FetchRequest) -> Result<Page>;

    /// First matching row, or `None`.
    fn find_one(&self, ctx: &QueryContext, request: &FetchRequest)
    -> Result<Option<SingleResult>>;
}

/// Looks up the [`Fetcher`] for a model name.
pub trait FetcherProvider {
    fn fetcher<'s>(&'s self, model: &str) -> Result<Box<dyn Fetcher + 's>>;
}

/// A provider without resources; every lookup fails with
/// [`Error::UnknownResource`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFetchers;

impl FetcherProvider for NoFetchers {
    fn fetcher<'s>(&'s self, model: &str) -> Result<Box<dyn Fetcher + 's>> {
        Err(Error::UnknownResource(model.to_string()))
    }
}

/// All resources of an application, keyed by model name.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: HashMap<String, Resource>,
    value_filters: ValueFilterRegistry,
    config: EngineConfig,
}

impl ResourceRegistry {
    /// An empty registry with the built-in value filters.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            resources: HashMap::new(),
            value_filters: ValueFilterRegistry::with_builtins(),
            config,
        }
    }

    pub fn with_value_filters(mut self, value_filters: ValueFilterRegistry) -> Self {
        self.value_filters = value_filters;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn value_filters(&self) -> &ValueFilterRegistry {
        &self.value_filters
    }

    pub fn value_filters_mut(&mut self) -> &mut ValueFilterRegistry {
        &mut self.value_filters
    }

    /// Register `resource`, replacing any resource of the same model.
    pub fn register(&mut self, resource: Resource) {
        tracing::debug!(resource = %resource.model(), table = %resource.table(), "registered resource");
        self.resources.insert(resource.model().to_string(), resource);
    }

    pub fn contains(&self, model: &str) -> bool {
        self.resources.contains_key(model)
    }

    /// Registered model names, sorted.
    pub fn models(&self) -> Vec<&str> {
        let mut models: Vec<&str> = self.resources.keys().map(String::as_str).collect();
        models.sort_unstable();
        models
    }

    pub fn resource(&self, model: &str) -> Result<ResourceHandle<'_>> {
        self.resources
            .get(model)
            .map(|resource| ResourceHandle {
                resource,
                registry: self,
            })
            .ok_or_else(|| Error::UnknownResource(model.to_string()))
    }

    /// A request using the configured join mode.
    pub fn request(&self) -> FetchRequest {
        FetchRequest::new().join_mode(self.config.filter_mode)
    }
}

impl FetcherProvider for ResourceRegistry {
    fn fetcher<'s>(&'s self, model: &str) -> Result<Box<dyn Fetcher + 's>> {
        Ok(Box::new(self.resource(model)?))
    }
}

/// A registered resource, ready to answer requests.
#[derive(Debug, Clone, Copy)]
pub struct ResourceHandle<'r> {
    resource: &'r Resource,
    registry: &'r ResourceRegistry,
}

impl<'r> ResourceHandle<'r> {
    pub fn resource(&self) -> &'r Resource {
        self.resource
    }

    pub fn model(&self) -> &'r str {
        self.resource.model()
    }

    /// One page of rows matching `request`.
    pub fn find_multiple(&self, ctx: &QueryContext, request: &FetchRequest) -> Result<Page> {
        self.resource.find_multiple(self.registry, ctx, request)
    }

    /// First row matching `request`.
    pub fn find_one(
        &self,
        ctx: &QueryContext,
        request: &FetchRequest,
    ) -> Result<Option<SingleResult>> {
        self.resource.find_one(self.registry, ctx, request)
    }

    /// The row whose primary key is `id`.
    pub fn find(
        &self,
        ctx: &QueryContext,
        id: &str,
        include: &str,
    ) -> Result<Option<SingleResult>> {
        let request = FetchRequest::new()
            .filter(format!("id:is({id})"))
            .include(include);
        self.find_one(ctx, &request)
    }

    /// Number of distinct rows matching `filter`.
    pub fn find_total_number_of_rows(
        &self,
        ctx: &QueryContext,
        filter: &str,
        join_mode: JoinMode,
    ) -> Result<u64> {
        self.resource
            .count_rows(self.registry, ctx, filter, join_mode)
    }

    /// Every page of `request`, in order.
    ///
    /// The first page is fetched right away; later pages are fetched as the
    /// iterator advances. A request without a limit uses the configured
    /// batch size.
    pub fn batch_find_multiple(
        &self,
        ctx: &QueryContext,
        request: &FetchRequest,
    ) -> Result<BatchPages<'r>> {
        let mut request = request.clone();
        if request.limit == 0 {
            request.limit = self.registry.config().batch_size;
        }
        request.page = request.page.max(1);

        let first = self.find_multiple(ctx, &request)?;
        Ok(BatchPages {
            handle: *self,
            ctx: ctx.clone(),
            total_pages: first.total_pages,
            next_page: request.page + 1,
            request,
            pending: Some(first),
            failed: false,
        })
    }

    /// Postgres SQL and bound values of the statement `find_multiple` runs.
    pub fn sql_for_find_multiple(
        &self,
        ctx: &QueryContext,
        request: &FetchRequest,
    ) -> Result<(String, sea_query::Values)> {
        let statement =
            self.resource
                .statement_for_find_multiple(self.registry.config(), ctx, request)?;
        Ok(statement.build(sea_query::PostgresQueryBuilder))
    }
}

impl Fetcher for ResourceHandle<'_> {
    fn find_multiple(&self, ctx: &QueryContext, request: &FetchRequest) -> Result<Page> {
        ResourceHandle::find_multiple(self, ctx, request)
    }

    fn find_one(
        &self,
        ctx: &QueryContext,
        request: &FetchRequest,
    ) -> Result<Option<SingleResult>> {
        ResourceHandle::find_one(self, ctx, request)
    }
}

/// Pages of a batched retrieval. See [`ResourceHandle::batch_find_multiple`].
#[derive(Debug)]
pub struct BatchPages<'r> {
    handle: ResourceHandle<'r>,
    ctx: QueryContext,
    request: FetchRequest,
    total_pages: u64,
    next_page: u64,
    pending: Option<Page>,
    failed: bool,
}

impl BatchPages<'_> {
    /// Page count reported by the first page.
    pub fn total_pages(&self) -> u64 {
        self.total_pages
    }
}

impl Iterator for BatchPages<'_> {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(first) = self.pending.take() {
            return Some(Ok(first));
        }
        if self.failed || self.next_page > self.total_pages {
            return None;
        }

        let request = self.request.clone().page(self.next_page);
        self.next_page += 1;
        let page = self.handle.find_multiple(&self.ctx, &request);
        self.failed = page.is_err();
        Some(page)
    }
}
