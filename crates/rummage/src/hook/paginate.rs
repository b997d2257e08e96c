//! Offset pagination with a pre-computed total.
//!
//! Wire format: `{"per_page": 10, "page": 1}` (integers or numeric strings),
//! or `{"scope": "name", "value": ...}`. The normalized form adds
//! `total_count` and `max_page`.

use super::{FormatContext, Hook, PAGINATE, as_object, int_param, scope_ref};
use crate::error::{RummageError, RummageResult};
use crate::query::Query;
use crate::repo::Repository;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Page request plus the derived totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginateSpec {
    pub page: i64,
    pub per_page: i64,
    #[serde(default)]
    pub total_count: i64,
    #[serde(default)]
    pub max_page: i64,
}

impl PaginateSpec {
    /// Page request with `page` and `per_page` clamped to at least 1.
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
            total_count: 0,
            max_page: 0,
        }
    }

    /// Rows skipped before this page.
    pub fn offset(&self) -> i64 {
        self.per_page.saturating_mul(self.page - 1)
    }

    /// Record the total and derive `max_page`, pulling `page` back into range.
    pub fn with_total(mut self, total_count: i64) -> Self {
        self.page = self.page.max(1);
        self.per_page = self.per_page.max(1);
        self.total_count = total_count.max(0);
        self.max_page = max_page(self.total_count, self.per_page);
        self.page = self.page.min(self.max_page.max(1));
        self
    }
}

/// `ceil(total / per_page)`; zero when there are no rows.
pub(crate) fn max_page(total_count: i64, per_page: i64) -> i64 {
    if total_count <= 0 {
        return 0;
    }
    (total_count - 1) / per_page.max(1) + 1
}

/// Count the rows `query` matches and fill in the totals.
pub async fn precompute(
    query: &Query,
    spec: PaginateSpec,
    repo: &dyn Repository,
) -> RummageResult<PaginateSpec> {
    let total_count = repo.count(query).await?;
    let spec = spec.with_total(total_count);
    #[cfg(feature = "tracing")]
    tracing::debug!(
        target: "rummage.paginate",
        total_count = spec.total_count,
        max_page = spec.max_page,
        page = spec.page,
        per_page = spec.per_page,
        "counted rows"
    );
    Ok(spec)
}

/// Built-in paginate stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaginateHook;

impl PaginateHook {
    fn parse(query: &Query, raw: &Value, default_per_page: i64) -> RummageResult<PaginateSpec> {
        let map = as_object(PAGINATE, raw)?;
        if let Some((name, value)) = scope_ref(map)? {
            let producer = query.base_schema().paginate_scope_fn(name)?;
            let spec = producer(&value)?;
            return Ok(PaginateSpec::new(spec.page, spec.per_page));
        }
        let per_page = int_param(map, "per_page")?.unwrap_or(default_per_page);
        let page = int_param(map, "page")?.unwrap_or(1);
        Ok(PaginateSpec::new(page, per_page))
    }
}

#[async_trait]
impl Hook for PaginateHook {
    type Params = PaginateSpec;

    fn name(&self) -> &str {
        PAGINATE
    }

    async fn format_params(
        &self,
        query: &Query,
        raw: Value,
        ctx: &FormatContext<'_>,
    ) -> RummageResult<PaginateSpec> {
        let spec = Self::parse(query, &raw, ctx.per_page)?;
        let repo = ctx
            .repo
            .ok_or_else(|| RummageError::missing_key(PAGINATE, "repo"))?;
        precompute(query, spec, repo).await
    }

    fn run(&self, query: Query, params: &PaginateSpec) -> RummageResult<Query> {
        let spec = PaginateSpec::new(params.page, params.per_page);
        Ok(query.limit(spec.per_page).offset(spec.offset()))
    }
}
