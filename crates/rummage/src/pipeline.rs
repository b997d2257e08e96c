//! The rummage pipeline: format each stage's params, then run the stages.

use crate::config::{FormatMode, Options, RummageConfig, resolve_hook};
use crate::error::{RummageError, RummageResult};
use crate::hook::{FormatContext, HookRef, PAGINATE, PaginateSpec, SEARCH, SORT};
use crate::query::Query;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Params map keyed by stage name, in request order.
///
/// A missing key and a `null` value both mean "leave this axis alone".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RummageParams(Map<String, Value>);

impl RummageParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON object; anything else is `InvalidParams`.
    pub fn from_value(value: Value) -> RummageResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(RummageError::invalid(format!(
                "rummage params must be an object, got {other}"
            ))),
        }
    }

    pub fn with(mut self, stage: impl Into<String>, value: Value) -> Self {
        self.0.insert(stage.into(), value);
        self
    }

    /// Stage params, treating `null` as absent.
    pub fn get(&self, stage: &str) -> Option<&Value> {
        self.0.get(stage).filter(|v| !v.is_null())
    }

    pub fn contains(&self, stage: &str) -> bool {
        self.get(stage).is_some()
    }

    fn set(&mut self, stage: &str, value: Value) {
        self.0.insert(stage.to_string(), value);
    }

    pub fn search(&self) -> Option<&Value> {
        self.get(SEARCH)
    }

    pub fn sort(&self) -> Option<&Value> {
        self.get(SORT)
    }

    /// Normalized paginate params, when that stage ran with the built-in shape.
    pub fn paginate(&self) -> Option<PaginateSpec> {
        self.get(PAGINATE)
            .and_then(|v| PaginateSpec::deserialize(v).ok())
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl TryFrom<Value> for RummageParams {
    type Error = RummageError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

/// Pipeline runner holding the global configuration.
#[derive(Debug, Clone, Default)]
pub struct Rummage {
    config: RummageConfig,
}

impl Rummage {
    pub fn new(config: RummageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RummageConfig {
        &self.config
    }

    /// Transform `query` according to `params`.
    ///
    /// Returns the new query and the normalized params. Stages whose params
    /// are absent are neither formatted nor run, and need no hook. Hooks for
    /// the present stages are all looked up before anything is formatted.
    pub async fn rummage(
        &self,
        query: Query,
        mut params: RummageParams,
        options: &Options<'_>,
    ) -> RummageResult<(Query, RummageParams)> {
        let stages = options.stages.as_ref().unwrap_or(&self.config.stages);
        let mut present: Vec<(&str, HookRef, Value)> = Vec::with_capacity(stages.len());
        for stage in stages {
            let Some(raw) = params.get(stage).cloned() else {
                log_skipped(stage);
                continue;
            };
            let hook = resolve_hook(stage, options, query.base_schema(), &self.config)?;
            present.push((stage.as_str(), hook, raw));
        }

        let mut ctx = FormatContext::new(options.per_page.unwrap_or(self.config.default_per_page));
        ctx.repo = options.repo;

        let query = match self.config.format_mode {
            FormatMode::TwoPass => {
                let mut ready = Vec::with_capacity(present.len());
                for (stage, hook, raw) in present {
                    let formatted = hook.format_value(&query, raw, &ctx).await?;
                    log_formatted(stage, hook.name());
                    params.set(stage, formatted.clone());
                    ready.push((stage, hook, formatted));
                }
                let mut query = query;
                for (stage, hook, formatted) in ready {
                    query = hook.run_value(query, &formatted)?;
                    log_ran(stage, &query);
                }
                query
            }
            FormatMode::Threaded => {
                let mut query = query;
                for (stage, hook, raw) in present {
                    let formatted = hook.format_value(&query, raw, &ctx).await?;
                    log_formatted(stage, hook.name());
                    query = hook.run_value(query, &formatted)?;
                    log_ran(stage, &query);
                    params.set(stage, formatted);
                }
                query
            }
        };

        Ok((query, params))
    }
}

/// Run the pipeline with the default configuration.
pub async fn rummage(
    query: Query,
    params: RummageParams,
    options: &Options<'_>,
) -> RummageResult<(Query, RummageParams)> {
    Rummage::default().rummage(query, params, options).await
}

#[cfg(feature = "tracing")]
fn log_skipped(stage: &str) {
    tracing::debug!(target: "rummage.pipeline", stage, "stage skipped");
}

#[cfg(feature = "tracing")]
fn log_formatted(stage: &str, hook: &str) {
    tracing::debug!(target: "rummage.pipeline", stage, hook, "params formatted");
}

#[cfg(feature = "tracing")]
fn log_ran(stage: &str, query: &Query) {
    tracing::debug!(target: "rummage.pipeline", stage, sql = %query.to_sql(), "stage ran");
}

#[cfg(not(feature = "tracing"))]
fn log_skipped(_stage: &str) {}

#[cfg(not(feature = "tracing"))]
fn log_formatted(_stage: &str, _hook: &str) {}

#[cfg(not(feature = "tracing"))]
fn log_ran(_stage: &str, _query: &Query) {}
