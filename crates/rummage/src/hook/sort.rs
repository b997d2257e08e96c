//! Strict sort stage and the ordering compiler.
//!
//! Wire format: one object or a list of objects, each
//! `{"assoc": [...], "field": "name", "order": "asc"|"desc", "ci": false}`,
//! or `{"scope": "name", "value": ...}` for a registered sort scope.
//! The normalized form is always a list.

use super::{FormatContext, Hook, SORT, as_object, scope_ref};
use crate::error::{RummageError, RummageResult};
use crate::query::{Query, SortDirection};
use crate::resolve::{AssociationPath, FieldRef, assoc, field};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One ordering key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: FieldRef,
    #[serde(default)]
    pub assoc: AssociationPath,
    /// `None` makes the spec a no-op.
    #[serde(rename = "order", default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<SortDirection>,
    #[serde(rename = "ci", default)]
    pub case_insensitive: bool,
}

impl SortSpec {
    pub fn new(field: impl Into<FieldRef>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            assoc: AssociationPath::default(),
            direction: Some(direction),
            case_insensitive: false,
        }
    }

    pub fn assoc(mut self, assoc: AssociationPath) -> Self {
        self.assoc = assoc;
        self
    }

    pub fn case_insensitive(mut self, ci: bool) -> Self {
        self.case_insensitive = ci;
        self
    }
}

/// Append one ordering key for `spec`.
///
/// Earlier keys are kept. Case-insensitive ordering wraps the column in
/// `LOWER(...)`; the column type is not checked here.
pub fn compile(query: Query, spec: &SortSpec) -> RummageResult<Query> {
    let Some(direction) = spec.direction else {
        return Ok(query);
    };
    let (query, target) = assoc::resolve(query, &spec.assoc);
    let mut operand = field::resolve(&query, &target, &spec.field)?;
    if spec.case_insensitive {
        operand = operand.lowercased();
    }
    Ok(query.order_by(operand, direction))
}

/// Normalized sort params.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortParams(pub Vec<SortSpec>);

impl SortParams {
    pub fn iter(&self) -> impl Iterator<Item = &SortSpec> {
        self.0.iter()
    }
}

/// Split a sort value into its items.
pub(crate) fn items<'v>(hook: &str, raw: &'v Value) -> RummageResult<Vec<&'v Value>> {
    match raw {
        Value::Array(items) => Ok(items.iter().collect()),
        Value::Object(_) => Ok(vec![raw]),
        other => Err(RummageError::invalid(format!(
            "{hook} params must be an object or a list, got {other}"
        ))),
    }
}

pub(crate) fn expand_scope(
    query: &Query,
    map: &Map<String, Value>,
) -> RummageResult<Option<SortSpec>> {
    match scope_ref(map)? {
        Some((name, value)) => {
            let producer = query.base_schema().sort_scope_fn(name)?;
            producer(&value).map(Some)
        }
        None => Ok(None),
    }
}

fn parse_item(query: &Query, item: &Value) -> RummageResult<SortSpec> {
    let map = as_object(SORT, item)?;
    if let Some(spec) = expand_scope(query, map)? {
        return Ok(spec);
    }
    let field = FieldRef::from_value(
        map.get("field")
            .ok_or_else(|| RummageError::missing_key(SORT, "field"))?,
    )?;
    let assoc = match map.get("assoc") {
        Some(value) => AssociationPath::from_value(value)?,
        None => AssociationPath::default(),
    };
    let direction = map
        .get("order")
        .and_then(|v| (!v.is_null()).then_some(v))
        .ok_or_else(|| RummageError::missing_key(SORT, "order"))?
        .as_str()
        .ok_or_else(|| RummageError::invalid("order must be \"asc\" or \"desc\""))?
        .parse::<SortDirection>()?;
    let case_insensitive = match map.get("ci") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(ci)) => *ci,
        Some(other) => {
            return Err(RummageError::invalid(format!(
                "ci must be a boolean, got {other}"
            )));
        }
    };
    Ok(SortSpec {
        field,
        assoc,
        direction: Some(direction),
        case_insensitive,
    })
}

/// Built-in sort stage: `field` and `order` are required.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortHook;

#[async_trait]
impl Hook for SortHook {
    type Params = SortParams;

    fn name(&self) -> &str {
        SORT
    }

    async fn format_params(
        &self,
        query: &Query,
        raw: Value,
        _ctx: &FormatContext<'_>,
    ) -> RummageResult<SortParams> {
        items(SORT, &raw)?
            .into_iter()
            .map(|item| parse_item(query, item))
            .collect::<RummageResult<Vec<_>>>()
            .map(SortParams)
    }

    fn run(&self, query: Query, params: &SortParams) -> RummageResult<Query> {
        params.iter().try_fold(query, compile)
    }
}
