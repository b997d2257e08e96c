//! Strict search stage and the per-field predicate compiler.
//!
//! Wire format, one entry per field:
//!
//! ```json
//! {"search": {"price": {"assoc": [], "search_type": "lteq", "search_term": 10, "search_expr": "where"}}}
//! ```
//!
//! `field` defaults to the entry name. Entries whose value is not an object
//! name a search scope registered on the base entity; the value is handed to
//! the scope.

use super::{FormatContext, Hook, SEARCH, as_object, term_of};
use crate::error::{RummageError, RummageResult};
use crate::expr::{CompareOp, Expr, Operand};
use crate::query::{CombineMode, Query};
use crate::resolve::{AssociationPath, FieldRef, assoc, field};
use crate::types::Term;
use async_trait::async_trait;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Search operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOp {
    Like,
    Ilike,
    Eq,
    Gt,
    Lt,
    Gteq,
    Lteq,
    IsNull,
    In,
    NotIn,
    Between,
}

impl FromStr for SearchOp {
    type Err = RummageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "like" => SearchOp::Like,
            "ilike" => SearchOp::Ilike,
            "eq" => SearchOp::Eq,
            "gt" => SearchOp::Gt,
            "lt" => SearchOp::Lt,
            "gteq" => SearchOp::Gteq,
            "lteq" => SearchOp::Lteq,
            "is_null" => SearchOp::IsNull,
            "in" => SearchOp::In,
            "not_in" => SearchOp::NotIn,
            "between" => SearchOp::Between,
            other => return Err(RummageError::UnsupportedOperator(other.to_string())),
        })
    }
}

/// One field's search specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpec {
    pub field: FieldRef,
    #[serde(default)]
    pub assoc: AssociationPath,
    #[serde(rename = "search_type")]
    pub operator: SearchOp,
    #[serde(rename = "search_term")]
    pub term: Term,
    #[serde(rename = "search_expr", default)]
    pub combine: CombineMode,
}

impl SearchSpec {
    pub fn new(field: impl Into<FieldRef>, operator: SearchOp, term: impl Into<Term>) -> Self {
        Self {
            field: field.into(),
            assoc: AssociationPath::default(),
            operator,
            term: term.into(),
            combine: CombineMode::And,
        }
    }

    pub fn assoc(mut self, assoc: AssociationPath) -> Self {
        self.assoc = assoc;
        self
    }

    pub fn combine(mut self, combine: CombineMode) -> Self {
        self.combine = combine;
        self
    }

    /// Check the term has the shape the operator needs.
    ///
    /// Blank terms always pass; they turn the spec into a no-op.
    pub fn check_term(&self) -> RummageResult<()> {
        if self.term.is_blank() {
            return Ok(());
        }
        let ok = match self.operator {
            SearchOp::Between => matches!(&self.term, Term::List(items) if items.len() == 2),
            SearchOp::In | SearchOp::NotIn => matches!(self.term, Term::List(_)),
            SearchOp::IsNull => self.term.as_bool().is_some(),
            _ => !matches!(self.term, Term::List(_)),
        };
        if ok {
            Ok(())
        } else {
            Err(RummageError::invalid(format!(
                "search_term {:?} does not fit operator {:?}",
                self.term, self.operator
            )))
        }
    }
}

/// Build the boolean condition for one operator.
pub(crate) fn condition(lhs: Operand, operator: SearchOp, term: &Term) -> RummageResult<Expr> {
    let op = match operator {
        SearchOp::Like => CompareOp::Like,
        SearchOp::Ilike => CompareOp::Ilike,
        SearchOp::Eq => CompareOp::Eq,
        SearchOp::Gt => CompareOp::Gt,
        SearchOp::Lt => CompareOp::Lt,
        SearchOp::Gteq => CompareOp::Gte,
        SearchOp::Lteq => CompareOp::Lte,
        SearchOp::IsNull => {
            return match term.as_bool() {
                Some(true) => Ok(Expr::is_null(lhs)),
                Some(false) => Ok(Expr::is_not_null(lhs)),
                None => Err(RummageError::invalid("is_null needs a boolean term")),
            };
        }
        SearchOp::In => {
            return match term.as_list() {
                Some(values) => Ok(Expr::in_list(lhs, values.to_vec())),
                None => Err(RummageError::invalid("in needs a list term")),
            };
        }
        SearchOp::NotIn => {
            return match term.as_list() {
                Some(values) => Ok(Expr::not_in(lhs, values.to_vec())),
                None => Err(RummageError::invalid("not_in needs a list term")),
            };
        }
        SearchOp::Between => {
            return match term.as_list() {
                Some([low, high]) => Ok(Expr::between(lhs, low.clone(), high.clone())),
                _ => Err(RummageError::invalid("between needs a [low, high] term")),
            };
        }
    };
    Ok(Expr::compare(lhs, op, term.clone()))
}

/// Identity of the searched field: association path plus field, without
/// join aliases, so two entries through the same path share it.
fn field_key(spec: &SearchSpec) -> String {
    let mut key = String::new();
    for step in spec.assoc.steps() {
        key.push_str(step.kind.as_str());
        key.push(':');
        key.push_str(&step.relation);
        key.push('/');
    }
    match &spec.field {
        FieldRef::Plain(name) => key.push_str(name),
        FieldRef::Computed { template, args } => {
            key.push_str(template.as_str());
            key.push('(');
            key.push_str(&args.join(","));
            key.push(')');
        }
    }
    key
}

/// Compile one search spec onto the query.
///
/// A blank term leaves the query untouched. Otherwise the association path is
/// joined, the field resolved on the last join target, and the condition
/// attached according to `spec.combine`; `or_where` groups with the latest
/// condition on the same association path and field.
pub fn compile(query: Query, spec: &SearchSpec) -> RummageResult<Query> {
    if spec.term.is_blank() {
        return Ok(query);
    }
    spec.check_term()?;
    let (query, target) = assoc::resolve(query, &spec.assoc);
    let operand = field::resolve(&query, &target, &spec.field)?;
    let expr = condition(operand, spec.operator, &spec.term)?;
    Ok(query.attach(&field_key(spec), spec.combine, expr))
}

/// Normalized search params, in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchParams(pub Vec<(String, SearchSpec)>);

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, spec: SearchSpec) -> Self {
        self.0.push((name.into(), spec));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SearchSpec)> {
        self.0.iter().map(|(name, spec)| (name.as_str(), spec))
    }
}

impl Serialize for SearchParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, spec) in &self.0 {
            map.serialize_entry(name, spec)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SearchParams {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        map.into_iter()
            .map(|(name, value)| {
                SearchSpec::deserialize(value)
                    .map(|spec| (name, spec))
                    .map_err(D::Error::custom)
            })
            .collect::<Result<Vec<_>, _>>()
            .map(SearchParams)
    }
}

/// Expand a non-object entry through the base entity's search scopes.
pub(crate) fn expand_scope(query: &Query, name: &str, value: &Value) -> RummageResult<SearchSpec> {
    let producer = query.base_schema().search_scope_fn(name)?;
    producer(&term_of(value)?)
}

/// Parse one object entry, raising on anything missing or unknown.
fn parse_entry(hook: &str, name: &str, entry: &Map<String, Value>) -> RummageResult<SearchSpec> {
    let field = match entry.get("field") {
        Some(value) => FieldRef::from_value(value)?,
        None => FieldRef::plain(name),
    };
    let assoc = match entry.get("assoc") {
        Some(value) => AssociationPath::from_value(value)?,
        None => AssociationPath::default(),
    };
    let operator = entry
        .get("search_type")
        .ok_or_else(|| RummageError::missing_key(hook, "search_type"))?
        .as_str()
        .ok_or_else(|| RummageError::invalid("search_type must be a string"))?
        .parse::<SearchOp>()?;
    let term = term_of(
        entry
            .get("search_term")
            .ok_or_else(|| RummageError::missing_key(hook, "search_term"))?,
    )?;
    let combine = match entry.get("search_expr") {
        None | Some(Value::Null) => CombineMode::And,
        Some(value) => CombineMode::deserialize(value)
            .map_err(|_| RummageError::invalid(format!("unknown search_expr {value}")))?,
    };
    let spec = SearchSpec {
        field,
        assoc,
        operator,
        term,
        combine,
    };
    spec.check_term()?;
    Ok(spec)
}

/// Built-in search stage: unknown operators and missing keys are errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchHook;

#[async_trait]
impl Hook for SearchHook {
    type Params = SearchParams;

    fn name(&self) -> &str {
        SEARCH
    }

    async fn format_params(
        &self,
        query: &Query,
        raw: Value,
        _ctx: &FormatContext<'_>,
    ) -> RummageResult<SearchParams> {
        let map = as_object(SEARCH, &raw)?;
        let mut params = SearchParams::new();
        for (name, value) in map {
            let spec = match value {
                Value::Object(entry) => parse_entry(SEARCH, name, entry)?,
                other => expand_scope(query, name, other)?,
            };
            params.0.push((name.clone(), spec));
        }
        Ok(params)
    }

    fn run(&self, query: Query, params: &SearchParams) -> RummageResult<Query> {
        params
            .iter()
            .try_fold(query, |query, (_, spec)| compile(query, spec))
    }
}
