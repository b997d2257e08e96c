use crate::error::{RummageError, RummageResult};
use crate::query::{Binding, JoinKind, Query};
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// One hop of an association path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssocStep {
    pub kind: JoinKind,
    pub relation: String,
}

impl AssocStep {
    pub fn new(kind: JoinKind, relation: impl Into<String>) -> Self {
        Self {
            kind,
            relation: relation.into(),
        }
    }

    /// Parse `{"left": "category"}` or a bare `"category"` (inner join).
    pub fn from_value(value: &Value) -> RummageResult<Self> {
        match value {
            Value::String(relation) => Ok(Self::new(JoinKind::Inner, relation.clone())),
            Value::Object(map) if map.len() == 1 => {
                let (kind, relation) = map
                    .iter()
                    .next()
                    .ok_or_else(|| RummageError::invalid("empty association step"))?;
                let relation = relation.as_str().ok_or_else(|| {
                    RummageError::invalid(format!("association `{kind}` must name a relation"))
                })?;
                Ok(Self::new(kind.parse()?, relation))
            }
            other => Err(RummageError::invalid(format!(
                "association step must be a string or a single-key object, got {other}"
            ))),
        }
    }
}

impl Serialize for AssocStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.kind.as_str(), &self.relation)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for AssocStep {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        AssocStep::from_value(&value).map_err(D::Error::custom)
    }
}

/// Ordered association hops; empty means the field lives on the base entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssociationPath(Vec<AssocStep>);

impl AssociationPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(self, relation: impl Into<String>) -> Self {
        self.step(JoinKind::Inner, relation)
    }

    pub fn left(self, relation: impl Into<String>) -> Self {
        self.step(JoinKind::Left, relation)
    }

    pub fn cross(self, relation: impl Into<String>) -> Self {
        self.step(JoinKind::Cross, relation)
    }

    pub fn step(mut self, kind: JoinKind, relation: impl Into<String>) -> Self {
        self.0.push(AssocStep::new(kind, relation));
        self
    }

    /// Parse the `assoc` wire value; `null` is an empty path.
    pub fn from_value(value: &Value) -> RummageResult<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Array(items) => items
                .iter()
                .map(AssocStep::from_value)
                .collect::<RummageResult<Vec<_>>>()
                .map(Self),
            other => Err(RummageError::invalid(format!(
                "assoc must be a list, got {other}"
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn steps(&self) -> &[AssocStep] {
        &self.0
    }
}

impl FromIterator<AssocStep> for AssociationPath {
    fn from_iter<I: IntoIterator<Item = AssocStep>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Fold `path` onto `query` starting at the base entity.
pub fn resolve(query: Query, path: &AssociationPath) -> (Query, Binding) {
    let from = query.base_binding().clone();
    resolve_from(query, from, path)
}

/// Fold `path` onto `query` starting at `from`.
///
/// Each hop joins from the previous hop's target, and every call adds fresh
/// joins; nothing is deduplicated.
pub fn resolve_from(query: Query, from: Binding, path: &AssociationPath) -> (Query, Binding) {
    path.steps()
        .iter()
        .fold((query, from), |(query, current), step| {
            query.join(step.kind, &current, &step.relation)
        })
}
