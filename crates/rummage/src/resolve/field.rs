use crate::error::{RummageError, RummageResult};
use crate::expr::Operand;
use crate::ident::qualified;
use crate::query::{Binding, Query};
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::str::FromStr;

/// Whitelisted computed-field templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    YearOf,
    MonthOf,
    Lowercase,
    Uppercase,
    ConcatTwo,
    CoalesceTwo,
}

impl Template {
    pub fn as_str(&self) -> &'static str {
        match self {
            Template::YearOf => "year_of",
            Template::MonthOf => "month_of",
            Template::Lowercase => "lowercase",
            Template::Uppercase => "uppercase",
            Template::ConcatTwo => "concat_two",
            Template::CoalesceTwo => "coalesce_two",
        }
    }

    /// Number of column arguments the template takes.
    pub fn arity(&self) -> usize {
        match self {
            Template::YearOf | Template::MonthOf | Template::Lowercase | Template::Uppercase => 1,
            Template::ConcatTwo | Template::CoalesceTwo => 2,
        }
    }

    fn render(&self, cols: &[String]) -> RummageResult<String> {
        let sql = match (self, cols) {
            (Template::YearOf, [a]) => format!("EXTRACT(YEAR FROM {a})::integer"),
            (Template::MonthOf, [a]) => format!("EXTRACT(MONTH FROM {a})::integer"),
            (Template::Lowercase, [a]) => format!("LOWER({a})"),
            (Template::Uppercase, [a]) => format!("UPPER({a})"),
            (Template::ConcatTwo, [a, b]) => format!("CONCAT({a}, {b})"),
            (Template::CoalesceTwo, [a, b]) => format!("COALESCE({a}, {b})"),
            _ => return Err(arity_error(*self, cols.len())),
        };
        Ok(sql)
    }
}

impl FromStr for Template {
    type Err = RummageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "year_of" => Ok(Template::YearOf),
            "month_of" => Ok(Template::MonthOf),
            "lowercase" => Ok(Template::Lowercase),
            "uppercase" => Ok(Template::Uppercase),
            "concat_two" => Ok(Template::ConcatTwo),
            "coalesce_two" => Ok(Template::CoalesceTwo),
            other => Err(RummageError::UnsupportedTemplate(other.to_string())),
        }
    }
}

fn arity_error(template: Template, got: usize) -> RummageError {
    RummageError::invalid(format!(
        "template `{}` takes {} column(s), got {got}",
        template.as_str(),
        template.arity(),
    ))
}

/// A field reference: a plain column or a whitelisted template over columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldRef {
    Plain(String),
    Computed { template: Template, args: Vec<String> },
}

impl FieldRef {
    pub fn plain(name: impl Into<String>) -> Self {
        FieldRef::Plain(name.into())
    }

    /// Build a computed field, checking the template's arity.
    pub fn computed<I, S>(template: Template, args: I) -> RummageResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        if args.len() != template.arity() {
            return Err(arity_error(template, args.len()));
        }
        Ok(FieldRef::Computed { template, args })
    }

    /// Parse the wire form: `"name"` or `{"template": "...", "args": [...]}`.
    pub fn from_value(value: &Value) -> RummageResult<Self> {
        match value {
            Value::String(name) => Ok(FieldRef::Plain(name.clone())),
            Value::Object(map) => {
                let template = map
                    .get("template")
                    .and_then(Value::as_str)
                    .ok_or_else(|| RummageError::invalid("computed field needs a `template`"))?
                    .parse::<Template>()?;
                let args = map
                    .get("args")
                    .and_then(Value::as_array)
                    .ok_or_else(|| RummageError::invalid("computed field needs an `args` list"))?
                    .iter()
                    .map(|arg| {
                        arg.as_str().map(str::to_string).ok_or_else(|| {
                            RummageError::invalid("computed field args must be column names")
                        })
                    })
                    .collect::<RummageResult<Vec<_>>>()?;
                FieldRef::computed(template, args)
            }
            other => Err(RummageError::invalid(format!(
                "field must be a name or a computed field, got {other}"
            ))),
        }
    }

    /// Column names the field reads.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            FieldRef::Plain(name) => vec![name.as_str()],
            FieldRef::Computed { args, .. } => args.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for FieldRef {
    fn from(name: &str) -> Self {
        FieldRef::Plain(name.to_string())
    }
}

impl Serialize for FieldRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldRef::Plain(name) => serializer.serialize_str(name),
            FieldRef::Computed { template, args } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("template", template.as_str())?;
                map.serialize_entry("args", args)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for FieldRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        FieldRef::from_value(&value).map_err(D::Error::custom)
    }
}

/// Resolve `field` against the entity bound at `binding`.
///
/// A plain name registered as a computed field on that entity expands to the
/// computed expression.
pub fn resolve(query: &Query, binding: &Binding, field: &FieldRef) -> RummageResult<Operand> {
    let field = match field {
        FieldRef::Plain(name) => query
            .schema(binding)
            .and_then(|schema| schema.computed_field(name))
            .unwrap_or(field),
        computed => computed,
    };

    match field {
        FieldRef::Plain(name) => Ok(Operand::new(qualified(binding.alias(), name)?)),
        FieldRef::Computed { template, args } => {
            let cols = args
                .iter()
                .map(|arg| qualified(binding.alias(), arg))
                .collect::<RummageResult<Vec<_>>>()?;
            Ok(Operand::new(template.render(&cols)?))
        }
    }
}
