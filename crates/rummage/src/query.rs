//! Immutable, composable SELECT query over a registered entity.
//!
//! Every builder method consumes `self` and returns the next query; clone first
//! to keep the previous value around. Joins onto unknown associations are
//! recorded as a build error and reported by [`Query::validate`], which every
//! repository execution calls first.

use crate::error::{RummageError, RummageResult};
use crate::expr::{Expr, Operand};
use crate::ident::Ident;
use crate::param::ParamList;
use crate::schema::{Schema, SchemaRegistry};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// An entity occurrence inside a query: the base entity or one join target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binding {
    alias: String,
    entity: String,
}

impl Binding {
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }
}

/// Join kind for association paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
    Cross,
}

impl JoinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
            JoinKind::Cross => "cross",
        }
    }

    fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

impl FromStr for JoinKind {
    type Err = RummageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inner" => Ok(JoinKind::Inner),
            "left" => Ok(JoinKind::Left),
            "cross" => Ok(JoinKind::Cross),
            other => Err(RummageError::invalid(format!("unknown join kind `{other}`"))),
        }
    }
}

/// How a search condition attaches relative to earlier conditions on the same field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombineMode {
    #[default]
    #[serde(rename = "where")]
    And,
    #[serde(rename = "or_where")]
    Or,
    #[serde(rename = "not_where")]
    NotAnd,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = RummageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(RummageError::invalid(format!("unknown sort direction `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Join {
    kind: JoinKind,
    table: String,
    alias: String,
    on: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct Conjunct {
    field: Option<String>,
    expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
struct OrderItem {
    operand: Operand,
    dir: SortDirection,
}

/// Immutable SELECT query value.
#[derive(Clone)]
pub struct Query {
    registry: Arc<SchemaRegistry>,
    base: Binding,
    base_schema: Arc<Schema>,
    table: String,
    joins: Vec<Join>,
    conjuncts: Vec<Conjunct>,
    order_items: Vec<OrderItem>,
    limit: Option<i64>,
    offset: Option<i64>,
    build_error: Option<String>,
}

fn alias_for(table: &str, index: usize) -> String {
    let initial = table
        .chars()
        .find(|c| c.is_ascii_alphabetic())
        .map_or('t', |c| c.to_ascii_lowercase());
    format!("{initial}{index}")
}

impl Query {
    /// Start a query selecting every row of `entity`.
    pub fn from_entity(registry: Arc<SchemaRegistry>, entity: &str) -> RummageResult<Self> {
        let base_schema = registry
            .get(entity)
            .cloned()
            .ok_or_else(|| RummageError::validation(format!("unknown entity `{entity}`")))?;
        let table = base_schema.table().to_string();
        let base = Binding {
            alias: alias_for(&table, 0),
            entity: entity.to_string(),
        };
        Ok(Self {
            registry,
            base,
            base_schema,
            table,
            joins: Vec::new(),
            conjuncts: Vec::new(),
            order_items: Vec::new(),
            limit: None,
            offset: None,
            build_error: None,
        })
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn base_binding(&self) -> &Binding {
        &self.base
    }

    pub fn schema(&self, binding: &Binding) -> Option<&Schema> {
        self.registry.get(&binding.entity).map(|s| s.as_ref())
    }

    pub fn base_schema(&self) -> &Schema {
        &self.base_schema
    }

    pub fn join_count(&self) -> usize {
        self.joins.len()
    }

    pub fn condition_count(&self) -> usize {
        self.conjuncts.len()
    }

    pub fn order_count(&self) -> usize {
        self.order_items.len()
    }

    pub fn limit_value(&self) -> Option<i64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<i64> {
        self.offset
    }

    // ==================== Joins ====================

    /// Join association `relation` of `from`; returns the new join target.
    ///
    /// Every call adds a fresh join. An unknown relation is not an error here;
    /// it surfaces from [`validate`](Self::validate).
    pub fn join(mut self, kind: JoinKind, from: &Binding, relation: &str) -> (Self, Binding) {
        let index = self.joins.len() + 1;
        let association = self
            .schema(from)
            .and_then(|schema| schema.association(relation))
            .cloned();
        let target = association
            .as_ref()
            .and_then(|assoc| self.registry.get(&assoc.target).cloned());

        let (entity, table, on) = match (association, target) {
            (Some(assoc), Some(target)) => {
                let alias = alias_for(target.table(), index);
                let on = (kind != JoinKind::Cross).then(|| {
                    format!(
                        "{alias}.{} = {}.{}",
                        assoc.related_key, from.alias, assoc.owner_key
                    )
                });
                (assoc.target, target.table().to_string(), on)
            }
            (Some(assoc), None) => {
                self.record_error(format!(
                    "association `{relation}` on `{}` targets unknown entity `{}`",
                    from.entity, assoc.target
                ));
                (assoc.target, relation.to_string(), None)
            }
            (None, _) => {
                self.record_error(format!(
                    "unknown association `{relation}` on `{}`",
                    from.entity
                ));
                let table = Ident::parse(relation)
                    .map_or_else(|_| "invalid".to_string(), |i| i.to_sql());
                (relation.to_string(), table, None)
            }
        };

        let binding = Binding {
            alias: alias_for(&table, index),
            entity,
        };
        self.joins.push(Join {
            kind,
            table,
            alias: binding.alias.clone(),
            on,
        });
        (self, binding)
    }

    fn record_error(&mut self, message: String) {
        if self.build_error.is_none() {
            self.build_error = Some(message);
        }
    }

    // ==================== Conditions ====================

    /// AND a condition onto the query.
    pub fn and_where(mut self, expr: Expr) -> Self {
        self.conjuncts.push(Conjunct { field: None, expr });
        self
    }

    /// OR a condition with everything accumulated so far.
    pub fn or_where(mut self, expr: Expr) -> Self {
        if self.conjuncts.is_empty() {
            return self.and_where(expr);
        }
        let all: Vec<Expr> = self.conjuncts.drain(..).map(|c| c.expr).collect();
        let existing = if all.len() == 1 {
            all.into_iter().next().unwrap_or(Expr::True)
        } else {
            Expr::And(all)
        };
        self.conjuncts.push(Conjunct {
            field: None,
            expr: existing.or_with(expr),
        });
        self
    }

    /// AND the negation of a condition.
    pub fn not_where(self, expr: Expr) -> Self {
        self.and_where(Expr::not(expr))
    }

    /// Attach a condition produced for search field `field`.
    ///
    /// `Or` joins the latest condition produced for the same field; with no
    /// earlier condition for that field it behaves like `And`.
    pub fn attach(mut self, field: &str, combine: CombineMode, expr: Expr) -> Self {
        let tag = Some(field.to_string());
        match combine {
            CombineMode::And => self.conjuncts.push(Conjunct { field: tag, expr }),
            CombineMode::NotAnd => self.conjuncts.push(Conjunct {
                field: tag,
                expr: Expr::not(expr),
            }),
            CombineMode::Or => match self.conjuncts.iter().rposition(|c| c.field == tag) {
                Some(pos) => {
                    let previous = std::mem::replace(&mut self.conjuncts[pos].expr, Expr::True);
                    self.conjuncts[pos].expr = previous.or_with(expr);
                }
                None => self.conjuncts.push(Conjunct { field: tag, expr }),
            },
        }
        self
    }

    // ==================== Ordering & paging ====================

    /// Append one ordering key; earlier keys are kept.
    pub fn order_by(mut self, operand: Operand, dir: SortDirection) -> Self {
        self.order_items.push(OrderItem { operand, dir });
        self
    }

    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: i64) -> Self {
        self.offset = Some(n);
        self
    }

    // ==================== Rendering ====================

    /// Report a deferred build error, if any.
    pub fn validate(&self) -> RummageResult<()> {
        match &self.build_error {
            Some(message) => Err(RummageError::validation(message.clone())),
            None => Ok(()),
        }
    }

    fn push_from(&self, sql: &mut String) {
        sql.push_str(" FROM ");
        sql.push_str(&self.table);
        sql.push_str(" AS ");
        sql.push_str(&self.base.alias);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join.kind.as_sql());
            sql.push(' ');
            sql.push_str(&join.table);
            sql.push_str(" AS ");
            sql.push_str(&join.alias);
            if let Some(on) = &join.on {
                sql.push_str(" ON ");
                sql.push_str(on);
            }
        }
    }

    fn push_where(&self, sql: &mut String, params: &mut ParamList) {
        let where_sql = match self.conjuncts.as_slice() {
            [only] => only.expr.build(params),
            conjuncts => {
                let exprs: Vec<Expr> = conjuncts.iter().map(|c| c.expr.clone()).collect();
                Expr::And(exprs).build(params)
            }
        };
        if !where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }
    }

    /// Render the SELECT statement and its parameters.
    pub fn build(&self) -> (String, ParamList) {
        let mut params = ParamList::new();
        let mut sql = format!("SELECT {}.*", self.base.alias);
        self.push_from(&mut sql);
        self.push_where(&mut sql, &mut params);

        if !self.order_items.is_empty() {
            let items: Vec<String> = self
                .order_items
                .iter()
                .map(|o| format!("{} {}", o.operand.as_sql(), o.dir.as_sql()))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&items.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        (sql, params)
    }

    /// Render the row-count statement; ordering and paging are dropped.
    ///
    /// Counts distinct primary keys when the base entity declares one, so
    /// joins that fan out do not inflate the total.
    pub fn build_count(&self) -> (String, ParamList) {
        let mut params = ParamList::new();
        let alias = &self.base.alias;
        match self.base_schema().primary_key_column() {
            Some(pk) => {
                let mut sql = format!("SELECT COUNT(DISTINCT {alias}.{pk})");
                self.push_from(&mut sql);
                self.push_where(&mut sql, &mut params);
                (sql, params)
            }
            None => {
                let mut inner = format!("SELECT DISTINCT {alias}.*");
                self.push_from(&mut inner);
                self.push_where(&mut inner, &mut params);
                (format!("SELECT COUNT(*) FROM ({inner}) AS t"), params)
            }
        }
    }

    pub fn to_sql(&self) -> String {
        self.build().0
    }

    pub fn to_count_sql(&self) -> String {
        self.build_count().0
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.registry, &other.registry)
            && self.base == other.base
            && self.table == other.table
            && self.joins == other.joins
            && self.conjuncts == other.conjuncts
            && self.order_items == other.order_items
            && self.limit == other.limit
            && self.offset == other.offset
            && self.build_error == other.build_error
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (sql, params) = self.build();
        f.debug_struct("Query")
            .field("sql", &sql)
            .field("params", &params.values())
            .field("build_error", &self.build_error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::CompareOp;
    use crate::schema::Schema;
    use crate::types::Term;

    fn registry() -> Arc<SchemaRegistry> {
        let registry = SchemaRegistry::new()
            .with(
                Schema::new("product", "products")
                    .primary_key("id")
                    .belongs_to("category", "category", "category_id"),
            )
            .and_then(|r| r.with(Schema::new("category", "categories").primary_key("id")))
            .and_then(|r| r.with(Schema::new("tag", "tags")))
            .unwrap();
        Arc::new(registry)
    }

    fn col(q: &Query, name: &str) -> Operand {
        Operand::new(format!("{}.{name}", q.base_binding().alias()))
    }

    #[test]
    fn base_select() {
        let q = Query::from_entity(registry(), "product").unwrap();
        assert_eq!(q.to_sql(), "SELECT p0.* FROM products AS p0");
    }

    #[test]
    fn unknown_entity_fails_eagerly() {
        let err = Query::from_entity(registry(), "nope").unwrap_err();
        assert!(matches!(err, RummageError::Validation(_)));
    }

    #[test]
    fn join_renders_on_clause() {
        let q = Query::from_entity(registry(), "product").unwrap();
        let base = q.base_binding().clone();
        let (q, target) = q.join(JoinKind::Inner, &base, "category");
        assert_eq!(target.alias(), "c1");
        assert_eq!(target.entity(), "category");
        assert_eq!(
            q.to_sql(),
            "SELECT p0.* FROM products AS p0 INNER JOIN categories AS c1 ON c1.id = p0.category_id"
        );
        assert!(q.validate().is_ok());
    }

    #[test]
    fn cross_join_has_no_on() {
        let q = Query::from_entity(registry(), "product").unwrap();
        let base = q.base_binding().clone();
        let (q, _) = q.join(JoinKind::Cross, &base, "category");
        assert_eq!(
            q.to_sql(),
            "SELECT p0.* FROM products AS p0 CROSS JOIN categories AS c1"
        );
    }

    #[test]
    fn unknown_association_is_deferred() {
        let q = Query::from_entity(registry(), "product").unwrap();
        let base = q.base_binding().clone();
        let (q, _) = q.join(JoinKind::Left, &base, "bogus");
        let err = q.validate().unwrap_err();
        assert!(matches!(err, RummageError::Validation(_)));
    }

    #[test]
    fn attach_or_groups_same_field() {
        let q = Query::from_entity(registry(), "product").unwrap();
        let price = col(&q, "price");
        let name = col(&q, "name");
        let q = q
            .attach("price", CombineMode::And, Expr::compare(price.clone(), CompareOp::Gt, 1))
            .attach("name", CombineMode::And, Expr::compare(name, CompareOp::Eq, "a"))
            .attach("price", CombineMode::Or, Expr::compare(price, CompareOp::Lt, 0));
        let (sql, params) = q.build();
        assert_eq!(
            sql,
            "SELECT p0.* FROM products AS p0 WHERE (p0.price > $1 OR p0.price < $2) AND p0.name = $3"
        );
        assert_eq!(
            params.values(),
            &[Term::Int(1), Term::Int(0), Term::from("a")]
        );
    }

    #[test]
    fn attach_not_and_negates() {
        let q = Query::from_entity(registry(), "product").unwrap();
        let price = col(&q, "price");
        let q = q.attach("price", CombineMode::NotAnd, Expr::compare(price, CompareOp::Eq, 5));
        assert_eq!(
            q.to_sql(),
            "SELECT p0.* FROM products AS p0 WHERE NOT (p0.price = $1)"
        );
    }

    #[test]
    fn or_where_wraps_everything() {
        let q = Query::from_entity(registry(), "product").unwrap();
        let a = col(&q, "a");
        let b = col(&q, "b");
        let c = col(&q, "c");
        let q = q
            .and_where(Expr::compare(a, CompareOp::Eq, 1))
            .and_where(Expr::compare(b, CompareOp::Eq, 2))
            .or_where(Expr::compare(c, CompareOp::Eq, 3));
        assert_eq!(
            q.to_sql(),
            "SELECT p0.* FROM products AS p0 WHERE (p0.a = $1 AND p0.b = $2) OR p0.c = $3"
        );
    }

    #[test]
    fn order_limit_offset() {
        let q = Query::from_entity(registry(), "product").unwrap();
        let name = col(&q, "name");
        let id = col(&q, "id");
        let q = q
            .order_by(name, SortDirection::Asc)
            .order_by(id, SortDirection::Desc)
            .limit(2)
            .offset(4);
        assert_eq!(
            q.to_sql(),
            "SELECT p0.* FROM products AS p0 ORDER BY p0.name ASC, p0.id DESC LIMIT 2 OFFSET 4"
        );
    }

    #[test]
    fn count_uses_distinct_primary_key() {
        let q = Query::from_entity(registry(), "product").unwrap();
        let price = col(&q, "price");
        let name = col(&q, "name");
        let q = q
            .and_where(Expr::compare(price, CompareOp::Lte, 10))
            .order_by(name, SortDirection::Asc)
            .limit(2);
        assert_eq!(
            q.to_count_sql(),
            "SELECT COUNT(DISTINCT p0.id) FROM products AS p0 WHERE p0.price <= $1"
        );
    }

    #[test]
    fn count_without_primary_key_counts_distinct_rows() {
        let q = Query::from_entity(registry(), "tag").unwrap();
        assert_eq!(
            q.to_count_sql(),
            "SELECT COUNT(*) FROM (SELECT DISTINCT t0.* FROM tags AS t0) AS t"
        );
    }

    #[test]
    fn builders_leave_clones_untouched() {
        let q = Query::from_entity(registry(), "product").unwrap();
        let before = q.clone();
        let _ = q.clone().limit(5);
        assert_eq!(q, before);
    }

    #[test]
    fn parse_closed_enums() {
        assert_eq!("left".parse::<JoinKind>().unwrap(), JoinKind::Left);
        assert!("outer".parse::<JoinKind>().is_err());
        assert_eq!("desc".parse::<SortDirection>().unwrap(), SortDirection::Desc);
        assert!("up".parse::<SortDirection>().is_err());
    }
}
