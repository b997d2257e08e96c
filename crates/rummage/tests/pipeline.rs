use async_trait::async_trait;
use rummage::{
    FormatMode, LegacySearchHook, Options, Query, Repository, Rummage, RummageConfig,
    RummageError, RummageParams, RummageResult, Schema, SchemaRegistry, SearchOp, SearchSpec,
    SortDirection, SortSpec, Term,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_postgres::Row;

/// Reports 8 rows for an unfiltered query and 2 once any condition applies.
#[derive(Default)]
struct FakeRepo {
    counts: AtomicUsize,
}

#[async_trait]
impl Repository for FakeRepo {
    async fn count(&self, query: &Query) -> RummageResult<i64> {
        self.counts.fetch_add(1, Ordering::SeqCst);
        Ok(if query.condition_count() == 0 { 8 } else { 2 })
    }

    async fn all(&self, _query: &Query) -> RummageResult<Vec<Row>> {
        Ok(Vec::new())
    }
}

fn registry() -> Arc<SchemaRegistry> {
    let registry = SchemaRegistry::new()
        .with(
            Schema::new("product", "products")
                .primary_key("id")
                .belongs_to("category", "category", "category_id")
                .has_many("reviews", "review", "product_id")
                .search_scope("cheap", |term| {
                    Ok(SearchSpec::new("price", SearchOp::Lteq, term.clone()))
                })
                .sort_scope("newest", |_| {
                    Ok(SortSpec::new("inserted_at", SortDirection::Desc))
                }),
        )
        .unwrap()
        .with(
            Schema::new("category", "categories")
                .primary_key("id")
                .belongs_to("parent", "category", "parent_id"),
        )
        .unwrap()
        .with(Schema::new("review", "reviews").primary_key("id"))
        .unwrap();
    Arc::new(registry)
}

fn product() -> Query {
    Query::from_entity(registry(), "product").unwrap()
}

fn params(value: serde_json::Value) -> RummageParams {
    RummageParams::from_value(value).unwrap()
}

#[tokio::test]
async fn paginates_second_page_of_eight_rows() {
    let repo = FakeRepo::default();
    let (query, out) = rummage::rummage(
        product(),
        params(json!({"paginate": {"per_page": 2, "page": 2}})),
        &Options::new().repo(&repo),
    )
    .await
    .unwrap();

    assert_eq!(query.limit_value(), Some(2));
    assert_eq!(query.offset_value(), Some(2));
    assert_eq!(query.to_sql(), "SELECT p0.* FROM products AS p0 LIMIT 2 OFFSET 2");

    let spec = out.paginate().unwrap();
    assert_eq!(spec.max_page, 4);
    assert_eq!(spec.total_count, 8);
    assert_eq!(spec.page, 2);
}

#[tokio::test]
async fn search_sort_and_paginate_together() {
    let repo = FakeRepo::default();
    let raw = json!({
        "search": {"name": {
            "assoc": ["category"],
            "search_type": "like",
            "search_term": "1"
        }},
        "sort": {"field": "name", "order": "asc"},
        "paginate": {"per_page": 3}
    });
    let (query, out) = rummage::rummage(product(), params(raw), &Options::new().repo(&repo))
        .await
        .unwrap();

    let (sql, binds) = query.build();
    assert_eq!(
        sql,
        "SELECT p0.* FROM products AS p0 \
         INNER JOIN categories AS c1 ON c1.id = p0.category_id \
         WHERE c1.name LIKE $1 \
         ORDER BY p0.name ASC LIMIT 3 OFFSET 0"
    );
    assert_eq!(binds.values(), &[Term::from("1")]);

    assert_eq!(out.search().unwrap()["name"]["assoc"], json!([{"inner": "category"}]));
    let spec = out.paginate().unwrap();
    assert_eq!(spec.page, 1);
    assert_eq!(spec.per_page, 3);
}

#[tokio::test]
async fn unknown_scope_stops_before_any_query() {
    let repo = FakeRepo::default();
    let err = rummage::rummage(
        product(),
        params(json!({
            "search": {"bogus": "x"},
            "paginate": {"per_page": 2}
        })),
        &Options::new().repo(&repo),
    )
    .await
    .unwrap_err();

    assert!(err.is_unknown_scope());
    assert!(matches!(err, RummageError::UnknownScope { ref name, .. } if name == "bogus"));
    assert_eq!(repo.counts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn absent_and_null_stages_leave_query_alone() {
    let base = product();
    let (query, out) = rummage::rummage(base.clone(), RummageParams::new(), &Options::new())
        .await
        .unwrap();
    assert_eq!(query, base);
    assert!(out.as_map().is_empty());

    let (query, out) = rummage::rummage(
        base.clone(),
        params(json!({"search": null, "sort": null, "paginate": null})),
        &Options::new(),
    )
    .await
    .unwrap();
    assert_eq!(query, base);
    assert!(out.paginate().is_none());
}

#[tokio::test]
async fn blank_search_terms_change_nothing() {
    let base = product();
    let (query, _) = rummage::rummage(
        base.clone(),
        params(json!({"search": {
            "name": {"search_type": "ilike", "search_term": ""},
            "price": {"search_type": "eq", "search_term": null}
        }})),
        &Options::new(),
    )
    .await
    .unwrap();
    assert_eq!(query, base);
}

#[tokio::test]
async fn formatted_params_are_a_fixed_point() {
    let repo = FakeRepo::default();
    let options = Options::new().repo(&repo);
    let raw = json!({
        "search": {
            "cheap": 15,
            "title": {"field": "name", "search_type": "ilike", "search_term": "lamp"}
        },
        "sort": [{"field": "name", "order": "desc", "ci": true}, {"scope": "newest"}],
        "paginate": {"per_page": "4", "page": "9"}
    });

    let (first_query, first) = rummage::rummage(product(), params(raw), &options).await.unwrap();
    let (second_query, second) = rummage::rummage(product(), first.clone(), &options)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first_query.build(), second_query.build());
    assert_eq!(first.paginate().unwrap().page, 2);
}

#[tokio::test]
async fn two_hop_association_joins_in_path_order() {
    let (query, _) = rummage::rummage(
        product(),
        params(json!({"sort": {
            "field": "name",
            "assoc": ["category", {"left": "parent"}],
            "order": "asc"
        }})),
        &Options::new(),
    )
    .await
    .unwrap();

    assert_eq!(
        query.to_sql(),
        "SELECT p0.* FROM products AS p0 \
         INNER JOIN categories AS c1 ON c1.id = p0.category_id \
         LEFT JOIN categories AS c2 ON c2.id = c1.parent_id \
         ORDER BY c2.name ASC"
    );
}

#[tokio::test]
async fn count_sees_original_query_in_two_pass_mode() {
    let repo = FakeRepo::default();
    let raw = json!({
        "search": {"price": {"search_type": "gteq", "search_term": 30}},
        "paginate": {"per_page": 2}
    });
    let (_, out) = Rummage::default()
        .rummage(product(), params(raw), &Options::new().repo(&repo))
        .await
        .unwrap();
    assert_eq!(out.paginate().unwrap().total_count, 8);
    assert_eq!(out.paginate().unwrap().max_page, 4);
}

#[tokio::test]
async fn count_sees_filtered_query_in_threaded_mode() {
    let repo = FakeRepo::default();
    let raw = json!({
        "search": {"price": {"search_type": "gteq", "search_term": 30}},
        "paginate": {"per_page": 2}
    });
    let runner = Rummage::new(RummageConfig::new().format_mode(FormatMode::Threaded));
    let (query, out) = runner
        .rummage(product(), params(raw), &Options::new().repo(&repo))
        .await
        .unwrap();
    assert_eq!(out.paginate().unwrap().total_count, 2);
    assert_eq!(out.paginate().unwrap().max_page, 1);
    assert_eq!(
        query.to_sql(),
        "SELECT p0.* FROM products AS p0 WHERE p0.price >= $1 LIMIT 2 OFFSET 0"
    );
}

#[tokio::test]
async fn options_hook_overrides_builtin() {
    let raw = json!({"search": {"name": {"search_type": "like", "search_term": "lamp"}}});
    let options = Options::new().hook("search", Arc::new(LegacySearchHook));
    let (query, _) = rummage::rummage(product(), params(raw), &options).await.unwrap();
    let (_, binds) = query.build();
    assert_eq!(binds.values(), &[Term::from("%lamp%")]);
}

#[tokio::test]
async fn schema_hook_applies_to_its_entity() {
    let registry = SchemaRegistry::new()
        .with(
            Schema::new("product", "products")
                .primary_key("id")
                .hook("search", Arc::new(LegacySearchHook)),
        )
        .unwrap();
    let query = Query::from_entity(Arc::new(registry), "product").unwrap();
    let raw = json!({"search": {
        "name": {"search_type": "like", "search_term": "lamp"},
        "color": {"search_type": "sparkly", "search_term": "red"}
    }});
    let (query, out) = rummage::rummage(query, params(raw), &Options::new()).await.unwrap();
    assert_eq!(query.condition_count(), 1);
    assert!(out.search().unwrap().get("color").is_none());
}

#[tokio::test]
async fn custom_stage_without_hook_is_rejected() {
    let err = rummage::rummage(
        product(),
        params(json!({"facet": {"color": "red"}})),
        &Options::new().stages(["search", "facet"]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RummageError::UnknownHook(ref s) if s == "facet"));
}

#[tokio::test]
async fn custom_stage_without_params_needs_no_hook() {
    let base = product();
    let (query, out) = rummage::rummage(
        base.clone(),
        params(json!({"search": {"price": {"search_type": "eq", "search_term": 3}}})),
        &Options::new().stages(["search", "facet"]),
    )
    .await
    .unwrap();
    assert_eq!(query.condition_count(), 1);
    assert!(!out.contains("facet"));

    let runner = Rummage::new(RummageConfig::new().stages(["facet"]));
    let (query, _) = runner
        .rummage(base.clone(), RummageParams::new(), &Options::new())
        .await
        .unwrap();
    assert_eq!(query, base);
}

#[tokio::test]
async fn or_where_through_association_is_disjunctive() {
    let raw = json!({"search": {
        "first": {"field": "name", "assoc": ["category"], "search_type": "eq", "search_term": "a"},
        "second": {
            "field": "name",
            "assoc": ["category"],
            "search_type": "eq",
            "search_term": "b",
            "search_expr": "or_where"
        }
    }});
    let (query, _) = rummage::rummage(product(), params(raw), &Options::new())
        .await
        .unwrap();
    assert!(query.to_sql().ends_with("WHERE c1.name = $1 OR c2.name = $2"));
}

#[tokio::test]
async fn paginate_without_repo_is_a_config_error() {
    let err = rummage::rummage(
        product(),
        params(json!({"paginate": {"per_page": 2}})),
        &Options::new(),
    )
    .await
    .unwrap_err();
    assert!(err.is_config_error());
}

#[test]
fn params_must_be_an_object() {
    assert!(RummageParams::from_value(json!(null)).unwrap().as_map().is_empty());
    let err = RummageParams::from_value(json!(["search"])).unwrap_err();
    assert!(matches!(err, RummageError::InvalidParams(_)));
    assert!(RummageParams::try_from(json!("paginate")).is_err());
}
