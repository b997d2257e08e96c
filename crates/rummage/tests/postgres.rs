//! Runs against a live database when `DATABASE_URL` is set; skipped otherwise.

use rummage::{Options, Query, Repository, RummageParams, Schema, SchemaRegistry};
use serde_json::json;
use std::sync::Arc;
use tokio_postgres::{Client, NoTls};

async fn connect() -> Option<Client> {
    dotenvy::dotenv().ok();
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping");
        return None;
    };
    let (client, connection) = tokio_postgres::connect(&url, NoTls).await.unwrap();
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("connection error: {e}");
        }
    });
    Some(client)
}

async fn seed(client: &Client) {
    client
        .batch_execute(
            "CREATE TEMP TABLE categories (id BIGINT PRIMARY KEY, name TEXT NOT NULL);
             CREATE TEMP TABLE products (
                 id BIGINT PRIMARY KEY,
                 name TEXT NOT NULL,
                 price INTEGER NOT NULL,
                 category_id BIGINT REFERENCES categories (id)
             );
             INSERT INTO categories (id, name) VALUES (1, '1'), (2, '2');
             INSERT INTO products (id, name, price, category_id) VALUES
                 (1, 'B', 10, 2),
                 (2, 'A', 10, 1),
                 (3, 'C', 20, 2),
                 (4, 'D', 20, 2),
                 (5, 'E', 30, 1),
                 (6, 'F', 30, 2),
                 (7, '1', 40, 2),
                 (8, 'H', 40, 2);",
        )
        .await
        .unwrap();
}

fn product() -> Query {
    let registry = SchemaRegistry::new()
        .with(
            Schema::new("product", "products")
                .primary_key("id")
                .belongs_to("category", "category", "category_id"),
        )
        .unwrap()
        .with(Schema::new("category", "categories").primary_key("id"))
        .unwrap();
    Query::from_entity(Arc::new(registry), "product").unwrap()
}

fn params(value: serde_json::Value) -> RummageParams {
    RummageParams::from_value(value).unwrap()
}

fn names(rows: &[tokio_postgres::Row]) -> Vec<String> {
    rows.iter().map(|r| r.get::<_, String>("name")).collect()
}

#[tokio::test]
async fn search_lteq_price() {
    let Some(client) = connect().await else { return };
    seed(&client).await;

    let raw = json!({"search": {"price": {"search_type": "lteq", "search_term": 10}}});
    let (query, _) = rummage::rummage(product(), params(raw), &Options::new())
        .await
        .unwrap();

    assert_eq!(client.all(&query).await.unwrap().len(), 2);
    assert_eq!(client.count(&query).await.unwrap(), 2);
}

#[tokio::test]
async fn sort_by_name_ascending() {
    let Some(client) = connect().await else { return };
    seed(&client).await;

    let raw = json!({
        "search": {"id": {"search_type": "in", "search_term": [1, 2]}},
        "sort": {"field": "name", "order": "asc"}
    });
    let (query, _) = rummage::rummage(product(), params(raw), &Options::new())
        .await
        .unwrap();

    assert_eq!(names(&client.all(&query).await.unwrap()), ["A", "B"]);
}

#[tokio::test]
async fn search_filters_on_joined_column() {
    let Some(client) = connect().await else { return };
    seed(&client).await;

    let raw = json!({
        "search": {"name": {
            "assoc": ["category"],
            "search_type": "like",
            "search_term": "1"
        }},
        "sort": {"field": "id", "order": "asc"}
    });
    let (query, _) = rummage::rummage(product(), params(raw), &Options::new())
        .await
        .unwrap();

    // Product "1" sits in category "2" and must not match.
    assert_eq!(names(&client.all(&query).await.unwrap()), ["A", "E"]);
}

#[tokio::test]
async fn paginate_counts_through_the_client() {
    let Some(client) = connect().await else { return };
    seed(&client).await;

    let raw = json!({
        "sort": {"field": "id", "order": "asc"},
        "paginate": {"per_page": 2, "page": 2}
    });
    let (query, out) = rummage::rummage(product(), params(raw), &Options::new().repo(&client))
        .await
        .unwrap();

    let spec = out.paginate().unwrap();
    assert_eq!(spec.total_count, 8);
    assert_eq!(spec.max_page, 4);
    assert_eq!(names(&client.all(&query).await.unwrap()), ["C", "D"]);
}
