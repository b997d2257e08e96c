//! Filter, order and page a product catalog.
//!
//! Prints the generated SQL. When `DATABASE_URL` is set, also seeds a temp
//! table and prints the rows of the requested page.
//!
//! ```sh
//! cargo run -p rummage --example products
//! ```

use rummage::{
    FieldRef, Options, Query, Repository, RummageParams, RummageResult, Schema, SchemaRegistry,
    SearchOp, SearchSpec, SortDirection, SortSpec, Template,
};
use serde_json::json;
use std::sync::Arc;

fn registry() -> RummageResult<SchemaRegistry> {
    SchemaRegistry::new()
        .with(
            Schema::new("product", "products")
                .primary_key("id")
                .unique_key("sku")
                .belongs_to("category", "category", "category_id")
                .computed("label", FieldRef::computed(Template::ConcatTwo, ["sku", "name"])?)
                .search_scope("under", |term| {
                    Ok(SearchSpec::new("price", SearchOp::Lteq, term.clone()))
                })
                .sort_scope("cheapest", |_| Ok(SortSpec::new("price", SortDirection::Asc))),
        )?
        .with(Schema::new("category", "categories").primary_key("id"))
}

const SEED: &str = "
    CREATE TEMP TABLE categories (id BIGINT PRIMARY KEY, name TEXT NOT NULL);
    CREATE TEMP TABLE products (
        id BIGINT PRIMARY KEY,
        sku TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        price INTEGER NOT NULL,
        category_id BIGINT REFERENCES categories (id)
    );
    INSERT INTO categories (id, name) VALUES (1, 'lamps'), (2, 'chairs');
    INSERT INTO products (id, sku, name, price, category_id) VALUES
        (1, 'L-1', 'desk lamp', 25, 1),
        (2, 'L-2', 'floor lamp', 60, 1),
        (3, 'L-3', 'reading lamp', 35, 1),
        (4, 'C-1', 'stool', 20, 2),
        (5, 'C-2', 'armchair', 140, 2);
";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let query = Query::from_entity(Arc::new(registry()?), "product")?;
    let params = RummageParams::from_value(json!({
        "search": {
            "under": 50,
            "name": {"assoc": ["category"], "search_type": "ilike", "search_term": "lamps"}
        },
        "sort": [{"scope": "cheapest"}, {"field": "label", "order": "desc"}],
        "paginate": {"per_page": 2, "page": 1}
    }))?;

    let Ok(url) = std::env::var("DATABASE_URL") else {
        let options = Options::new().stages(["search", "sort"]);
        let (query, params) = rummage::rummage(query, params, &options).await?;
        println!("sql:    {}", query.to_sql());
        println!("params: {}", params.into_value());
        println!("set DATABASE_URL to run against a database");
        return Ok(());
    };

    let pool = rummage::create_pool(&url)?;
    let client = pool.get().await?;
    client.batch_execute(SEED).await?;

    let (query, params) = rummage::rummage(query, params, &Options::new().repo(&client)).await?;
    println!("sql: {}", query.to_sql());

    for row in client.all(&query).await? {
        let sku: String = row.get("sku");
        let name: String = row.get("name");
        let price: i32 = row.get("price");
        println!("{sku:<6} {name:<14} {price}");
    }
    if let Some(page) = params.paginate() {
        println!("page {} of {} ({} rows)", page.page, page.max_page, page.total_count);
    }
    Ok(())
}
