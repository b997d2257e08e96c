//! Execution collaborator for rummaged queries.

use crate::client::GenericClient;
use crate::error::RummageResult;
use crate::query::Query;
use async_trait::async_trait;
use tokio_postgres::Row;

/// Executes queries on behalf of the pipeline.
///
/// Paginate's count lookup is the only place the pipeline itself calls this;
/// callers use [`all`](Repository::all) to fetch the final page.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Number of rows the query matches, ignoring ordering and paging.
    async fn count(&self, query: &Query) -> RummageResult<i64>;

    /// Materialize every row the query selects.
    async fn all(&self, query: &Query) -> RummageResult<Vec<Row>>;
}

#[async_trait]
impl<C: GenericClient> Repository for C {
    async fn count(&self, query: &Query) -> RummageResult<i64> {
        query.validate()?;
        let (sql, params) = query.build_count();
        #[cfg(feature = "tracing")]
        tracing::debug!(target: "rummage.sql", sql = %sql, params = params.len(), "count");
        let row = self.query_opt(&sql, &params.as_refs()).await?;
        match row {
            Some(row) => Ok(row.try_get::<_, i64>(0)?),
            None => Ok(0),
        }
    }

    async fn all(&self, query: &Query) -> RummageResult<Vec<Row>> {
        query.validate()?;
        let (sql, params) = query.build();
        #[cfg(feature = "tracing")]
        tracing::debug!(target: "rummage.sql", sql = %sql, params = params.len(), "select");
        self.query(&sql, &params.as_refs()).await
    }
}
