use std::sync::Arc;

use crate::http::bigquery_client::BigqueryClient;
use crate::http::error::Error;
use crate::http::job;
use crate::http::job::list::{ListJobsRequest, ListJobsResponse};
use crate::http::job::query::{QueryRequest, QueryResponse};

#[derive(Debug, Clone)]
pub struct BigqueryJobClient {
    inner: Arc<BigqueryClient>,
}

impl BigqueryJobClient {
    pub fn new(inner: Arc<BigqueryClient>) -> Self {
        Self { inner }
    }

    /// Runs a query job and waits up to `timeoutMs` for its first page of results.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn query(&self, project_id: &str, data: &QueryRequest) -> Result<QueryResponse, Error> {
        let builder = job::query::build(self.inner.endpoint(), self.inner.http(), project_id, data);
        self.inner.send(builder).await
    }

    /// Fetches a single page of the project's jobs.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn list(&self, project_id: &str, req: &ListJobsRequest) -> Result<ListJobsResponse, Error> {
        let builder = job::list::build(self.inner.endpoint(), self.inner.http(), project_id, req);
        self.inner.send(builder).await
    }
}
