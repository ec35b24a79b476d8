use reqwest_middleware::{ClientWithMiddleware as Client, RequestBuilder};

use crate::http::dataset::DatasetReference;
use crate::http::error::ErrorProto;
use crate::http::job::JobReference;
use crate::http::table::TableSchema;
use crate::http::tabledata::Tuple;

#[derive(Clone, PartialEq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    /// Required. A query string to execute, using GoogleSQL or legacy SQL syntax.
    pub query: String,
    /// Optional. The maximum number of rows of data to return per page of results.
    /// By default there is no maximum row count and only the 10 MB response limit applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<i64>,
    /// Optional. Specifies the default datasetId and projectId to assume for any unqualified table names in the query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_dataset: Option<DatasetReference>,
    /// Optional. How long to wait for the query to complete, in milliseconds.
    /// If the query has not completed within this budget, jobComplete is false in the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<i64>,
    /// Optional. If set to true, BigQuery doesn't run the job and only validates the query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    /// Optional. Whether to look for the result in the query cache. The default value is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_query_cache: Option<bool>,
    /// Specifies whether to use BigQuery's legacy SQL dialect for this query.
    pub use_legacy_sql: bool,
    /// The geographic location where the job should run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Clone, PartialEq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// The resource type.
    #[serde(default)]
    pub kind: String,
    /// The schema of the results. Present only when the query completes successfully.
    pub schema: Option<TableSchema>,
    /// Reference to the Job that was created to run the query.
    pub job_reference: Option<JobReference>,
    /// The total number of rows in the complete query result set,
    /// which can be more than the number of rows in this single page of results.
    #[serde(default, deserialize_with = "crate::http::from_str_option")]
    pub total_rows: Option<i64>,
    /// A non-empty token indicates that additional results are available through jobs.getQueryResults.
    pub page_token: Option<String>,
    /// The first page of rows.
    pub rows: Option<Vec<Tuple>>,
    /// The total number of bytes processed for this query.
    #[serde(default, deserialize_with = "crate::http::from_str_option")]
    pub total_bytes_processed: Option<i64>,
    /// Whether the query has completed or not.
    #[serde(default)]
    pub job_complete: bool,
    /// The first errors or warnings encountered during the running of the job.
    pub errors: Option<Vec<ErrorProto>>,
    /// Whether the query result was fetched from the query cache.
    pub cache_hit: Option<bool>,
    /// The number of rows affected by a DML statement.
    #[serde(default, deserialize_with = "crate::http::from_str_option")]
    pub num_dml_affected_rows: Option<i64>,
}

pub fn build(base_url: &str, client: &Client, project_id: &str, data: &QueryRequest) -> RequestBuilder {
    let url = format!("{base_url}/projects/{project_id}/queries");
    client.post(url).json(data)
}

#[cfg(test)]
mod tests {
    use crate::http::job::query::{QueryRequest, QueryResponse};
    use crate::http::tabledata::Value;

    #[test]
    fn test_serialize_request() {
        let request = QueryRequest {
            query: "SELECT 1".to_string(),
            timeout_ms: Some(30000),
            ..Default::default()
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["query"], "SELECT 1");
        assert_eq!(json["timeoutMs"], 30000);
        assert_eq!(json["useLegacySql"], false);
        assert!(json.get("maxResults").is_none());
    }

    #[test]
    fn test_deserialize_response() {
        let body = r#"{
            "kind": "bigquery#queryResponse",
            "schema": {"fields": [{"name": "weight_pounds", "type": "FLOAT", "mode": "NULLABLE"},
                                  {"name": "is_male", "type": "BOOLEAN", "mode": "NULLABLE"}]},
            "jobReference": {"projectId": "p", "jobId": "job_1", "location": "US"},
            "totalRows": "2",
            "rows": [{"f": [{"v": "7.5"}, {"v": "true"}]}, {"f": [{"v": null}, {"v": "false"}]}],
            "totalBytesProcessed": "0",
            "jobComplete": true,
            "cacheHit": true
        }"#;
        let response: QueryResponse = serde_json::from_str(body).unwrap();
        assert!(response.job_complete);
        assert_eq!(response.total_rows, Some(2));
        let schema = response.schema.unwrap();
        assert_eq!(schema.fields[0].data_type, "FLOAT");
        let rows = response.rows.unwrap();
        assert_eq!(rows[0].f[0].v, Value::String("7.5".to_string()));
        assert_eq!(rows[1].f[0].v, Value::Null);
    }
}
