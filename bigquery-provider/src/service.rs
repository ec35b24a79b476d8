//! Remote calls the provider makes, behind a trait so a connection can run against any backend.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::connection_string::ConnectionStringBuilder;
use crate::error::Error;
use crate::http::bigquery_client::BigqueryClient;
use crate::http::bigquery_dataset_client::BigqueryDatasetClient;
use crate::http::bigquery_job_client::BigqueryJobClient;
use crate::http::bigquery_table_client::BigqueryTableClient;
use crate::http::dataset::list::{DatasetOverview, ListDatasetsRequest};
use crate::http::job::list::ListJobsRequest;
use crate::http::job::query::{QueryRequest, QueryResponse};
use crate::http::table::list::{ListTablesRequest, TableOverview};
use crate::http::table::Table;

/// BigQuery operations used by connections, commands and readers.
///
/// Every failure is already rewrapped into the provider [`Error`].
#[async_trait]
pub trait BigQueryService: Send + Sync + Debug {
    /// Submits a query job and waits for its first page.
    async fn query(&self, project_id: &str, request: &QueryRequest) -> Result<QueryResponse, Error>;

    async fn list_tables(&self, project_id: &str, dataset_id: &str) -> Result<Vec<TableOverview>, Error>;

    async fn list_datasets(&self, project_id: &str) -> Result<Vec<DatasetOverview>, Error>;

    async fn get_table(&self, project_id: &str, dataset_id: &str, table_id: &str) -> Result<Table, Error>;

    /// Cheapest authenticated round-trip, used to confirm connectivity.
    async fn list_jobs(&self, project_id: &str) -> Result<(), Error>;
}

/// An authenticated service together with the project it bills to.
#[derive(Clone, Debug)]
pub struct Session {
    pub project_id: String,
    pub service: Arc<dyn BigQueryService>,
}

/// Turns connection settings into an authenticated [`Session`].
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    async fn connect(&self, settings: &ConnectionStringBuilder) -> Result<Session, Error>;
}

/// [`BigQueryService`] over the BigQuery v2 REST API.
#[derive(Debug, Clone)]
pub struct HttpBigQueryService {
    job_client: BigqueryJobClient,
    table_client: BigqueryTableClient,
    dataset_client: BigqueryDatasetClient,
}

impl HttpBigQueryService {
    pub fn new(client: BigqueryClient) -> Self {
        let client = Arc::new(client);
        Self {
            job_client: BigqueryJobClient::new(client.clone()),
            table_client: BigqueryTableClient::new(client.clone()),
            dataset_client: BigqueryDatasetClient::new(client),
        }
    }
}

#[async_trait]
impl BigQueryService for HttpBigQueryService {
    async fn query(&self, project_id: &str, request: &QueryRequest) -> Result<QueryResponse, Error> {
        Ok(self.job_client.query(project_id, request).await?)
    }

    async fn list_tables(&self, project_id: &str, dataset_id: &str) -> Result<Vec<TableOverview>, Error> {
        Ok(self
            .table_client
            .list(project_id, dataset_id, &ListTablesRequest::default())
            .await?)
    }

    async fn list_datasets(&self, project_id: &str) -> Result<Vec<DatasetOverview>, Error> {
        Ok(self
            .dataset_client
            .list(project_id, &ListDatasetsRequest::default())
            .await?)
    }

    async fn get_table(&self, project_id: &str, dataset_id: &str, table_id: &str) -> Result<Table, Error> {
        Ok(self.table_client.get(project_id, dataset_id, table_id).await?)
    }

    async fn list_jobs(&self, project_id: &str) -> Result<(), Error> {
        let request = ListJobsRequest {
            max_results: Some(1),
            ..Default::default()
        };
        self.job_client.list(project_id, &request).await?;
        Ok(())
    }
}

#[cfg(feature = "auth")]
pub use default_connector::DefaultConnector;

#[cfg(feature = "auth")]
mod default_connector {
    use async_trait::async_trait;
    use google_cloud_auth::credentials::CredentialsFile;
    use google_cloud_auth::project::Config;
    use google_cloud_auth::token::DefaultTokenSourceProvider;
    use token_source::TokenSourceProvider;

    use crate::connection_string::{
        ConnectionStringBuilder, PRIVATE_KEY_FILE_NAME, PROJECT_ID, SERVICE_ACCOUNT_EMAIL,
    };
    use crate::error::Error;
    use crate::http::bigquery_client::{BigqueryClient, DEFAULT_ENDPOINT, SCOPES};
    use crate::service::{Connector, HttpBigQueryService, Session};
    use std::sync::Arc;

    /// Authenticates with `gcloud-auth` and talks to BigQuery over HTTPS.
    ///
    /// Credentials are taken from the first key present among `JsonCredentials`,
    /// `JsonCredentialsFileName` and `ServiceAccountEmail` + `PrivateKeyFileName`. Without any of them
    /// Application Default Credentials are used.
    #[derive(Clone, Debug, Default)]
    pub struct DefaultConnector {
        http: Option<reqwest_middleware::ClientWithMiddleware>,
    }

    impl DefaultConnector {
        /// Uses the given HTTP client, e.g. one carrying retry middleware.
        pub fn with_http_client(http: reqwest_middleware::ClientWithMiddleware) -> Self {
            Self { http: Some(http) }
        }

        async fn credentials(settings: &ConnectionStringBuilder) -> Result<Option<CredentialsFile>, Error> {
            if let Some(json) = settings.json_credentials() {
                return Ok(Some(CredentialsFile::new_from_str(json).await?));
            }
            if let Some(path) = settings.json_credentials_file_name() {
                return Ok(Some(CredentialsFile::new_from_file(path.to_string()).await?));
            }
            let Some(key_file) = settings.private_key_file_name() else {
                return Ok(None);
            };
            if key_file.to_ascii_lowercase().ends_with(".json") {
                return Ok(Some(CredentialsFile::new_from_file(key_file.to_string()).await?));
            }
            let email = settings.service_account_email().ok_or_else(|| {
                Error::InvalidConnectionString(format!("{SERVICE_ACCOUNT_EMAIL} is required with {PRIVATE_KEY_FILE_NAME}"))
            })?;
            let private_key = tokio::fs::read_to_string(key_file)
                .await
                .map_err(|e| Error::InvalidConnectionString(format!("cannot read {key_file}: {e}")))?;
            let json = serde_json::json!({
                "type": "service_account",
                "client_email": email,
                "private_key": private_key,
                "project_id": settings.project_id(),
            });
            Ok(Some(CredentialsFile::new_from_str(&json.to_string()).await?))
        }
    }

    #[async_trait]
    impl Connector for DefaultConnector {
        async fn connect(&self, settings: &ConnectionStringBuilder) -> Result<Session, Error> {
            let config = Config::default().with_scopes(&SCOPES);
            let tsp = match Self::credentials(settings).await? {
                Some(credentials) => DefaultTokenSourceProvider::new_with_credentials(config, Box::new(credentials)).await?,
                None => DefaultTokenSourceProvider::new(config).await?,
            };
            let project_id = match settings.project_id() {
                Some(project_id) => project_id.to_string(),
                None => tsp
                    .project_id
                    .clone()
                    .ok_or_else(|| Error::InvalidConnectionString(format!("{PROJECT_ID} is required")))?,
            };
            let http = self
                .http
                .clone()
                .unwrap_or_else(|| reqwest_middleware::ClientBuilder::new(reqwest::Client::default()).build());
            let endpoint = settings.endpoint().unwrap_or(DEFAULT_ENDPOINT);
            tracing::debug!(project_id = %project_id, endpoint, "authenticated");
            let client = BigqueryClient::new(tsp.token_source(), endpoint, http);
            Ok(Session {
                project_id,
                service: Arc::new(HttpBigQueryService::new(client)),
            })
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::connection_string::ConnectionStringBuilder;
    use crate::error::Error;
    use crate::http::dataset::list::DatasetOverview;
    use crate::http::dataset::DatasetReference;
    use crate::http::job::query::{QueryRequest, QueryResponse};
    use crate::http::table::list::TableOverview;
    use crate::http::table::{Table, TableFieldSchema, TableReference, TableSchema};
    use crate::http::tabledata::{Cell, Tuple, Value};
    use crate::service::{BigQueryService, Connector, Session};

    pub const PROJECT: &str = "test-project";
    pub const DATASET: &str = "samples";

    #[ctor::ctor]
    fn init() {
        let filter = tracing_subscriber::filter::EnvFilter::from_default_env()
            .add_directive("gcloud_bigquery_provider=trace".parse().unwrap());
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }

    pub fn field(name: &str, data_type: &str) -> TableFieldSchema {
        TableFieldSchema {
            name: name.to_string(),
            data_type: data_type.to_string(),
            mode: Some("NULLABLE".to_string()),
            ..Default::default()
        }
    }

    pub fn row(values: &[Option<&str>]) -> Tuple {
        Tuple {
            f: values
                .iter()
                .map(|v| Cell {
                    v: v.map(|s| Value::String(s.to_string())).unwrap_or(Value::Null),
                })
                .collect(),
        }
    }

    fn natality_schema() -> Vec<TableFieldSchema> {
        vec![field("weight_pounds", "FLOAT"), field("is_male", "BOOLEAN")]
    }

    fn natality_rows() -> Vec<Tuple> {
        vec![
            row(&[Some("7.5"), Some("true")]),
            row(&[Some("6.1"), Some("false")]),
            row(&[None, Some("true")]),
            row(&[Some("8.0"), None]),
        ]
    }

    fn overview(table_id: &str, table_type: &str) -> TableOverview {
        TableOverview {
            id: format!("{PROJECT}:{DATASET}.{table_id}"),
            table_reference: TableReference {
                project_id: PROJECT.to_string(),
                dataset_id: DATASET.to_string(),
                table_id: table_id.to_string(),
            },
            friendly_name: None,
            table_type: table_type.to_string(),
        }
    }

    /// In-memory catalog: dataset `samples` with the `natality` table, an `events` table and a
    /// `heavy_births` view.
    #[derive(Debug, Default)]
    pub struct FakeService {
        pub queries: Mutex<Vec<QueryRequest>>,
        pub next_response: Mutex<Option<QueryResponse>>,
        pub describe_calls: AtomicUsize,
        pub probe_calls: AtomicUsize,
        pub fail_queries: AtomicBool,
        pub fail_probe: AtomicBool,
        pub hang_probe: AtomicBool,
        pub catalog_calls: AtomicUsize,
    }

    impl FakeService {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn respond_with(&self, response: QueryResponse) {
            *self.next_response.lock().unwrap() = Some(response);
        }

        pub fn last_query(&self) -> Option<QueryRequest> {
            self.queries.lock().unwrap().last().cloned()
        }

        pub fn query_count(&self) -> usize {
            self.queries.lock().unwrap().len()
        }

        fn schema_of(table_id: &str) -> Option<Vec<TableFieldSchema>> {
            match table_id {
                "natality" => Some(natality_schema()),
                "events" => Some(vec![
                    field("name", "STRING"),
                    field("count", "INTEGER"),
                    field("at", "TIMESTAMP"),
                    field("payload", "RECORD"),
                ]),
                "heavy_births" => Some(vec![field("weight_pounds", "FLOAT")]),
                _ => None,
            }
        }

        fn respond(query: &str) -> QueryResponse {
            let (schema, rows) = if query.starts_with("SELECT 1") {
                (vec![field("f0_", "INTEGER")], vec![row(&[Some("1")])])
            } else if query.contains("natality") {
                (natality_schema(), natality_rows())
            } else {
                (vec![], vec![])
            };
            QueryResponse {
                kind: "bigquery#queryResponse".to_string(),
                total_rows: Some(rows.len() as i64),
                schema: Some(TableSchema { fields: schema }),
                rows: Some(rows),
                job_complete: true,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl BigQueryService for FakeService {
        async fn query(&self, _project_id: &str, request: &QueryRequest) -> Result<QueryResponse, Error> {
            self.queries.lock().unwrap().push(request.clone());
            if self.fail_queries.load(Ordering::SeqCst) {
                return Err(Error::remote("Syntax error: Unexpected end of script"));
            }
            if let Some(response) = self.next_response.lock().unwrap().take() {
                return Ok(response);
            }
            Ok(Self::respond(&request.query))
        }

        async fn list_tables(&self, _project_id: &str, dataset_id: &str) -> Result<Vec<TableOverview>, Error> {
            self.catalog_calls.fetch_add(1, Ordering::SeqCst);
            if dataset_id != DATASET {
                return Err(Error::remote(format!("Not found: Dataset {PROJECT}:{dataset_id}")));
            }
            Ok(vec![
                overview("events", "TABLE"),
                overview("heavy_births", "VIEW"),
                overview("natality", "TABLE"),
            ])
        }

        async fn list_datasets(&self, _project_id: &str) -> Result<Vec<DatasetOverview>, Error> {
            self.catalog_calls.fetch_add(1, Ordering::SeqCst);
            Ok(["samples", "scratch"]
                .iter()
                .map(|id| DatasetOverview {
                    id: format!("{PROJECT}:{id}"),
                    dataset_reference: DatasetReference {
                        dataset_id: id.to_string(),
                        project_id: Some(PROJECT.to_string()),
                    },
                    ..Default::default()
                })
                .collect())
        }

        async fn get_table(&self, project_id: &str, dataset_id: &str, table_id: &str) -> Result<Table, Error> {
            self.describe_calls.fetch_add(1, Ordering::SeqCst);
            let fields = Self::schema_of(table_id)
                .ok_or_else(|| Error::remote(format!("Not found: Table {project_id}:{dataset_id}.{table_id}")))?;
            Ok(Table {
                id: format!("{project_id}:{dataset_id}.{table_id}"),
                table_reference: TableReference {
                    project_id: project_id.to_string(),
                    dataset_id: dataset_id.to_string(),
                    table_id: table_id.to_string(),
                },
                schema: Some(TableSchema { fields }),
                ..Default::default()
            })
        }

        async fn list_jobs(&self, _project_id: &str) -> Result<(), Error> {
            self.probe_calls.fetch_add(1, Ordering::SeqCst);
            if self.hang_probe.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.fail_probe.load(Ordering::SeqCst) {
                return Err(Error::remote("Request had invalid authentication credentials"));
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    pub struct FakeConnector {
        pub service: Arc<FakeService>,
        pub connects: AtomicUsize,
    }

    impl FakeConnector {
        pub fn new(service: Arc<FakeService>) -> Arc<Self> {
            Arc::new(Self {
                service,
                connects: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, settings: &ConnectionStringBuilder) -> Result<Session, Error> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Session {
                project_id: settings.project_id().unwrap_or(PROJECT).to_string(),
                service: self.service.clone(),
            })
        }
    }

    pub fn connection_string() -> String {
        format!("ProjectId={PROJECT};DataSetId={DATASET};ServiceAccountEmail=sa@{PROJECT}.iam.gserviceaccount.com")
    }

    #[tokio::test]
    async fn test_fake_catalog() {
        let service = FakeService::new();
        let tables = service.list_tables(PROJECT, DATASET).await.unwrap();
        assert_eq!(tables.len(), 3);
        let natality = service.get_table(PROJECT, DATASET, "natality").await.unwrap();
        assert_eq!(natality.schema.unwrap().fields.len(), 2);
        assert!(service.get_table(PROJECT, DATASET, "missing").await.is_err());
    }
}
