use std::sync::Arc;

use crate::http::bigquery_client::BigqueryClient;
use crate::http::error::Error;
use crate::http::table;
use crate::http::table::list::{ListTablesRequest, ListTablesResponse, TableOverview};
use crate::http::table::Table;

#[derive(Debug, Clone)]
pub struct BigqueryTableClient {
    inner: Arc<BigqueryClient>,
}

impl BigqueryTableClient {
    pub fn new(inner: Arc<BigqueryClient>) -> Self {
        Self { inner }
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn get(&self, project_id: &str, dataset_id: &str, table_id: &str) -> Result<Table, Error> {
        let builder = table::get::build(self.inner.endpoint(), self.inner.http(), project_id, dataset_id, table_id);
        self.inner.send(builder).await
    }

    /// Lists every table and view in the dataset, following page tokens.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn list(
        &self,
        project_id: &str,
        dataset_id: &str,
        req: &ListTablesRequest,
    ) -> Result<Vec<TableOverview>, Error> {
        let mut page_token: Option<String> = None;
        let mut tables = vec![];
        loop {
            let builder = table::list::build(
                self.inner.endpoint(),
                self.inner.http(),
                project_id,
                dataset_id,
                req,
                page_token,
            );
            let response: ListTablesResponse = self.inner.send(builder).await?;
            tables.extend(response.tables);
            if response.next_page_token.is_none() {
                break;
            }
            page_token = response.next_page_token;
        }
        Ok(tables)
    }
}

#[cfg(all(test, feature = "auth"))]
mod test {
    use std::sync::Arc;

    use serial_test::serial;

    use crate::http::bigquery_client::test::create_client;
    use crate::http::bigquery_table_client::BigqueryTableClient;
    use crate::http::table::list::ListTablesRequest;

    #[tokio::test]
    #[serial]
    #[ignore]
    pub async fn list_and_get_public_table() {
        let (client, _project) = create_client().await;
        let client = BigqueryTableClient::new(Arc::new(client));
        let tables = client
            .list("bigquery-public-data", "samples", &ListTablesRequest::default())
            .await
            .unwrap();
        assert!(tables.iter().any(|t| t.table_reference.table_id == "natality"));

        let natality = client.get("bigquery-public-data", "samples", "natality").await.unwrap();
        let fields = natality.schema.unwrap().fields;
        let weight = fields.iter().find(|f| f.name == "weight_pounds").unwrap();
        assert_eq!(weight.data_type, "FLOAT");
    }
}
