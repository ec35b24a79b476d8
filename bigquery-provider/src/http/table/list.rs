use reqwest_middleware::{ClientWithMiddleware as Client, RequestBuilder};

use crate::http::table::TableReference;

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListTablesRequest {
    /// The maximum number of results to return in a single response page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<i64>,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TableOverview {
    /// An opaque ID of the table, `projectId:datasetId.tableId`.
    pub id: String,
    /// A reference uniquely identifying table.
    pub table_reference: TableReference,
    /// The user-friendly name for this table.
    pub friendly_name: Option<String>,
    /// The type of table, e.g. TABLE or VIEW.
    #[serde(rename(serialize = "type", deserialize = "type"))]
    pub table_type: String,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListTablesResponse {
    /// Tables in the requested dataset. Omitted when the dataset is empty.
    #[serde(default)]
    pub tables: Vec<TableOverview>,
    /// A token to request the next page of results. Omitted on the final results page.
    pub next_page_token: Option<String>,
    /// The total number of tables in the dataset.
    pub total_items: Option<i32>,
}

pub fn build(
    base_url: &str,
    client: &Client,
    project_id: &str,
    dataset_id: &str,
    req: &ListTablesRequest,
    page_token: Option<String>,
) -> RequestBuilder {
    let url = format!("{base_url}/projects/{project_id}/datasets/{dataset_id}/tables");
    let builder = client.get(url).query(req);
    if let Some(page_token) = page_token {
        builder.query(&[("pageToken", page_token.as_str())])
    } else {
        builder
    }
}
