use reqwest_middleware::{ClientWithMiddleware as Client, RequestBuilder};

use crate::http::dataset::DatasetReference;

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListDatasetsRequest {
    /// The maximum number of results to return in a single response page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<i32>,
    /// Whether to list all datasets, including hidden ones.
    pub all: bool,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct DatasetOverview {
    /// The fully-qualified, unique, opaque ID of the dataset, `projectId:datasetId`.
    pub id: String,
    /// The dataset reference.
    pub dataset_reference: DatasetReference,
    /// An alternate name for the dataset.
    pub friendly_name: Option<String>,
    /// The geographic location where the dataset resides.
    pub location: Option<String>,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListDatasetsResponse {
    /// Datasets in the project. Omitted when there are no datasets in the project.
    #[serde(default)]
    pub datasets: Vec<DatasetOverview>,
    /// A token to request the next page of results. Omitted on the final results page.
    pub next_page_token: Option<String>,
}

pub fn build(
    base_url: &str,
    client: &Client,
    project_id: &str,
    req: &ListDatasetsRequest,
    page_token: Option<String>,
) -> RequestBuilder {
    let url = format!("{base_url}/projects/{project_id}/datasets");
    let builder = client.get(url).query(req);
    if let Some(page_token) = page_token {
        builder.query(&[("pageToken", page_token.as_str())])
    } else {
        builder
    }
}
