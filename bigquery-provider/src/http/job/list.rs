use reqwest_middleware::{ClientWithMiddleware as Client, RequestBuilder};

use crate::http::error::ErrorProto;
use crate::http::job::{JobReference, JobState};

#[derive(Clone, PartialEq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListJobsRequest {
    /// Whether to display jobs owned by all users in the project. Default False.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_users: Option<bool>,
    /// The maximum number of results to return in a single response page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<i64>,
}

#[derive(Clone, PartialEq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobOverview {
    /// Unique opaque ID of the job.
    #[serde(default)]
    pub id: String,
    /// Unique opaque ID of the job.
    pub job_reference: JobReference,
    /// Running state of the job.
    #[serde(default)]
    pub state: JobState,
    /// A result object that will be present only if the job has failed.
    pub error_result: Option<ErrorProto>,
}

#[derive(Clone, PartialEq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListJobsResponse {
    /// A token to request the next page of results.
    pub next_page_token: Option<String>,
    /// List of jobs that were requested. Omitted when the project has no jobs.
    #[serde(default)]
    pub jobs: Vec<JobOverview>,
}

pub fn build(base_url: &str, client: &Client, project_id: &str, data: &ListJobsRequest) -> RequestBuilder {
    let url = format!("{base_url}/projects/{project_id}/jobs");
    client.get(url).query(data)
}
