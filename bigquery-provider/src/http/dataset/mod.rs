pub mod list;

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct DatasetReference {
    /// Required. A unique ID for this dataset, without the project name.
    pub dataset_id: String,
    /// Optional. The ID of the project containing this dataset.
    pub project_id: Option<String>,
}
