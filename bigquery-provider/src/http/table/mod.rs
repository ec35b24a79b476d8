pub mod get;
pub mod list;

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    /// Required. The ID of the project containing this table.
    pub project_id: String,
    /// Required. The ID of the dataset containing this table.
    pub dataset_id: String,
    /// Required. The ID of the table.
    pub table_id: String,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TableFieldSchema {
    /// Required. The field name.
    pub name: String,
    /// Required. The field data type as reported by the service, e.g. STRING, INTEGER, FLOAT,
    /// BOOLEAN, TIMESTAMP or RECORD. Kept as text so that types this crate does not know about
    /// still deserialize.
    #[serde(rename(serialize = "type", deserialize = "type"))]
    pub data_type: String,
    /// Optional. NULLABLE, REQUIRED or REPEATED. The default value is NULLABLE.
    pub mode: Option<String>,
    /// Optional. Describes the nested schema fields if the type property is set to RECORD.
    pub fields: Option<Vec<TableFieldSchema>>,
    /// Optional. The field description.
    pub description: Option<String>,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    /// Describes the fields in a table.
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Output only. The fully-qualified unique name of the table in the format projectId:datasetId.tableId.
    #[serde(default)]
    pub id: String,
    /// Required. Reference describing the ID of this table.
    pub table_reference: TableReference,
    /// Optional. A descriptive name for the table.
    pub friendly_name: Option<String>,
    /// Optional. Describes the schema of this table.
    pub schema: Option<TableSchema>,
    /// Output only. TABLE, VIEW, MATERIALIZED_VIEW, EXTERNAL or SNAPSHOT.
    #[serde(rename(serialize = "type", deserialize = "type"))]
    pub table_type: Option<String>,
    /// Output only. The number of rows of data in this table, excluding any data in the streaming buffer.
    #[serde(default, deserialize_with = "crate::http::from_str_option")]
    pub num_rows: Option<u64>,
}
