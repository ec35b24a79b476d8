#![allow(clippy::result_large_err)]
//! # gcloud-bigquery-provider
//!
//! Relational provider for Google Cloud BigQuery: connections, commands with named parameters and
//! forward-only readers over the BigQuery v2 REST API.
//!
//! ## Quick Start
//!
//! ### Open a connection
//!
//! The connection string selects the project, the default dataset and the credentials.
//! Without credential keys the credentials are read from `GOOGLE_APPLICATION_CREDENTIALS`,
//! `GOOGLE_APPLICATION_CREDENTIALS_JSON` or the metadata server, as described in
//! [google-cloud-auth](https://github.com/yoshidan/google-cloud-rust/blob/main/foundation/auth/README.md).
//!
//! ```rust
//! use gcloud_bigquery_provider::connection::Connection;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn run() {
//!     let mut connection = Connection::new(
//!         "ProjectId=my-project;DataSetId=samples;ServiceAccountEmail=sa@my-project.iam.gserviceaccount.com;PrivateKeyFileName=/keys/sa.pem",
//!     )
//!     .unwrap();
//!     let cancel = CancellationToken::new();
//!     connection.open_async(&cancel).await.unwrap();
//!     let tables = connection.get_table_names_async(&cancel).await.unwrap();
//! }
//! ```
//!
//! ### Query with parameters
//!
//! Parameters are written as `@name` and rendered into the query as escaped literals.
//!
//! ```rust
//! use gcloud_bigquery_provider::command::CommandBehavior;
//! use gcloud_bigquery_provider::connection::Connection;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn run(connection: &Connection) {
//!     let cancel = CancellationToken::new();
//!     let mut command = connection
//!         .create_command()
//!         .unwrap()
//!         .with_text("SELECT weight_pounds, is_male FROM natality WHERE state = @state LIMIT 10");
//!     command.parameters_mut().add_with_value("@state", "CA");
//!     let mut reader = command.execute_reader_async(CommandBehavior::Default, &cancel).await.unwrap();
//!     while reader.read_async(&cancel).await.unwrap() {
//!         let weight = reader.get_field_value::<Option<f32>>(0).unwrap();
//!         let is_male = reader.get_field_value::<Option<bool>>(1).unwrap();
//!     }
//! }
//! ```
//!
//! ### Blocking calls
//!
//! Every async operation has a blocking twin (`open`, `execute_reader`, `execute_scalar`, ...).
//! They run on a process-wide runtime and fail with [`error::Error::BlockingInAsyncContext`] when
//! called from inside a Tokio runtime.
//!
//! ### Describe tables
//!
//! ```rust
//! use gcloud_bigquery_provider::command::CommandBehavior;
//! use gcloud_bigquery_provider::connection::Connection;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn run(connection: &Connection) {
//!     let cancel = CancellationToken::new();
//!     let command = connection.create_command().unwrap();
//!     let mut reader = command.execute_reader_async(CommandBehavior::SchemaOnly, &cancel).await.unwrap();
//!     loop {
//!         let schema = reader.get_schema_table_async(&cancel).await.unwrap();
//!         for column in schema.columns {
//!             println!("{:?}.{} {:?}", schema.table_name, column.name, column.data_type);
//!         }
//!         if !reader.next_result_async(&cancel).await.unwrap() {
//!             break;
//!         }
//!     }
//! }
//! ```
pub mod command;
pub mod connection;
pub mod connection_string;
pub mod error;
pub mod http;
pub mod parameter;
pub mod parameter_collection;
pub mod reader;
mod runtime;
pub mod service;
pub mod types;
