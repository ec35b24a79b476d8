use tokio_util::sync::CancellationToken;

use crate::connection::Connection;
use crate::error::Error;
use crate::http::dataset::DatasetReference;
use crate::http::job::query::QueryRequest;
use crate::http::tabledata::Value;
use crate::parameter::Parameter;
use crate::parameter_collection::ParameterCollection;
use crate::reader::DataReader;
use crate::runtime;

pub const DEFAULT_COMMAND_TIMEOUT: u32 = 30;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum CommandType {
    /// GoogleSQL text with `@name` placeholders.
    #[default]
    Text,
    /// Command text is a table of the default dataset, read in full.
    TableDirect,
    /// Not available on BigQuery, rejected by [`Command::set_command_type`].
    StoredProcedure,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum CommandBehavior {
    #[default]
    Default,
    /// Describe the tables of the default dataset instead of running the command.
    SchemaOnly,
}

/// A query against the connection it is bound to.
///
/// Parameters are rendered into the text as escaped literals before submission; BigQuery receives a
/// plain query job. Cloning a command copies its parameters.
#[derive(Clone, Debug)]
pub struct Command<'conn> {
    connection: Option<&'conn Connection>,
    command_text: String,
    command_type: CommandType,
    command_timeout: u32,
    parameters: ParameterCollection,
}

impl Default for Command<'_> {
    fn default() -> Self {
        Self {
            connection: None,
            command_text: String::new(),
            command_type: CommandType::Text,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            parameters: ParameterCollection::new(),
        }
    }
}

impl<'conn> Command<'conn> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, command_text: impl Into<String>) -> Self {
        self.command_text = command_text.into();
        self
    }

    pub fn connection(&self) -> Option<&'conn Connection> {
        self.connection
    }

    pub fn set_connection(&mut self, connection: Option<&'conn Connection>) {
        self.connection = connection;
    }

    pub fn command_text(&self) -> &str {
        &self.command_text
    }

    pub fn set_command_text(&mut self, command_text: impl Into<String>) {
        self.command_text = command_text.into();
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    pub fn set_command_type(&mut self, command_type: CommandType) -> Result<(), Error> {
        if command_type == CommandType::StoredProcedure {
            return Err(Error::InvalidArgument(
                "BigQuery does not support stored procedures".to_string(),
            ));
        }
        self.command_type = command_type;
        Ok(())
    }

    /// Server-side execution budget in seconds. `0` means no limit.
    pub fn command_timeout(&self) -> u32 {
        self.command_timeout
    }

    pub fn set_command_timeout(&mut self, seconds: i32) -> Result<(), Error> {
        self.command_timeout = u32::try_from(seconds)
            .map_err(|_| Error::InvalidArgument(format!("command timeout must not be negative: {seconds}")))?;
        Ok(())
    }

    pub fn parameters(&self) -> &ParameterCollection {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterCollection {
        &mut self.parameters
    }

    pub fn create_parameter(&self) -> Parameter {
        Parameter::default()
    }

    pub fn prepare(&self) -> Result<(), Error> {
        Err(Error::NotSupported("prepared statements"))
    }

    fn timeout_ms(&self) -> i64 {
        match self.command_timeout {
            0 => u32::MAX as i64,
            seconds => seconds as i64 * 1000,
        }
    }

    /// Query text as submitted: parameters substituted, table-direct commands expanded.
    pub(crate) fn query_text(&self, dataset_id: Option<&str>, use_legacy_sql: bool) -> Result<String, Error> {
        match self.command_type {
            CommandType::Text => {
                if self.command_text.trim().is_empty() {
                    return Err(Error::InvalidArgument("command text is empty".to_string()));
                }
                Ok(self.parameters.substitute(&self.command_text))
            }
            CommandType::TableDirect => {
                let table_id = self.command_text.trim();
                if table_id.is_empty() {
                    return Err(Error::InvalidArgument("table name is empty".to_string()));
                }
                let dataset_id = dataset_id.ok_or_else(|| {
                    Error::InvalidConnectionString(format!("{} is required", crate::connection_string::DATASET_ID))
                })?;
                if use_legacy_sql {
                    // legacy SQL has no escape inside [...]
                    if [dataset_id, table_id].iter().any(|id| id.contains(['[', ']'])) {
                        return Err(Error::InvalidArgument(format!(
                            "invalid table name: '{dataset_id}.{table_id}'"
                        )));
                    }
                    Ok(format!("SELECT * FROM [{dataset_id}.{table_id}]"))
                } else {
                    Ok(format!(
                        "SELECT * FROM {}.{}",
                        quote_identifier(dataset_id),
                        quote_identifier(table_id)
                    ))
                }
            }
            CommandType::StoredProcedure => Err(Error::NotSupported("stored procedures")),
        }
    }

    pub fn execute_reader(&self, behavior: CommandBehavior) -> Result<DataReader, Error> {
        let cancel = CancellationToken::new();
        runtime::block_on(self.execute_reader_async(behavior, &cancel))?
    }

    pub async fn execute_reader_async(
        &self,
        behavior: CommandBehavior,
        cancel: &CancellationToken,
    ) -> Result<DataReader, Error> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let connection = self.connection.ok_or(Error::NoConnection)?;
        let session = connection.session()?;
        let dataset_id = connection.database();
        let request = match behavior {
            CommandBehavior::SchemaOnly => {
                connection.required_dataset()?;
                None
            }
            CommandBehavior::Default => {
                self.parameters.validate()?;
                let use_legacy_sql = connection.settings().use_legacy_sql()?;
                Some(QueryRequest {
                    query: self.query_text(dataset_id, use_legacy_sql)?,
                    default_dataset: dataset_id.map(|dataset_id| DatasetReference {
                        dataset_id: dataset_id.to_string(),
                        project_id: Some(session.project_id.clone()),
                    }),
                    timeout_ms: Some(self.timeout_ms()),
                    use_legacy_sql,
                    ..Default::default()
                })
            }
        };
        let mut reader = DataReader::new(session, dataset_id.map(str::to_string), behavior, request);
        reader.initialize_async(cancel).await?;
        Ok(reader)
    }

    /// Runs the command and discards its results. BigQuery reports no affected-row count here, so
    /// the result is always 0.
    pub fn execute_non_query(&self) -> Result<u64, Error> {
        let cancel = CancellationToken::new();
        runtime::block_on(self.execute_non_query_async(&cancel))?
    }

    pub async fn execute_non_query_async(&self, cancel: &CancellationToken) -> Result<u64, Error> {
        let mut reader = self.execute_reader_async(CommandBehavior::Default, cancel).await?;
        while reader.next_result_async(cancel).await? {}
        reader.dispose();
        Ok(0)
    }

    pub fn execute_scalar(&self) -> Result<Option<Value>, Error> {
        let cancel = CancellationToken::new();
        runtime::block_on(self.execute_scalar_async(&cancel))?
    }

    /// First column of the first row, `None` when there is no row, no column or the cell is null.
    pub async fn execute_scalar_async(&self, cancel: &CancellationToken) -> Result<Option<Value>, Error> {
        let mut reader = self.execute_reader_async(CommandBehavior::Default, cancel).await?;
        let value = if reader.field_count()? > 0 && reader.read()? {
            Some(reader.get_value(0)?.clone()).filter(|v| !v.is_null())
        } else {
            None
        };
        reader.dispose();
        Ok(value)
    }
}

/// GoogleSQL quoted identifier.
fn quote_identifier(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('`');
    for c in name.chars() {
        if c == '`' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('`');
    quoted
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use crate::command::{Command, CommandBehavior, CommandType, DEFAULT_COMMAND_TIMEOUT};
    use crate::connection::{Connection, ConnectionState};
    use crate::error::{Error, ErrorKind};
    use crate::http::tabledata::Value;
    use crate::parameter::Parameter;
    use crate::service::test::{connection_string, FakeConnector, FakeService, DATASET, PROJECT};
    use crate::types::{BigQueryDbType, HostType};

    async fn open(connection_string: &str) -> (Connection, Arc<FakeService>) {
        let service = FakeService::new();
        let mut connection =
            Connection::with_connector(connection_string, FakeConnector::new(service.clone())).unwrap();
        connection.open_async(&CancellationToken::new()).await.unwrap();
        (connection, service)
    }

    #[tokio::test]
    async fn test_natality_reader() {
        let (connection, service) = open(&connection_string()).await;
        let command = connection
            .create_command()
            .unwrap()
            .with_text("SELECT * FROM natality LIMIT 10");
        let cancel = CancellationToken::new();
        let mut reader = command
            .execute_reader_async(CommandBehavior::Default, &cancel)
            .await
            .unwrap();
        assert_eq!(reader.field_count().unwrap(), 2);
        assert_eq!(reader.get_field_type(0).unwrap(), Some(HostType::Float32));
        assert_eq!(reader.get_field_type(1).unwrap(), Some(HostType::Bool));
        let mut rows = 0;
        while reader.read_async(&cancel).await.unwrap() {
            rows += 1;
        }
        assert!(rows <= 10);

        let request = service.last_query().unwrap();
        assert_eq!(request.query, "SELECT * FROM natality LIMIT 10");
        assert_eq!(request.timeout_ms, Some(30_000));
        assert!(!request.use_legacy_sql);
        let dataset = request.default_dataset.unwrap();
        assert_eq!(dataset.dataset_id, DATASET);
        assert_eq!(dataset.project_id.as_deref(), Some(PROJECT));
    }

    #[tokio::test]
    async fn test_execute_scalar() {
        let (connection, _) = open(&connection_string()).await;
        let command = connection.create_command().unwrap().with_text("SELECT 1 FROM natality");
        let value = command
            .execute_scalar_async(&CancellationToken::new())
            .await
            .unwrap();
        match value {
            Some(Value::String(v)) => assert_eq!(v.parse::<i64>().unwrap(), 1),
            other => panic!("unexpected {other:?}"),
        }

        let command = connection.create_command().unwrap().with_text("SELECT name FROM empty");
        assert_eq!(command.execute_scalar_async(&CancellationToken::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_execute_non_query() {
        let (connection, service) = open(&connection_string()).await;
        let command = connection
            .create_command()
            .unwrap()
            .with_text("DELETE FROM natality WHERE weight_pounds IS NULL");
        assert_eq!(command.execute_non_query_async(&CancellationToken::new()).await.unwrap(), 0);
        assert_eq!(service.query_count(), 1);
    }

    #[test]
    fn test_blocking_execution() {
        let service = FakeService::new();
        let mut connection = Connection::with_connector(&connection_string(), FakeConnector::new(service)).unwrap();
        connection.open().unwrap();
        let command = connection.create_command().unwrap().with_text("SELECT 1");
        assert_eq!(command.execute_scalar().unwrap(), Some(Value::String("1".to_string())));
        assert_eq!(command.execute_non_query().unwrap(), 0);
        let mut reader = command.execute_reader(CommandBehavior::Default).unwrap();
        assert!(reader.read().unwrap());
    }

    #[tokio::test]
    async fn test_stored_procedure_rejected() {
        let (connection, service) = open(&connection_string()).await;
        let mut command = connection.create_command().unwrap().with_text("my_procedure");
        let err = command.set_command_type(CommandType::StoredProcedure).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(command.command_type(), CommandType::Text);
        assert_eq!(service.query_count(), 0);
        assert_eq!(command.prepare().unwrap_err().kind(), ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_timeout() {
        let (connection, service) = open(&connection_string()).await;
        let mut command = connection.create_command().unwrap().with_text("SELECT 1");
        assert_eq!(command.command_timeout(), DEFAULT_COMMAND_TIMEOUT);
        assert_eq!(command.set_command_timeout(-1).unwrap_err().kind(), ErrorKind::Configuration);
        assert_eq!(command.command_timeout(), DEFAULT_COMMAND_TIMEOUT);

        command.set_command_timeout(0).unwrap();
        command.execute_scalar_async(&CancellationToken::new()).await.unwrap();
        assert_eq!(service.last_query().unwrap().timeout_ms, Some(u32::MAX as i64));

        command.set_command_timeout(5).unwrap();
        command.execute_scalar_async(&CancellationToken::new()).await.unwrap();
        assert_eq!(service.last_query().unwrap().timeout_ms, Some(5000));
    }

    #[tokio::test]
    async fn test_injection_payloads_stay_literals() {
        let (connection, service) = open(&connection_string()).await;
        let cases = [
            ("CA' or 1=1--", r"SELECT * FROM natality WHERE state='CA\' or 1=1--'"),
            (r#"CA" or 1=1--"#, r#"SELECT * FROM natality WHERE state='CA\" or 1=1--'"#),
            (r"CA\' or 1=1--", r"SELECT * FROM natality WHERE state='CA\\\' or 1=1--'"),
        ];
        for (payload, expected) in cases {
            let mut command = connection
                .create_command()
                .unwrap()
                .with_text("SELECT * FROM natality WHERE state=@state");
            command.parameters_mut().add_with_value("@state", payload);
            command
                .execute_reader_async(CommandBehavior::Default, &CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(service.last_query().unwrap().query, expected);
        }
    }

    #[tokio::test]
    async fn test_typed_parameters() {
        let (connection, service) = open(&connection_string()).await;
        let mut command = connection
            .create_command()
            .unwrap()
            .with_text("SELECT * FROM natality WHERE year = @year AND is_male = @is_male AND plurality > @plurality");
        command.parameters_mut().add_with_value("year", 2005i64);
        command.parameters_mut().add_with_value("@is_male", true);
        let mut plurality = command.create_parameter();
        plurality.set_name("@plurality");
        plurality.set_bigquery_db_type(BigQueryDbType::Integer);
        plurality.set_value("1");
        command.parameters_mut().add(plurality);
        command
            .execute_reader_async(CommandBehavior::Default, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            service.last_query().unwrap().query,
            "SELECT * FROM natality WHERE year = 2005 AND is_male = true AND plurality > 1"
        );
    }

    #[tokio::test]
    async fn test_invalid_parameters_fail_before_submission() {
        let (connection, service) = open(&connection_string()).await;
        let mut command = connection.create_command().unwrap().with_text("SELECT @a");
        command.parameters_mut().add_with_value("@a", 1i64);
        command.parameters_mut().add_with_value("a", 2i64);
        let err = command
            .execute_reader_async(CommandBehavior::Default, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateParameter(_)));

        command.parameters_mut().clear();
        command.parameters_mut().add(Parameter::new("@a"));
        let err = command
            .execute_reader_async(CommandBehavior::Default, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(service.query_count(), 0);
    }

    #[tokio::test]
    async fn test_table_direct() {
        let (connection, service) = open(&connection_string()).await;
        let mut command = connection.create_command().unwrap().with_text("natality");
        command.set_command_type(CommandType::TableDirect).unwrap();
        let mut reader = command
            .execute_reader_async(CommandBehavior::Default, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(service.last_query().unwrap().query, "SELECT * FROM `samples`.`natality`");
        assert!(reader.read().unwrap());

        command.set_command_text("daily-events_2024");
        command
            .execute_reader_async(CommandBehavior::Default, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(service.last_query().unwrap().query, "SELECT * FROM `samples`.`daily-events_2024`");

        command.set_command_text("natality`; DROP TABLE natality; --");
        command
            .execute_reader_async(CommandBehavior::Default, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            service.last_query().unwrap().query,
            "SELECT * FROM `samples`.`natality\\`; DROP TABLE natality; --`"
        );

        command.set_command_text("  ");
        let err = command
            .execute_reader_async(CommandBehavior::Default, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_table_direct_legacy_sql() {
        let (connection, service) = open("ProjectId=p;DataSetId=samples;UseLegacySql=true").await;
        let mut command = connection.create_command().unwrap().with_text("natality");
        command.set_command_type(CommandType::TableDirect).unwrap();
        command
            .execute_reader_async(CommandBehavior::Default, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(service.last_query().unwrap().query, "SELECT * FROM [samples.natality]");

        command.set_command_text("natality]; DROP TABLE x");
        let err = command
            .execute_reader_async(CommandBehavior::Default, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_schema_only() {
        let (connection, service) = open(&connection_string()).await;
        let command = connection.create_command().unwrap().with_text("SELECT * FROM natality");
        let cancel = CancellationToken::new();
        let mut reader = command
            .execute_reader_async(CommandBehavior::SchemaOnly, &cancel)
            .await
            .unwrap();
        assert_eq!(service.query_count(), 0);
        let mut tables = vec![];
        loop {
            let schema = reader.get_schema_table_async(&cancel).await.unwrap();
            tables.push((schema.table_name.unwrap(), schema.columns.len()));
            if !reader.next_result_async(&cancel).await.unwrap() {
                break;
            }
        }
        assert_eq!(
            tables,
            vec![
                ("events".to_string(), 4),
                ("heavy_births".to_string(), 1),
                ("natality".to_string(), 2)
            ]
        );
    }

    #[tokio::test]
    async fn test_remote_error_is_wrapped() {
        let (connection, service) = open(&connection_string()).await;
        service.fail_queries.store(true, std::sync::atomic::Ordering::SeqCst);
        let command = connection.create_command().unwrap().with_text("SELECT");
        let err = command
            .execute_reader_async(CommandBehavior::Default, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Remote);
        assert!(err.to_string().contains("Syntax error"));
    }

    #[tokio::test]
    async fn test_requires_usable_connection() {
        let command = Command::new().with_text("SELECT 1");
        let err = command
            .execute_reader_async(CommandBehavior::Default, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoConnection));

        let service = FakeService::new();
        let closed = Connection::with_connector(&connection_string(), FakeConnector::new(service)).unwrap();
        let mut command = command;
        command.set_connection(Some(&closed));
        let err = command
            .execute_reader_async(CommandBehavior::Default, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionNotOpen(ConnectionState::Closed)));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = command.execute_scalar_async(&cancel).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_legacy_sql_setting() {
        let (connection, service) = open("ProjectId=p;DataSetId=samples;UseLegacySql=true").await;
        let command = connection.create_command().unwrap().with_text("SELECT 1");
        command.execute_scalar_async(&CancellationToken::new()).await.unwrap();
        assert!(service.last_query().unwrap().use_legacy_sql);
    }

    #[tokio::test]
    async fn test_clone_copies_parameters() {
        let (connection, _) = open(&connection_string()).await;
        let mut command = connection.create_command().unwrap().with_text("SELECT @x");
        command.parameters_mut().add_with_value("@x", 1i64);
        let mut clone = command.clone();
        clone.parameters_mut().get_mut(0).unwrap().set_value(2i64);
        clone.set_command_text("SELECT @x + 1");

        assert_eq!(command.command_text(), "SELECT @x");
        assert_eq!(command.parameters().get(0).unwrap().value(), Some(1i64.into()));
        assert_eq!(clone.parameters().get(0).unwrap().value(), Some(2i64.into()));
        assert!(std::ptr::eq(clone.connection().unwrap(), &connection));
    }
}
