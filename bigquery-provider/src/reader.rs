use std::sync::Arc;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use crate::command::CommandBehavior;
use crate::error::Error;
use crate::http::job::query::QueryRequest;
use crate::http::table::TableFieldSchema;
use crate::http::tabledata::{Tuple, Value};
use crate::runtime;
use crate::service::{BigQueryService, Session};
use crate::types::{self, BigQueryDbType, HostType};

#[derive(thiserror::Error, Debug)]
pub enum CellError {
    #[error("unexpected null value")]
    UnexpectedNull,
    #[error("invalid type")]
    InvalidType,
    #[error("cannot parse '{0}'")]
    FromString(String),
    #[error(transparent)]
    ComponentRange(#[from] time::error::ComponentRange),
    #[error(transparent)]
    Parse(#[from] time::error::Parse),
}

/// Conversion from a raw cell to a host value, given the column's declared type.
pub trait FromCell: Sized {
    fn from_cell(value: &Value, column_type: BigQueryDbType) -> Result<Self, CellError>;
}

fn text(value: &Value) -> Result<&str, CellError> {
    match value {
        Value::String(v) => Ok(v.as_str()),
        Value::Null => Err(CellError::UnexpectedNull),
        _ => Err(CellError::InvalidType),
    }
}

impl FromCell for String {
    fn from_cell(value: &Value, _: BigQueryDbType) -> Result<Self, CellError> {
        text(value).map(|v| v.to_string())
    }
}

/// Reads the cell as the column's declared type, then converts it to `target`.
fn coerce(value: &Value, column_type: BigQueryDbType, target: HostType) -> Result<types::Value, CellError> {
    let v = text(value)?;
    let raw = types::Value::String(v.to_string());
    let declared = match column_type.host_type() {
        Some(host @ (HostType::Int64 | HostType::Float32 | HostType::Bool)) => raw.convert(host),
        _ => None,
    };
    declared
        .unwrap_or(raw)
        .convert(target)
        .ok_or_else(|| CellError::FromString(v.to_string()))
}

impl FromCell for i64 {
    fn from_cell(value: &Value, column_type: BigQueryDbType) -> Result<Self, CellError> {
        match coerce(value, column_type, HostType::Int64)? {
            types::Value::Int64(v) => Ok(v),
            _ => Err(CellError::InvalidType),
        }
    }
}

impl FromCell for i32 {
    fn from_cell(value: &Value, column_type: BigQueryDbType) -> Result<Self, CellError> {
        let v = i64::from_cell(value, column_type)?;
        i32::try_from(v).map_err(|_| CellError::FromString(v.to_string()))
    }
}

impl FromCell for i16 {
    fn from_cell(value: &Value, column_type: BigQueryDbType) -> Result<Self, CellError> {
        let v = i64::from_cell(value, column_type)?;
        i16::try_from(v).map_err(|_| CellError::FromString(v.to_string()))
    }
}

impl FromCell for f32 {
    fn from_cell(value: &Value, column_type: BigQueryDbType) -> Result<Self, CellError> {
        match coerce(value, column_type, HostType::Float32)? {
            types::Value::Float32(v) => Ok(v),
            _ => Err(CellError::InvalidType),
        }
    }
}

impl FromCell for bool {
    fn from_cell(value: &Value, column_type: BigQueryDbType) -> Result<Self, CellError> {
        match coerce(value, column_type, HostType::Bool)? {
            types::Value::Bool(v) => Ok(v),
            _ => Err(CellError::InvalidType),
        }
    }
}

impl FromCell for OffsetDateTime {
    fn from_cell(value: &Value, column_type: BigQueryDbType) -> Result<Self, CellError> {
        let v = text(value)?;
        if column_type != BigQueryDbType::Timestamp {
            return Ok(OffsetDateTime::parse(v, &Rfc3339)?);
        }
        // TIMESTAMP cells are epoch seconds with a fraction, e.g. "1.7012448E9".
        let f = v.parse::<f64>().map_err(|_| CellError::FromString(v.to_string()))?;
        let sec = f.trunc();
        // BigQuery keeps microsecond precision, so round to whole microseconds.
        let micro = ((f - sec) * 1_000_000.0).round();
        Ok(OffsetDateTime::from_unix_timestamp_nanos(
            sec as i128 * 1_000_000_000 + micro as i128 * 1000,
        )?)
    }
}

impl FromCell for Tuple {
    fn from_cell(value: &Value, _: BigQueryDbType) -> Result<Self, CellError> {
        match value {
            Value::Struct(v) => Ok(v.clone()),
            Value::Null => Err(CellError::UnexpectedNull),
            _ => Err(CellError::InvalidType),
        }
    }
}

impl<T: FromCell> FromCell for Vec<T> {
    fn from_cell(value: &Value, column_type: BigQueryDbType) -> Result<Self, CellError> {
        match value {
            Value::Array(cells) => cells.iter().map(|c| T::from_cell(&c.v, column_type)).collect(),
            Value::Null => Err(CellError::UnexpectedNull),
            _ => Err(CellError::InvalidType),
        }
    }
}

impl<T: FromCell> FromCell for Option<T> {
    fn from_cell(value: &Value, column_type: BigQueryDbType) -> Result<Self, CellError> {
        match value {
            Value::Null => Ok(None),
            _ => Ok(Some(T::from_cell(value, column_type)?)),
        }
    }
}

/// One column of a [`SchemaTable`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SchemaColumn {
    pub ordinal: usize,
    pub name: String,
    /// `None` for wire types without a host mapping.
    pub data_type: Option<HostType>,
    pub data_type_name: String,
    pub bigquery_db_type: BigQueryDbType,
    pub is_nullable: bool,
}

/// Column description of the current result set.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct SchemaTable {
    /// Table described, in schema-only mode.
    pub table_name: Option<String>,
    pub columns: Vec<SchemaColumn>,
}

impl SchemaTable {
    fn from_fields(table_name: Option<String>, fields: &[TableFieldSchema]) -> Self {
        let columns = fields
            .iter()
            .enumerate()
            .map(|(ordinal, f)| {
                let bigquery_db_type = BigQueryDbType::from_wire_type(&f.data_type);
                SchemaColumn {
                    ordinal,
                    name: f.name.clone(),
                    data_type: bigquery_db_type.host_type(),
                    data_type_name: f.data_type.clone(),
                    bigquery_db_type,
                    is_nullable: f.mode.as_deref().map_or(true, |m| m.eq_ignore_ascii_case("NULLABLE")),
                }
            })
            .collect();
        Self { table_name, columns }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ReaderState {
    Uninitialized,
    Active,
    Closed,
}

/// Forward-only cursor over the result of one command execution.
///
/// The whole first page of the query response is buffered; BigQuery's page size limit applies and
/// further pages are not fetched. In [`CommandBehavior::SchemaOnly`] each result set is one table of
/// the default dataset and has no rows.
#[derive(Debug)]
pub struct DataReader {
    service: Arc<dyn BigQueryService>,
    project_id: String,
    dataset_id: Option<String>,
    behavior: CommandBehavior,
    request: Option<QueryRequest>,
    state: ReaderState,
    schema: Vec<TableFieldSchema>,
    rows: Vec<Tuple>,
    next_row: usize,
    current: Option<usize>,
    tables: Vec<String>,
    table_index: usize,
}

impl DataReader {
    pub(crate) fn new(
        session: &Session,
        dataset_id: Option<String>,
        behavior: CommandBehavior,
        request: Option<QueryRequest>,
    ) -> Self {
        Self {
            service: session.service.clone(),
            project_id: session.project_id.clone(),
            dataset_id,
            behavior,
            request,
            state: ReaderState::Uninitialized,
            schema: vec![],
            rows: vec![],
            next_row: 0,
            current: None,
            tables: vec![],
            table_index: 0,
        }
    }

    /// Runs the query, or lists the dataset's tables in schema-only mode.
    pub(crate) async fn initialize_async(&mut self, cancel: &CancellationToken) -> Result<(), Error> {
        match self.state {
            ReaderState::Closed => return Err(Error::Disposed("DataReader")),
            ReaderState::Active => return Ok(()),
            ReaderState::Uninitialized => {}
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match self.behavior {
            CommandBehavior::Default => self.run_query(cancel).await?,
            CommandBehavior::SchemaOnly => self.list_tables(cancel).await?,
        }
        self.state = ReaderState::Active;
        Ok(())
    }

    async fn run_query(&mut self, cancel: &CancellationToken) -> Result<(), Error> {
        let request = self.request.as_ref().ok_or(Error::NotInitialized)?;
        tracing::debug!(query_len = request.query.len(), timeout_ms = ?request.timeout_ms, "submitting query");
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = self.service.query(&self.project_id, request) => response?,
        };
        let job_id = response
            .job_reference
            .as_ref()
            .map(|r| r.job_id.clone())
            .unwrap_or_default();
        if !response.job_complete {
            tracing::warn!(job_id = %job_id, "query did not complete within its timeout");
            return Err(Error::remote(format!(
                "query job {job_id} did not complete within {} ms",
                request.timeout_ms.unwrap_or_default()
            )));
        }
        for e in response.errors.iter().flatten() {
            tracing::warn!(job_id = %job_id, reason = ?e.reason, message = ?e.message, "query reported an error");
        }
        self.schema = response.schema.map(|s| s.fields).unwrap_or_default();
        self.rows = response.rows.unwrap_or_default();
        if response.page_token.is_some() {
            tracing::warn!(
                job_id = %job_id,
                returned = self.rows.len(),
                total_rows = ?response.total_rows,
                "query result was truncated to its first page"
            );
        }
        Ok(())
    }

    async fn list_tables(&mut self, cancel: &CancellationToken) -> Result<(), Error> {
        let dataset_id = self.required_dataset()?.to_string();
        let tables = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            tables = self.service.list_tables(&self.project_id, &dataset_id) => tables?,
        };
        self.tables = tables.into_iter().map(|t| t.table_reference.table_id).collect();
        self.table_index = 0;
        self.schema = match self.tables.first() {
            Some(table_id) => self.describe(table_id, cancel).await?,
            None => vec![],
        };
        Ok(())
    }

    async fn describe(&self, table_id: &str, cancel: &CancellationToken) -> Result<Vec<TableFieldSchema>, Error> {
        let dataset_id = self.required_dataset()?;
        let table = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            table = self.service.get_table(&self.project_id, dataset_id, table_id) => table?,
        };
        Ok(table.schema.map(|s| s.fields).unwrap_or_default())
    }

    fn required_dataset(&self) -> Result<&str, Error> {
        self.dataset_id.as_deref().ok_or_else(|| {
            Error::InvalidConnectionString(format!("{} is required", crate::connection_string::DATASET_ID))
        })
    }

    fn check_active(&self) -> Result<(), Error> {
        match self.state {
            ReaderState::Active => Ok(()),
            ReaderState::Uninitialized => Err(Error::NotInitialized),
            ReaderState::Closed => Err(Error::Disposed("DataReader")),
        }
    }

    pub fn behavior(&self) -> CommandBehavior {
        self.behavior
    }

    /// Advances to the next row. Returns `false` once the rows are exhausted.
    pub fn read(&mut self) -> Result<bool, Error> {
        self.check_active()?;
        if self.next_row < self.rows.len() {
            self.current = Some(self.next_row);
            self.next_row += 1;
            Ok(true)
        } else {
            self.current = None;
            Ok(false)
        }
    }

    pub async fn read_async(&mut self, cancel: &CancellationToken) -> Result<bool, Error> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.read()
    }

    pub fn next_result(&mut self) -> Result<bool, Error> {
        self.check_active()?;
        if self.behavior == CommandBehavior::Default {
            return Ok(false);
        }
        let cancel = CancellationToken::new();
        runtime::block_on(self.next_result_async(&cancel))?
    }

    /// Moves to the next result set. A query has exactly one; schema-only mode has one per table.
    pub async fn next_result_async(&mut self, cancel: &CancellationToken) -> Result<bool, Error> {
        self.check_active()?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.behavior == CommandBehavior::Default || self.table_index + 1 >= self.tables.len() {
            return Ok(false);
        }
        let table_id = self.tables[self.table_index + 1].clone();
        let schema = self.describe(&table_id, cancel).await?;
        self.table_index += 1;
        self.schema = schema;
        self.rows.clear();
        self.next_row = 0;
        self.current = None;
        Ok(true)
    }

    pub fn field_count(&self) -> Result<usize, Error> {
        self.check_active()?;
        Ok(self.schema.len())
    }

    pub fn has_rows(&self) -> Result<bool, Error> {
        self.check_active()?;
        Ok(!self.rows.is_empty())
    }

    pub fn is_closed(&self) -> bool {
        self.state == ReaderState::Closed
    }

    /// Table the current result set describes, in schema-only mode.
    pub fn current_table(&self) -> Option<&str> {
        self.tables.get(self.table_index).map(String::as_str)
    }

    fn field(&self, ordinal: usize) -> Result<&TableFieldSchema, Error> {
        self.check_active()?;
        self.schema.get(ordinal).ok_or(Error::IndexOutOfRange {
            index: ordinal,
            count: self.schema.len(),
        })
    }

    pub fn get_name(&self, ordinal: usize) -> Result<&str, Error> {
        Ok(self.field(ordinal)?.name.as_str())
    }

    /// Wire type name of the column, e.g. `FLOAT`.
    pub fn get_data_type_name(&self, ordinal: usize) -> Result<&str, Error> {
        Ok(self.field(ordinal)?.data_type.as_str())
    }

    /// Host type of the column, `None` for wire types without a mapping.
    pub fn get_field_type(&self, ordinal: usize) -> Result<Option<HostType>, Error> {
        Ok(BigQueryDbType::from_wire_type(&self.field(ordinal)?.data_type).host_type())
    }

    /// Exact, case-sensitive lookup of a column by name.
    pub fn get_ordinal(&self, name: &str) -> Option<usize> {
        self.schema.iter().position(|f| f.name == name)
    }

    /// Raw cell of the current row.
    pub fn get_value(&self, ordinal: usize) -> Result<&Value, Error> {
        self.field(ordinal)?;
        let row = self.current.and_then(|i| self.rows.get(i)).ok_or(Error::NoCurrentRow)?;
        row.f.get(ordinal).map(|cell| &cell.v).ok_or(Error::IndexOutOfRange {
            index: ordinal,
            count: row.f.len(),
        })
    }

    /// Converts the cell using the column's declared type. Use `Option<T>` for nullable columns.
    pub fn get_field_value<T: FromCell>(&self, ordinal: usize) -> Result<T, Error> {
        let value = self.get_value(ordinal)?;
        let column_type = BigQueryDbType::from_wire_type(&self.schema[ordinal].data_type);
        T::from_cell(value, column_type).map_err(|e| Error::InvalidCast {
            ordinal,
            column_type,
            target: std::any::type_name::<T>(),
            reason: e.to_string(),
        })
    }

    pub fn is_db_null(&self, ordinal: usize) -> Result<bool, Error> {
        Ok(self.get_value(ordinal)?.is_null())
    }

    pub fn get_string(&self, ordinal: usize) -> Result<String, Error> {
        self.get_field_value(ordinal)
    }

    pub fn get_int64(&self, ordinal: usize) -> Result<i64, Error> {
        self.get_field_value(ordinal)
    }

    pub fn get_int32(&self, ordinal: usize) -> Result<i32, Error> {
        self.get_field_value(ordinal)
    }

    pub fn get_int16(&self, ordinal: usize) -> Result<i16, Error> {
        self.get_field_value(ordinal)
    }

    pub fn get_float(&self, ordinal: usize) -> Result<f32, Error> {
        self.get_field_value(ordinal)
    }

    pub fn get_boolean(&self, ordinal: usize) -> Result<bool, Error> {
        self.get_field_value(ordinal)
    }

    pub fn get_date_time(&self, ordinal: usize) -> Result<OffsetDateTime, Error> {
        self.get_field_value(ordinal)
    }

    pub fn get_double(&self, _ordinal: usize) -> Result<f64, Error> {
        self.unsupported("GetDouble")
    }

    pub fn get_decimal(&self, _ordinal: usize) -> Result<String, Error> {
        self.unsupported("GetDecimal")
    }

    pub fn get_guid(&self, _ordinal: usize) -> Result<[u8; 16], Error> {
        self.unsupported("GetGuid")
    }

    pub fn get_byte(&self, _ordinal: usize) -> Result<u8, Error> {
        self.unsupported("GetByte")
    }

    pub fn get_bytes(&self, _ordinal: usize, _field_offset: usize, _buffer: &mut [u8]) -> Result<usize, Error> {
        self.unsupported("GetBytes")
    }

    pub fn get_char(&self, _ordinal: usize) -> Result<char, Error> {
        self.unsupported("GetChar")
    }

    pub fn get_chars(&self, _ordinal: usize, _field_offset: usize, _buffer: &mut [char]) -> Result<usize, Error> {
        self.unsupported("GetChars")
    }

    fn unsupported<T>(&self, accessor: &'static str) -> Result<T, Error> {
        self.check_active()?;
        Err(Error::NotSupported(accessor))
    }

    pub fn get_schema_table(&mut self) -> Result<SchemaTable, Error> {
        self.check_active()?;
        match self.behavior {
            CommandBehavior::Default => Ok(SchemaTable::from_fields(None, &self.schema)),
            CommandBehavior::SchemaOnly => {
                let cancel = CancellationToken::new();
                runtime::block_on(self.get_schema_table_async(&cancel))?
            }
        }
    }

    /// Describes the current result set. In schema-only mode the current table is fetched again.
    pub async fn get_schema_table_async(&mut self, cancel: &CancellationToken) -> Result<SchemaTable, Error> {
        self.check_active()?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.behavior == CommandBehavior::Default {
            return Ok(SchemaTable::from_fields(None, &self.schema));
        }
        let Some(table_id) = self.current_table().map(str::to_string) else {
            return Ok(SchemaTable::default());
        };
        self.schema = self.describe(&table_id, cancel).await?;
        Ok(SchemaTable::from_fields(Some(table_id), &self.schema))
    }

    pub fn close(&mut self) {
        self.dispose()
    }

    /// Releases the buffered rows. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.state == ReaderState::Closed {
            return;
        }
        self.state = ReaderState::Closed;
        self.request = None;
        self.schema = vec![];
        self.rows = vec![];
        self.tables = vec![];
        self.current = None;
    }
}
