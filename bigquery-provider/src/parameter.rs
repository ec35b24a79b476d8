use std::fmt::Write;

use time::format_description::well_known::Rfc3339;

use crate::error::Error;
use crate::types::{BigQueryDbType, DbType, Value};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

/// Row version a parameter reads its value from when driven by a data adapter.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum DataRowVersion {
    Original,
    #[default]
    Current,
    Proposed,
    Default,
}

/// Named placeholder whose value is rendered into the command text as a SQL literal.
///
/// The provider type and the generic [`DbType`] are always kept consistent: setting one recomputes
/// the other, last write wins. When neither was set explicitly, both are inferred from the value.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Parameter {
    name: String,
    explicit_type: Option<(BigQueryDbType, DbType)>,
    value: Option<Value>,
    is_nullable: bool,
    direction: ParameterDirection,
    size: i32,
    source_column: String,
    source_version: DataRowVersion,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_value(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn with_type(name: impl Into<String>, db_type: BigQueryDbType) -> Self {
        let mut p = Self::new(name);
        p.set_bigquery_db_type(db_type);
        p
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Name without the leading `@`.
    pub fn bare_name(&self) -> &str {
        bare_name(&self.name)
    }

    /// Explicit type, else the type inferred from the value, else [`BigQueryDbType::Unknown`].
    pub fn bigquery_db_type(&self) -> BigQueryDbType {
        match (&self.explicit_type, &self.value) {
            (Some((t, _)), _) => *t,
            (None, Some(v)) => v.bigquery_db_type(),
            (None, None) => BigQueryDbType::Unknown,
        }
    }

    pub fn set_bigquery_db_type(&mut self, db_type: BigQueryDbType) {
        self.explicit_type = Some((db_type, db_type.to_db_type()));
    }

    /// Explicit type, else the type inferred from the value, else [`DbType::Object`].
    pub fn db_type(&self) -> DbType {
        match (&self.explicit_type, &self.value) {
            (Some((_, t)), _) => *t,
            (None, Some(v)) => v.db_type(),
            (None, None) => DbType::Object,
        }
    }

    pub fn set_db_type(&mut self, db_type: DbType) {
        self.explicit_type = Some((db_type.to_bigquery_db_type(), db_type));
    }

    /// Forgets the explicit type so it is inferred from the value again.
    pub fn reset_db_type(&mut self) {
        self.explicit_type = None;
    }

    /// The assigned value, or the zero value of the declared type when none was assigned.
    pub fn value(&self) -> Option<Value> {
        match (&self.value, &self.explicit_type) {
            (Some(v), _) => Some(v.clone()),
            (None, Some((_, t))) => t.default_value(),
            (None, None) => None,
        }
    }

    pub fn set_value(&mut self, value: impl Into<Value>) {
        self.value = Some(value.into());
    }

    pub fn clear_value(&mut self) {
        self.value = None;
    }

    pub fn is_nullable(&self) -> bool {
        self.is_nullable
    }

    pub fn set_nullable(&mut self, nullable: bool) {
        self.is_nullable = nullable;
    }

    pub fn direction(&self) -> ParameterDirection {
        self.direction
    }

    /// BigQuery has no output parameters: anything but [`ParameterDirection::Input`] is rejected.
    pub fn set_direction(&mut self, direction: ParameterDirection) -> Result<(), Error> {
        if direction != ParameterDirection::Input {
            return Err(Error::InvalidArgument(format!(
                "parameter direction {direction:?} is not valid, only Input is allowed"
            )));
        }
        self.direction = direction;
        Ok(())
    }

    pub fn size(&self) -> i32 {
        self.size
    }

    pub fn set_size(&mut self, size: i32) {
        self.size = size;
    }

    pub fn source_column(&self) -> &str {
        &self.source_column
    }

    pub fn set_source_column(&mut self, column: impl Into<String>) {
        self.source_column = column.into();
    }

    pub fn source_version(&self) -> DataRowVersion {
        self.source_version
    }

    pub fn set_source_version(&mut self, version: DataRowVersion) {
        self.source_version = version;
    }

    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |reason: &str| Error::InvalidParameter {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.bare_name().is_empty() {
            return Err(invalid("name is empty"));
        }
        if !is_identifier(self.bare_name()) {
            return Err(invalid("name must be letters, digits or underscores"));
        }
        let value = self.value().ok_or_else(|| invalid("value is not set"))?;
        if self.bigquery_db_type() == BigQueryDbType::Unknown {
            return Err(invalid("type has no BigQuery mapping"));
        }
        let host_type = self
            .db_type()
            .host_type()
            .ok_or_else(|| invalid("type has no host representation"))?;
        if value.convert(host_type).is_none() {
            return Err(invalid(&format!("value cannot be converted to {}", host_type.name())));
        }
        Ok(())
    }

    /// Renders the value as an inert GoogleSQL literal of the declared type.
    pub(crate) fn to_sql_literal(&self) -> String {
        let value = match self.value() {
            Some(v) => v,
            None => return "NULL".to_string(),
        };
        let value = match self.db_type().host_type() {
            Some(host_type) => value.convert(host_type).unwrap_or(value),
            None => value,
        };
        match value {
            Value::String(v) => quote_string(&v),
            Value::Float32(v) if v.is_nan() => "CAST('nan' AS FLOAT64)".to_string(),
            Value::Float32(v) if v.is_infinite() => {
                let sign = if v > 0.0 { "" } else { "-" };
                format!("CAST('{sign}inf' AS FLOAT64)")
            }
            Value::Float32(v) => v.to_string(),
            Value::Bool(v) => v.to_string(),
            Value::Int16(v) => v.to_string(),
            Value::Int32(v) => v.to_string(),
            Value::Int64(v) => v.to_string(),
            Value::UInt16(v) => v.to_string(),
            Value::UInt32(v) => v.to_string(),
            Value::UInt64(v) => v.to_string(),
            Value::Timestamp(v) => match v.format(&Rfc3339) {
                Ok(text) => format!("TIMESTAMP {}", quote_string(&text)),
                Err(_) => "NULL".to_string(),
            },
            Value::Object(serde_json::Value::Null) => "NULL".to_string(),
            Value::Object(v) => quote_string(&v.to_string()),
        }
    }
}

pub(crate) fn bare_name(name: &str) -> &str {
    name.strip_prefix('@').unwrap_or(name)
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// Single-quoted literal with backslash doubled and quotes and control characters backslash-escaped.
pub(crate) fn quote_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(quoted, "\\u{:04x}", c as u32);
            }
            c => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}
