//! Mapping between BigQuery wire types, the provider's own type enum, the generic relational
//! [`DbType`] and host values.
//!
//! Every function here is total: inputs without a mapping come back as [`BigQueryDbType::Unknown`],
//! [`DbType::Object`] or `None`.

use std::fmt;

use time::macros::datetime;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Default value for date-time parameters and columns: `0001-01-01T00:00:00Z`.
pub const MIN_TIMESTAMP: OffsetDateTime = datetime!(0001-01-01 0:00 UTC);

/// Provider-neutral type set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum BigQueryDbType {
    String,
    Integer,
    Float,
    Boolean,
    Record,
    Timestamp,
    #[default]
    Unknown,
}

impl BigQueryDbType {
    /// Resolves a schema type tag. Legacy names and their GoogleSQL aliases are accepted.
    pub fn from_wire_type(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "STRING" => BigQueryDbType::String,
            "INTEGER" | "INT64" => BigQueryDbType::Integer,
            "FLOAT" | "FLOAT64" => BigQueryDbType::Float,
            "BOOLEAN" | "BOOL" => BigQueryDbType::Boolean,
            "TIMESTAMP" => BigQueryDbType::Timestamp,
            "RECORD" | "STRUCT" => BigQueryDbType::Record,
            _ => BigQueryDbType::Unknown,
        }
    }

    pub fn wire_type(&self) -> Option<&'static str> {
        match self {
            BigQueryDbType::String => Some("STRING"),
            BigQueryDbType::Integer => Some("INTEGER"),
            BigQueryDbType::Float => Some("FLOAT"),
            BigQueryDbType::Boolean => Some("BOOLEAN"),
            BigQueryDbType::Timestamp => Some("TIMESTAMP"),
            BigQueryDbType::Record => Some("RECORD"),
            BigQueryDbType::Unknown => None,
        }
    }

    pub fn to_db_type(self) -> DbType {
        match self {
            BigQueryDbType::String => DbType::String,
            BigQueryDbType::Integer => DbType::Int64,
            BigQueryDbType::Float => DbType::Single,
            BigQueryDbType::Boolean => DbType::Boolean,
            BigQueryDbType::Timestamp => DbType::DateTime,
            BigQueryDbType::Record | BigQueryDbType::Unknown => DbType::Object,
        }
    }

    pub fn host_type(self) -> Option<HostType> {
        match self {
            BigQueryDbType::Unknown => None,
            other => other.to_db_type().host_type(),
        }
    }
}

impl fmt::Display for BigQueryDbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_type().unwrap_or("UNKNOWN"))
    }
}

/// Generic relational type enumeration.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DbType {
    AnsiString,
    AnsiStringFixedLength,
    Binary,
    Boolean,
    Byte,
    Currency,
    Date,
    DateTime,
    DateTime2,
    DateTimeOffset,
    Decimal,
    Double,
    Guid,
    Int16,
    Int32,
    Int64,
    Object,
    SByte,
    Single,
    String,
    StringFixedLength,
    Time,
    UInt16,
    UInt32,
    UInt64,
    VarNumeric,
    Xml,
}

impl DbType {
    pub fn to_bigquery_db_type(self) -> BigQueryDbType {
        match self {
            DbType::String => BigQueryDbType::String,
            DbType::Int64 => BigQueryDbType::Integer,
            DbType::Single => BigQueryDbType::Float,
            DbType::Boolean => BigQueryDbType::Boolean,
            DbType::DateTime => BigQueryDbType::Timestamp,
            DbType::Object => BigQueryDbType::Record,
            _ => BigQueryDbType::Unknown,
        }
    }

    pub fn host_type(self) -> Option<HostType> {
        match self {
            DbType::String => Some(HostType::String),
            DbType::Int64 => Some(HostType::Int64),
            DbType::Single => Some(HostType::Float32),
            DbType::Boolean => Some(HostType::Bool),
            DbType::DateTime => Some(HostType::Timestamp),
            DbType::Object => Some(HostType::Object),
            _ => None,
        }
    }

    /// Zero value of the type. Only [`DbType::Object`] and unmapped types have none.
    pub fn default_value(self) -> Option<Value> {
        match self.host_type()? {
            HostType::String => Some(Value::String(String::new())),
            HostType::Int64 => Some(Value::Int64(0)),
            HostType::Float32 => Some(Value::Float32(0.0)),
            HostType::Bool => Some(Value::Bool(false)),
            HostType::Timestamp => Some(Value::Timestamp(MIN_TIMESTAMP)),
            HostType::Object => None,
        }
    }
}

/// Host representation selected for a [`DbType`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum HostType {
    String,
    Int64,
    Float32,
    Bool,
    Timestamp,
    Object,
}

impl HostType {
    pub fn name(&self) -> &'static str {
        match self {
            HostType::String => "String",
            HostType::Int64 => "i64",
            HostType::Float32 => "f32",
            HostType::Bool => "bool",
            HostType::Timestamp => "OffsetDateTime",
            HostType::Object => "Object",
        }
    }
}

/// Host value carried by a parameter.
#[derive(Clone, PartialEq, Debug)]
pub enum Value {
    String(String),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Bool(bool),
    Timestamp(OffsetDateTime),
    Object(serde_json::Value),
}

impl Value {
    /// Every integer width normalizes to `Int64`; the original width is not kept.
    pub fn db_type(&self) -> DbType {
        match self {
            Value::String(_) => DbType::String,
            Value::Int16(_)
            | Value::Int32(_)
            | Value::Int64(_)
            | Value::UInt16(_)
            | Value::UInt32(_)
            | Value::UInt64(_) => DbType::Int64,
            Value::Float32(_) => DbType::Single,
            Value::Bool(_) => DbType::Boolean,
            Value::Timestamp(_) => DbType::DateTime,
            Value::Object(_) => DbType::Object,
        }
    }

    pub fn bigquery_db_type(&self) -> BigQueryDbType {
        self.db_type().to_bigquery_db_type()
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            Value::UInt16(v) => Some(*v as i64),
            Value::UInt32(v) => Some(*v as i64),
            Value::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Converts to the representation of `target`, or `None` when the value does not fit.
    pub fn convert(&self, target: HostType) -> Option<Value> {
        match target {
            HostType::Object => Some(self.clone()),
            HostType::String => match self {
                Value::String(v) => Some(Value::String(v.clone())),
                Value::Float32(v) => Some(Value::String(v.to_string())),
                Value::Bool(v) => Some(Value::String(v.to_string())),
                Value::Timestamp(v) => v.format(&Rfc3339).ok().map(Value::String),
                Value::Object(v) => Some(Value::String(v.to_string())),
                other => other.as_i64().map(|v| Value::String(v.to_string())),
            },
            HostType::Int64 => match self {
                Value::String(v) => v.trim().parse::<i64>().ok().map(Value::Int64),
                Value::Float32(v) if v.fract() == 0.0 && v.is_finite() => Some(Value::Int64(*v as i64)),
                other => other.as_i64().map(Value::Int64),
            },
            HostType::Float32 => match self {
                Value::String(v) => v.trim().parse::<f32>().ok().map(Value::Float32),
                Value::Float32(v) => Some(Value::Float32(*v)),
                other => other.as_i64().map(|v| Value::Float32(v as f32)),
            },
            HostType::Bool => match self {
                Value::Bool(v) => Some(Value::Bool(*v)),
                Value::String(v) => match v.trim().to_ascii_lowercase().as_str() {
                    "true" => Some(Value::Bool(true)),
                    "false" => Some(Value::Bool(false)),
                    _ => None,
                },
                other => other.as_i64().map(|v| Value::Bool(v != 0)),
            },
            HostType::Timestamp => match self {
                Value::Timestamp(v) => Some(Value::Timestamp(*v)),
                Value::String(v) => OffsetDateTime::parse(v.trim(), &Rfc3339).ok().map(Value::Timestamp),
                _ => None,
            },
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

macro_rules! impl_from_for_value {
    ($($t:ty => $variant:ident),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

impl_from_for_value!(
    String => String,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    bool => Bool,
    OffsetDateTime => Timestamp,
    serde_json::Value => Object
);

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use crate::types::{BigQueryDbType, DbType, HostType, Value, MIN_TIMESTAMP};

    const MAPPED_DB_TYPES: [DbType; 6] = [
        DbType::String,
        DbType::Int64,
        DbType::Single,
        DbType::Boolean,
        DbType::DateTime,
        DbType::Object,
    ];

    const MAPPED_BQ_TYPES: [BigQueryDbType; 6] = [
        BigQueryDbType::String,
        BigQueryDbType::Integer,
        BigQueryDbType::Float,
        BigQueryDbType::Boolean,
        BigQueryDbType::Timestamp,
        BigQueryDbType::Record,
    ];

    #[test]
    fn test_round_trip() {
        for t in MAPPED_DB_TYPES {
            assert_eq!(t.to_bigquery_db_type().to_db_type(), t, "{t:?}");
        }
        for t in MAPPED_BQ_TYPES {
            assert_eq!(t.to_db_type().to_bigquery_db_type(), t, "{t:?}");
            assert_eq!(BigQueryDbType::from_wire_type(t.wire_type().unwrap()), t);
        }
    }

    #[test]
    fn test_unmapped() {
        assert_eq!(BigQueryDbType::from_wire_type("GEOGRAPHY"), BigQueryDbType::Unknown);
        assert_eq!(BigQueryDbType::from_wire_type(""), BigQueryDbType::Unknown);
        assert_eq!(BigQueryDbType::Unknown.to_db_type(), DbType::Object);
        assert_eq!(BigQueryDbType::Unknown.host_type(), None);
        assert_eq!(BigQueryDbType::Unknown.wire_type(), None);
        for t in [DbType::Double, DbType::Guid, DbType::Decimal, DbType::Int32, DbType::Byte] {
            assert_eq!(t.to_bigquery_db_type(), BigQueryDbType::Unknown);
            assert_eq!(t.host_type(), None);
            assert_eq!(t.default_value(), None);
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!(BigQueryDbType::from_wire_type("INT64"), BigQueryDbType::Integer);
        assert_eq!(BigQueryDbType::from_wire_type("float64"), BigQueryDbType::Float);
        assert_eq!(BigQueryDbType::from_wire_type("BOOL"), BigQueryDbType::Boolean);
        assert_eq!(BigQueryDbType::from_wire_type("STRUCT"), BigQueryDbType::Record);
    }

    #[test]
    fn test_default_values() {
        assert_eq!(DbType::String.default_value(), Some(Value::String(String::new())));
        assert_eq!(DbType::Int64.default_value(), Some(Value::Int64(0)));
        assert_eq!(DbType::Single.default_value(), Some(Value::Float32(0.0)));
        assert_eq!(DbType::Boolean.default_value(), Some(Value::Bool(false)));
        assert_eq!(DbType::DateTime.default_value(), Some(Value::Timestamp(MIN_TIMESTAMP)));
        assert_eq!(DbType::Object.default_value(), None);
    }

    #[test]
    fn test_integer_widths_normalize() {
        for v in [
            Value::from(1i16),
            Value::from(1i32),
            Value::from(1i64),
            Value::from(1u16),
            Value::from(1u32),
            Value::from(1u64),
        ] {
            assert_eq!(v.db_type(), DbType::Int64);
            assert_eq!(v.bigquery_db_type(), BigQueryDbType::Integer);
        }
        assert_eq!(Value::from(1.5f32).db_type(), DbType::Single);
        assert_eq!(Value::from("a").bigquery_db_type(), BigQueryDbType::String);
    }

    #[test]
    fn test_convert() {
        assert_eq!(Value::from("42").convert(HostType::Int64), Some(Value::Int64(42)));
        assert_eq!(Value::from("4x").convert(HostType::Int64), None);
        assert_eq!(Value::from(u64::MAX).convert(HostType::Int64), None);
        assert_eq!(Value::from(3i32).convert(HostType::Float32), Some(Value::Float32(3.0)));
        assert_eq!(Value::from("TRUE").convert(HostType::Bool), Some(Value::Bool(true)));
        assert_eq!(Value::from(true).convert(HostType::Timestamp), None);
        assert_eq!(
            Value::from("2016-03-12T10:00:00Z").convert(HostType::Timestamp),
            Some(Value::Timestamp(datetime!(2016-03-12 10:00 UTC)))
        );
        assert_eq!(Value::from(7i64).convert(HostType::String), Some(Value::String("7".to_string())));
    }
}
