//! `Key=Value;Key=Value` connection strings.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub const PROJECT_ID: &str = "ProjectId";
pub const DATASET_ID: &str = "DataSetId";
pub const SERVICE_ACCOUNT_EMAIL: &str = "ServiceAccountEmail";
pub const PRIVATE_KEY_FILE_NAME: &str = "PrivateKeyFileName";
pub const JSON_CREDENTIALS_FILE_NAME: &str = "JsonCredentialsFileName";
pub const JSON_CREDENTIALS: &str = "JsonCredentials";
pub const ENDPOINT: &str = "Endpoint";
pub const USE_LEGACY_SQL: &str = "UseLegacySql";

/// Parsed connection string.
///
/// Keys are matched case-insensitively and keep their insertion order. Keys this crate does not
/// know are carried through untouched.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct ConnectionStringBuilder {
    entries: Vec<(String, String)>,
}

impl ConnectionStringBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(s: &str) -> Result<Self, Error> {
        let mut builder = Self::new();
        for segment in s.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| Error::InvalidConnectionString(format!("missing '=' in segment '{segment}'")))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::InvalidConnectionString(format!("empty key in segment '{segment}'")));
            }
            builder.set(key, value.trim());
        }
        Ok(builder)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Replaces the value of an existing key (keeping its position and spelling) or appends it.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k.eq_ignore_ascii_case(key))?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn project_id(&self) -> Option<&str> {
        self.non_empty(PROJECT_ID)
    }

    pub fn dataset_id(&self) -> Option<&str> {
        self.non_empty(DATASET_ID)
    }

    pub fn set_dataset_id(&mut self, dataset_id: &str) {
        self.set(DATASET_ID, dataset_id);
    }

    pub fn service_account_email(&self) -> Option<&str> {
        self.non_empty(SERVICE_ACCOUNT_EMAIL)
    }

    pub fn private_key_file_name(&self) -> Option<&str> {
        self.non_empty(PRIVATE_KEY_FILE_NAME)
    }

    pub fn json_credentials_file_name(&self) -> Option<&str> {
        self.non_empty(JSON_CREDENTIALS_FILE_NAME)
    }

    pub fn json_credentials(&self) -> Option<&str> {
        self.non_empty(JSON_CREDENTIALS)
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.non_empty(ENDPOINT)
    }

    pub fn use_legacy_sql(&self) -> Result<bool, Error> {
        match self.non_empty(USE_LEGACY_SQL) {
            None => Ok(false),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
            Some(v) => Err(Error::InvalidConnectionString(format!(
                "{USE_LEGACY_SQL} must be true or false: {v}"
            ))),
        }
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }
}

impl FromStr for ConnectionStringBuilder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ConnectionStringBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}
