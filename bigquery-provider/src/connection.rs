use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::command::Command;
use crate::connection_string::ConnectionStringBuilder;
use crate::error::Error;
use crate::runtime;
use crate::service::{Connector, Session};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ConnectionState {
    #[default]
    Closed,
    Connecting,
    Open,
    Broken,
}

/// A connection to one BigQuery project and default dataset.
///
/// Opening authenticates and confirms connectivity with one lightweight request. Closing is local:
/// BigQuery holds no session for the connection. A connection is meant for one caller at a time.
///
/// ```no_run
/// use gcloud_bigquery_provider::command::CommandBehavior;
/// use gcloud_bigquery_provider::connection::Connection;
///
/// fn run() -> Result<(), gcloud_bigquery_provider::error::Error> {
///     let mut connection = Connection::new("ProjectId=my-project;DataSetId=samples")?;
///     connection.open()?;
///     let command = connection
///         .create_command()?
///         .with_text("SELECT weight_pounds FROM natality LIMIT 10");
///     let mut reader = command.execute_reader(CommandBehavior::Default)?;
///     while reader.read()? {
///         let weight: Option<f32> = reader.get_field_value(0)?;
///         println!("{weight:?}");
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Connection {
    settings: ConnectionStringBuilder,
    state: ConnectionState,
    session: Option<Session>,
    connector: Arc<dyn Connector>,
    disposed: bool,
}

impl Connection {
    /// Connection authenticating through `gcloud-auth`.
    #[cfg(feature = "auth")]
    pub fn new(connection_string: &str) -> Result<Self, Error> {
        Self::with_connector(connection_string, Arc::new(crate::service::DefaultConnector::default()))
    }

    pub fn with_connector(connection_string: &str, connector: Arc<dyn Connector>) -> Result<Self, Error> {
        Ok(Self {
            settings: ConnectionStringBuilder::parse(connection_string)?,
            state: ConnectionState::Closed,
            session: None,
            connector,
            disposed: false,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Default dataset.
    pub fn database(&self) -> Option<&str> {
        self.settings.dataset_id()
    }

    /// Project the connection runs jobs in.
    pub fn data_source(&self) -> Option<&str> {
        match &self.session {
            Some(session) => Some(session.project_id.as_str()),
            None => self.settings.project_id(),
        }
    }

    pub fn settings(&self) -> &ConnectionStringBuilder {
        &self.settings
    }

    pub fn connection_string(&self) -> String {
        self.settings.to_string()
    }

    /// Replaces the connection string. Only allowed while the connection is not open.
    pub fn set_connection_string(&mut self, connection_string: &str) -> Result<(), Error> {
        self.check_disposed()?;
        if matches!(self.state, ConnectionState::Open | ConnectionState::Connecting) {
            return Err(Error::AlreadyOpen);
        }
        self.settings = ConnectionStringBuilder::parse(connection_string)?;
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn open(&mut self) -> Result<(), Error> {
        let cancel = CancellationToken::new();
        runtime::block_on(self.open_async(&cancel))?
    }

    /// Authenticates and probes the service.
    ///
    /// On failure the connection is left `Broken`; a cancelled attempt goes back to `Closed`.
    pub async fn open_async(&mut self, cancel: &CancellationToken) -> Result<(), Error> {
        self.check_disposed()?;
        if self.state == ConnectionState::Open {
            return Err(Error::AlreadyOpen);
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        // settings errors surface before any state change
        self.settings.use_legacy_sql()?;

        self.state = ConnectionState::Connecting;
        tracing::debug!(project_id = ?self.settings.project_id(), dataset_id = ?self.settings.dataset_id(), "opening connection");
        let connector = self.connector.clone();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = connect(connector.as_ref(), &self.settings) => result,
        };
        match result {
            Ok(session) => {
                self.session = Some(session);
                self.state = ConnectionState::Open;
                tracing::debug!("connection opened");
                Ok(())
            }
            Err(Error::Cancelled) => {
                self.state = ConnectionState::Closed;
                Err(Error::Cancelled)
            }
            Err(e) => {
                tracing::warn!("failed to open connection: {e}");
                self.state = ConnectionState::Broken;
                Err(e)
            }
        }
    }

    /// Does nothing unless the connection is open or an abandoned open left it `Connecting`.
    pub fn close(&mut self) -> Result<(), Error> {
        self.check_disposed()?;
        match self.state {
            ConnectionState::Open | ConnectionState::Connecting => {
                self.session = None;
                self.state = ConnectionState::Closed;
                tracing::debug!("connection closed");
            }
            ConnectionState::Closed | ConnectionState::Broken => {}
        }
        Ok(())
    }

    pub fn change_database(&mut self, dataset_id: &str) -> Result<(), Error> {
        let cancel = CancellationToken::new();
        runtime::block_on(self.change_database_async(dataset_id, &cancel))?
    }

    /// Switches the default dataset and reopens the connection with it.
    pub async fn change_database_async(&mut self, dataset_id: &str, cancel: &CancellationToken) -> Result<(), Error> {
        self.check_disposed()?;
        if dataset_id.trim().is_empty() {
            return Err(Error::InvalidArgument("dataset name is empty".to_string()));
        }
        self.close()?;
        self.settings.set_dataset_id(dataset_id.trim());
        self.open_async(cancel).await
    }

    pub fn get_table_names(&self) -> Result<Vec<String>, Error> {
        let cancel = CancellationToken::new();
        runtime::block_on(self.get_table_names_async(&cancel))?
    }

    pub async fn get_table_names_async(&self, cancel: &CancellationToken) -> Result<Vec<String>, Error> {
        self.list_table_ids("TABLE", cancel).await
    }

    pub fn get_view_names(&self) -> Result<Vec<String>, Error> {
        let cancel = CancellationToken::new();
        runtime::block_on(self.get_view_names_async(&cancel))?
    }

    pub async fn get_view_names_async(&self, cancel: &CancellationToken) -> Result<Vec<String>, Error> {
        self.list_table_ids("VIEW", cancel).await
    }

    pub fn get_data_set_names(&self) -> Result<Vec<String>, Error> {
        let cancel = CancellationToken::new();
        runtime::block_on(self.get_data_set_names_async(&cancel))?
    }

    pub async fn get_data_set_names_async(&self, cancel: &CancellationToken) -> Result<Vec<String>, Error> {
        let session = self.session()?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let datasets = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            datasets = session.service.list_datasets(&session.project_id) => datasets?,
        };
        Ok(datasets
            .into_iter()
            .map(|d| d.dataset_reference.dataset_id)
            .collect())
    }

    async fn list_table_ids(&self, table_type: &str, cancel: &CancellationToken) -> Result<Vec<String>, Error> {
        let session = self.session()?;
        let dataset_id = self.required_dataset()?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let tables = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            tables = session.service.list_tables(&session.project_id, dataset_id) => tables?,
        };
        let prefix = format!("{}:{}.", session.project_id, dataset_id);
        Ok(tables
            .into_iter()
            .filter(|t| t.table_type.eq_ignore_ascii_case(table_type))
            .map(|t| match t.id.strip_prefix(prefix.as_str()) {
                Some(name) => name.to_string(),
                None => t.table_reference.table_id,
            })
            .collect())
    }

    /// New command bound to this connection. The connection must be open.
    pub fn create_command(&self) -> Result<Command<'_>, Error> {
        self.session()?;
        let mut command = Command::new();
        command.set_connection(Some(self));
        Ok(command)
    }

    pub fn begin_transaction(&self) -> Result<(), Error> {
        self.check_disposed()?;
        Err(Error::NotSupported("transactions"))
    }

    /// Releases the session. Calling it again is a no-op; every other operation fails afterwards.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.session = None;
        self.state = ConnectionState::Closed;
        self.disposed = true;
    }

    /// Session of an open, undisposed connection.
    pub(crate) fn session(&self) -> Result<&Session, Error> {
        self.check_disposed()?;
        match (&self.session, self.state) {
            (Some(session), ConnectionState::Open) => Ok(session),
            (_, state) => Err(Error::ConnectionNotOpen(state)),
        }
    }

    pub(crate) fn required_dataset(&self) -> Result<&str, Error> {
        self.settings.dataset_id().ok_or_else(|| {
            Error::InvalidConnectionString(format!("{} is required", crate::connection_string::DATASET_ID))
        })
    }

    fn check_disposed(&self) -> Result<(), Error> {
        if self.disposed {
            return Err(Error::Disposed("Connection"));
        }
        Ok(())
    }
}

async fn connect(connector: &dyn Connector, settings: &ConnectionStringBuilder) -> Result<Session, Error> {
    let session = connector.connect(settings).await?;
    session.service.list_jobs(&session.project_id).await?;
    Ok(session)
}
