//! SQL Server implementation of the database traits, over one tiberius
//! connection.

mod convert;
mod introspect;
mod store;

use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::{Result, SyncError};

/// One connection to a SQL Server database.
pub struct MssqlDatabase {
    label: String,
    client: Client<Compat<TcpStream>>,
}

fn build_config(config: &DatabaseConfig) -> Config {
    let mut tds = Config::new();
    tds.host(&config.host);
    tds.port(config.port);
    tds.database(&config.database);
    tds.authentication(AuthMethod::sql_server(&config.user, config.password()));

    if config.encrypt {
        if config.trust_server_cert {
            tds.trust_cert();
        }
        tds.encryption(EncryptionLevel::Required);
    } else {
        tds.encryption(EncryptionLevel::NotSupported);
    }

    tds
}

impl MssqlDatabase {
    /// Connect to the database described by `config`.
    ///
    /// `side` names the role ("source" or "target") in connection errors.
    pub async fn connect(side: &str, config: &DatabaseConfig) -> Result<Self> {
        let tds = build_config(config);
        let fail = |e: &dyn std::fmt::Display| {
            SyncError::connection(side, format!("{}:{}/{}: {}", config.host, config.port, config.database, e))
        };

        let tcp = TcpStream::connect(tds.get_addr()).await.map_err(|e| fail(&e))?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(tds, tcp.compat_write())
            .await
            .map_err(|e| fail(&e))?;

        info!(
            "Connected to {} database {} at {}:{}",
            side,
            config.display_name(),
            config.host,
            config.port
        );

        Ok(Self {
            label: config.display_name().to_string(),
            client,
        })
    }

    /// Round-trip check; returns the server version string.
    pub async fn health_check(&mut self) -> Result<String> {
        let row = self
            .client
            .simple_query("SELECT @@VERSION")
            .await?
            .into_row()
            .await?;
        let version = match row {
            Some(row) => row.try_get::<&str, _>(0)?.unwrap_or_default().to_string(),
            None => String::new(),
        };
        Ok(version.lines().next().unwrap_or_default().trim().to_string())
    }

    /// Run a statement batch outside `sp_executesql` and drain its results.
    ///
    /// Session settings such as `IDENTITY_INSERT` only persist when issued
    /// this way.
    async fn batch(&mut self, sql: &str) -> Result<()> {
        debug!("{}: {}", self.label, sql);
        self.client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }
}
