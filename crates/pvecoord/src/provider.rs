//! Provider context shared by every provisioning operation.

use std::sync::Arc;

use crate::authority::IdAuthority;
use crate::client::ApiClient;
use crate::config::{ConfigError, ProviderConfig};
use crate::coordination::Coordination;
use crate::logging;

/// Everything a provisioning operation needs: the API client, the shared
/// coordination state, and the configuration it was built from.
#[derive(Debug)]
pub struct Provider {
    config: ProviderConfig,
    client: Arc<ApiClient>,
    coordination: Arc<Coordination>,
}

impl Provider {
    /// Validate `config`, build the client, install logging, and construct
    /// the single coordination instance.
    ///
    /// The parallelism bound is checked first so a bad bound is reported
    /// before anything else is touched. Logging is installed only once the
    /// rest of the configuration has been accepted.
    pub fn configure(config: ProviderConfig) -> Result<Self, ConfigError> {
        let parallelism = config.parallelism()?;
        config.credentials()?;
        config.log.validate()?;

        let client = Arc::new(ApiClient::from_config(&config)?);
        logging::init_logging(&config.log)?;
        let authority: Arc<dyn IdAuthority> = client.clone();
        let coordination = Coordination::new(parallelism, authority);

        tracing::info!(
            api_url = %client.base_url(),
            max_parallel = parallelism.get(),
            tls_insecure = config.tls_insecure,
            "Provider configured"
        );
        if config.dangerously_ignore_unknown_attributes {
            tracing::warn!("Unknown API attributes will be ignored");
        }

        Ok(Self {
            config,
            client,
            coordination,
        })
    }

    pub fn coordination(&self) -> &Arc<Coordination> {
        &self.coordination
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn ignore_unknown_attributes(&self) -> bool {
        self.config.dangerously_ignore_unknown_attributes
    }

    /// Stop admitting new API operations.
    pub fn shutdown(&self) {
        self.coordination.close();
    }
}
