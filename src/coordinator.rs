use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::CoordinatorConfig;
use crate::definitions::DefinitionLoader;
use crate::error::Result;
use crate::scheduler::{EntityKind, Registry, SharedRegistry};
use crate::server::{CommandHandler, CoordinationServer};

/// Owns the configuration and the registry and wires them into the server.
pub struct Coordinator {
    config: Arc<CoordinatorConfig>,
    registry: SharedRegistry,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: Registry::new().shared(),
        }
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    /// Load job and then report definitions. A folder that cannot be read
    /// is logged and leaves that kind empty; it can be reloaded later.
    pub async fn load_definitions(&self) {
        let loader = DefinitionLoader::from_config(&self.config);
        for kind in [EntityKind::Job, EntityKind::Report] {
            if let Err(e) = loader.reload(kind, &self.registry).await {
                tracing::warn!(kind = %kind, error = %e, "Could not load definitions");
            }
        }
    }

    /// Bind the server on the configured address.
    pub async fn bind(&self) -> Result<CoordinationServer> {
        let handler = CommandHandler::new(self.registry.clone(), self.config.clone());
        CoordinationServer::bind(self.config.listen_addr, handler).await
    }

    /// Load definitions and serve until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the listening socket cannot be bound.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        self.load_definitions().await;
        let server = self.bind().await?;
        server.run(shutdown).await
    }
}
