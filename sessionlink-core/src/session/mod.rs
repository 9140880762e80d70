//! Session backends and backend selection.

pub mod in_memory;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

pub use in_memory::InMemorySessionService;
pub use traits::SessionService;

use crate::config::SessionConfig;
use crate::error::{ConfigError, SessionLinkError};
use crate::remote::RemoteSessionClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    InMemory,
    Remote,
}

/// The session backend a process runs against, chosen once at startup.
#[derive(Clone)]
pub struct SessionBackend {
    service: Arc<dyn SessionService>,
    kind: BackendKind,
}

impl SessionBackend {
    /// In-memory wins over a service URL; neither is a configuration error.
    pub fn from_config(config: &SessionConfig) -> Result<Self, SessionLinkError> {
        if config.use_memory {
            return Ok(Self::with_service(
                Arc::new(InMemorySessionService::new()),
                BackendKind::InMemory,
            ));
        }
        match config.service_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => {
                let client = RemoteSessionClient::with_timeout(
                    url,
                    Duration::from_secs(config.timeout_seconds),
                )?;
                Ok(Self::with_service(Arc::new(client), BackendKind::Remote))
            }
            _ => Err(ConfigError::NoSessionBackend.into()),
        }
    }

    pub fn with_service(service: Arc<dyn SessionService>, kind: BackendKind) -> Self {
        Self { service, kind }
    }

    pub fn in_memory() -> Self {
        Self::with_service(Arc::new(InMemorySessionService::new()), BackendKind::InMemory)
    }

    pub fn service(&self) -> &Arc<dyn SessionService> {
        &self.service
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn is_remote(&self) -> bool {
        self.kind == BackendKind::Remote
    }

    pub fn name(&self) -> &str {
        self.service.name()
    }
}
