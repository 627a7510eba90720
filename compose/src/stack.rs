//! Service set of the FIFA Rivalry Tracker stack.
//!
//! The stack mirrors what the compose manifests declare: a backend API, a
//! dashboard frontend that talks to the backend through `API_URL`, and the
//! MongoDB instance both depend on. Deploys use it to find which published
//! ports to probe and which internal URL the frontend should be given.

use crate::{ComposeError, ComposeResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Role a service plays in the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// HTTP API container
    Backend,
    /// Dashboard container
    Frontend,
    /// Document database container
    Database,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceKind::Backend => write!(f, "backend"),
            ServiceKind::Frontend => write!(f, "frontend"),
            ServiceKind::Database => write!(f, "database"),
        }
    }
}

/// One service as declared in the compose manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackService {
    /// Compose service name, also its hostname on the compose network
    pub name: String,
    pub kind: ServiceKind,
    /// Port the process listens on inside the container
    pub container_port: u16,
    /// Port published on the host
    pub published_port: u16,
    /// HTTP path polled after a deploy; `None` means the service is not probed
    #[serde(default)]
    pub health_path: Option<String>,
}

impl StackService {
    pub fn new(
        name: impl Into<String>,
        kind: ServiceKind,
        container_port: u16,
        published_port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            container_port,
            published_port,
            health_path: None,
        }
    }

    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = Some(path.into());
        self
    }

    /// URL of this service as seen from the host
    pub fn published_url(&self, host: &str) -> String {
        let path = self.health_path.as_deref().unwrap_or("/");
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        format!("http://{}:{}{}", host, self.published_port, path)
    }

    /// URL of this service as seen from other containers on the compose network
    pub fn internal_url(&self) -> String {
        format!("http://{}:{}", self.name, self.container_port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    pub services: Vec<StackService>,
}

impl Default for Stack {
    fn default() -> Self {
        Self::rivalry_tracker()
    }
}

impl Stack {
    /// Services from the production compose manifest
    pub fn rivalry_tracker() -> Self {
        Self {
            services: vec![
                StackService::new("backend", ServiceKind::Backend, 8000, 8000)
                    .with_health_path("/"),
                StackService::new("frontend", ServiceKind::Frontend, 8501, 8501),
                StackService::new("mongodb", ServiceKind::Database, 27017, 27018),
            ],
        }
    }

    pub fn first_of_kind(&self, kind: ServiceKind) -> Option<&StackService> {
        self.services.iter().find(|s| s.kind == kind)
    }

    /// Services that declare a health path, in manifest order
    pub fn probed_services(&self) -> impl Iterator<Item = &StackService> {
        self.services.iter().filter(|s| s.health_path.is_some())
    }

    /// Base URL the frontend uses to reach the backend (`API_URL`)
    pub fn api_url(&self) -> Option<String> {
        self.first_of_kind(ServiceKind::Backend)
            .map(StackService::internal_url)
    }

    pub fn validate(&self) -> ComposeResult<()> {
        if self.services.is_empty() {
            return Err(ComposeError::InvalidConfig(
                "stack must declare at least one service".to_string(),
            ));
        }

        let mut names = HashSet::new();
        let mut ports = HashSet::new();
        for service in &self.services {
            if service.name.is_empty() {
                return Err(ComposeError::InvalidConfig(
                    "service name cannot be empty".to_string(),
                ));
            }
            if service.container_port == 0 || service.published_port == 0 {
                return Err(ComposeError::InvalidConfig(format!(
                    "service '{}' must use non-zero ports",
                    service.name
                )));
            }
            if !names.insert(service.name.as_str()) {
                return Err(ComposeError::InvalidConfig(format!(
                    "duplicate service '{}'",
                    service.name
                )));
            }
            if !ports.insert(service.published_port) {
                return Err(ComposeError::InvalidConfig(format!(
                    "published port {} is used by more than one service",
                    service.published_port
                )));
            }
        }

        if self.first_of_kind(ServiceKind::Backend).is_none() {
            return Err(ComposeError::InvalidConfig(
                "stack must include a backend service".to_string(),
            ));
        }

        Ok(())
    }
}
