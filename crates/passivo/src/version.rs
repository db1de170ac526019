//! Version information for passivo.

/// Passivo version from Cargo.toml
pub const PASSIVO_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version information reported by the health check.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionInfo {
    pub passivo: &'static str,
    /// Deployment label, e.g. the school unit the instance serves.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            passivo: PASSIVO_VERSION,
            deployment: None,
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deployment(mut self, deployment: String) -> Self {
        self.deployment = Some(deployment);
        self
    }
}
