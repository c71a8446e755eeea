//! Identity RPCs of the node plugin.
//!
//! The plugin runs no controller service, so it advertises no plugin
//! capabilities, and it holds no connection that could go stale, so the
//! readiness check always succeeds. Both are default methods; an implementor
//! only has to name itself.

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::{PluginCapability, PluginInfo};

/// Plugin metadata and readiness as seen by the container orchestrator.
#[async_trait]
pub trait CsiIdentity: Send + Sync {
    /// Plugin name plus the crate version.
    async fn get_plugin_info(&self) -> Result<PluginInfo, CsiError>;

    /// Readiness check. Mount state is per target path and never makes the
    /// plugin as a whole unready.
    async fn probe(&self) -> Result<bool, CsiError> {
        Ok(true)
    }

    /// Empty: `CONTROLLER_SERVICE` is never advertised.
    async fn get_plugin_capabilities(&self) -> Result<Vec<PluginCapability>, CsiError> {
        Ok(Vec::new())
    }
}
