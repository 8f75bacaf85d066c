//! Connector contract (`spec.md` §1/§6): the black-box interface a
//! concrete data-source or sink integration would implement. This crate
//! defines the contract only; no concrete connector ships here.

use async_trait::async_trait;

/// Lifecycle hooks for an external system integration used by an
/// [`crate::executor::Executor`] (a database, an API, a queue). Out of
/// scope for this crate beyond the trait itself.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Acquire whatever resources the connector needs (connections,
    /// auth tokens) before first use.
    async fn initialize(&mut self) -> anyhow::Result<()>;

    /// Cheap reachability/auth check, independent of `initialize`.
    async fn test_connection(&self) -> anyhow::Result<bool>;

    /// Release resources acquired in `initialize`.
    async fn cleanup(&mut self) -> anyhow::Result<()>;
}
