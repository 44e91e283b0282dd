//! The container runtime client contract (spec §1 "Runtime client").
//!
//! [`RuntimeClient`] is the only seam between the watchdog's decision logic
//! and the actual container runtime. Every call is request-scoped and
//! cancellation-aware, mirroring the teacher's habit of putting external
//! collaborators behind a narrow trait (`ConfigRepository`,
//! `SupervisorBuilder`) so the core logic can be exercised with a mock.

use super::types::{ContainerInspect, ContainerSummary, RuntimeEvent};
use crate::error::WatchdogError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Lists every container whose canonical name is in `names`, in one
    /// runtime call (spec §4.3). Names absent from the runtime are simply
    /// absent from the result map.
    async fn list(
        &self,
        names: &[String],
        deadline: Duration,
    ) -> Result<Vec<ContainerSummary>, WatchdogError>;

    /// Lists every container on the host, managed or not (spec §6
    /// `list_runtime_containers`).
    async fn list_all(&self, deadline: Duration) -> Result<Vec<ContainerSummary>, WatchdogError>;

    async fn inspect(
        &self,
        name: &str,
        deadline: Duration,
    ) -> Result<ContainerInspect, WatchdogError>;

    async fn restart(&self, name: &str, timeout: Duration) -> Result<(), WatchdogError>;

    async fn stop(&self, name: &str, timeout: Duration) -> Result<(), WatchdogError>;

    async fn start(&self, name: &str, deadline: Duration) -> Result<(), WatchdogError>;

    /// Subscribes to a live, already-filtered event stream. Implementations
    /// apply the runtime-side name filter where possible; callers must not
    /// assume perfect filtering and should re-check the container name.
    fn events(&self, names: &[String]) -> BoxStream<'static, Result<RuntimeEvent, WatchdogError>>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        pub RuntimeClient {}

        #[async_trait]
        impl RuntimeClient for RuntimeClient {
            async fn list(&self, names: &[String], deadline: Duration) -> Result<Vec<ContainerSummary>, WatchdogError>;
            async fn list_all(&self, deadline: Duration) -> Result<Vec<ContainerSummary>, WatchdogError>;
            async fn inspect(&self, name: &str, deadline: Duration) -> Result<ContainerInspect, WatchdogError>;
            async fn restart(&self, name: &str, timeout: Duration) -> Result<(), WatchdogError>;
            async fn stop(&self, name: &str, timeout: Duration) -> Result<(), WatchdogError>;
            async fn start(&self, name: &str, deadline: Duration) -> Result<(), WatchdogError>;
            fn events(&self, names: &[String]) -> BoxStream<'static, Result<RuntimeEvent, WatchdogError>>;
        }
    }
}
