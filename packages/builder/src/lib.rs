// ABOUTME: Container builder for bridges
// ABOUTME: Build plan rendering, Docker pipeline, readiness probing, and the launcher seam

pub mod docker;
pub mod error;
pub mod events;
pub mod launcher;
pub mod plan;
pub mod readiness;

pub use docker::ContainerBuilder;
pub use error::{BuildError, Result};
pub use events::{BuildEvent, EventSink, LogLevel};
pub use launcher::{BridgeLauncher, BuildRequest, DockerLauncher, LaunchHandle};
pub use plan::{BuildPlan, BuildStep};
