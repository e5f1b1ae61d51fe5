// ABOUTME: Bridge lifecycle management
// ABOUTME: Instance ownership, port allocation, and health/log access for live bridges

pub mod error;
pub mod lifecycle;
pub mod ports;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{LifecycleError, Result};
pub use lifecycle::{BridgeInstance, BridgeLifecycle};
pub use ports::PortAllocator;
