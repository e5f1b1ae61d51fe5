// ABOUTME: In-container bridge server library
// ABOUTME: Path jail, log ring buffer, method dispatch, and the socket and HTTP front ends

pub mod dispatch;
pub mod error;
pub mod http;
pub mod logs;
pub mod paths;
pub mod socket;

pub use dispatch::Dispatcher;
pub use error::{Result, ServerError};
pub use logs::LogBuffer;
pub use paths::PathJail;
