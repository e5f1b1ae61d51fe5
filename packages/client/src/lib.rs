// ABOUTME: Host-side client for bridge in-container servers
// ABOUTME: Framed socket and HTTP transports plus the typed BridgeClient stub

pub mod client;
pub mod error;
pub mod transport;

pub use client::{BridgeClient, DirEntry, ExecOutput, FileStat, HealthReport, DEFAULT_EXEC_TIMEOUT};
pub use error::{ClientError, Result};
pub use transport::{
    DefaultTransportFactory, HttpTransport, SocketTransport, Transport, TransportEvent,
    TransportFactory,
};
