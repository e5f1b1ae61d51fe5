// ABOUTME: Wire protocol shared by the host client and the in-container server
// ABOUTME: JSON-RPC envelopes, the MCP initialize handshake, tool results, and newline framing

pub mod content;
pub mod framing;
pub mod jsonrpc;
pub mod mcp;
pub mod methods;

pub use content::{Content, ToolResult};
pub use framing::{encode_line, FrameDecoder, FrameError};
pub use jsonrpc::{Request, Response, RpcError, JSONRPC_VERSION};
pub use mcp::{InitializeRequest, InitializeResult, ServerInfo, PROTOCOL_VERSION, SERVER_NAME};
