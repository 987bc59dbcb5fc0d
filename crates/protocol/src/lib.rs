//! Grimbox wire contracts: the JSON-RPC 2.0 envelope, per-method
//! parameter/result structs, and WebSocket frames. Shared by the engine
//! and by headless test clients; free of business logic.

pub mod frames;
pub mod methods;
pub mod rpc;

pub use frames::{FramePayload, StateUpdate, WsFrame};
pub use rpc::{RpcError, RpcRequest, RpcResponse, JSONRPC_VERSION};
