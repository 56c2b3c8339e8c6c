//! WebSocket 实时通道
//!
//! - `gateway`: 握手认证与连接生命周期
//! - `router`: 入站帧分派
//! - `streaming`: 分块流式输出
//! - `registry`: 活动连接表与统计

pub mod connection;
pub mod gateway;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod streaming;

pub use connection::{ConnectionState, FrameSink};
pub use gateway::{Gateway, Handshake, HandshakeParams, HandshakeRejection};
pub use protocol::{InboundFrame, OutboundFrame, ProtocolError};
pub use registry::{ConnectionRegistry, RegistryError, WsStatsSnapshot};
pub use router::{MessageRouter, RouterError};
pub use streaming::{split_into_chunks, StreamJob, StreamOutcome, StreamState, StreamingSession};
