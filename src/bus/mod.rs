//! 传输管理层
//!
//! 对外入口是 [`CanBus`]：连接端点（SocketCAN 或 Loopback）、维护
//! 分发表、运行唯一的接收线程、提供有界的协作式关闭。

pub mod error;
pub mod manager;
pub mod pipeline;

pub use error::BusError;
pub use manager::{BusMode, CanBus};
pub use pipeline::{BusConfig, FrameHandler};
