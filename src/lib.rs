//! # vesc-telemetry
//!
//! VESC 电机控制器 CAN 遥测中间件：
//!
//! - **传输层** ([`bus`], [`can`])：SocketCAN 实车总线 / Loopback 虚拟
//!   总线之上的统一抽象，后台接收线程 + 按 CAN ID 的分发表，协作式
//!   有界关闭
//! - **状态编解码** ([`protocol`])：五种定点格式状态帧的无状态
//!   解码/编码，零值哨兵语义的合并与派生字段（功率/效率）计算
//! - **状态聚合** ([`telemetry`])：按帧类型缓存最近的部分记录，
//!   每帧到达即重新合并并输出完整快照
//!
//! ## 快速开始
//!
//! ```
//! use vesc_telemetry::bus::{BusMode, CanBus};
//! use vesc_telemetry::telemetry::attach_aggregator;
//!
//! # fn main() -> Result<(), vesc_telemetry::BusError> {
//! // 虚拟总线：无硬件依赖，流量经注入句柄进入接收路径
//! let mut bus = CanBus::connect("virtual", BusMode::Loopback)?;
//!
//! let aggregator = attach_aggregator(&bus, |snapshot| {
//!     println!("power: {:.1} W, rpm: {}", snapshot.power, snapshot.rpm);
//! });
//!
//! bus.start_receiving()?;
//! // ... 流量发生器通过 bus.injector() 注入状态帧 ...
//! bus.disconnect()?;
//! # let _ = aggregator;
//! # Ok(())
//! # }
//! ```
//!
//! 实车模式把 `BusMode::Loopback` 换成 `BusMode::SocketCan` 并传入
//! 接口名（如 `"can0"`），其余代码完全相同。

pub mod bus;
pub mod can;
pub mod protocol;
pub mod telemetry;

pub use bus::{BusConfig, BusError, BusMode, CanBus};
pub use can::{CanAdapter, CanError, FrameInjector, LoopbackAdapter, VescFrame};
pub use protocol::{
    ProtocolError, StatusFrameKind, VescStatus, decode_status, decode_status_frame,
    encode_status_frame, merge_status_frames, try_decode_status_frame,
};
pub use telemetry::{StatusAggregator, attach_aggregator};

#[cfg(target_os = "linux")]
pub use can::SocketCanAdapter;
