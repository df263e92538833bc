//! CAN 适配层核心定义
//!
//! 提供统一的 CAN 接口抽象，支持 SocketCAN（Linux 实车总线）和
//! Loopback（进程内虚拟总线，无硬件依赖）两种后端。

use std::time::Duration;
use thiserror::Error;

pub mod loopback;

#[cfg(target_os = "linux")]
pub mod socketcan;

pub use loopback::{FrameInjector, LoopbackAdapter};

#[cfg(target_os = "linux")]
pub use socketcan::SocketCanAdapter;

/// 库内通用的 CAN 帧定义（只针对 CAN 2.0）
///
/// 设计要点：
/// - Copy trait：零成本复制，适合高频场景
/// - 固定 8 字节数据：避免堆分配，未使用部分为 0
/// - 无生命周期：自包含数据结构，简化 API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VescFrame {
    /// CAN ID（标准帧或扩展帧）
    pub id: u32,

    /// 帧数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; 8],

    /// 有效数据长度 (0-8)
    pub len: u8,

    /// 是否为扩展帧（29-bit ID，VESC 状态协议使用扩展帧）
    pub is_extended: bool,
}

impl VescFrame {
    /// 创建标准帧
    pub fn new_standard(id: u16, data: &[u8]) -> Self {
        Self::new(id as u32, data, false)
    }

    /// 创建扩展帧
    pub fn new_extended(id: u32, data: &[u8]) -> Self {
        Self::new(id, data, true)
    }

    /// 通用构造器：超过 8 字节截断，不足 8 字节零填充
    fn new(id: u32, data: &[u8], is_extended: bool) -> Self {
        let mut fixed_data = [0u8; 8];
        let len = data.len().min(8);
        fixed_data[..len].copy_from_slice(&data[..len]);

        Self {
            id,
            data: fixed_data,
            len: len as u8,
            is_extended,
        }
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

/// CAN 适配层统一错误类型
#[derive(Error, Debug)]
pub enum CanError {
    /// IO 底层错误
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 设备相关错误（接口未找到、未启动、配置失败等）
    #[error("Device Error: {0}")]
    Device(#[from] CanDeviceError),

    /// 读取超时（非致命，可以重试）
    #[error("Read timeout")]
    Timeout,

    /// 设备未启动 / 已关闭
    #[error("Device not started")]
    NotStarted,
}

/// 设备/后端错误的结构化分类（不绑定具体后端实现）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanDeviceErrorKind {
    Unknown,
    /// 接口未找到/不存在
    NotFound,
    /// 接口存在但未启动（DOWN 状态）
    NotUp,
    /// 权限不足/被拒绝
    AccessDenied,
    /// 解析到无效帧
    InvalidFrame,
    /// 其他 IO/后端错误
    Backend,
}

/// 结构化设备错误：kind + message（保留人类可读信息，供日志/上层策略判断）
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct CanDeviceError {
    pub kind: CanDeviceErrorKind,
    pub message: String,
}

impl CanDeviceError {
    pub fn new(kind: CanDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 判断是否为致命错误
    ///
    /// 致命错误表示设备已不可用，需要重新连接；非致命错误可以重试或忽略。
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            CanDeviceErrorKind::NotFound
                | CanDeviceErrorKind::NotUp
                | CanDeviceErrorKind::AccessDenied
        )
    }
}

impl From<String> for CanDeviceError {
    fn from(message: String) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for CanDeviceError {
    fn from(message: &str) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

/// CAN 适配器 Trait
///
/// 语义：
/// - `send()`: Fire-and-Forget，写入发送缓冲区即返回
/// - `receive()`: 阻塞直到收到有效数据帧或超时
///
/// 超时必须有界（`set_receive_timeout`），接收循环依赖它及时观察退出标志。
pub trait CanAdapter {
    /// 发送一帧
    ///
    /// # 错误处理
    /// - 设备未启动 → `CanError::NotStarted`
    /// - 写入失败 → `CanError::Io` 或 `CanError::Device`
    fn send(&mut self, frame: VescFrame) -> Result<(), CanError>;

    /// 接收一帧
    ///
    /// # 错误处理
    /// - 超时 → `CanError::Timeout`（可重试，不是故障）
    /// - 设备未启动 → `CanError::NotStarted`
    fn receive(&mut self) -> Result<VescFrame, CanError>;

    /// 设置后续 `receive()` 调用的超时时间
    ///
    /// # 默认实现
    /// 默认实现为空操作（no-op），适配器可以使用初始化时设置的超时。
    fn set_receive_timeout(&mut self, _timeout: Duration) {}
}

// Box<dyn CanAdapter> 的委托实现，供连接管理层以类型擦除的方式持有后端
impl CanAdapter for Box<dyn CanAdapter + Send> {
    fn send(&mut self, frame: VescFrame) -> Result<(), CanError> {
        (**self).send(frame)
    }

    fn receive(&mut self) -> Result<VescFrame, CanError> {
        (**self).receive()
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        (**self).set_receive_timeout(timeout)
    }
}
