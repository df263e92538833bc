//! Loopback（虚拟）CAN 适配器
//!
//! 进程内回环后端，不触碰任何主机网络设施，无硬件依赖。
//! 用于 Mac/CI 上开发调试：流量发生器通过 [`FrameInjector`] 把帧注入
//! 接收路径，帧会走与实车模式完全相同的接收循环和分发逻辑。
//!
//! 语义差异（相对 SocketCAN）：
//! - `send()` 是只记录日志的空操作（虚拟总线上没有对端）
//! - `receive()` 阻塞在进程内通道上，超时语义与实车一致

use crate::can::{CanAdapter, CanError, VescFrame};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::time::Duration;
use tracing::trace;

/// 默认读超时：足够短以便及时观察退出标志
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Loopback 适配器
///
/// 内部持有一对 crossbeam 通道端点；适配器自身保留一个发送端克隆，
/// 保证接收端在适配器存活期间永远不会观察到 Disconnected。
pub struct LoopbackAdapter {
    frame_tx: Sender<VescFrame>,
    frame_rx: Receiver<VescFrame>,
    read_timeout: Duration,
}

impl LoopbackAdapter {
    /// 创建虚拟总线端点（永远成功，不触碰主机网络）
    pub fn new() -> Self {
        let (frame_tx, frame_rx) = unbounded();
        Self {
            frame_tx,
            frame_rx,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// 获取注入句柄
    ///
    /// 句柄可克隆、可跨线程使用；注入的帧按到达顺序从 `receive()` 弹出。
    pub fn injector(&self) -> FrameInjector {
        FrameInjector {
            tx: self.frame_tx.clone(),
        }
    }
}

impl Default for LoopbackAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl CanAdapter for LoopbackAdapter {
    /// 虚拟模式下发送是空操作，只记录日志
    fn send(&mut self, frame: VescFrame) -> Result<(), CanError> {
        trace!(
            "Loopback send (no-op): ID=0x{:X}, len={}",
            frame.id, frame.len
        );
        Ok(())
    }

    fn receive(&mut self) -> Result<VescFrame, CanError> {
        match self.frame_rx.recv_timeout(self.read_timeout) {
            Ok(frame) => Ok(frame),
            Err(RecvTimeoutError::Timeout) => Err(CanError::Timeout),
            // 不会发生：适配器自身持有一个发送端
            Err(RecvTimeoutError::Disconnected) => Err(CanError::NotStarted),
        }
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }
}

/// 帧注入句柄（虚拟模式的注入入口）
///
/// 绕过物理端点，把帧直接送入传输层的分发路径。流量发生器持有它
/// 生成符合状态协议字节布局的帧（布局即线缆兼容性契约）。
#[derive(Clone)]
pub struct FrameInjector {
    tx: Sender<VescFrame>,
}

impl FrameInjector {
    /// 注入一帧（按扩展帧处理，与 VESC 状态协议一致）
    ///
    /// # 错误
    /// - `CanError::NotStarted`: 适配器已随连接关闭而销毁
    pub fn inject(&self, id: u32, data: &[u8]) -> Result<(), CanError> {
        self.inject_frame(VescFrame::new_extended(id, data))
    }

    /// 注入一个已构造好的帧
    pub fn inject_frame(&self, frame: VescFrame) -> Result<(), CanError> {
        self.tx.send(frame).map_err(|_| CanError::NotStarted)
    }
}
