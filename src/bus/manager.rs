//! CAN 总线连接管理
//!
//! `CanBus` 是传输层的对外入口：持有端点、命令通道与接收线程句柄，
//! 管理注册/发送/启动/断开的完整生命周期。断开连接保证有界等待
//! 接收线程退出，返回后不会再有任何处理器被调用。

use crate::bus::error::BusError;
use crate::bus::pipeline::{BusConfig, BusShared, io_loop};
use crate::can::{CanAdapter, FrameInjector, LoopbackAdapter, VescFrame};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 出站命令通道容量
///
/// 遥测场景的出站流量极低（偶发的控制/请求帧），32 帧的背压窗口
/// 足以覆盖接收循环一个超时周期内的积压。
const CMD_CHANNEL_CAPACITY: usize = 32;

/// 退出等待的轮询间隔
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 总线端点模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusMode {
    /// Linux SocketCAN 实车总线
    SocketCan,
    /// 进程内虚拟总线（无硬件依赖，注入式流量）
    Loopback,
}

/// CAN 总线管理器
///
/// # 生命周期
///
/// ```text
/// connect → register(...) → start_receiving → [帧分发] → disconnect
/// ```
///
/// `Drop` 会自动执行断开流程，接收线程不会泄漏。
///
/// # 示例
///
/// ```
/// use vesc_telemetry::bus::{BusMode, CanBus};
///
/// let mut bus = CanBus::connect("virtual", BusMode::Loopback).unwrap();
/// bus.register(0x02, |frame| {
///     println!("status frame: {:?}", frame.data_slice());
/// });
/// bus.start_receiving().unwrap();
/// bus.disconnect().unwrap();
/// ```
pub struct CanBus {
    /// 端点，`start_receiving` 时移交给接收线程
    adapter: Option<Box<dyn CanAdapter + Send>>,

    /// 出站命令通道（有界，满即 `ChannelFull`）
    cmd_tx: Option<Sender<VescFrame>>,
    cmd_rx: Option<Receiver<VescFrame>>,

    /// 接收线程句柄
    handle: Option<JoinHandle<()>>,

    /// 与接收线程共享的状态（运行标志 + 分发表）
    shared: Arc<BusShared>,

    config: BusConfig,

    /// Loopback 模式下的注入句柄
    injector: Option<FrameInjector>,
}

impl CanBus {
    /// 以默认配置连接总线
    ///
    /// `interface` 在 SocketCAN 模式下是接口名（如 "can0"），
    /// Loopback 模式下仅用于日志。Loopback 连接永远成功。
    pub fn connect(interface: &str, mode: BusMode) -> Result<Self, BusError> {
        Self::connect_with_config(interface, mode, BusConfig::default())
    }

    /// 以自定义配置连接总线
    pub fn connect_with_config(
        interface: &str,
        mode: BusMode,
        config: BusConfig,
    ) -> Result<Self, BusError> {
        let (adapter, injector): (Box<dyn CanAdapter + Send>, Option<FrameInjector>) = match mode {
            BusMode::SocketCan => {
                #[cfg(target_os = "linux")]
                {
                    let adapter = crate::can::SocketCanAdapter::new(interface)?;
                    (Box::new(adapter), None)
                }
                #[cfg(not(target_os = "linux"))]
                {
                    return Err(BusError::Can(crate::can::CanError::Device(
                        crate::can::CanDeviceError::new(
                            crate::can::CanDeviceErrorKind::Backend,
                            "SocketCAN is only available on Linux; use BusMode::Loopback",
                        ),
                    )));
                }
            },
            BusMode::Loopback => {
                let adapter = LoopbackAdapter::new();
                let injector = adapter.injector();
                (Box::new(adapter), Some(injector))
            },
        };

        info!("CAN bus connected: interface={}, mode={:?}", interface, mode);
        Ok(Self::assemble(adapter, injector, config))
    }

    /// 用任意适配器构造总线（测试入口）
    pub fn with_adapter(adapter: impl CanAdapter + Send + 'static) -> Self {
        Self::assemble(Box::new(adapter), None, BusConfig::default())
    }

    fn assemble(
        adapter: Box<dyn CanAdapter + Send>,
        injector: Option<FrameInjector>,
        config: BusConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = bounded(CMD_CHANNEL_CAPACITY);
        Self {
            adapter: Some(adapter),
            cmd_tx: Some(cmd_tx),
            cmd_rx: Some(cmd_rx),
            handle: None,
            shared: Arc::new(BusShared::new()),
            config,
            injector,
        }
    }

    /// 注册帧处理器
    ///
    /// 同一 ID 的后注册者覆盖先注册者。与活动的接收循环并发安全：
    /// 表锁只在变更期间持有。
    pub fn register(&self, id: u32, handler: impl Fn(&VescFrame) + Send + Sync + 'static) {
        self.shared.handlers.lock().insert(id, Arc::new(handler));
        debug!("Registered handler for CAN ID 0x{:X}", id);
    }

    /// 注销帧处理器，返回该 ID 此前是否有注册
    pub fn unregister(&self, id: u32) -> bool {
        let removed = self.shared.handlers.lock().remove(&id).is_some();
        if removed {
            debug!("Unregistered handler for CAN ID 0x{:X}", id);
        }
        removed
    }

    /// 发送一帧（异步入队，实际写入由接收线程执行）
    ///
    /// 载荷超过 8 字节截断、不足零填充。端点写入失败只在循环内记录
    /// 日志；调用方能观察到的失败只有通道层面的两种：
    ///
    /// # 错误
    /// - `BusError::ChannelFull`: 出站通道已满（背压）
    /// - `BusError::ChannelClosed`: 已断开
    pub fn send(&self, id: u32, payload: &[u8]) -> Result<(), BusError> {
        let tx = self.cmd_tx.as_ref().ok_or(BusError::NotConnected)?;
        let frame = VescFrame::new_extended(id, payload);

        tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => BusError::ChannelFull,
            TrySendError::Disconnected(_) => BusError::ChannelClosed,
        })
    }

    /// 启动接收循环（每个连接恰好一个工作线程；重复调用为空操作）
    pub fn start_receiving(&mut self) -> Result<(), BusError> {
        if self.handle.is_some() {
            warn!("Receive loop already running, ignoring duplicate start");
            return Ok(());
        }

        let mut adapter = self.adapter.take().ok_or(BusError::NotConnected)?;
        let cmd_rx = self.cmd_rx.take().ok_or(BusError::NotConnected)?;

        adapter.set_receive_timeout(self.config.receive_timeout());
        self.shared.running.store(true, Ordering::Release);

        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("vesc-can-io".into())
            .spawn(move || io_loop(adapter, cmd_rx, shared))
            .map_err(|e| BusError::IoThread(format!("Failed to spawn IO thread: {}", e)))?;

        self.handle = Some(handle);
        info!("CAN receive loop started");
        Ok(())
    }

    /// 断开连接（幂等）
    ///
    /// 顺序：清运行标志 → 丢弃命令发送端 → 有界等待接收线程退出 →
    /// 清空分发表。返回 `Ok` 后保证不会再有任何处理器被调用。
    ///
    /// # 错误
    /// - `BusError::ShutdownTimeout`: 接收线程未在限定时间内退出
    ///   （可报告的故障，而不是静默泄漏线程）
    pub fn disconnect(&mut self) -> Result<(), BusError> {
        self.shared.running.store(false, Ordering::Release);

        // 丢弃发送端：即使循环阻塞在出站清空阶段也能观察到退出
        self.cmd_tx = None;
        self.cmd_rx = None;

        if let Some(handle) = self.handle.take() {
            let deadline = Instant::now() + self.config.shutdown_timeout();
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    error!(
                        "IO thread did not exit within {:?}",
                        self.config.shutdown_timeout()
                    );
                    // 线程仍在运行，保留句柄以便后续重试断开
                    self.handle = Some(handle);
                    return Err(BusError::ShutdownTimeout);
                }
                thread::sleep(JOIN_POLL_INTERVAL);
            }

            handle
                .join()
                .map_err(|_| BusError::IoThread("IO thread panicked".into()))?;
        }

        // 线程已退出，之后不会再有任何分发
        self.shared.handlers.lock().clear();

        // 未启动过接收循环时，端点在这里随管理器释放
        self.adapter = None;

        info!("CAN bus disconnected");
        Ok(())
    }

    /// 获取 Loopback 模式的帧注入句柄（其他模式返回 `None`）
    pub fn injector(&self) -> Option<FrameInjector> {
        self.injector.clone()
    }

    /// 当前是否有活动的接收循环
    pub fn is_receiving(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for CanBus {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            error!("Error during CAN bus shutdown: {}", e);
        }
    }
}
