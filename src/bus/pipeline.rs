//! 接收循环与分发表
//!
//! 每个活动连接只有一个接收线程，循环结构：
//! 1. 清空出站命令通道，把待发送帧写入端点（写失败记录日志，不中断循环）
//! 2. 带超时阻塞读一帧
//! 3. 按 CAN ID 查分发表并调用处理器（处理器 panic 被隔离，循环继续）
//!
//! 退出条件：`running` 标志被清除，或命令通道的发送端全部被丢弃。
//! 锁纪律：分发表锁只在查找/变更期间持有，绝不跨越处理器调用，
//! 因此处理器内部可以安全地调用 register/unregister。

use crate::can::{CanAdapter, CanError, VescFrame};
use crossbeam_channel::{Receiver, TryRecvError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, trace};

/// 传输层配置
#[derive(Debug, Clone, Copy)]
pub struct BusConfig {
    /// 端点读超时（毫秒）。决定退出标志的最大观察延迟。
    pub receive_timeout_ms: u64,

    /// 断开连接时等待接收线程退出的上限（毫秒）
    pub shutdown_timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: 100,
            shutdown_timeout_ms: 2000,
        }
    }
}

impl BusConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// 注册的帧处理器
///
/// `Arc` 包装使分发路径可以先克隆、再释放表锁、最后调用，
/// 保证锁永远不跨越用户代码。
pub type FrameHandler = Arc<dyn Fn(&VescFrame) + Send + Sync>;

/// 接收线程与调用方线程之间的共享状态
///
/// 分发表是唯一的跨线程可变状态；`running` 是协作式退出标志。
pub struct BusShared {
    /// 接收循环的运行标志
    pub running: AtomicBool,

    /// 分发表：CAN ID → 处理器
    pub handlers: Mutex<HashMap<u32, FrameHandler>>,
}

impl BusShared {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            handlers: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for BusShared {
    fn default() -> Self {
        Self::new()
    }
}

/// 按 CAN ID 分发一帧
///
/// 未注册的 ID 透明忽略（只留 trace 日志）。处理器 panic 被捕获并
/// 记录为 error，绝不让接收循环死亡。
pub(crate) fn dispatch(shared: &BusShared, frame: &VescFrame) {
    // 先克隆处理器再释放锁，处理器执行期间表可以被并发变更
    let handler = shared.handlers.lock().get(&frame.id).cloned();

    match handler {
        Some(handler) => {
            let result = catch_unwind(AssertUnwindSafe(|| handler(frame)));
            if result.is_err() {
                error!(
                    "Frame handler for ID 0x{:X} panicked, receive loop continues",
                    frame.id
                );
            }
        },
        None => {
            trace!("No handler registered for CAN ID 0x{:X}, ignoring", frame.id);
        },
    }
}

/// 接收循环主体（在专用线程上运行）
pub(crate) fn io_loop(
    mut can: impl CanAdapter,
    cmd_rx: Receiver<VescFrame>,
    shared: Arc<BusShared>,
) {
    debug!("CAN IO loop started");

    'outer: while shared.running.load(Ordering::Acquire) {
        // 1. 清空出站命令通道（总线安静时发送也不能饿死）
        loop {
            match cmd_rx.try_recv() {
                Ok(frame) => {
                    if let Err(e) = can.send(frame) {
                        error!("Failed to send CAN frame ID 0x{:X}: {}", frame.id, e);
                    }
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("Command channel disconnected, exiting IO loop");
                    break 'outer;
                },
            }
        }

        // 2. 带超时阻塞读一帧
        match can.receive() {
            Ok(frame) => dispatch(&shared, &frame),
            // 超时只是心跳：回到循环顶部检查退出标志
            Err(CanError::Timeout) => continue,
            Err(e) => {
                error!("CAN receive error: {}, receive loop continues", e);
            },
        }
    }

    debug!("CAN IO loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    /// 队列式 Mock 适配器：receive 依次弹出预置帧，send 记录到共享列表
    struct MockCanAdapter {
        rx_queue: VecDeque<VescFrame>,
        sent: Arc<Mutex<Vec<VescFrame>>>,
    }

    impl MockCanAdapter {
        fn new(frames: Vec<VescFrame>) -> Self {
            Self {
                rx_queue: frames.into(),
                sent: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl CanAdapter for MockCanAdapter {
        fn send(&mut self, frame: VescFrame) -> Result<(), CanError> {
            self.sent.lock().push(frame);
            Ok(())
        }

        fn receive(&mut self) -> Result<VescFrame, CanError> {
            match self.rx_queue.pop_front() {
                Some(frame) => Ok(frame),
                None => {
                    // 队列空后模拟真实端点的有界超时
                    thread::sleep(Duration::from_millis(1));
                    Err(CanError::Timeout)
                },
            }
        }
    }

    #[test]
    fn test_dispatch_invokes_registered_handler() {
        let shared = BusShared::new();
        let count = Arc::new(AtomicUsize::new(0));

        let count_clone = count.clone();
        shared.handlers.lock().insert(
            0x02,
            Arc::new(move |frame: &VescFrame| {
                assert_eq!(frame.id, 0x02);
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        dispatch(&shared, &VescFrame::new_extended(0x02, &[1, 2, 3]));
        dispatch(&shared, &VescFrame::new_extended(0x02, &[4, 5, 6]));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dispatch_ignores_unregistered_id() {
        let shared = BusShared::new();
        // 不应 panic，也不应有任何副作用
        dispatch(&shared, &VescFrame::new_extended(0x700, &[0; 8]));
    }

    #[test]
    fn test_dispatch_isolates_handler_panic() {
        let shared = BusShared::new();
        let after = Arc::new(AtomicUsize::new(0));

        shared.handlers.lock().insert(
            0x02,
            Arc::new(|_: &VescFrame| panic!("handler bug")),
        );
        let after_clone = after.clone();
        shared.handlers.lock().insert(
            0x03,
            Arc::new(move |_: &VescFrame| {
                after_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        // panic 被隔离，后续分发照常进行
        dispatch(&shared, &VescFrame::new_extended(0x02, &[0; 8]));
        dispatch(&shared, &VescFrame::new_extended(0x03, &[0; 8]));
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_can_mutate_table_without_deadlock() {
        let shared = Arc::new(BusShared::new());

        let shared_clone = shared.clone();
        shared.handlers.lock().insert(
            0x02,
            Arc::new(move |_: &VescFrame| {
                // 处理器内部变更分发表：锁未被分发路径持有，不得死锁
                shared_clone.handlers.lock().remove(&0x02);
            }),
        );

        dispatch(&shared, &VescFrame::new_extended(0x02, &[0; 8]));
        assert!(!shared.handlers.lock().contains_key(&0x02));
    }

    #[test]
    fn test_io_loop_dispatches_queued_frames_in_order() {
        let shared = Arc::new(BusShared::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        for id in [0x02u32, 0x03, 0x06] {
            let seen_clone = seen.clone();
            shared.handlers.lock().insert(
                id,
                Arc::new(move |frame: &VescFrame| {
                    seen_clone.lock().push(frame.id);
                }),
            );
        }

        let adapter = MockCanAdapter::new(vec![
            VescFrame::new_extended(0x02, &[0; 8]),
            VescFrame::new_extended(0x03, &[0; 8]),
            VescFrame::new_extended(0x06, &[0; 8]),
        ]);

        let (tx, rx) = bounded::<VescFrame>(32);
        shared.running.store(true, Ordering::Release);
        let shared_clone = shared.clone();
        let handle = thread::spawn(move || io_loop(adapter, rx, shared_clone));

        // 等三帧全部分发完，再发出退出信号
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while seen.lock().len() < 3 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        shared.running.store(false, Ordering::Release);
        drop(tx);
        handle.join().unwrap();

        assert_eq!(*seen.lock(), vec![0x02, 0x03, 0x06]);
    }

    #[test]
    fn test_io_loop_sends_outbound_frames() {
        let shared = Arc::new(BusShared::new());
        let adapter = MockCanAdapter::new(vec![]);
        let sent = adapter.sent.clone();

        let (tx, rx) = bounded(32);
        tx.send(VescFrame::new_extended(0x100, &[0xAA])).unwrap();
        tx.send(VescFrame::new_extended(0x101, &[0xBB])).unwrap();

        shared.running.store(true, Ordering::Release);
        let handle = thread::spawn(move || io_loop(adapter, rx, shared));

        drop(tx);
        handle.join().unwrap();

        let sent = sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].id, 0x100);
        assert_eq!(sent[1].id, 0x101);
    }

    #[test]
    fn test_io_loop_exits_when_running_cleared() {
        let shared = Arc::new(BusShared::new());
        let adapter = MockCanAdapter::new(vec![]);

        let (_tx, rx) = bounded::<VescFrame>(32);
        shared.running.store(true, Ordering::Release);

        let shared_clone = shared.clone();
        let handle = thread::spawn(move || io_loop(adapter, rx, shared_clone));

        thread::sleep(Duration::from_millis(20));
        shared.running.store(false, Ordering::Release);

        let start = std::time::Instant::now();
        handle.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_bus_config_defaults() {
        let config = BusConfig::default();
        assert_eq!(config.receive_timeout(), Duration::from_millis(100));
        assert_eq!(config.shutdown_timeout(), Duration::from_millis(2000));
    }
}
