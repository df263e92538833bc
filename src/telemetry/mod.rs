//! 状态聚合层
//!
//! 每种状态帧各占一个缓存槽位，保存最近一次解码出的部分记录。
//! 每到一帧：整条记录覆盖对应槽位，按固定顺序重新合并全部槽位，
//! 输出一条快照。不做平滑、滤波或限频。

use crate::bus::CanBus;
use crate::protocol::{
    STATUS_IDS, StatusFrameKind, VescStatus, decode_status_frame, merge_status_frames,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// 状态聚合器
///
/// 单消费者结构：五个注册处理器在同一接收线程上被依次调用，
/// 因此内部不含锁；跨处理器共享由 [`attach_aggregator`] 的
/// `Mutex` 包装完成。
#[derive(Debug, Default)]
pub struct StatusAggregator {
    /// 按 [`StatusFrameKind::index`] 索引的槽位缓存
    cache: [Option<VescStatus>; 5],
}

impl StatusAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一帧状态数据，返回合并后的快照
    ///
    /// 非状态 ID 返回 `None`（不解码、不报错）。短载荷解码为全默认
    /// 记录并照常覆盖槽位：畸形帧的语义是"该帧类型的数据归零"。
    pub fn handle_frame(&mut self, id: u32, data: &[u8]) -> Option<VescStatus> {
        let kind = StatusFrameKind::try_from(id).ok()?;

        // 整条记录覆盖：同类型帧之间不做字段级合并
        self.cache[kind.index()] = Some(decode_status_frame(kind, data));

        let snapshot = merge_status_frames(&self.cache);
        trace!(
            "Status frame 0x{:X} merged: power={:.1}W, rpm={}",
            id, snapshot.power, snapshot.rpm
        );
        Some(snapshot)
    }

    /// 不接收新帧，直接重新合并当前缓存（幂等）
    pub fn snapshot(&self) -> VescStatus {
        merge_status_frames(&self.cache)
    }

    /// 清空全部槽位
    pub fn clear(&mut self) {
        self.cache = Default::default();
    }
}

/// 把聚合器接到总线上
///
/// 为五个保留 ID 各注册一个处理器，所有处理器共享同一个聚合器；
/// 每收到一帧状态数据，`sink` 就会收到一条合并后的快照。
/// 返回共享的聚合器句柄，调用方可随时取 `snapshot()`。
pub fn attach_aggregator(
    bus: &CanBus,
    sink: impl Fn(VescStatus) + Send + Sync + 'static,
) -> Arc<Mutex<StatusAggregator>> {
    let aggregator = Arc::new(Mutex::new(StatusAggregator::new()));
    let sink = Arc::new(sink);

    for id in STATUS_IDS {
        let aggregator = aggregator.clone();
        let sink = sink.clone();
        bus.register(id, move |frame| {
            let snapshot = aggregator.lock().handle_frame(frame.id, frame.data_slice());
            if let Some(snapshot) = snapshot {
                sink(snapshot);
            }
        });
    }

    aggregator
}
