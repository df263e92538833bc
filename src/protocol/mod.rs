//! VESC 状态协议编解码层
//!
//! 协议特性：
//! - 固定 8 字节帧，字段全部为小端序（little-endian）
//! - 定点数编码：温度/电流 ×10，占空比 ×1000，电量 ×10000
//! - 无状态编解码：一帧进、一条部分记录出，不依赖历史
//!
//! 字节布局是与流量发生器之间的线缆兼容性契约，`encode_*` 与
//! `decode_*` 必须严格互逆（定点舍入误差以内）。

use thiserror::Error;

pub mod ids;
pub mod status;

pub use ids::{
    ID_STATUS_1, ID_STATUS_2, ID_STATUS_3, ID_STATUS_4, ID_STATUS_5, STATUS_IDS, is_status_id,
};
pub use status::{
    STATUS_FRAME_LEN, StatusFrameKind, VescStatus, decode_status, decode_status_frame,
    encode_status_frame, merge_status_frames, try_decode_status_frame,
};

/// 协议层错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// CAN ID 不属于状态协议
    #[error("CAN ID 0x{0:X} is not a VESC status frame ID")]
    InvalidCanId(u32),

    /// 数据长度不符
    #[error("Invalid data length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

// ============================================================================
// 小端序字节辅助函数
// ============================================================================

/// 从 offset 处读取小端 i16
#[inline]
pub(crate) fn i16_le(data: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([data[offset], data[offset + 1]])
}

/// 从 offset 处读取小端 u16
#[inline]
pub(crate) fn u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

/// 从 offset 处读取小端 i32
#[inline]
pub(crate) fn i32_le(data: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// 从 offset 处读取小端 u32
#[inline]
pub(crate) fn u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// 在 offset 处写入小端 i16
#[inline]
pub(crate) fn put_i16_le(data: &mut [u8], offset: usize, value: i16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

/// 在 offset 处写入小端 u16
#[inline]
pub(crate) fn put_u16_le(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

/// 在 offset 处写入小端 i32
#[inline]
pub(crate) fn put_i32_le(data: &mut [u8], offset: usize, value: i32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// 在 offset 处写入小端 u32
#[inline]
pub(crate) fn put_u32_le(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
