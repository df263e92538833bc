//! VESC 状态帧编解码与合并
//!
//! 五种状态帧分别携带快照的一个子集，解码结果是"部分记录"：只有该帧
//! 拥有的字段为非默认值。`merge_status_frames` 按固定顺序把至多五条
//! 部分记录折叠成一条完整快照，并计算派生字段。
//!
//! # 设计要点
//! - 解码绝不失败：短帧返回全默认记录（总线上的畸形帧不应打断遥测流）
//! - 合并采用"零值不覆盖"语义：默认值（0）不会抹掉已积累的非默认值
//! - 派生字段（功率/效率）只在合并时计算，从不缓存

use crate::protocol::{
    ProtocolError, i16_le, i32_le, ids, put_i16_le, put_i32_le, put_u16_le, put_u32_le, u16_le,
    u32_le,
};

/// 状态帧类型（五个保留 ID 的封闭枚举）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusFrameKind {
    /// 0x02：MOSFET 温度 / 电机电流 / 电池电流 / 占空比
    Status1,
    /// 0x03：转速 / 输入电压
    Status2,
    /// 0x04：安时消耗 / 安时回充
    Status3,
    /// 0x05：瓦时消耗 / 瓦时回充
    Status4,
    /// 0x06：里程计
    Status5,
}

impl StatusFrameKind {
    /// 全部类型，按合并顺序排列
    pub const ALL: [StatusFrameKind; 5] = [
        StatusFrameKind::Status1,
        StatusFrameKind::Status2,
        StatusFrameKind::Status3,
        StatusFrameKind::Status4,
        StatusFrameKind::Status5,
    ];

    /// 对应的 CAN ID
    pub const fn id(self) -> u32 {
        match self {
            StatusFrameKind::Status1 => ids::ID_STATUS_1,
            StatusFrameKind::Status2 => ids::ID_STATUS_2,
            StatusFrameKind::Status3 => ids::ID_STATUS_3,
            StatusFrameKind::Status4 => ids::ID_STATUS_4,
            StatusFrameKind::Status5 => ids::ID_STATUS_5,
        }
    }

    /// 缓存槽位索引 (0-4)
    pub const fn index(self) -> usize {
        match self {
            StatusFrameKind::Status1 => 0,
            StatusFrameKind::Status2 => 1,
            StatusFrameKind::Status3 => 2,
            StatusFrameKind::Status4 => 3,
            StatusFrameKind::Status5 => 4,
        }
    }
}

impl TryFrom<u32> for StatusFrameKind {
    type Error = ProtocolError;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        match id {
            ids::ID_STATUS_1 => Ok(StatusFrameKind::Status1),
            ids::ID_STATUS_2 => Ok(StatusFrameKind::Status2),
            ids::ID_STATUS_3 => Ok(StatusFrameKind::Status3),
            ids::ID_STATUS_4 => Ok(StatusFrameKind::Status4),
            ids::ID_STATUS_5 => Ok(StatusFrameKind::Status5),
            other => Err(ProtocolError::InvalidCanId(other)),
        }
    }
}

/// VESC 状态快照
///
/// 既是单帧解码出的"部分记录"，也是合并后的完整快照。`Default` 即
/// 全零"未知"记录。浮点字段均为换算后的物理单位。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VescStatus {
    /// MOSFET 温度 (°C)
    pub temp_mos: f64,
    /// 电机温度 (°C)，当前五种帧均不携带，保留给后续帧类型
    pub temp_motor: f64,
    /// 电机电流 (A)
    pub current_motor: f64,
    /// 电池电流 (A)
    pub current_battery: f64,
    /// 占空比 (0.0 - 1.0)
    pub duty_cycle: f64,
    /// 电气转速 (ERPM)
    pub rpm: i32,
    /// 输入电压 (V)
    pub voltage: f64,
    /// 安时消耗 (Ah)
    pub amp_hours_consumed: f64,
    /// 安时回充 (Ah)
    pub amp_hours_charged: f64,
    /// 瓦时消耗 (Wh)
    pub watt_hours_consumed: f64,
    /// 瓦时回充 (Wh)
    pub watt_hours_charged: f64,
    /// 里程计（电角度计数）
    pub tachometer: i32,
    /// 里程计绝对值
    pub tachometer_abs: u32,
    /// 故障码（0 = 无故障）
    pub fault_code: u8,
    /// 瞬时功率 (W)，派生字段，仅在合并时计算
    pub power: f64,
    /// 效率估计 (%)，派生字段，仅在合并时计算
    pub efficiency: f64,
}

/// 状态帧的固定载荷长度
pub const STATUS_FRAME_LEN: usize = 8;

/// 解码一帧状态数据
///
/// 短于 8 字节的载荷返回全默认记录，绝不报错：畸形帧不应打断遥测流，
/// 由调用方决定是否记录日志。需要显式长度错误时用
/// [`try_decode_status_frame`]。
pub fn decode_status_frame(kind: StatusFrameKind, data: &[u8]) -> VescStatus {
    try_decode_status_frame(kind, data).unwrap_or_default()
}

/// 严格版解码：载荷不足 8 字节上报 `InvalidLength`
///
/// 供总线之外的调用方（文件回放、帧校验工具）使用；接收路径走
/// [`decode_status_frame`] 的宽容语义。
pub fn try_decode_status_frame(
    kind: StatusFrameKind,
    data: &[u8],
) -> Result<VescStatus, ProtocolError> {
    if data.len() < STATUS_FRAME_LEN {
        return Err(ProtocolError::InvalidLength {
            expected: STATUS_FRAME_LEN,
            actual: data.len(),
        });
    }

    let mut status = VescStatus::default();
    match kind {
        StatusFrameKind::Status1 => {
            status.temp_mos = i16_le(data, 0) as f64 * 0.1;
            status.current_motor = i16_le(data, 2) as f64 * 0.1;
            status.current_battery = i16_le(data, 4) as f64 * 0.1;
            status.duty_cycle = u16_le(data, 6) as f64 * 0.001;
        },
        StatusFrameKind::Status2 => {
            status.rpm = i32_le(data, 0);
            status.voltage = u16_le(data, 4) as f64 * 0.1;
        },
        StatusFrameKind::Status3 => {
            status.amp_hours_consumed = i32_le(data, 0) as f64 * 0.0001;
            status.amp_hours_charged = i32_le(data, 4) as f64 * 0.0001;
        },
        StatusFrameKind::Status4 => {
            status.watt_hours_consumed = i32_le(data, 0) as f64 * 0.0001;
            status.watt_hours_charged = i32_le(data, 4) as f64 * 0.0001;
        },
        StatusFrameKind::Status5 => {
            status.tachometer = i32_le(data, 0);
            status.tachometer_abs = u32_le(data, 4);
        },
    }
    Ok(status)
}

/// 按 CAN ID 解码：非状态 ID 返回 `None`（透明忽略，不是错误）
pub fn decode_status(id: u32, data: &[u8]) -> Option<VescStatus> {
    let kind = StatusFrameKind::try_from(id).ok()?;
    Some(decode_status_frame(kind, data))
}

/// 编码一帧状态数据（线缆兼容性契约，流量发生器用它生成帧）
///
/// 与 `decode_status_frame` 严格互逆（定点舍入以内）。
pub fn encode_status_frame(kind: StatusFrameKind, status: &VescStatus) -> [u8; 8] {
    let mut data = [0u8; 8];
    match kind {
        StatusFrameKind::Status1 => {
            put_i16_le(&mut data, 0, (status.temp_mos * 10.0).round() as i16);
            put_i16_le(&mut data, 2, (status.current_motor * 10.0).round() as i16);
            put_i16_le(&mut data, 4, (status.current_battery * 10.0).round() as i16);
            put_u16_le(&mut data, 6, (status.duty_cycle * 1000.0).round() as u16);
        },
        StatusFrameKind::Status2 => {
            put_i32_le(&mut data, 0, status.rpm);
            put_u16_le(&mut data, 4, (status.voltage * 10.0).round() as u16);
        },
        StatusFrameKind::Status3 => {
            put_i32_le(&mut data, 0, (status.amp_hours_consumed * 10000.0).round() as i32);
            put_i32_le(&mut data, 4, (status.amp_hours_charged * 10000.0).round() as i32);
        },
        StatusFrameKind::Status4 => {
            put_i32_le(&mut data, 0, (status.watt_hours_consumed * 10000.0).round() as i32);
            put_i32_le(&mut data, 4, (status.watt_hours_charged * 10000.0).round() as i32);
        },
        StatusFrameKind::Status5 => {
            put_i32_le(&mut data, 0, status.tachometer);
            put_u32_le(&mut data, 4, status.tachometer_abs);
        },
    }
    data
}

/// 合并至多五条部分记录为一条完整快照
///
/// 合并语义（零值哨兵）：
/// - 非默认字段值覆盖之前的值
/// - 默认值（0）永远不会抹掉已积累的非默认值
/// - 调用方负责固定的传入顺序（按帧类型索引）
///
/// 合并完成后计算派生字段：
/// - `power = voltage × current_battery`
/// - `efficiency = current_motor × voltage / power × 100`（power > 0 时，否则为 0）
pub fn merge_status_frames(frames: &[Option<VescStatus>]) -> VescStatus {
    let mut merged = VescStatus::default();

    for frame in frames.iter().flatten() {
        if frame.temp_mos != 0.0 {
            merged.temp_mos = frame.temp_mos;
        }
        if frame.temp_motor != 0.0 {
            merged.temp_motor = frame.temp_motor;
        }
        if frame.current_motor != 0.0 {
            merged.current_motor = frame.current_motor;
        }
        if frame.current_battery != 0.0 {
            merged.current_battery = frame.current_battery;
        }
        if frame.duty_cycle != 0.0 {
            merged.duty_cycle = frame.duty_cycle;
        }
        if frame.rpm != 0 {
            merged.rpm = frame.rpm;
        }
        if frame.voltage != 0.0 {
            merged.voltage = frame.voltage;
        }
        if frame.amp_hours_consumed != 0.0 {
            merged.amp_hours_consumed = frame.amp_hours_consumed;
        }
        if frame.amp_hours_charged != 0.0 {
            merged.amp_hours_charged = frame.amp_hours_charged;
        }
        if frame.watt_hours_consumed != 0.0 {
            merged.watt_hours_consumed = frame.watt_hours_consumed;
        }
        if frame.watt_hours_charged != 0.0 {
            merged.watt_hours_charged = frame.watt_hours_charged;
        }
        if frame.tachometer != 0 {
            merged.tachometer = frame.tachometer;
        }
        if frame.tachometer_abs != 0 {
            merged.tachometer_abs = frame.tachometer_abs;
        }
        if frame.fault_code != 0 {
            merged.fault_code = frame.fault_code;
        }
    }

    merged.power = merged.voltage * merged.current_battery;
    merged.efficiency = if merged.power > 0.0 {
        merged.current_motor * merged.voltage / merged.power * 100.0
    } else {
        0.0
    };

    merged
}
