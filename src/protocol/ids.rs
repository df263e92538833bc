//! VESC 状态协议保留的 CAN ID
//!
//! 五个状态帧各占一个扩展帧 ID，其余 ID 对本协议透明（不解码、不报错）。

/// Status Frame 1：MOSFET 温度 / 电机电流 / 电池电流 / 占空比
pub const ID_STATUS_1: u32 = 0x02;

/// Status Frame 2：转速 (ERPM) / 输入电压
pub const ID_STATUS_2: u32 = 0x03;

/// Status Frame 3：安时消耗 / 安时回充
pub const ID_STATUS_3: u32 = 0x04;

/// Status Frame 4：瓦时消耗 / 瓦时回充
pub const ID_STATUS_4: u32 = 0x05;

/// Status Frame 5：里程计（电角度计数）
pub const ID_STATUS_5: u32 = 0x06;

/// 所有状态帧 ID，按合并顺序排列
pub const STATUS_IDS: [u32; 5] = [
    ID_STATUS_1,
    ID_STATUS_2,
    ID_STATUS_3,
    ID_STATUS_4,
    ID_STATUS_5,
];

/// 判断给定 ID 是否属于状态协议
pub const fn is_status_id(id: u32) -> bool {
    id >= ID_STATUS_1 && id <= ID_STATUS_5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ids_are_contiguous() {
        assert_eq!(STATUS_IDS, [0x02, 0x03, 0x04, 0x05, 0x06]);
        for id in STATUS_IDS {
            assert!(is_status_id(id));
        }
        assert!(!is_status_id(0x01));
        assert!(!is_status_id(0x07));
        assert!(!is_status_id(0x700));
    }
}
