//! 传输管理层错误类型

use crate::can::CanError;
use crate::protocol::ProtocolError;
use thiserror::Error;

/// 传输管理层统一错误类型
///
/// 传播策略：连接失败直接上抛给调用方；单帧级别的故障（接收错误、
/// 处理器 panic、端点写失败）在接收循环内记录日志并继续，不会出现
/// 在这里。
#[derive(Error, Debug)]
pub enum BusError {
    /// CAN 适配层错误
    #[error("CAN Error: {0}")]
    Can(#[from] CanError),

    /// 协议层错误
    #[error("Protocol Error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 发送通道已满（背压指示，调用方可稍后重试）
    #[error("Command channel full")]
    ChannelFull,

    /// 发送通道已关闭（连接已断开）
    #[error("Command channel closed")]
    ChannelClosed,

    /// 尚未连接或已断开
    #[error("Not connected")]
    NotConnected,

    /// 接收线程未在限定时间内退出
    #[error("IO thread did not exit within shutdown timeout")]
    ShutdownTimeout,

    /// 接收线程异常（join 失败等）
    #[error("IO thread error: {0}")]
    IoThread(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_error_display() {
        assert!(BusError::ChannelFull.to_string().contains("full"));
        assert!(BusError::ChannelClosed.to_string().contains("closed"));
        assert!(BusError::NotConnected.to_string().contains("connected"));
        assert!(BusError::ShutdownTimeout.to_string().contains("timeout"));
    }

    #[test]
    fn test_bus_error_from_can_error() {
        let err: BusError = CanError::Timeout.into();
        assert!(matches!(err, BusError::Can(CanError::Timeout)));
    }

    #[test]
    fn test_bus_error_from_protocol_error() {
        let err: BusError = ProtocolError::InvalidCanId(0x700).into();
        assert!(matches!(
            err,
            BusError::Protocol(ProtocolError::InvalidCanId(0x700))
        ));
    }
}
