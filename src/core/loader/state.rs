use serde::{Serialize, Deserialize};

/// 分段下载中的传输阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferPhase {
    Idle,
    RequestInFlight,
}

/// 加载器状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoaderState {
    Uninitialized,
    HeaderPending,
    FullDownload,
    PartialDownload(TransferPhase),
    Complete,
    Failed(String),
}

impl LoaderState {
    /// 终止状态下不再发出请求
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoaderState::Complete | LoaderState::Failed(_))
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, LoaderState::PartialDownload(_))
    }
}

/// 初始化后选定的下载策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// 顺序读取整个正文，继续使用探测连接
    FullDownload,
    /// 分段请求，探测连接应被丢弃
    PartialDownload,
}
