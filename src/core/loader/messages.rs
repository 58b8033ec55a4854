use actix::Message;
use bytes::Bytes;

use crate::core::error::LoaderError;
use super::headers::ResponseHead;
use super::scheduler::LoaderSnapshot;

/// 开始加载，发出探测请求
pub struct StartLoad {
    pub url: String,
}
impl Message for StartLoad { type Result = Result<(), LoaderError>; }

/// 请求一段数据，初始化完成前收到的请求会暂存
pub struct RequestData {
    pub offset: u64,
    pub size: u64,
}
impl Message for RequestData { type Result = (); }

/// 查询范围是否可用
pub struct IsDataAvailable {
    pub offset: u64,
    pub size: u64,
}
impl Message for IsDataAvailable { type Result = bool; }

/// 读取一段已可用的数据，不可用时返回 None
pub struct GetBlock {
    pub offset: u64,
    pub size: u64,
}
impl Message for GetBlock { type Result = Option<Bytes>; }

/// 查询已可用的字节数
pub struct GetAvailableByteCount;
impl Message for GetAvailableByteCount { type Result = u64; }

/// 查询文档是否已完整
pub struct IsDocumentComplete;
impl Message for IsDocumentComplete { type Result = bool; }

/// 丢弃队首之外的请求
pub struct ClearPendingRequests;
impl Message for ClearPendingRequests { type Result = (); }

/// 查询状态快照
pub struct QuerySnapshot;
impl Message for QuerySnapshot { type Result = LoaderSnapshot; }

// ========== 连接内部消息 ==========
// generation 不匹配的消息来自已取消的连接，直接丢弃

/// 响应头到达
pub struct DidOpen {
    pub generation: u64,
    pub head: ResponseHead,
}
impl Message for DidOpen { type Result = (); }

/// 收到一块正文
pub struct DidRead {
    pub generation: u64,
    pub chunk: Bytes,
}
impl Message for DidRead { type Result = (); }

/// 正文读取完毕
pub struct ReadComplete {
    pub generation: u64,
}
impl Message for ReadComplete { type Result = (); }

/// 连接失败或中断
pub struct ConnectionFailed {
    pub generation: u64,
    pub error: LoaderError,
}
impl Message for ConnectionFailed { type Result = (); }
