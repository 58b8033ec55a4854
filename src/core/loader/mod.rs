//! `loader` 模块实现渐进式文档加载
//!
//! 主要包括：
//! - `scheduler`: 不做 IO 的调度核心 `ProgressiveLoader`
//! - `state`: 加载状态 `LoaderState`
//! - `headers`: 响应头、Content-Range 和 multipart 解析
//! - `network`: 网络客户端抽象及 awc 实现
//! - `client`: 通知使用方的接口 `DocumentClient`
//! - `actor`: 驱动加载器的 `LoaderActor`
//! - `messages`: Actor 之间传递的消息
//! - `handlers`: 消息处理器

pub mod actor;
pub mod client;
pub mod handlers;
pub mod headers;
pub mod messages;
pub mod network;
pub mod scheduler;
pub mod state;

pub use actor::LoaderActor;
pub use client::{ChannelClient, ConsumerContext, DocumentClient, LoaderEvent};
pub use headers::{DocumentInfo, ResponseHead, ResponseHeaders};
pub use messages::{
    ClearPendingRequests, GetAvailableByteCount, GetBlock, IsDataAvailable, IsDocumentComplete,
    QuerySnapshot, RequestData, StartLoad,
};
pub use network::{AwcClient, FetchRequest, FetchResponse, NetworkClient};
pub use scheduler::{LoaderSnapshot, ProgressiveLoader};
pub use state::{LoaderState, Strategy, TransferPhase};
