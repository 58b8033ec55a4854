use thiserror::Error;
use std::io;

/// 渐进式加载过程中可能出现的错误
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("不支持的内容类型: {0}")]
    UnsupportedContentType(String),

    #[error("文档以附件形式提供: {0}")]
    AttachmentDisposition(String),

    #[error("HTTP 客户端错误: {0}")]
    HttpClientError(u16),

    #[error("服务器错误: {0}")]
    ServerError(u16),

    #[error("无法解析 Content-Range: {0}")]
    MalformedRangeHeader(String),

    #[error("读取被截断: 预期 {expected} 字节, 实际 {actual} 字节")]
    TruncatedRead {
        expected: u64,
        actual: u64,
    },

    #[error("越界访问: 偏移 {offset}, 长度 {size}, 容量 {capacity}")]
    OutOfBounds {
        offset: u64,
        size: u64,
        capacity: u64,
    },

    #[error("文档过大，无法分配 {0} 字节")]
    DocumentTooLarge(u64),

    #[error("网络错误: {0}")]
    NetworkError(String),

    #[error("IO错误: {0}")]
    IoError(#[from] io::Error),

    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("未知错误: {0}")]
    Unknown(String),
}

impl LoaderError {
    /// 按 HTTP 状态码归类，2xx 返回 None
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            400..=499 => Some(LoaderError::HttpClientError(status)),
            500..=599 => Some(LoaderError::ServerError(status)),
            200..=299 => None,
            other => Some(LoaderError::Unknown(format!("意外的状态码: {}", other))),
        }
    }
}

impl From<String> for LoaderError {
    fn from(error: String) -> Self {
        LoaderError::Unknown(error)
    }
}

impl From<&str> for LoaderError {
    fn from(error: &str) -> Self {
        LoaderError::Unknown(error.to_string())
    }
}


pub type LoaderResult<T> = Result<T, LoaderError>;
