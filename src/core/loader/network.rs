//! 抽象的网络客户端：发出带 Range 头的 GET 请求，以流的形式交付正文

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::LocalBoxStream;
use futures::StreamExt;

use crate::config::Config;
use crate::core::error::LoaderError;
use crate::core::range_store::ByteSpan;
use super::headers::{ResponseHead, ResponseHeaders};

/// 一次 GET 请求，`range` 为空表示获取整个正文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub range: Option<ByteSpan>,
}

impl FetchRequest {
    pub fn whole(url: impl Into<String>) -> Self {
        Self { url: url.into(), range: None }
    }

    pub fn ranged(url: impl Into<String>, span: ByteSpan) -> Self {
        Self { url: url.into(), range: Some(span) }
    }

    /// 按 RFC 7233 生成 Range 头的值，结束位置包含在内
    pub fn range_header(&self) -> Option<String> {
        self.range
            .filter(|span| span.size > 0)
            .map(|span| format!("bytes={}-{}", span.offset, span.end() - 1))
    }
}

/// 正文数据流
pub type BodyStream = LocalBoxStream<'static, Result<Bytes, LoaderError>>;

/// 打开后的响应
pub struct FetchResponse {
    pub head: ResponseHead,
    pub body: BodyStream,
}

/// 网络客户端，加载器同一时刻只会打开一个请求
#[async_trait(?Send)]
pub trait NetworkClient {
    async fn open(&self, request: FetchRequest) -> Result<FetchResponse, LoaderError>;
}

/// 基于 awc 的网络客户端
pub struct AwcClient {
    client: awc::Client,
}

impl AwcClient {
    pub fn new(config: &Config) -> Self {
        let client = awc::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .add_default_header(("User-Agent", config.user_agent.clone()))
            .finish();
        Self { client }
    }
}

#[async_trait(?Send)]
impl NetworkClient for AwcClient {
    async fn open(&self, request: FetchRequest) -> Result<FetchResponse, LoaderError> {
        let mut builder = self.client.get(&request.url);
        if let Some(range) = request.range_header() {
            builder = builder
                .insert_header(("Range", range))
                .insert_header(("Accept-Encoding", "identity"));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LoaderError::NetworkError(format!("{:?}", e)))?;

        let headers = ResponseHeaders::from_pairs(response.headers().iter().filter_map(
            |(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            },
        ));
        let head = ResponseHead::new(response.status().as_u16(), headers);

        let body = response
            .map(|chunk| chunk.map_err(|e| LoaderError::NetworkError(format!("网络流错误: {:?}", e))))
            .boxed_local();

        Ok(FetchResponse { head, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_header_is_inclusive() {
        let request = FetchRequest::ranged("http://example.com/a.pdf", ByteSpan::new(0, 32768));
        assert_eq!(request.range_header().as_deref(), Some("bytes=0-32767"));

        let request = FetchRequest::ranged("http://example.com/a.pdf", ByteSpan::new(967232, 32768));
        assert_eq!(request.range_header().as_deref(), Some("bytes=967232-999999"));
    }

    #[test]
    fn test_whole_request_has_no_range() {
        let request = FetchRequest::whole("http://example.com/a.pdf");
        assert!(request.range_header().is_none());

        let request = FetchRequest::ranged("http://example.com/a.pdf", ByteSpan::new(10, 0));
        assert!(request.range_header().is_none());
    }
}
