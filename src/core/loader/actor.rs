use actix::prelude::*;
use futures::StreamExt;
use std::rc::Rc;
use uuid::Uuid;

use crate::config::Config;
use crate::core::range_store::ByteSpan;
use super::client::ChannelClient;
use super::messages::{ConnectionFailed, DidOpen, DidRead, ReadComplete};
use super::network::{FetchRequest, FetchResponse, NetworkClient};
use super::scheduler::ProgressiveLoader;

/// 驱动 `ProgressiveLoader` 的 Actor，同一时刻只持有一个连接
pub struct LoaderActor<N: NetworkClient + 'static> {
    pub id: Uuid,
    pub loader: ProgressiveLoader<ChannelClient>,
    network: Rc<N>,
    connection: Option<SpawnHandle>,
    generation: u64,
    /// 初始化完成前收到的请求
    early_requests: Vec<ByteSpan>,
}

impl<N: NetworkClient + 'static> Actor for LoaderActor<N> {
    type Context = Context<Self>;

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        log::debug!("[loader {}] 已停止", self.id);
    }
}

impl<N: NetworkClient + 'static> LoaderActor<N> {
    pub fn new(config: &Config, network: N, client: ChannelClient) -> Self {
        Self {
            id: Uuid::new_v4(),
            loader: ProgressiveLoader::new(client, config),
            network: Rc::new(network),
            connection: None,
            generation: 0,
            early_requests: Vec::new(),
        }
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    pub(crate) fn defer_request(&mut self, span: ByteSpan) {
        self.early_requests.push(span);
    }

    /// 初始化为分段加载后重放暂存的请求
    pub(crate) fn replay_early_requests(&mut self) {
        for span in std::mem::take(&mut self.early_requests) {
            self.loader.request_data(span.offset, span.size);
        }
    }

    /// 取消当前连接，之后到达的旧消息都会被丢弃
    pub(crate) fn cancel_connection(&mut self, ctx: &mut Context<Self>) {
        if let Some(handle) = self.connection.take() {
            ctx.cancel_future(handle);
            log::debug!("[loader {}] 取消连接 #{}", self.id, self.generation);
        }
        self.generation += 1;
    }

    pub(crate) fn connection_finished(&mut self) {
        self.connection = None;
    }

    /// 空闲时发出加载器排好的下一个请求
    pub(crate) fn pump(&mut self, ctx: &mut Context<Self>) {
        if self.loader.state().is_terminal() {
            if self.connection.is_some() {
                self.cancel_connection(ctx);
            }
            return;
        }
        if self.connection.is_some() {
            return;
        }
        if let Some(request) = self.loader.take_request() {
            self.open_connection(ctx, request);
        }
    }

    pub(crate) fn open_connection(&mut self, ctx: &mut Context<Self>, request: FetchRequest) {
        self.cancel_connection(ctx);
        let generation = self.generation;
        let network = Rc::clone(&self.network);
        let addr = ctx.address();
        log::debug!(
            "[loader {}] 连接 #{} {} {}",
            self.id,
            generation,
            request.url,
            request.range_header().unwrap_or_default()
        );

        let fut = async move {
            let FetchResponse { head, mut body } = match network.open(request).await {
                Ok(response) => response,
                Err(error) => {
                    addr.do_send(ConnectionFailed { generation, error });
                    return;
                }
            };
            addr.do_send(DidOpen { generation, head });
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(chunk) => addr.do_send(DidRead { generation, chunk }),
                    Err(error) => {
                        addr.do_send(ConnectionFailed { generation, error });
                        return;
                    }
                }
            }
            addr.do_send(ReadComplete { generation });
        };
        self.connection = Some(ctx.spawn(fut.into_actor(self)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::LoaderError;
    use crate::core::loader::client::LoaderEvent;
    use crate::core::loader::headers::{ResponseHead, ResponseHeaders};
    use crate::core::loader::messages::*;
    use crate::core::loader::state::LoaderState;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::cell::RefCell;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// 内存中的服务器，记录收到的请求
    struct MockNetwork {
        data: Rc<Vec<u8>>,
        status: u16,
        requests: Rc<RefCell<Vec<FetchRequest>>>,
    }

    #[async_trait(?Send)]
    impl NetworkClient for MockNetwork {
        async fn open(&self, request: FetchRequest) -> Result<FetchResponse, LoaderError> {
            self.requests.borrow_mut().push(request.clone());
            let total = self.data.len() as u64;
            let (head, body) = match request.range {
                _ if self.status != 200 => (ResponseHead::new(self.status, ResponseHeaders::new()), Vec::new()),
                Some(span) => {
                    let end = span.end().min(total);
                    let headers = ResponseHeaders::from_pairs([(
                        "Content-Range",
                        format!("bytes {}-{}/{}", span.offset, end - 1, total),
                    )]);
                    (ResponseHead::new(206, headers), self.data[span.offset as usize..end as usize].to_vec())
                }
                None => {
                    let headers = ResponseHeaders::from_pairs([
                        ("Content-Length", total.to_string()),
                        ("Accept-Ranges", "bytes".to_string()),
                        ("Content-Type", "application/pdf".to_string()),
                    ]);
                    (ResponseHead::new(200, headers), self.data.to_vec())
                }
            };
            let chunks: Vec<Result<Bytes, LoaderError>> = body
                .chunks(8 * 1024)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            Ok(FetchResponse { head, body: futures::stream::iter(chunks).boxed_local() })
        }
    }

    fn start(
        size: usize,
        status: u16,
        config: Config,
    ) -> (Addr<LoaderActor<MockNetwork>>, UnboundedReceiver<LoaderEvent>, Rc<Vec<u8>>, Rc<RefCell<Vec<FetchRequest>>>) {
        let data = Rc::new((0..size).map(|i| (i % 253) as u8).collect::<Vec<u8>>());
        let requests = Rc::new(RefCell::new(Vec::new()));
        let network = MockNetwork { data: Rc::clone(&data), status, requests: Rc::clone(&requests) };
        let (client, rx) = ChannelClient::channel();
        let addr = LoaderActor::new(&config, network, client).start();
        (addr, rx, data, requests)
    }

    async fn wait_for<F>(rx: &mut UnboundedReceiver<LoaderEvent>, mut done: F) -> Vec<LoaderEvent>
    where
        F: FnMut(&LoaderEvent) -> bool,
    {
        let mut seen = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("等待通知超时")
                .expect("通道已关闭");
            let finished = done(&event);
            seen.push(event);
            if finished {
                return seen;
            }
        }
    }

    #[actix_rt::test]
    async fn test_actor_loads_whole_document() {
        let (addr, mut rx, data, requests) = start(300_000, 200, Config::default());
        addr.send(StartLoad { url: "http://example.com/a.pdf".to_string() }).await.unwrap().unwrap();
        addr.send(RequestData { offset: 250_000, size: 10 }).await.unwrap();

        let events = wait_for(&mut rx, |e| matches!(e, LoaderEvent::DocumentComplete { .. })).await;
        assert!(events.iter().any(|e| matches!(e, LoaderEvent::PartialDocumentLoaded { total_size: 300_000 })));
        assert!(events.iter().all(|e| !matches!(e, LoaderEvent::LoadFailed { .. })));

        let requests = requests.borrow().clone();
        assert!(requests[0].range.is_none());
        assert_eq!(requests[1].range_header().as_deref(), Some("bytes=0-32767"));
        // 暂存的请求在头部之后立即发出
        let third = requests[2].range.unwrap();
        assert!(third.offset <= 250_000 && third.end() >= 250_010);

        assert!(addr.send(IsDocumentComplete).await.unwrap());
        assert_eq!(addr.send(GetAvailableByteCount).await.unwrap(), 300_000);
        let block = addr.send(GetBlock { offset: 0, size: 300_000 }).await.unwrap().unwrap();
        assert_eq!(&block[..], &data[..]);

        let snapshot = addr.send(QuerySnapshot).await.unwrap();
        assert_eq!(snapshot.state, LoaderState::Complete);
        assert_eq!(snapshot.requests_issued as usize, requests.len() - 1);
    }

    #[actix_rt::test]
    async fn test_actor_without_background_fill() {
        let config = Config { background_fill: false, ..Config::default() };
        let (addr, mut rx, data, requests) = start(1_000_000, 200, config);
        addr.send(StartLoad { url: "http://example.com/a.pdf".to_string() }).await.unwrap().unwrap();
        wait_for(&mut rx, |e| matches!(e, LoaderEvent::PartialDocumentLoaded { .. })).await;

        addr.send(RequestData { offset: 500_000, size: 100 }).await.unwrap();
        wait_for(&mut rx, |e| matches!(e, LoaderEvent::PendingRequestComplete)).await;

        assert!(addr.send(IsDataAvailable { offset: 500_000, size: 100 }).await.unwrap());
        assert!(!addr.send(IsDocumentComplete).await.unwrap());
        assert!(addr.send(GetBlock { offset: 900_000, size: 10 }).await.unwrap().is_none());
        let block = addr.send(GetBlock { offset: 500_000, size: 100 }).await.unwrap().unwrap();
        assert_eq!(&block[..], &data[500_000..500_100]);
        assert_eq!(requests.borrow().len(), 3);

        addr.send(ClearPendingRequests).await.unwrap();
        assert_eq!(addr.send(QuerySnapshot).await.unwrap().pending_requests, 0);
    }

    #[actix_rt::test]
    async fn test_actor_small_document_reuses_probe() {
        let (addr, mut rx, data, requests) = start(10_000, 200, Config::default());
        addr.send(StartLoad { url: "http://example.com/a.pdf".to_string() }).await.unwrap().unwrap();
        wait_for(&mut rx, |e| matches!(e, LoaderEvent::DocumentComplete { total_size: 10_000 })).await;

        assert_eq!(requests.borrow().len(), 1);
        let block = addr.send(GetBlock { offset: 0, size: 10_000 }).await.unwrap().unwrap();
        assert_eq!(&block[..], &data[..]);
    }

    #[actix_rt::test]
    async fn test_actor_reports_failure() {
        let (addr, mut rx, _data, requests) = start(300_000, 404, Config::default());
        addr.send(StartLoad { url: "http://example.com/missing.pdf".to_string() }).await.unwrap().unwrap();

        let events = wait_for(&mut rx, |e| matches!(e, LoaderEvent::LoadFailed { .. })).await;
        assert_eq!(events.len(), 1);
        assert_eq!(requests.borrow().len(), 1);
        assert!(!addr.send(IsDocumentComplete).await.unwrap());

        let again = addr.send(StartLoad { url: "http://example.com/missing.pdf".to_string() }).await.unwrap();
        assert!(again.is_err());
    }
}
