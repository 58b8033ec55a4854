//! 加载器向使用方发出的通知

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::error::LoaderError;
use crate::core::range_store::{ByteRangeStore, ByteSpan};

/// 通知回调期间提供给使用方的视图，可查询数据并追加请求
pub struct ConsumerContext<'a> {
    store: &'a ByteRangeStore,
    queued: &'a mut VecDeque<ByteSpan>,
    total_size: u64,
    /// 只有分段加载时才接受新的请求
    partial: bool,
}

impl<'a> ConsumerContext<'a> {
    pub(crate) fn new(
        store: &'a ByteRangeStore,
        queued: &'a mut VecDeque<ByteSpan>,
        total_size: u64,
        partial: bool,
    ) -> Self {
        Self { store, queued, total_size, partial }
    }

    pub fn document_size(&self) -> u64 {
        self.total_size
    }

    pub fn is_data_available(&self, offset: u64, size: u64) -> bool {
        self.store.is_range_available(offset, size)
    }

    pub fn get_block(&self, offset: u64, buf: &mut [u8]) -> bool {
        self.store.read_data(offset, buf)
    }

    pub fn available_bytes(&self) -> u64 {
        if self.total_size == 0 {
            self.store.pending_len().max(self.store.available_bytes())
        } else {
            self.store.available_bytes()
        }
    }

    /// 追加一个请求，回调返回后由加载器统一调度；整体下载时什么都不做
    pub fn request_data(&mut self, offset: u64, size: u64) {
        if !self.partial || size == 0 || offset >= self.total_size {
            return;
        }
        let size = size.min(self.total_size - offset);
        if self.store.is_range_available(offset, size) {
            return;
        }
        self.queued.push_back(ByteSpan::new(offset, size));
    }
}

/// 使用方，接收加载进度通知
pub trait DocumentClient {
    /// 文档头和第一块数据已就绪，只在分段加载时触发一次
    fn on_partial_document_loaded(&mut self, _ctx: &mut ConsumerContext<'_>) {}

    /// 一批请求的数据已全部到达
    fn on_pending_request_complete(&mut self, _ctx: &mut ConsumerContext<'_>) {}

    /// 有新数据写入
    fn on_new_data_available(&mut self, _ctx: &mut ConsumerContext<'_>) {}

    /// 整个文档可用
    fn on_document_complete(&mut self, _ctx: &mut ConsumerContext<'_>) {}

    /// 加载失败，之后不会再有任何通知
    fn on_load_failed(&mut self, _error: &LoaderError) {}
}

/// 通过通道转发出去的通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoaderEvent {
    PartialDocumentLoaded { total_size: u64 },
    PendingRequestComplete,
    NewDataAvailable { available: u64, total_size: u64 },
    DocumentComplete { total_size: u64 },
    LoadFailed { error: String },
}

/// 把通知转发到 mpsc 通道的使用方
pub struct ChannelClient {
    sender: mpsc::UnboundedSender<LoaderEvent>,
}

impl ChannelClient {
    pub fn new(sender: mpsc::UnboundedSender<LoaderEvent>) -> Self {
        Self { sender }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LoaderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn send(&self, event: LoaderEvent) {
        if self.sender.send(event).is_err() {
            log::debug!("通知接收端已关闭");
        }
    }
}

impl DocumentClient for ChannelClient {
    fn on_partial_document_loaded(&mut self, ctx: &mut ConsumerContext<'_>) {
        self.send(LoaderEvent::PartialDocumentLoaded { total_size: ctx.document_size() });
    }

    fn on_pending_request_complete(&mut self, _ctx: &mut ConsumerContext<'_>) {
        self.send(LoaderEvent::PendingRequestComplete);
    }

    fn on_new_data_available(&mut self, ctx: &mut ConsumerContext<'_>) {
        self.send(LoaderEvent::NewDataAvailable {
            available: ctx.available_bytes(),
            total_size: ctx.document_size(),
        });
    }

    fn on_document_complete(&mut self, ctx: &mut ConsumerContext<'_>) {
        self.send(LoaderEvent::DocumentComplete { total_size: ctx.document_size() });
    }

    fn on_load_failed(&mut self, error: &LoaderError) {
        self.send(LoaderEvent::LoadFailed { error: error.to_string() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_skips_available_requests() {
        let mut store = ByteRangeStore::new();
        store.preallocate(100).unwrap();
        store.write_data(0, &[1u8; 50]).unwrap();
        let mut queued = VecDeque::new();

        let mut ctx = ConsumerContext::new(&store, &mut queued, 100, true);
        ctx.request_data(10, 10);
        ctx.request_data(40, 20);
        ctx.request_data(60, 0);
        ctx.request_data(90, 50);
        ctx.request_data(100, 5);
        assert!(ctx.is_data_available(0, 50));
        assert_eq!(ctx.available_bytes(), 50);

        assert_eq!(queued, VecDeque::from(vec![ByteSpan::new(40, 20), ByteSpan::new(90, 10)]));
    }

    #[test]
    fn test_context_ignores_requests_during_full_download() {
        let mut store = ByteRangeStore::new();
        store.preallocate(1000).unwrap();
        store.write_data(0, &[1u8; 100]).unwrap();
        let mut queued = VecDeque::new();

        let mut ctx = ConsumerContext::new(&store, &mut queued, 1000, false);
        ctx.request_data(500, 10);
        ctx.request_data(100, 900);
        assert_eq!(ctx.available_bytes(), 100);
        assert!(queued.is_empty());
    }

    #[test]
    fn test_channel_client_forwards_events() {
        let (mut client, mut rx) = ChannelClient::channel();
        let store = ByteRangeStore::new();
        let mut queued = VecDeque::new();
        let mut ctx = ConsumerContext::new(&store, &mut queued, 0, false);

        client.on_pending_request_complete(&mut ctx);
        client.on_load_failed(&LoaderError::HttpClientError(404));

        assert_eq!(rx.try_recv().unwrap(), LoaderEvent::PendingRequestComplete);
        assert!(matches!(rx.try_recv().unwrap(), LoaderEvent::LoadFailed { .. }));
        assert!(rx.try_recv().is_err());
    }
}
