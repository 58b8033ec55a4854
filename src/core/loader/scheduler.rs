//! 渐进式加载的请求调度
//!
//! `ProgressiveLoader` 不做任何 IO：驱动方把响应头、数据块和读取完成事件交给它，
//! 并通过 [`ProgressiveLoader::take_request`] 取走它决定发出的下一个请求。
//! 同一时刻最多只有一个请求在途，队首就是在途的请求。

use std::collections::VecDeque;
use std::rc::Rc;

use bytes::Bytes;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::core::clock::{Clock, SystemClock, TransferMeter};
use crate::core::error::{LoaderError, LoaderResult};
use crate::core::range_store::{ByteRangeStore, ByteSpan};
use crate::core::request_sizer::RequestSizer;
use super::client::{ConsumerContext, DocumentClient};
use super::headers::{
    byte_range, find_part_body, multipart_boundary, DocumentInfo, ResponseHead, ResponseHeaders,
};
use super::network::FetchRequest;
use super::state::{LoaderState, Strategy, TransferPhase};

/// 队列中等待下载的范围
pub type PendingRequest = ByteSpan;

/// 当前响应的读取位置
#[derive(Debug, Default)]
struct ResponseCursor {
    current_pos: u64,
    /// 服务器声明的字节数，0 表示未知
    chunk_size: u64,
    chunk_read: u64,
    /// 还需要在第一块数据中解析分段头
    multipart: bool,
    available_before: u64,
}

/// 加载器状态快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderSnapshot {
    pub state: LoaderState,
    pub total_size: u64,
    pub available: u64,
    pub partial: bool,
    pub requests_issued: u32,
    pub pending_requests: usize,
    pub speed: u64,
}

/// 渐进式文档加载器
pub struct ProgressiveLoader<C: DocumentClient> {
    client: C,
    sizer: RequestSizer,
    min_partial_size: u64,
    accepted_types: Vec<String>,
    background_fill: bool,
    store: ByteRangeStore,
    pending: VecDeque<PendingRequest>,
    document: DocumentInfo,
    state: LoaderState,
    partial_document: bool,
    requests_count: u32,
    header_request: bool,
    cursor: ResponseCursor,
    outgoing: Option<FetchRequest>,
    meter: TransferMeter,
}

impl<C: DocumentClient> ProgressiveLoader<C> {
    pub fn new(client: C, config: &Config) -> Self {
        Self::with_clock(client, config, Rc::new(SystemClock))
    }

    pub fn with_clock(client: C, config: &Config, clock: Rc<dyn Clock>) -> Self {
        Self {
            client,
            sizer: config.request_sizer(),
            min_partial_size: config.min_partial_size,
            accepted_types: config.accepted_content_types.clone(),
            background_fill: config.background_fill,
            store: ByteRangeStore::new(),
            pending: VecDeque::new(),
            document: DocumentInfo::default(),
            state: LoaderState::Uninitialized,
            partial_document: false,
            requests_count: 0,
            header_request: true,
            cursor: ResponseCursor::default(),
            outgoing: None,
            meter: TransferMeter::new(clock),
        }
    }

    /// 生成不带 Range 头的探测请求
    pub fn probe_request(&mut self, url: &str) -> LoaderResult<FetchRequest> {
        if self.state != LoaderState::Uninitialized {
            return Err(LoaderError::Unknown(format!("加载器已启动: {:?}", self.state)));
        }
        self.document.url = url.to_string();
        self.state = LoaderState::HeaderPending;
        Ok(FetchRequest::whole(url))
    }

    /// 根据初次响应选择下载策略
    pub fn init(&mut self, url: &str, head: &ResponseHead) -> LoaderResult<Strategy> {
        if self.state.is_terminal() {
            return Err(LoaderError::Unknown(format!("加载器已结束: {:?}", self.state)));
        }
        if let Some(err) = head.status_error() {
            return Err(self.fail(err));
        }

        let mut info = DocumentInfo::from_headers(url, &head.headers);
        if let Err(err) = info.check(&self.accepted_types) {
            return Err(self.fail(err));
        }
        if info.content_encoded {
            // 编码后的长度与解码后的正文长度不一致
            info.total_size = 0;
        }

        self.requests_count = 0;
        self.document = info;
        if let Err(err) = self.store.preallocate(self.document.total_size) {
            return Err(self.fail(err));
        }

        if self.document.total_size > self.min_partial_size
            && self.document.accepts_ranges
            && !self.document.content_encoded
        {
            info!(
                "分段加载 {} ({} 字节)",
                self.document.url, self.document.total_size
            );
            self.partial_document = true;
            self.header_request = true;
            self.state = LoaderState::PartialDownload(TransferPhase::Idle);
            let size = self.request_size().min(self.document.total_size);
            self.request_data(0, size);
            Ok(Strategy::PartialDownload)
        } else {
            info!(
                "整体加载 {} (大小 {})",
                self.document.url,
                if self.document.total_size > 0 {
                    self.document.total_size.to_string()
                } else {
                    "未知".to_string()
                }
            );
            self.partial_document = false;
            self.state = LoaderState::FullDownload;
            self.cursor = ResponseCursor::default();
            Ok(Strategy::FullDownload)
        }
    }

    /// 请求 `[offset, offset + size)`，数据已可用时什么都不做
    pub fn request_data(&mut self, offset: u64, size: u64) {
        if !self.state.is_partial() {
            debug!("当前状态 {:?} 不接受分段请求", self.state);
            return;
        }
        let total = self.document.total_size;
        if size == 0 || offset >= total || self.is_document_complete() {
            return;
        }
        let size = size.min(total - offset);
        if self.store.is_range_available(offset, size) {
            return;
        }
        self.pending.push_back(ByteSpan::new(offset, size));
        self.download_pending_requests();
    }

    /// 丢弃队首之外的所有请求
    pub fn clear_pending_requests(&mut self) {
        self.pending.truncate(1);
    }

    /// 取走下一个需要发出的请求
    pub fn take_request(&mut self) -> Option<FetchRequest> {
        self.outgoing.take()
    }

    fn request_size(&self) -> u64 {
        self.sizer.request_size(self.requests_count)
    }

    fn download_pending_requests(&mut self) {
        if self.state != LoaderState::PartialDownload(TransferPhase::Idle) {
            return;
        }

        // 队首之后的请求可能已经被其他请求顺带下载
        while self.pending.len() > 1 {
            match self.pending.front() {
                Some(front) if self.store.is_range_available(front.offset, front.size) => {
                    self.pending.pop_front();
                }
                _ => break,
            }
        }

        let Some(head) = self.pending.front().copied() else {
            return;
        };
        if self.store.is_range_available(head.offset, head.size) {
            self.finish_request();
            return;
        }

        let missed = self.store.missed_ranges(head.offset, head.size);
        if !missed.is_empty() {
            self.pending.pop_front();
            for span in missed.into_iter().rev() {
                self.pending.push_front(span);
            }
        }
        let Some(head) = self.pending.front().copied() else {
            return;
        };

        let total = self.document.total_size;
        let cur_request_size = self.request_size();
        let mut pos = head.offset;
        let mut size = head.size;

        if size < cur_request_size {
            // 先向文件末尾扩展
            let mut new_pos = pos;
            let mut new_size = cur_request_size.min(total - pos);
            if let Some(first) = self.store.missed_ranges(new_pos, new_size).first() {
                new_pos = first.offset;
                new_size = first.size;
            }

            // 仍然不够时向文件开头扩展
            if new_size < cur_request_size {
                let block_end = new_pos + new_size;
                new_pos = block_end.saturating_sub(cur_request_size);
                new_size = block_end - new_pos;
                if let Some(last) = self.store.missed_ranges(new_pos, new_size).last() {
                    new_pos = last.offset;
                    new_size = last.size;
                }
            }
            pos = new_pos;
            size = new_size;
        }

        // 避免在已下载区间旁边留下小缝隙
        let last_byte_before = self.store.last_byte_before(pos);
        let first_byte_after = self.store.first_byte_after(pos + size - 1);
        if let Some(gap) = pos.checked_sub(last_byte_before) {
            if gap < cur_request_size {
                size += gap;
                pos = last_byte_before;
            }
        }
        if pos + size < first_byte_after && pos + size + cur_request_size >= first_byte_after {
            size = first_byte_after - pos;
        }

        let span = ByteSpan::new(pos, size);
        debug!(
            "请求 #{} {}-{} (队首 {}+{})",
            self.requests_count + 1,
            span.offset,
            span.end() - 1,
            head.offset,
            head.size
        );
        self.state = LoaderState::PartialDownload(TransferPhase::RequestInFlight);
        self.requests_count += 1;
        self.cursor = ResponseCursor {
            available_before: self.store.available_bytes(),
            ..ResponseCursor::default()
        };
        self.outgoing = Some(FetchRequest::ranged(self.document.url.clone(), span));
    }

    /// 分段请求的响应头到达
    pub fn did_open(&mut self, head: &ResponseHead) -> LoaderResult<()> {
        if self.state != LoaderState::PartialDownload(TransferPhase::RequestInFlight) {
            debug!("忽略状态 {:?} 下的响应", self.state);
            return Ok(());
        }
        // 4xx 说明后续请求同样会失败
        if let Some(err) = head.status_error() {
            return Err(self.fail(err));
        }

        let available_before = self.cursor.available_before;
        self.cursor = ResponseCursor { available_before, ..ResponseCursor::default() };

        if let Some(boundary) = multipart_boundary(&head.headers) {
            debug!("multipart 响应, boundary={}", boundary);
            self.cursor.multipart = true;
        } else {
            self.apply_content_range(&head.headers);
        }
        Ok(())
    }

    fn apply_content_range(&mut self, headers: &ResponseHeaders) {
        match byte_range(headers) {
            Some(range) => {
                self.cursor.current_pos = range.start;
                if let Some(len) = range.len() {
                    self.cursor.chunk_size = len;
                }
            }
            None => {
                let err = LoaderError::MalformedRangeHeader(
                    headers.get("content-range").unwrap_or("<缺失>").to_string(),
                );
                warn!("{}，按偏移 0 处理", err);
                self.cursor.current_pos = 0;
            }
        }
    }

    /// 收到一块正文数据
    pub fn did_read(&mut self, chunk: Bytes) {
        match self.state {
            LoaderState::FullDownload
            | LoaderState::PartialDownload(TransferPhase::RequestInFlight) => {}
            _ => return,
        }

        let mut data = chunk;
        if self.cursor.multipart && data.len() > 2 {
            if let Some(body) = find_part_body(&data) {
                let part = ResponseHeaders::parse(&String::from_utf8_lossy(&data[..body]));
                self.apply_content_range(&part);
                data = data.slice(body..);
            }
            // 只解析第一个分段，多个分段的响应不受支持
            self.cursor.multipart = false;
        }

        let mut length = data.len() as u64;
        if self.cursor.chunk_size > 0 && self.cursor.chunk_read + length > self.cursor.chunk_size {
            length = self.cursor.chunk_size.saturating_sub(self.cursor.chunk_read);
        }
        if self.document.total_size > 0 {
            let room = self.document.total_size.saturating_sub(self.cursor.current_pos);
            if length > room {
                warn!("服务器返回的数据超出文档末尾，丢弃 {} 字节", length - room);
                length = room;
            }
        }
        if length == 0 {
            return;
        }
        data.truncate(length as usize);

        if self.document.total_size > 0 {
            if let Err(e) = self.store.write_data(self.cursor.current_pos, &data) {
                warn!("写入数据失败: {}", e);
                return;
            }
        } else {
            self.store.append_chunk(data);
        }
        self.cursor.current_pos += length;
        self.cursor.chunk_read += length;
        self.meter.record(length);

        self.notify(|client, ctx| client.on_new_data_available(ctx));
    }

    /// 当前响应读取完毕
    pub fn read_complete(&mut self) {
        match self.state {
            LoaderState::FullDownload => self.finish_full_download(),
            LoaderState::PartialDownload(TransferPhase::RequestInFlight) => {
                self.state = LoaderState::PartialDownload(TransferPhase::Idle);
                self.finish_request();
            }
            _ => debug!("忽略状态 {:?} 下的读取完成", self.state),
        }
    }

    /// 请求无法打开
    pub fn open_failed(&mut self, error: LoaderError) {
        if !self.state.is_terminal() {
            self.fail(error);
        }
    }

    /// 读取正文时连接中断；分段加载时按不完整读取处理
    pub fn read_failed(&mut self, error: LoaderError) {
        match self.state {
            LoaderState::PartialDownload(TransferPhase::RequestInFlight) => {
                warn!("连接中断: {}，缺失部分将重新请求", error);
                self.read_complete();
            }
            LoaderState::Complete | LoaderState::Failed(_) => {}
            _ => {
                self.fail(error);
            }
        }
    }

    fn finish_full_download(&mut self) {
        let received = self.cursor.current_pos;
        if self.document.total_size == 0 {
            match self.store.assemble() {
                Ok(total) => self.document.total_size = total,
                Err(e) => {
                    self.fail(e);
                    return;
                }
            }
            if self.document.total_size == 0 {
                self.fail(LoaderError::Unknown("文档为空".to_string()));
                return;
            }
        } else if received < self.document.total_size {
            self.fail(LoaderError::TruncatedRead {
                expected: self.document.total_size,
                actual: received,
            });
            return;
        }
        self.complete();
    }

    fn finish_request(&mut self) {
        // 队首只有在数据到达、或者响应没有带来任何新数据时才出队
        let mut stalled = false;
        if let Some(head) = self.pending.front().copied() {
            if self.store.is_range_available(head.offset, head.size) {
                self.pending.pop_front();
            } else if self.store.available_bytes() <= self.cursor.available_before {
                let err = LoaderError::TruncatedRead {
                    expected: head.size,
                    actual: self.cursor.chunk_read,
                };
                warn!(
                    "{}，放弃请求 {}+{}，缺失部分在下次请求时重新获取",
                    err, head.offset, head.size
                );
                self.pending.pop_front();
                stalled = true;
            } else {
                warn!(
                    "请求 {}+{} 只收到部分数据，剩余部分将重新请求",
                    head.offset, head.size
                );
            }
        }

        if !self.pending.is_empty() {
            self.download_pending_requests();
            return;
        }

        if self.is_document_complete() {
            self.complete();
            return;
        }

        if self.header_request {
            self.notify(|client, ctx| client.on_partial_document_loaded(ctx));
        } else {
            self.notify(|client, ctx| client.on_pending_request_complete(ctx));
        }
        self.header_request = false;

        // 回调中可能追加了新的请求
        if !self.pending.is_empty() {
            self.download_pending_requests();
        } else if self.background_fill && !stalled {
            // 空闲时继续在后台下载
            let pos = self.store.first_missing_byte();
            let size = self
                .request_size()
                .min(self.document.total_size.saturating_sub(pos));
            if let Some(span) = self.store.missed_ranges(pos, size).first().copied() {
                self.request_data(span.offset, span.size);
            }
        }
    }

    fn complete(&mut self) {
        info!(
            "文档加载完成: {} ({} 字节, {} 个请求)",
            self.document.url, self.document.total_size, self.requests_count
        );
        self.state = LoaderState::Complete;
        self.pending.clear();
        self.outgoing = None;
        self.notify(|client, ctx| client.on_document_complete(ctx));
    }

    fn fail(&mut self, error: LoaderError) -> LoaderError {
        if !matches!(self.state, LoaderState::Failed(_)) {
            error!("加载失败 {}: {}", self.document.url, error);
            self.state = LoaderState::Failed(error.to_string());
            self.pending.clear();
            self.outgoing = None;
            self.client.on_load_failed(&error);
        }
        error
    }

    fn notify<F>(&mut self, f: F)
    where
        F: FnOnce(&mut C, &mut ConsumerContext<'_>),
    {
        let mut ctx = ConsumerContext::new(
            &self.store,
            &mut self.pending,
            self.document.total_size,
            self.state.is_partial(),
        );
        f(&mut self.client, &mut ctx);
    }

    pub fn is_document_complete(&self) -> bool {
        let total = self.document.total_size;
        total > 0 && self.store.is_range_available(0, total)
    }

    pub fn is_data_available(&self, offset: u64, size: u64) -> bool {
        self.store.is_range_available(offset, size)
    }

    pub fn get_block(&self, offset: u64, buf: &mut [u8]) -> bool {
        self.store.read_data(offset, buf)
    }

    /// 已可用的字节数；大小未知时为已收到的字节数
    pub fn available_byte_count(&self) -> u64 {
        if self.document.total_size == 0 {
            self.cursor.current_pos
        } else {
            self.store.available_bytes()
        }
    }

    pub fn state(&self) -> &LoaderState {
        &self.state
    }

    pub fn document(&self) -> &DocumentInfo {
        &self.document
    }

    pub fn document_size(&self) -> u64 {
        self.document.total_size
    }

    pub fn url(&self) -> &str {
        &self.document.url
    }

    pub fn is_partial_document(&self) -> bool {
        self.partial_document
    }

    pub fn requests_issued(&self) -> u32 {
        self.requests_count
    }

    pub fn pending_requests(&self) -> Vec<PendingRequest> {
        self.pending.iter().copied().collect()
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    pub fn snapshot(&self) -> LoaderSnapshot {
        LoaderSnapshot {
            state: self.state.clone(),
            total_size: self.document.total_size,
            available: self.available_byte_count(),
            partial: self.partial_document,
            requests_issued: self.requests_count,
            pending_requests: self.pending.len(),
            speed: self.meter.speed(),
        }
    }
}
