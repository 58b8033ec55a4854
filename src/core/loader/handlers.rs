use actix::{Context, Handler, MessageResult};
use bytes::Bytes;

use crate::core::error::LoaderError;
use crate::core::range_store::ByteSpan;
use super::actor::LoaderActor;
use super::messages::*;
use super::network::NetworkClient;
use super::state::{LoaderState, Strategy};

impl<N: NetworkClient + 'static> Handler<StartLoad> for LoaderActor<N> {
    type Result = Result<(), LoaderError>;
    fn handle(&mut self, msg: StartLoad, ctx: &mut Context<Self>) -> Self::Result {
        let probe = self.loader.probe_request(&msg.url)?;
        log::info!("[loader {}] 开始加载 {}", self.id, msg.url);
        self.open_connection(ctx, probe);
        Ok(())
    }
}

impl<N: NetworkClient + 'static> Handler<RequestData> for LoaderActor<N> {
    type Result = ();
    fn handle(&mut self, msg: RequestData, ctx: &mut Context<Self>) {
        match self.loader.state() {
            LoaderState::Uninitialized | LoaderState::HeaderPending => {
                self.defer_request(ByteSpan::new(msg.offset, msg.size));
            }
            _ => {
                self.loader.request_data(msg.offset, msg.size);
                self.pump(ctx);
            }
        }
    }
}

impl<N: NetworkClient + 'static> Handler<IsDataAvailable> for LoaderActor<N> {
    type Result = bool;
    fn handle(&mut self, msg: IsDataAvailable, _ctx: &mut Context<Self>) -> bool {
        self.loader.is_data_available(msg.offset, msg.size)
    }
}

impl<N: NetworkClient + 'static> Handler<GetBlock> for LoaderActor<N> {
    type Result = Option<Bytes>;
    fn handle(&mut self, msg: GetBlock, _ctx: &mut Context<Self>) -> Option<Bytes> {
        if !self.loader.is_data_available(msg.offset, msg.size) {
            return None;
        }
        let size = usize::try_from(msg.size).ok()?;
        let mut buf = vec![0u8; size];
        if self.loader.get_block(msg.offset, &mut buf) {
            Some(Bytes::from(buf))
        } else {
            None
        }
    }
}

impl<N: NetworkClient + 'static> Handler<GetAvailableByteCount> for LoaderActor<N> {
    type Result = u64;
    fn handle(&mut self, _msg: GetAvailableByteCount, _ctx: &mut Context<Self>) -> u64 {
        self.loader.available_byte_count()
    }
}

impl<N: NetworkClient + 'static> Handler<IsDocumentComplete> for LoaderActor<N> {
    type Result = bool;
    fn handle(&mut self, _msg: IsDocumentComplete, _ctx: &mut Context<Self>) -> bool {
        self.loader.is_document_complete()
    }
}

impl<N: NetworkClient + 'static> Handler<ClearPendingRequests> for LoaderActor<N> {
    type Result = ();
    fn handle(&mut self, _msg: ClearPendingRequests, _ctx: &mut Context<Self>) {
        self.loader.clear_pending_requests();
    }
}

impl<N: NetworkClient + 'static> Handler<QuerySnapshot> for LoaderActor<N> {
    type Result = MessageResult<QuerySnapshot>;
    fn handle(&mut self, _msg: QuerySnapshot, _ctx: &mut Context<Self>) -> Self::Result {
        MessageResult(self.loader.snapshot())
    }
}

impl<N: NetworkClient + 'static> Handler<DidOpen> for LoaderActor<N> {
    type Result = ();
    fn handle(&mut self, msg: DidOpen, ctx: &mut Context<Self>) {
        if !self.is_current(msg.generation) {
            return;
        }
        if *self.loader.state() == LoaderState::HeaderPending {
            let url = self.loader.url().to_string();
            match self.loader.init(&url, &msg.head) {
                // 整体下载继续读取探测连接的正文
                Ok(Strategy::FullDownload) => {}
                Ok(Strategy::PartialDownload) => {
                    self.cancel_connection(ctx);
                    self.replay_early_requests();
                    self.pump(ctx);
                }
                Err(_) => self.cancel_connection(ctx),
            }
            return;
        }
        if self.loader.did_open(&msg.head).is_err() {
            self.cancel_connection(ctx);
        }
    }
}

impl<N: NetworkClient + 'static> Handler<DidRead> for LoaderActor<N> {
    type Result = ();
    fn handle(&mut self, msg: DidRead, ctx: &mut Context<Self>) {
        if !self.is_current(msg.generation) {
            return;
        }
        self.loader.did_read(msg.chunk);
        // 回调中追加的请求要等当前连接结束
        if self.loader.state().is_terminal() {
            self.pump(ctx);
        }
    }
}

impl<N: NetworkClient + 'static> Handler<ReadComplete> for LoaderActor<N> {
    type Result = ();
    fn handle(&mut self, msg: ReadComplete, ctx: &mut Context<Self>) {
        if !self.is_current(msg.generation) {
            return;
        }
        self.connection_finished();
        self.loader.read_complete();
        self.pump(ctx);
    }
}

impl<N: NetworkClient + 'static> Handler<ConnectionFailed> for LoaderActor<N> {
    type Result = ();
    fn handle(&mut self, msg: ConnectionFailed, ctx: &mut Context<Self>) {
        if !self.is_current(msg.generation) {
            return;
        }
        self.connection_finished();
        if *self.loader.state() == LoaderState::HeaderPending {
            self.loader.open_failed(msg.error);
        } else {
            self.loader.read_failed(msg.error);
        }
        self.pump(ctx);
    }
}
