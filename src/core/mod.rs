//! Core: 字节范围存储、请求大小策略、渐进式加载器与错误处理等核心逻辑模块

pub mod clock;
pub mod error;
pub mod loader;
pub mod range_store;
pub mod request_sizer;

pub use error::{LoaderError, LoaderResult};
pub use range_store::{ByteRangeStore, ByteSpan};
pub use request_sizer::RequestSizer;
