//! 已下载字节的稀疏存储与区间查询
//!
//! 已到达的字节用有序、互不重叠且互不相邻的 `[start, end)` 区间记录，
//! 以 `BTreeMap<start, end>` 保存，所有查询都是对数复杂度的范围查找。

use std::collections::BTreeMap;
use std::ops::Bound;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::core::error::{LoaderError, LoaderResult};

/// 一段字节范围 `[offset, offset + size)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteSpan {
    pub offset: u64,
    pub size: u64,
}

impl ByteSpan {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }
}

/// 已下载字节的存储
#[derive(Debug, Default)]
pub struct ByteRangeStore {
    data: Vec<u8>,
    /// 预分配后的固定容量（文档总大小）
    capacity: Option<u64>,
    ranges: BTreeMap<u64, u64>,
    /// 总大小未知时按到达顺序暂存的数据块
    pending_chunks: Vec<Bytes>,
    pending_len: u64,
}

impl ByteRangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按文档总大小预留存储，0 表示大小未知，不做任何事
    ///
    /// 大小来自服务器的响应头，无法分配时返回错误而不是中止进程。
    pub fn preallocate(&mut self, total_size: u64) -> LoaderResult<()> {
        if total_size == 0 {
            return Ok(());
        }
        let len = usize::try_from(total_size).map_err(|_| LoaderError::DocumentTooLarge(total_size))?;
        let additional = len.saturating_sub(self.data.len());
        self.data
            .try_reserve_exact(additional)
            .map_err(|_| LoaderError::DocumentTooLarge(total_size))?;
        self.data.resize(len, 0);
        self.capacity = Some(total_size);
        Ok(())
    }

    /// 预分配的容量，未预分配时为当前已写入的长度
    pub fn capacity(&self) -> u64 {
        self.capacity.unwrap_or(self.data.len() as u64)
    }

    /// 在 `offset` 处写入数据并合并区间，重复写入同一范围是安全的
    pub fn write_data(&mut self, offset: u64, bytes: &[u8]) -> LoaderResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let size = bytes.len() as u64;
        let end = offset.checked_add(size).ok_or(LoaderError::OutOfBounds {
            offset,
            size,
            capacity: self.capacity(),
        })?;
        if let Some(capacity) = self.capacity {
            if end > capacity {
                return Err(LoaderError::OutOfBounds { offset, size, capacity });
            }
        } else if end > self.data.len() as u64 {
            self.data.resize(end as usize, 0);
        }
        self.data[offset as usize..end as usize].copy_from_slice(bytes);
        self.merge_range(offset, end);
        Ok(())
    }

    fn merge_range(&mut self, offset: u64, end: u64) {
        let mut start = offset;
        let mut stop = end;

        if let Some((&s, &e)) = self.ranges.range(..=offset).next_back() {
            if e >= offset {
                start = s;
                stop = stop.max(e);
            }
        }

        let touching: Vec<u64> = self
            .ranges
            .range(offset..=stop)
            .map(|(&s, _)| s)
            .collect();
        for s in touching {
            if let Some(e) = self.ranges.remove(&s) {
                stop = stop.max(e);
            }
        }

        self.ranges.insert(start, stop);
    }

    /// `[offset, offset + size)` 是否完全被一个已存储区间覆盖
    pub fn is_range_available(&self, offset: u64, size: u64) -> bool {
        if size == 0 {
            return true;
        }
        let end = match offset.checked_add(size) {
            Some(end) => end,
            None => return false,
        };
        match self.ranges.range(..=offset).next_back() {
            Some((_, &e)) => end <= e,
            None => false,
        }
    }

    /// 返回 `[offset, offset + size)` 中缺失的最大子区间，按顺序排列
    pub fn missed_ranges(&self, offset: u64, size: u64) -> Vec<ByteSpan> {
        let end = offset.saturating_add(size);
        let mut missed = Vec::new();
        if size == 0 {
            return missed;
        }

        let first = self
            .ranges
            .range(..=offset)
            .next_back()
            .map(|(&s, _)| s)
            .unwrap_or(offset);

        let mut cursor = offset;
        for (&s, &e) in self.ranges.range(first..end) {
            if e <= cursor {
                continue;
            }
            if s > cursor {
                missed.push(ByteSpan::new(cursor, s - cursor));
            }
            cursor = e;
            if cursor >= end {
                break;
            }
        }
        if cursor < end {
            missed.push(ByteSpan::new(cursor, end - cursor));
        }
        missed
    }

    /// 第一个尚未到达的字节偏移
    pub fn first_missing_byte(&self) -> u64 {
        match self.ranges.iter().next() {
            Some((&0, &e)) => e,
            _ => 0,
        }
    }

    /// `pos` 之前（含起点等于 `pos`）最近区间的结束位置，没有则为 0
    pub fn last_byte_before(&self, pos: u64) -> u64 {
        self.ranges
            .range(..=pos)
            .next_back()
            .map(|(_, &e)| e)
            .unwrap_or(0)
    }

    /// `pos` 之后第一个区间的起点，没有则为存储容量
    pub fn first_byte_after(&self, pos: u64) -> u64 {
        self.ranges
            .range((Bound::Excluded(pos), Bound::Unbounded))
            .next()
            .map(|(&s, _)| s)
            .unwrap_or_else(|| self.capacity())
    }

    /// 范围未完全可用时返回 false，否则拷贝到 `buf`
    pub fn read_data(&self, offset: u64, buf: &mut [u8]) -> bool {
        let size = buf.len() as u64;
        if !self.is_range_available(offset, size) {
            return false;
        }
        let start = offset as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        true
    }

    /// 已到达的字节总数
    pub fn available_bytes(&self) -> u64 {
        self.ranges.iter().map(|(s, e)| e - s).sum()
    }

    /// 已存储区间的个数
    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    /// 总大小未知时追加一块顺序到达的数据
    pub fn append_chunk(&mut self, chunk: Bytes) {
        self.pending_len += chunk.len() as u64;
        self.pending_chunks.push(chunk);
    }

    pub fn pending_len(&self) -> u64 {
        self.pending_len
    }

    /// 总大小确定后，把暂存的数据块拼接进连续存储，返回总大小
    pub fn assemble(&mut self) -> LoaderResult<u64> {
        let total = self.pending_len;
        self.preallocate(total)?;
        let mut pos = 0u64;
        for chunk in std::mem::take(&mut self.pending_chunks) {
            self.write_data(pos, &chunk)?;
            pos += chunk.len() as u64;
        }
        self.pending_len = 0;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn store_with(total: u64, spans: &[(u64, u64)]) -> ByteRangeStore {
        let mut store = ByteRangeStore::new();
        assert_ok!(store.preallocate(total));
        for &(offset, size) in spans {
            assert_ok!(store.write_data(offset, &vec![7u8; size as usize]));
        }
        store
    }

    #[test]
    fn test_union_available_in_any_order() {
        let a = store_with(100, &[(0, 40), (40, 60)]);
        let b = store_with(100, &[(40, 60), (0, 40)]);
        assert!(a.is_range_available(0, 100));
        assert!(b.is_range_available(0, 100));
        assert_eq!(a.range_count(), 1);
        assert_eq!(b.range_count(), 1);
    }

    #[test]
    fn test_write_merges_overlapping_ranges() {
        let store = store_with(100, &[(10, 10), (30, 10), (50, 10), (15, 40)]);
        assert_eq!(store.range_count(), 1);
        assert!(store.is_range_available(10, 50));
        assert!(!store.is_range_available(9, 2));
        assert_eq!(store.available_bytes(), 50);
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let mut store = store_with(50, &[(0, 20)]);
        assert_ok!(store.write_data(5, &[7u8; 10]));
        assert_eq!(store.range_count(), 1);
        assert_eq!(store.available_bytes(), 20);
    }

    #[test]
    fn test_missed_ranges_after_full_write_is_empty() {
        let store = store_with(1000, &[(100, 200)]);
        assert!(store.missed_ranges(100, 200).is_empty());
        assert!(store.missed_ranges(150, 10).is_empty());
    }

    #[test]
    fn test_missed_ranges_are_ordered_and_maximal() {
        let store = store_with(100, &[(10, 10), (40, 10)]);
        let missed = store.missed_ranges(0, 100);
        assert_eq!(
            missed,
            vec![ByteSpan::new(0, 10), ByteSpan::new(20, 20), ByteSpan::new(50, 50)]
        );

        let missed = store.missed_ranges(15, 30);
        assert_eq!(missed, vec![ByteSpan::new(20, 20)]);
    }

    #[test]
    fn test_boundary_queries() {
        let store = store_with(100, &[(0, 10), (40, 10)]);
        assert_eq!(store.first_missing_byte(), 10);
        assert_eq!(store.last_byte_before(25), 10);
        assert_eq!(store.first_byte_after(25), 40);
        assert_eq!(store.first_byte_after(45), 100);
        assert_eq!(store.last_byte_before(60), 50);

        let empty = store_with(100, &[]);
        assert_eq!(empty.first_missing_byte(), 0);
        assert_eq!(empty.last_byte_before(60), 0);
        assert_eq!(empty.first_byte_after(60), 100);

        let tail = store_with(100, &[(30, 10)]);
        assert_eq!(tail.first_missing_byte(), 0);
    }

    #[test]
    fn test_read_data_requires_availability() {
        let mut store = ByteRangeStore::new();
        assert_ok!(store.preallocate(10));
        assert_ok!(store.write_data(2, b"abcd"));

        let mut buf = [0u8; 4];
        assert!(store.read_data(2, &mut buf));
        assert_eq!(&buf, b"abcd");

        let mut buf = [0u8; 5];
        assert!(!store.read_data(2, &mut buf));
    }

    #[test]
    fn test_out_of_bounds_write_is_rejected_when_size_known() {
        let mut store = ByteRangeStore::new();
        assert_ok!(store.preallocate(10));
        let err = assert_err!(store.write_data(8, b"abcd"));
        assert!(matches!(err, LoaderError::OutOfBounds { offset: 8, size: 4, capacity: 10 }));
        assert_eq!(store.available_bytes(), 0);
    }

    #[test]
    fn test_oversized_preallocation_is_rejected() {
        let mut store = ByteRangeStore::new();
        let err = assert_err!(store.preallocate(u64::MAX));
        assert!(matches!(err, LoaderError::DocumentTooLarge(u64::MAX)));
        assert_eq!(store.capacity(), 0);
        assert_eq!(store.available_bytes(), 0);
    }

    #[test]
    fn test_write_extends_storage_when_size_unknown() {
        let mut store = ByteRangeStore::new();
        assert_ok!(store.write_data(4, b"tail"));
        assert_eq!(store.capacity(), 8);
        assert!(store.is_range_available(4, 4));
        assert!(!store.is_range_available(0, 1));
    }

    #[test]
    fn test_assemble_pending_chunks() {
        let mut store = ByteRangeStore::new();
        assert_ok!(store.preallocate(0));
        assert_eq!(store.capacity(), 0);
        store.append_chunk(Bytes::from_static(b"hello "));
        store.append_chunk(Bytes::from_static(b"world"));
        assert_eq!(store.pending_len(), 11);

        let total = assert_ok!(store.assemble());
        assert_eq!(total, 11);
        let mut buf = [0u8; 11];
        assert!(store.read_data(0, &mut buf));
        assert_eq!(&buf, b"hello world");
        assert_eq!(store.pending_len(), 0);
    }
}
