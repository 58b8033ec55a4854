/// 下一次分段请求大小的计算策略
///
/// 前 `step` 个请求使用基础大小，此后每多 `step` 个请求大小翻倍，
/// 请求数达到 `max_count` 后不再增长。默认参数下从 32KB 增长到 2MB。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestSizer {
    pub base_size: u64,
    pub step: u32,
    pub max_count: u32,
}

pub const DEFAULT_BASE_REQUEST_SIZE: u64 = 32 * 1024;
pub const DEFAULT_REQUESTS_PER_STEP: u32 = 10;
pub const DEFAULT_MAX_REQUEST_COUNT: u32 = 70;

impl Default for RequestSizer {
    fn default() -> Self {
        Self {
            base_size: DEFAULT_BASE_REQUEST_SIZE,
            step: DEFAULT_REQUESTS_PER_STEP,
            max_count: DEFAULT_MAX_REQUEST_COUNT,
        }
    }
}

impl RequestSizer {
    pub fn new(base_size: u64, step: u32, max_count: u32) -> Self {
        Self { base_size, step, max_count }
    }

    /// 已发出 `requests_count` 个请求时下一个请求的字节数
    pub fn request_size(&self, requests_count: u32) -> u64 {
        let step = self.step.max(1);
        let limited = requests_count.max(step).min(self.max_count.max(step));
        self.base_size << ((limited - 1) / step)
    }

    /// 请求大小的上限
    pub fn max_request_size(&self) -> u64 {
        self.request_size(self.max_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_requests_use_base_size() {
        let sizer = RequestSizer::default();
        assert_eq!(sizer.request_size(0), 32 * 1024);
        assert_eq!(sizer.request_size(1), 32 * 1024);
        assert_eq!(sizer.request_size(10), 32 * 1024);
    }

    #[test]
    fn test_size_doubles_every_ten_requests() {
        let sizer = RequestSizer::default();
        assert_eq!(sizer.request_size(11), 64 * 1024);
        assert_eq!(sizer.request_size(20), 64 * 1024);
        assert_eq!(sizer.request_size(21), 128 * 1024);
        assert_eq!(sizer.request_size(61), 2 * 1024 * 1024);
    }

    #[test]
    fn test_size_is_monotonic_and_capped() {
        let sizer = RequestSizer::default();
        let mut previous = 0;
        for n in 1..500 {
            let size = sizer.request_size(n);
            assert!(size >= previous);
            assert!(size <= 2 * 1024 * 1024);
            previous = size;
        }
        assert_eq!(sizer.request_size(70), 2 * 1024 * 1024);
        assert_eq!(sizer.request_size(u32::MAX), 2 * 1024 * 1024);
        assert_eq!(sizer.max_request_size(), 2 * 1024 * 1024);
    }

    #[test]
    fn test_custom_policy() {
        let sizer = RequestSizer::new(1024, 2, 6);
        assert_eq!(sizer.request_size(1), 1024);
        assert_eq!(sizer.request_size(3), 2048);
        assert_eq!(sizer.request_size(5), 4096);
        assert_eq!(sizer.request_size(100), 4096);
    }
}
