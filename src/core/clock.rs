use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// 时间来源，由需要计时的组件持有
pub trait Clock {
    fn now(&self) -> Instant;
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// 手动推进的时钟，用于测试
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { now: Rc::new(Cell::new(Instant::now())) }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

/// 传输计量：统计收到的字节数并计算平均速度
pub struct TransferMeter {
    clock: Rc<dyn Clock>,
    started_at: Option<Instant>,
    bytes: u64,
}

impl TransferMeter {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self { clock, started_at: None, bytes: 0 }
    }

    pub fn record(&mut self, bytes: u64) {
        if self.started_at.is_none() {
            self.started_at = Some(self.clock.now());
        }
        self.bytes += bytes;
    }

    pub fn elapsed(&self) -> Duration {
        match self.started_at {
            Some(start) => self.clock.now().saturating_duration_since(start),
            None => Duration::ZERO,
        }
    }

    /// 平均速度 (B/s)
    pub fn speed(&self) -> u64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            (self.bytes as f64 / secs) as u64
        } else {
            0
        }
    }
}
