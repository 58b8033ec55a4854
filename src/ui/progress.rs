use std::time::{Duration, Instant};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const PROGRESS_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

// 结构体：ProgressManager
// 用于显示文档的加载进度
pub struct ProgressManager {
    bar: ProgressBar,
    last_update: Option<Instant>,
}

impl ProgressManager {
    // 构造函数：hidden 为 true 时不绘制（例如 --json 输出）
    pub fn new(hidden: bool) -> Self {
        let bar = ProgressBar::new(0);
        if hidden {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner} [{bar:40}] {bytes}/{total_bytes} {bytes_per_sec} {msg}",
        ) {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar, last_update: None }
    }

    // 文档大小确定后设置进度条长度
    pub fn set_total(&self, total: u64) {
        if total > 0 {
            self.bar.set_length(total);
        }
    }

    // 方法：更新进度，过于频繁的更新会被忽略
    pub fn update_progress(&mut self, available: u64, total: u64) {
        let now = Instant::now();
        if let Some(last) = self.last_update {
            if now.duration_since(last) < PROGRESS_UPDATE_INTERVAL && available < total {
                return;
            }
        }
        self.last_update = Some(now);
        self.set_total(total);
        self.bar.set_position(available);

        let percentage = if total > 0 {
            (available as f64 / total as f64 * 100.0) as u32
        } else {
            0
        };
        self.bar.set_message(format!("{}%", percentage));
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_progress_updates() {
        let mut progress = ProgressManager::new(true);
        progress.update_progress(10, 100);
        assert_eq!(progress.bar.length(), Some(100));
        assert_eq!(progress.bar.position(), 10);

        // 节流期间的更新被忽略，完成时的更新总会生效
        progress.update_progress(20, 100);
        assert_eq!(progress.bar.position(), 10);
        progress.update_progress(100, 100);
        assert_eq!(progress.bar.position(), 100);
        progress.finish("完成");
    }
}
