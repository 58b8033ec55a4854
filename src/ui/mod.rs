mod progress;

use serde::Serialize;
use std::fmt;
pub use progress::ProgressManager;

pub fn print_success(message: &str) {
    println!("✓ {}", message);
}

pub fn print_error(message: &str) {
    eprintln!("✗ {}", message);
}

/// 一次加载的摘要
#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub url: String,
    /// 文档完整时保存的路径
    pub output: Option<String>,
    pub total_size: u64,
    pub available: u64,
    pub requests_issued: u32,
    pub partial: bool,
    pub complete: bool,
    pub elapsed_secs: f64,
}

impl fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n加载摘要:")?;
        writeln!(f, "URL: {}", self.url)?;
        writeln!(f, "文档大小: {}", format_size(self.total_size))?;
        writeln!(f, "已获取: {}", format_size(self.available))?;
        writeln!(f, "加载方式: {}", if self.partial { "分段" } else { "整体" })?;
        writeln!(f, "请求数: {}", self.requests_issued)?;
        writeln!(f, "耗时: {:.2}秒", self.elapsed_secs)?;
        match &self.output {
            Some(path) => writeln!(f, "保存到: {}", path)?,
            None => writeln!(f, "文档未完整下载，未保存")?,
        }
        Ok(())
    }
}

pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}
