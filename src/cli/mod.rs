//! CLI: 命令行接口和参数解析模块
//!
//! ## 主要功能
//!
//! - 命令行参数解析和验证
//! - 配置文件路径管理
//! - 平台特定的路径处理
//! - 配置文件编辑器集成
//!
//! ## 支持的命令
//!
//! - 下载文档：`rangedown <url>`
//! - 优先获取范围：`rangedown -r 0:1024 -r 900000:4096 <url>`
//! - 只获取指定范围：`rangedown --no-background -r 0:1024 <url>`
//! - 编辑配置：`rangedown -e`
//! - 指定配置：`rangedown -c config.conf <url>`
//!
//! ## 平台支持
//!
//! - Windows: `%APPDATA%/rangedown/rangedown.conf`
//! - macOS: `~/Library/Application Support/rangedown/rangedown.conf`
//! - Linux: `~/.config/rangedown/rangedown.conf`

use clap::Parser;
use std::env;
use std::path::{Path, PathBuf};
use crate::config::Config;
use crate::core::error::LoaderError;
use crate::core::range_store::ByteSpan;
use crate::utils::validator::{is_valid_url, parse_range_spec};

/// 获取平台默认配置文件路径
pub fn default_config_path() -> String {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        format!("{}/rangedown/rangedown.conf", appdata)
    }
    #[cfg(target_os = "macos")]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/Library/Application Support/rangedown/rangedown.conf", home)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/.config/rangedown/rangedown.conf", home)
    }
}

/// 打开配置文件编辑器
pub fn open_config_in_editor(config_path: &str) {
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("notepad").arg(config_path).status().ok();
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg("-e").arg(config_path).status().ok();
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        // 优先 xdg-open，否则 nano
        if std::process::Command::new("xdg-open").arg(config_path).status().is_err() {
            let _ = std::process::Command::new("nano").arg(config_path).status();
        }
    }
}

/// rangedown 命令行参数
///
/// 示例用法：
///   rangedown https://example.com/doc.pdf
///   rangedown -r 0:1024 https://example.com/doc.pdf
///   rangedown -e  # 编辑配置文件
///
/// 更多用法请加 --help 查看
#[derive(Parser, Debug, Clone)]
#[command(
    name = "rangedown",
    version = concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("VERGEN_BUILD_TIMESTAMP"), ")"),
    about = "按需分段下载远程文档的渐进式加载器",
    long_about = "先获取文档头部，再按需请求任意字节范围，空闲时在后台补全剩余部分。\n\n示例：\n  rangedown https://example.com/doc.pdf\n  rangedown -r 0:1024 -r 900000:4096 https://example.com/doc.pdf\n  rangedown --no-background -r 0:1024 https://example.com/doc.pdf\n  rangedown -e\n"
)]
pub struct Args {
    /// 文档 URL
    #[arg(required_unless_present = "edit_config", help = "要加载的文档 URL。")]
    pub url: Option<String>,

    /// 配置文件路径，默认为平台推荐路径
    #[arg(short = 'c', long, default_value_t = default_config_path(), help = "配置文件路径，默认为平台推荐路径。")]
    pub config: String,

    /// 编辑配置文件（-e 或 --edit）
    #[arg(short = 'e', long = "edit", help = "用系统默认编辑器打开配置文件并退出。")]
    pub edit_config: bool,

    /// 输出文件
    #[arg(short = 'o', long, help = "保存文档的路径，默认从 URL 推断文件名并放入配置的输出目录。")]
    pub output: Option<String>,

    /// 启动后立即请求的字节范围
    #[arg(short = 'r', long = "range", value_parser = parse_range_spec, help = "优先获取的范围，格式为 offset:size，可重复指定。")]
    pub ranges: Vec<ByteSpan>,

    /// 网络超时（秒）
    #[arg(short = 't', long, help = "网络超时时间（秒），覆盖配置文件中的设置。")]
    pub timeout: Option<u64>,

    /// 接受任何内容类型
    #[arg(long, help = "不检查 Content-Type。")]
    pub any_type: bool,

    /// 关闭后台下载
    #[arg(long, help = "只下载请求的范围，全部到达后退出。")]
    pub no_background: bool,

    /// 以 JSON 输出摘要
    #[arg(long, help = "以 JSON 格式输出加载摘要。")]
    pub json: bool,

    /// 日志详细程度
    #[arg(short = 'v', long, action = clap::ArgAction::Count, help = "输出更详细的日志，可重复指定。")]
    pub verbose: u8,
}

impl Args {
    /// 解析命令行；`-e` 时打开配置文件后直接退出
    pub fn parse_args() -> Result<Self, LoaderError> {
        let args = Args::parse();

        if args.edit_config {
            if !Path::new(&args.config).exists() {
                Config::default().save_with_tutorial(&args.config)?;
            }
            open_config_in_editor(&args.config);
            std::process::exit(0);
        }

        Ok(args)
    }

    /// 加载配置文件并合并命令行参数
    pub fn load_config(&self) -> Result<Config, LoaderError> {
        let mut config = Config::load(&self.config)
            .map_err(|e| LoaderError::Config(format!("无法读取配置文件: {}", e)))?;
        config.merge_from_args(self);
        config
            .validate()
            .map_err(|e| LoaderError::Config(format!("配置无效: {}", e)))?;
        Ok(config)
    }

    /// 校验后的 URL
    pub fn document_url(&self) -> Result<&str, LoaderError> {
        match self.url.as_deref() {
            Some(url) if is_valid_url(url) => Ok(url),
            Some(url) => Err(LoaderError::InvalidUrl(url.to_string())),
            None => Err(LoaderError::InvalidUrl("未提供 URL".to_string())),
        }
    }

    /// 文档保存路径
    pub fn output_path(&self, config: &Config) -> Result<PathBuf, LoaderError> {
        if let Some(output) = &self.output {
            return Ok(PathBuf::from(output));
        }
        let url = url::Url::parse(self.document_url()?)
            .map_err(|e| LoaderError::InvalidUrl(e.to_string()))?;
        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .unwrap_or("document.pdf");
        Ok(Path::new(&config.output_dir).join(file_name))
    }
}
