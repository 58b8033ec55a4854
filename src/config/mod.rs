use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use crate::core::error::LoaderError;
use crate::core::request_sizer::{
    RequestSizer, DEFAULT_BASE_REQUEST_SIZE, DEFAULT_MAX_REQUEST_COUNT, DEFAULT_REQUESTS_PER_STEP,
};

/// 文档大小不超过该值时整体下载
pub const DEFAULT_MIN_PARTIAL_SIZE: u64 = 64 * 1024;

/// 配置结构体
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// User-Agent
    pub user_agent: String,
    /// 网络超时时间（秒）
    pub timeout: u64,
    /// 分段加载的最小文档大小（字节）
    pub min_partial_size: u64,
    /// 前几次请求的大小（字节）
    pub base_request_size: u64,
    /// 每发出多少个请求，请求大小翻倍
    pub requests_per_step: u32,
    /// 超过该请求数后请求大小不再增长
    pub max_request_count: u32,
    /// 接受的内容类型后缀，为空时接受任何类型
    pub accepted_content_types: Vec<String>,
    /// 空闲时是否在后台继续下载剩余部分
    pub background_fill: bool,
    /// 默认输出目录
    pub output_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: format!("rangedown/{}", env!("CARGO_PKG_VERSION")),
            timeout: 30,
            min_partial_size: DEFAULT_MIN_PARTIAL_SIZE,
            base_request_size: DEFAULT_BASE_REQUEST_SIZE,
            requests_per_step: DEFAULT_REQUESTS_PER_STEP,
            max_request_count: DEFAULT_MAX_REQUEST_COUNT,
            accepted_content_types: ["/pdf", ".pdf", "/x-pdf", "/*", "/acrobat", "/unknown"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            background_fill: true,
            output_dir: "./downloads".to_string(),
        }
    }
}

impl Config {
    /// 加载配置文件
    pub fn load(path: &str) -> Result<Self, LoaderError> {
        if Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            match toml::from_str(&content) {
                Ok(config) => Ok(config),
                Err(e) => {
                    log::warn!("配置文件格式错误: {}，将使用默认配置", e);
                    let config = Config::default();
                    Config::save_with_tutorial(&config, path)?;
                    Ok(config)
                }
            }
        } else {
            let config = Config::default();
            Config::save_with_tutorial(&config, path)?;
            Ok(config)
        }
    }

    /// 保存带教程的配置文件
    pub fn save_with_tutorial(&self, path: &str) -> Result<(), LoaderError> {
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        let config_content = toml::to_string_pretty(self)
            .map_err(|e| LoaderError::Config(format!("无法序列化配置: {}", e)))?;
        let full_content = format!("{}\n{}", Config::generate_tutorial_content(), config_content);
        fs::write(path, full_content)?;
        Ok(())
    }

    /// 配置文件开头的说明，全部为注释
    fn generate_tutorial_content() -> String {
        r#"# rangedown 配置文件
# ====================
#
# 这是一个 TOML 格式的配置文件，用于配置 rangedown 渐进式文档加载器。
#
# 配置文件位置：
# - Windows: %APPDATA%/rangedown/rangedown.conf
# - macOS: ~/Library/Application Support/rangedown/rangedown.conf
# - Linux: ~/.config/rangedown/rangedown.conf
#
# 命令行参数会覆盖配置文件中的设置，优先级：命令行 > 配置文件 > 默认值
#
# 使用示例：
#   rangedown https://example.com/doc.pdf                       # 下载整个文档
#   rangedown -r 0:1024 -r 900000:4096 https://example.com/doc.pdf   # 优先获取指定范围
#   rangedown --no-background -r 0:1024 https://example.com/doc.pdf  # 只获取指定范围
#   rangedown -e                                                # 编辑配置文件
#
# ==================== 配置项说明 ====================
#
# user_agent              请求使用的 User-Agent
# timeout                 网络超时时间（秒）
# min_partial_size        文档大小超过该值且服务器支持 Range 时才分段加载（字节）
# base_request_size       前几次请求的大小（字节），之后逐步翻倍
# requests_per_step       每发出多少个请求，请求大小翻倍一次
# max_request_count       超过该请求数后请求大小不再增长
#                         默认值下单个请求最大为 32KB * 64 = 2MB
# accepted_content_types  接受的 Content-Type 后缀，为空时接受任何类型
# background_fill         空闲时是否继续下载文档的剩余部分
# output_dir              未指定 -o 时文档保存的目录
#
# ==================== 故障排除 ====================
#
# 问题：提示不支持的内容类型
# 解决：在 accepted_content_types 中加入对应后缀，或使用 --any-type
#
# 问题：小范围读取也很慢
# 解决：减小 base_request_size
#
# 问题：请求次数过多
# 解决：增大 base_request_size 或减小 requests_per_step
"#
        .to_string()
    }

    /// 校验配置合法性
    pub fn validate(&self) -> Result<(), LoaderError> {
        if self.timeout == 0 {
            return Err(LoaderError::Config("超时时间必须大于0".to_string()));
        }

        if self.base_request_size == 0 {
            return Err(LoaderError::Config("请求大小必须大于0".to_string()));
        }

        if self.requests_per_step == 0 {
            return Err(LoaderError::Config("requests_per_step 必须大于0".to_string()));
        }

        if self.max_request_count < self.requests_per_step {
            return Err(LoaderError::Config(
                "max_request_count 不能小于 requests_per_step".to_string(),
            ));
        }

        // 翻倍后不能溢出
        let doublings = (self.max_request_count - 1) / self.requests_per_step;
        if self.base_request_size.checked_shl(doublings).map_or(true, |v| v >> doublings != self.base_request_size) {
            return Err(LoaderError::Config("最大请求大小溢出".to_string()));
        }

        if self.output_dir.is_empty() {
            return Err(LoaderError::Config("输出目录不能为空".to_string()));
        }

        Ok(())
    }

    /// 合并命令行参数到配置
    pub fn merge_from_args(&mut self, args: &crate::cli::Args) {
        if let Some(timeout) = args.timeout {
            self.timeout = timeout;
        }

        if args.any_type {
            self.accepted_content_types.clear();
        }

        if args.no_background {
            self.background_fill = false;
        }
    }

    pub fn request_sizer(&self) -> RequestSizer {
        RequestSizer::new(self.base_request_size, self.requests_per_step, self.max_request_count)
    }

    /// 获取配置摘要信息
    pub fn get_summary(&self) -> String {
        format!(
            "配置摘要:\n\
            - 输出目录: {}\n\
            - 超时时间: {} 秒\n\
            - 分段阈值: {} 字节\n\
            - 请求大小: {} - {} 字节\n\
            - 内容类型: {}\n\
            - 后台下载: {}",
            self.output_dir,
            self.timeout,
            self.min_partial_size,
            self.base_request_size,
            self.request_sizer().max_request_size(),
            if self.accepted_content_types.is_empty() {
                "任意".to_string()
            } else {
                self.accepted_content_types.join(", ")
            },
            if self.background_fill { "启用" } else { "禁用" }
        )
    }
}
