use anyhow::{Context, Result};
use crate::core::range_store::ByteSpan;

/// 只接受 http 和 https
pub fn is_valid_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some(),
        Err(_) => false,
    }
}

/// 解析 `offset:size` 形式的范围
pub fn parse_range_spec(spec: &str) -> Result<ByteSpan> {
    let (offset, size) = spec
        .split_once(':')
        .with_context(|| format!("范围格式应为 offset:size: {}", spec))?;
    let offset: u64 = offset.trim().parse().with_context(|| format!("无效的偏移: {}", offset))?;
    let size: u64 = size.trim().parse().with_context(|| format!("无效的长度: {}", size))?;
    if size == 0 {
        anyhow::bail!("范围长度必须大于0");
    }
    offset
        .checked_add(size)
        .with_context(|| format!("范围溢出: {}", spec))?;
    Ok(ByteSpan::new(offset, size))
}

pub fn validate_output_path(path: &str) -> Result<()> {
    if path.is_empty() {
        anyhow::bail!("输出路径不能为空");
    }
    if std::path::Path::new(path).is_dir() {
        anyhow::bail!("输出路径是一个目录: {}", path);
    }
    Ok(())
}
