//! HTTP 响应头解析：文档信息、Content-Range 与 multipart 边界

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::error::LoaderError;

/// 响应头列表，名称大小写不敏感
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    entries: Vec<(String, String)>,
}

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// 解析以换行分隔的 `Name: value` 头部文本，忽略无法识别的行
    pub fn parse(raw: &str) -> Self {
        let entries = raw
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                let name = name.trim();
                if name.is_empty() || name.contains(' ') {
                    return None;
                }
                Some((name.to_string(), value.trim().to_string()))
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// 响应状态行与头部
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: ResponseHeaders,
}

impl ResponseHead {
    pub fn new(status: u16, headers: ResponseHeaders) -> Self {
        Self { status, headers }
    }

    /// 非 2xx 状态对应的错误
    pub fn status_error(&self) -> Option<LoaderError> {
        LoaderError::from_status(self.status)
    }
}

/// `Content-Range: bytes <start>-<end>/<total>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: Option<u64>,
}

impl ContentRange {
    /// 服务器声明的字节数，end 不大于 start 时无法确定
    pub fn len(&self) -> Option<u64> {
        if self.end > self.start {
            Some(self.end - self.start + 1)
        } else {
            None
        }
    }
}

fn content_range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*bytes[\s=]*(\d+)\s*(?:-\s*(\d+)?)?(?:\s*/\s*(\d+|\*))?")
            .expect("content-range pattern is valid")
    })
}

/// 解析 Content-Range 头的值
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let caps = content_range_regex().captures(value)?;
    let start = caps.get(1)?.as_str().parse().ok()?;
    let end = caps
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    let total = caps.get(3).and_then(|m| m.as_str().parse().ok());
    Some(ContentRange { start, end, total })
}

/// 在头部中查找并解析 Content-Range
pub fn byte_range(headers: &ResponseHeaders) -> Option<ContentRange> {
    headers.get("content-range").and_then(parse_content_range)
}

/// multipart 响应的边界字符串，非 multipart 时返回 None
pub fn multipart_boundary(headers: &ResponseHeaders) -> Option<String> {
    let content_type = headers.get("content-type")?.to_ascii_lowercase();
    if !content_type.starts_with("multipart/") {
        return None;
    }
    let idx = content_type.find("boundary=")?;
    let boundary = content_type[idx + "boundary=".len()..]
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches('"');
    Some(boundary.to_string())
}

/// 在 multipart 的第一块数据中查找头部与正文的分隔（`\n\n` 或 `\r\n\r\n`），
/// 返回正文开始的位置
pub fn find_part_body(chunk: &[u8]) -> Option<usize> {
    (2..=chunk.len()).find(|&i| {
        (chunk[i - 1] == b'\n' && chunk[i - 2] == b'\n')
            || (i >= 4 && &chunk[i - 4..i] == b"\r\n\r\n")
    })
}

/// 初次响应中得到的文档信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub url: String,
    /// 0 表示大小未知
    pub total_size: u64,
    pub accepts_ranges: bool,
    pub content_encoded: bool,
    pub content_type: String,
    pub disposition: String,
}

impl DocumentInfo {
    pub fn from_headers(url: &str, headers: &ResponseHeaders) -> Self {
        let content_type = headers
            .get("content-type")
            .map(|v| v.split(';').next().unwrap_or_default().trim().to_string())
            .unwrap_or_default();
        Self {
            url: url.to_string(),
            total_size: headers
                .get("content-length")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(0),
            accepts_ranges: headers
                .get("accept-ranges")
                .map(|v| v.eq_ignore_ascii_case("bytes"))
                .unwrap_or(false),
            content_encoded: headers.contains("content-encoding"),
            content_type,
            disposition: headers.get("content-disposition").unwrap_or_default().to_string(),
        }
    }

    /// 内容类型为空或以允许的后缀结尾；允许列表为空时接受任何类型
    pub fn is_accepted_type(&self, accepted: &[String]) -> bool {
        if self.content_type.is_empty() || accepted.is_empty() {
            return true;
        }
        let content_type = self.content_type.to_ascii_lowercase();
        accepted
            .iter()
            .any(|suffix| content_type.ends_with(&suffix.to_ascii_lowercase()))
    }

    pub fn is_attachment(&self) -> bool {
        self.disposition
            .get(.."attachment".len())
            .map(|p| p.eq_ignore_ascii_case("attachment"))
            .unwrap_or(false)
    }

    /// 检查文档能否被加载
    pub fn check(&self, accepted: &[String]) -> Result<(), LoaderError> {
        if !self.is_accepted_type(accepted) {
            return Err(LoaderError::UnsupportedContentType(self.content_type.clone()));
        }
        if self.is_attachment() {
            return Err(LoaderError::AttachmentDisposition(self.disposition.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted() -> Vec<String> {
        ["/pdf", ".pdf", "/x-pdf", "/*", "/acrobat", "/unknown"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_parse_raw_headers() {
        let headers = ResponseHeaders::parse(
            "HTTP/1.1 200 OK\r\nContent-Length: 1000\r\nAccept-Ranges: bytes\r\n\r\n",
        );
        assert_eq!(headers.get("content-length"), Some("1000"));
        assert_eq!(headers.get("ACCEPT-RANGES"), Some("bytes"));
        assert!(!headers.contains("content-type"));
    }

    #[test]
    fn test_parse_content_range() {
        let range = parse_content_range("bytes 0-99/1000").unwrap();
        assert_eq!(range, ContentRange { start: 0, end: 99, total: Some(1000) });
        assert_eq!(range.len(), Some(100));

        let range = parse_content_range("Bytes  200-299/*").unwrap();
        assert_eq!(range, ContentRange { start: 200, end: 299, total: None });

        let range = parse_content_range("bytes 5-").unwrap();
        assert_eq!(range.len(), None);

        assert!(parse_content_range("items 0-1/2").is_none());
        assert!(parse_content_range("bytes */1000").is_none());
    }

    #[test]
    fn test_multipart_boundary() {
        let headers = ResponseHeaders::from_pairs([(
            "Content-Type",
            "multipart/byteranges; boundary=xyz",
        )]);
        assert_eq!(multipart_boundary(&headers), Some("xyz".to_string()));

        let headers = ResponseHeaders::from_pairs([("Content-Type", "application/pdf")]);
        assert_eq!(multipart_boundary(&headers), None);
    }

    #[test]
    fn test_find_part_body() {
        let chunk = b"--xyz\r\nContent-Range: bytes 0-3/10\r\n\r\nDATA";
        let body = find_part_body(chunk).unwrap();
        assert_eq!(&chunk[body..], b"DATA");

        let chunk = b"--xyz\nContent-Range: bytes 0-3/10\n\nDATA";
        let body = find_part_body(chunk).unwrap();
        assert_eq!(&chunk[body..], b"DATA");

        assert!(find_part_body(b"no separator here").is_none());
    }

    #[test]
    fn test_document_info_from_headers() {
        let headers = ResponseHeaders::from_pairs([
            ("Content-Length", "2000000"),
            ("Accept-Ranges", "bytes"),
            ("Content-Type", "application/pdf; charset=binary"),
        ]);
        let info = DocumentInfo::from_headers("http://example.com/a.pdf", &headers);
        assert_eq!(info.total_size, 2_000_000);
        assert!(info.accepts_ranges);
        assert!(!info.content_encoded);
        assert_eq!(info.content_type, "application/pdf");
        assert!(info.check(&accepted()).is_ok());
    }

    #[test]
    fn test_document_rejections() {
        let headers = ResponseHeaders::from_pairs([("Content-Type", "text/html")]);
        let info = DocumentInfo::from_headers("http://example.com/", &headers);
        assert!(matches!(info.check(&accepted()), Err(LoaderError::UnsupportedContentType(_))));
        assert!(info.check(&[]).is_ok());

        let headers = ResponseHeaders::from_pairs([
            ("Content-Type", "application/pdf"),
            ("Content-Disposition", "Attachment; filename=a.pdf"),
        ]);
        let info = DocumentInfo::from_headers("http://example.com/a.pdf", &headers);
        assert!(matches!(info.check(&accepted()), Err(LoaderError::AttachmentDisposition(_))));
    }
}
