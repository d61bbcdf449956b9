//! 搜索条件数据结构
//!
//! 本模块定义了一次搜索的全部过滤条件。条件在一次搜索期间不可变。

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::record::{ProtocolMask, MAX_HOSTNAME_LENGTH};

/// 文件名过滤作用于哪个名字
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NameField {
    #[default]
    Local,
    /// 远端文件名；记录没有远端名时回退到本地名
    Remote,
}

/// 文件大小比较方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeComparator {
    Equal,
    Less,
    Greater,
}

/// 文件大小过滤器
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeFilter {
    pub comparator: SizeComparator,
    pub value: f64,
}

impl SizeFilter {
    pub fn new(comparator: SizeComparator, value: u64) -> Self {
        Self {
            comparator,
            value: value as f64,
        }
    }

    /// 解析 `[=<>]大小` 形式的输入，省略比较符时为等于
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let (comparator, digits) = match text.as_bytes().first() {
            Some(b'=') => (SizeComparator::Equal, &text[1..]),
            Some(b'<') => (SizeComparator::Less, &text[1..]),
            Some(b'>') => (SizeComparator::Greater, &text[1..]),
            Some(_) => (SizeComparator::Equal, text),
            None => return Err(AppError::validation_error("empty file size filter")),
        };
        let value: u64 = digits.trim().parse().map_err(|_| {
            AppError::validation_error(format!(
                "file size must be given in bytes as [=<>]size, got '{}'",
                text
            ))
        })?;
        Ok(Self::new(comparator, value))
    }

    pub fn accepts(&self, size: f64) -> bool {
        match self.comparator {
            SizeComparator::Equal => size == self.value,
            SizeComparator::Less => size < self.value,
            SizeComparator::Greater => size > self.value,
        }
    }
}

/// 收件方过滤器：主机模式，可选用户模式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientFilter {
    pub host: String,
    pub user: Option<String>,
}

impl RecipientFilter {
    pub fn host(host: impl Into<String>) -> Self {
        Self {
            host: widen_host_pattern(host.into()),
            user: None,
        }
    }

    pub fn with_user(host: impl Into<String>, user: impl Into<String>) -> Self {
        let user = user.into();
        Self {
            host: widen_host_pattern(host.into()),
            user: if user.is_empty() { None } else { Some(user) },
        }
    }
}

/// 日志中的主机名被截断为固定宽度，满宽度的模式需要追加 `*`
fn widen_host_pattern(mut host: String) -> String {
    if host.len() == MAX_HOSTNAME_LENGTH {
        host.push('*');
    }
    host
}

/// 搜索条件
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchCriteria {
    /// 开始时间（Unix 秒，含）
    pub time_start: Option<u64>,
    /// 结束时间（Unix 秒，含）
    pub time_end: Option<u64>,
    /// 文件名通配模式
    pub name_glob: Option<String>,
    #[serde(default)]
    pub name_field: NameField,
    pub size: Option<SizeFilter>,
    #[serde(default)]
    pub recipients: Vec<RecipientFilter>,
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default)]
    pub protocol_mask: ProtocolMask,
}

impl SearchCriteria {
    /// 检查条件本身是否自洽
    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.time_start, self.time_end) {
            if start > end {
                return Err(AppError::validation_error(format!(
                    "start time {} is after end time {}",
                    start, end
                )));
            }
        }
        if matches!(self.name_glob.as_deref(), Some("")) {
            return Err(AppError::validation_error("empty file name pattern"));
        }
        if self.recipients.iter().any(|r| r.host.is_empty()) {
            return Err(AppError::validation_error("empty recipient pattern"));
        }
        if self.directories.iter().any(|d| d.is_empty()) {
            return Err(AppError::validation_error("empty directory pattern"));
        }
        Ok(())
    }

    /// 是否有谓词需要作业元数据关联
    pub fn needs_join(&self) -> bool {
        !self.directories.is_empty() || self.recipients.iter().any(|r| r.user.is_some())
    }

    /// 结束时间是否已经过去
    pub fn window_closed_at(&self, now: u64) -> bool {
        matches!(self.time_end, Some(end) if now > end)
    }

    /**
     * 解析逗号分隔的收件方输入，例如 `user@host, host2`
     *
     * 反斜杠转义下一个字符；`@` 之前为用户模式，之后为主机模式。
     */
    pub fn parse_recipients(text: &str) -> Vec<RecipientFilter> {
        let mut filters = Vec::new();
        let mut current = String::new();
        let mut user: Option<String> = None;
        let mut chars = text.chars();

        let mut flush = |current: &mut String, user: &mut Option<String>| {
            let host = current.trim().to_string();
            let user = user.take().map(|u| u.trim().to_string());
            if !host.is_empty() {
                match user {
                    Some(u) => filters.push(RecipientFilter::with_user(host, u)),
                    None => filters.push(RecipientFilter::host(host)),
                }
            }
            current.clear();
        };

        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                }
                '@' if user.is_none() => {
                    user = Some(std::mem::take(&mut current));
                }
                ',' => flush(&mut current, &mut user),
                _ => current.push(c),
            }
        }
        flush(&mut current, &mut user);

        filters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_filter_parse() {
        let filter = SizeFilter::parse(">1000").unwrap();
        assert_eq!(filter.comparator, SizeComparator::Greater);
        assert!(filter.accepts(1500.0));
        assert!(!filter.accepts(1000.0));

        let filter = SizeFilter::parse("42").unwrap();
        assert_eq!(filter.comparator, SizeComparator::Equal);
        assert!(filter.accepts(42.0));

        assert!(SizeFilter::parse("<abc").is_err());
        assert!(SizeFilter::parse("").is_err());
    }

    #[test]
    fn test_parse_recipients() {
        let filters = SearchCriteria::parse_recipients("alice@alpha, beta,  carol@gam\\,ma");
        assert_eq!(filters.len(), 3);
        assert_eq!(filters[0].host, "alpha");
        assert_eq!(filters[0].user.as_deref(), Some("alice"));
        assert_eq!(filters[1].host, "beta");
        assert_eq!(filters[1].user, None);
        assert_eq!(filters[2].host, "gam,ma");
        assert_eq!(filters[2].user.as_deref(), Some("carol"));
    }

    #[test]
    fn test_full_width_host_gets_wildcard() {
        let filter = RecipientFilter::host("abcdefgh");
        assert_eq!(filter.host, "abcdefgh*");
        let filter = RecipientFilter::host("short");
        assert_eq!(filter.host, "short");
    }

    #[test]
    fn test_validate_rejects_inverted_window() {
        let criteria = SearchCriteria {
            time_start: Some(300),
            time_end: Some(100),
            ..Default::default()
        };
        assert!(matches!(criteria.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_needs_join() {
        let mut criteria = SearchCriteria::default();
        assert!(!criteria.needs_join());
        criteria.recipients.push(RecipientFilter::host("alpha"));
        assert!(!criteria.needs_join());
        criteria.recipients.push(RecipientFilter::with_user("beta", "bob"));
        assert!(criteria.needs_join());

        let criteria = SearchCriteria {
            directories: vec!["/data/*".into()],
            ..Default::default()
        };
        assert!(criteria.needs_join());
    }

    #[test]
    fn test_window_closed() {
        let criteria = SearchCriteria {
            time_end: Some(100),
            ..Default::default()
        };
        assert!(!criteria.window_closed_at(100));
        assert!(criteria.window_closed_at(101));
        assert!(!SearchCriteria::default().window_closed_at(u64::MAX));
    }
}
