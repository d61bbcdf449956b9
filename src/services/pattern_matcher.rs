use regex::Regex;

use crate::error::{AppError, Result};

/**
 * 通配符模式匹配器
 *
 * 支持 `*`（任意字符序列）和 `?`（任意单个字符），模式以 `!` 开头时取反。
 * 模式整体匹配，而不是子串匹配：`*.csv` 匹配 `a.csv`，但不匹配 `a.csv.gz`。
 */
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
    negated: bool,
}

impl GlobPattern {
    /**
     * 编译通配符模式
     *
     * # 参数
     * * `pattern` - 通配符模式，可以以 `!` 开头表示取反
     */
    pub fn new(pattern: &str) -> Result<Self> {
        let (negated, body) = match pattern.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };

        let mut expr = String::with_capacity(body.len() * 2 + 8);
        expr.push_str("(?s)^");
        let mut literal = [0u8; 4];
        for c in body.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                _ => expr.push_str(&regex::escape(c.encode_utf8(&mut literal))),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| {
            AppError::validation_error(format!("invalid pattern '{}': {}", pattern, e))
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            negated,
        })
    }

    /// 原始模式文本
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text) != self.negated
    }
}

/**
 * 模式集合（OR 逻辑）
 *
 * 任意一个模式匹配即视为匹配。空集合不匹配任何文本。
 */
#[derive(Debug, Clone, Default)]
pub struct GlobSet {
    patterns: Vec<GlobPattern>,
}

impl GlobSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| GlobPattern::new(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn matches_any(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("*.csv", "report.csv", true)]
    #[case("*.csv", "report.csv.gz", false)]
    #[case("rep?rt.*", "report.txt", true)]
    #[case("rep?rt.*", "reprt.txt", false)]
    #[case("alpha", "alpha", true)]
    #[case("alpha", "alphabet", false)]
    #[case("!*.tmp", "data.tmp", false)]
    #[case("!*.tmp", "data.csv", true)]
    #[case("a+b(c)", "a+b(c)", true)]
    #[case("*", "", true)]
    fn test_glob_matches(#[case] pattern: &str, #[case] text: &str, #[case] expected: bool) {
        let glob = GlobPattern::new(pattern).unwrap();
        assert_eq!(glob.matches(text), expected, "{} vs {}", pattern, text);
    }

    #[test]
    fn test_glob_set_any() {
        let set = GlobSet::new(&["alpha*", "beta"]).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.matches_any("alpha1"));
        assert!(set.matches_any("beta"));
        assert!(!set.matches_any("gamma"));

        let empty = GlobSet::default();
        assert!(empty.is_empty());
        assert!(!empty.matches_any("anything"));
    }

    #[test]
    fn test_negated_flag() {
        let glob = GlobPattern::new("!abc").unwrap();
        assert!(glob.is_negated());
        assert_eq!(glob.as_str(), "!abc");
    }
}
