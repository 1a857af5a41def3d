//! Hosts-file line model.

/// A single block directive: `<address> <selector>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardedEntry {
    pub address: String,
    pub selector: String,
}

impl GuardedEntry {
    pub fn new(address: &str, selector: &str) -> Self {
        Self {
            address: address.trim().to_string(),
            selector: normalize_selector(selector),
        }
    }

    /// Parses a directive line. Comments, blank lines and lines with more than
    /// one host name are not entries.
    pub fn parse(line: &str) -> Option<Self> {
        let content = line.split('#').next().unwrap_or_default();
        let mut fields = content.split_whitespace();
        let address = fields.next()?;
        let selector = fields.next()?;
        if fields.next().is_some() {
            return None;
        }
        Some(Self::new(address, selector))
    }

    pub fn to_line(&self) -> String {
        format!("{} {}", self.address, self.selector)
    }

    /// Selector identity is case-insensitive; the address must match exactly.
    pub fn same_directive(&self, other: &GuardedEntry) -> bool {
        self.address == other.address && self.selector == other.selector
    }
}

/// Matches hosts lines that mention any of the configured patterns.
#[derive(Debug, Clone)]
pub struct SelectorMatcher {
    patterns: Vec<String>,
}

impl SelectorMatcher {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .map(|pattern| pattern.as_ref().trim().to_lowercase())
                .filter(|pattern| !pattern.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, line: &str) -> bool {
        let line = line.to_lowercase();
        self.patterns.iter().any(|pattern| line.contains(pattern.as_str()))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// Lowercases and trims a trailing dot, so `Example.COM.` and `example.com`
/// name the same entry.
pub fn normalize_selector(selector: &str) -> String {
    selector.trim().trim_end_matches('.').to_lowercase()
}
