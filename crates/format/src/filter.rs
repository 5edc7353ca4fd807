use std::path::Path;

use anyhow::Context as _;

/// Allows or rejects RPC methods based on their name.
///
/// Entries match any method name that contains them, case sensitively. An empty allow list allows
/// every method that's not rejected and a rejection always wins over an allowance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterList {
    allow: Vec<String>,
    reject: Vec<String>,
}

impl FilterList {
    /// Reads a filter file with one entry per line. Lines starting with `!` are rejections, all
    /// other lines are allowances. Empty lines and lines starting with `#` are skipped.
    pub fn new_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read the filter file at {}", path.display()))?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let (reject, allow): (Vec<_>, Vec<_>) = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_owned)
            .partition(|line| line.starts_with('!'));

        let reject = reject
            .into_iter()
            .map(|entry| entry.trim_start_matches('!').to_owned())
            .collect();

        Self { allow, reject }
    }

    pub fn allow(mut self, entry: impl Into<String>) -> Self {
        self.allow.push(entry.into());
        self
    }

    pub fn reject(mut self, entry: impl Into<String>) -> Self {
        self.reject.push(entry.into());
        self
    }

    /// Whether a method with the given name should be part of the run.
    pub fn authorize(&self, method: &str) -> bool {
        (self.allow.is_empty() || self.allow.iter().any(|entry| method.contains(entry.as_str())))
            && !self.reject.iter().any(|entry| method.contains(entry.as_str()))
    }
}
