//! Dotted context paths with leading-dot ascent.
//!
//! `a.b.c` is absolute (resolved from the state root). A leading `.` makes
//! the path relative to the table holding the placeholder, and every extra
//! leading dot ascends one more level: `.x` is a sibling, `..x` is a sibling
//! of the enclosing table, and so on.

use std::fmt;

use crate::types::{GuardianError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextPath {
    dots: usize,
    segments: Vec<String>,
}

impl ContextPath {
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let dots = trimmed.chars().take_while(|c| *c == '.').count();
        let rest = &trimmed[dots..];

        if rest.is_empty() {
            return Err(GuardianError::resolution(text, "path has no segments"));
        }

        let segments: Vec<String> = rest.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(GuardianError::resolution(text, "empty path segment"));
        }

        Ok(Self { dots, segments })
    }

    pub fn is_absolute(&self) -> bool {
        self.dots == 0
    }

    /// Number of leading dots
    pub fn dots(&self) -> usize {
        self.dots
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Resolve against `base`, the absolute path of the table the path
    /// was written in.
    pub fn resolve(&self, base: &[String]) -> Result<Vec<String>> {
        if self.is_absolute() {
            return Ok(self.segments.clone());
        }

        let ascend = self.dots - 1;
        if ascend > base.len() {
            return Err(GuardianError::resolution(
                self.to_string(),
                format!("ascends {} levels above {}", ascend, join_path(base)),
            ));
        }

        let mut resolved = base[..base.len() - ascend].to_vec();
        resolved.extend(self.segments.iter().cloned());
        Ok(resolved)
    }
}

impl fmt::Display for ContextPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in 0..self.dots {
            f.write_str(".")?;
        }
        f.write_str(&self.segments.join("."))
    }
}

/// Split a plain dotted key into segments, dropping empty pieces
pub fn split_key(key: &str) -> Vec<String> {
    key.split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn join_path(path: &[String]) -> String {
    path.join(".")
}
