//! Dotted key paths used to address values inside a configuration tree.

use std::fmt;

use crate::ConfigError;

/// An immutable, non-empty sequence of key segments such as `server.http.port`.
///
/// Equality and hashing are structural. Quoting only matters when a path is
/// rendered for a human (see the [`Display`](fmt::Display) impl).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// Builds a path from its segments.
    ///
    /// Fails with [`ConfigError::BadPath`] when `segments` is empty.
    pub fn new<I, S>(segments: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(ConfigError::BadPath {
                path: String::new(),
                message: "path has no segments".into(),
            });
        }
        Ok(Self { segments })
    }

    /// A single-segment path.
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            segments: vec![key.into()],
        }
    }

    /// Parses a plain dotted expression like `a.b.c`.
    ///
    /// Segments may not be empty, so `""`, `"a..b"` and `"a."` are rejected.
    pub fn parse(expr: &str) -> Result<Self, ConfigError> {
        let bad = |message: &str| ConfigError::BadPath {
            path: expr.to_string(),
            message: message.to_string(),
        };

        if expr.trim().is_empty() {
            return Err(bad("path expression is empty"));
        }

        let mut segments = Vec::new();
        for segment in expr.split('.') {
            let segment = segment.trim();
            if segment.is_empty() {
                return Err(bad("path has an empty segment"));
            }
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    pub fn first(&self) -> &str {
        &self.segments[0]
    }

    /// Everything after the first segment, or `None` for a single key.
    pub fn remainder(&self) -> Option<Path> {
        self.sub_path(1)
    }

    /// The path minus its last segment, or `None` for a single key.
    pub fn parent(&self) -> Option<Path> {
        if self.segments.len() == 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn last(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false; a path has at least one segment.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Drops the first `remove_from_front` segments.
    ///
    /// Returns `None` when nothing is left.
    pub fn sub_path(&self, remove_from_front: usize) -> Option<Path> {
        if remove_from_front >= self.segments.len() {
            return None;
        }
        Some(Self {
            segments: self.segments[remove_from_front..].to_vec(),
        })
    }

    /// The segments in `first..last`.
    pub fn sub_path_range(&self, first: usize, last: usize) -> Result<Path, ConfigError> {
        if last < first || last > self.segments.len() {
            return Err(ConfigError::BugOrBroken(format!(
                "sub_path_range({first}, {last}) out of range for {self}"
            )));
        }
        Self::new(self.segments[first..last].iter().cloned())
    }

    /// True if `other`'s segments are a prefix of this path's segments.
    pub fn starts_with(&self, other: &Path) -> bool {
        other.segments.len() <= self.segments.len()
            && self.segments.iter().zip(&other.segments).all(|(a, b)| a == b)
    }

    /// `to_prepend` followed by this path.
    pub fn prepend(&self, to_prepend: &Path) -> Path {
        to_prepend.concat(self)
    }

    /// This path followed by `other`.
    pub fn concat(&self, other: &Path) -> Path {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }
}

fn needs_quotes(segment: &str) -> bool {
    segment.is_empty()
        || segment
            .chars()
            .any(|c| !(c.is_alphanumeric() || c == '-' || c == '_'))
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            if needs_quotes(segment) {
                write!(f, "{segment:?}")?;
            } else {
                f.write_str(segment)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(expr: &str) -> Path {
        Path::parse(expr).unwrap()
    }

    #[test]
    fn test_empty_path_is_rejected() {
        let result = Path::new(Vec::<String>::new());
        assert!(matches!(result, Err(ConfigError::BadPath { .. })));
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        assert!(matches!(Path::parse(""), Err(ConfigError::BadPath { .. })));
        assert!(matches!(Path::parse("a..b"), Err(ConfigError::BadPath { .. })));
        assert!(matches!(Path::parse("a."), Err(ConfigError::BadPath { .. })));
    }

    #[test]
    fn test_parent_and_last() {
        let path = p("a.b.c");
        assert_eq!(path.parent(), Some(p("a.b")));
        assert_eq!(path.last(), "c");
        assert_eq!(Path::key("a").parent(), None);
    }

    #[test]
    fn test_sub_path() {
        let path = p("a.b.c");
        assert_eq!(path.sub_path(1), Some(p("b.c")));
        assert_eq!(path.sub_path(3), None);
        assert_eq!(path.sub_path_range(1, 2).unwrap(), p("b"));
        assert!(path.sub_path_range(2, 1).is_err());
    }

    #[test]
    fn test_starts_with() {
        assert!(p("a.b.c").starts_with(&p("a.b")));
        assert!(p("a.b").starts_with(&p("a.b")));
        assert!(!p("a.b").starts_with(&p("a.b.c")));
        assert!(!p("a.x").starts_with(&p("a.b")));
    }

    #[test]
    fn test_prepend_and_concat() {
        assert_eq!(p("c").prepend(&p("a.b")), p("a.b.c"));
        assert_eq!(p("a").concat(&p("b.c")), p("a.b.c"));
        assert_eq!(p("a.b").len(), 2);
    }

    #[test]
    fn test_display_quotes_funky_segments() {
        let path = Path::new(["server", "host.name", ""]).unwrap();
        assert_eq!(path.to_string(), r#"server."host.name"."""#);
        assert_eq!(p("a-b.c_d").to_string(), "a-b.c_d");
    }
}
