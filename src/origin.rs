//! Provenance of configuration values.

use std::fmt;

const MERGE_OF_PREFIX: &str = "merge of ";

/// Where an origin came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginKind {
    Generic,
    File,
    Env,
}

/// Describes where a value was defined, for error messages.
///
/// Origins never take part in equality of values or in merge outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    description: String,
    line: Option<u32>,
    end_line: Option<u32>,
    kind: OriginKind,
}

impl Origin {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            line: None,
            end_line: None,
            kind: OriginKind::Generic,
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self {
            kind: OriginKind::File,
            ..Self::new(name)
        }
    }

    pub fn env(variable: impl Into<String>) -> Self {
        Self {
            kind: OriginKind::Env,
            ..Self::new(format!("env variable {}", variable.into()))
        }
    }

    /// Same origin, pinned to one line.
    pub fn with_line(&self, line: u32) -> Self {
        Self {
            line: Some(line),
            end_line: Some(line),
            ..self.clone()
        }
    }

    pub fn with_lines(&self, line: u32, end_line: u32) -> Self {
        Self {
            line: Some(line),
            end_line: Some(end_line.max(line)),
            ..self.clone()
        }
    }

    pub fn kind(&self) -> OriginKind {
        self.kind
    }

    pub fn line(&self) -> Option<u32> {
        self.line
    }

    pub fn end_line(&self) -> Option<u32> {
        self.end_line
    }

    /// Description including the line range, e.g. `app.toml: 4-9`.
    pub fn description(&self) -> String {
        match (self.line, self.end_line) {
            (Some(line), Some(end)) if end != line => {
                format!("{}: {}-{}", self.description, line, end)
            }
            (Some(line), _) => format!("{}: {}", self.description, line),
            (None, _) => self.description.clone(),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

fn strip_merge_prefix(desc: &str) -> &str {
    desc.strip_prefix(MERGE_OF_PREFIX).unwrap_or(desc)
}

fn merge_two(a: &Origin, b: &Origin) -> Origin {
    let kind = if a.kind == b.kind {
        a.kind
    } else {
        OriginKind::Generic
    };

    let a_desc = strip_merge_prefix(&a.description);
    let b_desc = strip_merge_prefix(&b.description);

    if a_desc == b_desc {
        let line = match (a.line, b.line) {
            (Some(x), Some(y)) => Some(x.min(y)),
            (x, y) => x.or(y),
        };
        return Origin {
            description: a_desc.to_string(),
            line,
            end_line: a.end_line.max(b.end_line),
            kind,
        };
    }

    // Different sources: fall back to a flat description with line numbers baked in.
    let a_full = a.description();
    let b_full = b.description();
    Origin {
        description: format!(
            "{MERGE_OF_PREFIX}{},{}",
            strip_merge_prefix(&a_full),
            strip_merge_prefix(&b_full)
        ),
        line: None,
        end_line: None,
        kind,
    }
}

fn similarity(a: &Origin, b: &Origin) -> u32 {
    let mut count = 0;
    if a.kind == b.kind {
        count += 1;
    }
    if a.description == b.description {
        count += 1;
        if a.line == b.line {
            count += 1;
        }
        if a.end_line == b.end_line {
            count += 1;
        }
    }
    count
}

/// Merges the pair with more in common first.
fn merge_three(a: &Origin, b: &Origin, c: &Origin) -> Origin {
    if similarity(a, b) >= similarity(b, c) {
        merge_two(&merge_two(a, b), c)
    } else {
        merge_two(a, &merge_two(b, c))
    }
}

/// Combines the origins of values that were merged into one.
///
/// Returns `None` only for an empty input.
pub fn merge_origins<'a, I>(origins: I) -> Option<Origin>
where
    I: IntoIterator<Item = &'a Origin>,
{
    let mut remaining: Vec<Origin> = origins.into_iter().cloned().collect();
    while remaining.len() > 2 {
        let c = remaining.pop()?;
        let b = remaining.pop()?;
        let a = remaining.pop()?;
        remaining.push(merge_three(&a, &b, &c));
    }
    match remaining.as_slice() {
        [] => None,
        [only] => Some(only.clone()),
        [a, b] => Some(merge_two(a, b)),
        _ => unreachable!("loop leaves at most two origins"),
    }
}
