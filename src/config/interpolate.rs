//! `${...}` substitution syntax inside string values.
//!
//! A string made of a single `${path}` becomes a reference, so it can point
//! at objects and lists as well as scalars. Anything mixed with literal
//! text becomes a concatenation. `${?path}` marks the substitution as
//! optional and `$$` produces a literal `$`.

use crate::{ConfigError, ConfigValue, Origin, Path};

/// Parses `text` into a string, reference or concatenation value.
pub(crate) fn parse_string(text: &str, origin: &Origin) -> Result<ConfigValue, ConfigError> {
    let mut pieces = Vec::new();
    let mut literal = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            literal.push(ch);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                literal.push('$');
            }
            Some('{') => {
                chars.next();
                let expr = consume_until(&mut chars, '}').ok_or_else(|| ConfigError::BadValue {
                    origin: origin.clone(),
                    message: format!("unclosed substitution (missing '}}') in {text:?}"),
                })?;
                let (expr, optional) = match expr.strip_prefix('?') {
                    Some(rest) => (rest, true),
                    None => (expr.as_str(), false),
                };
                let path = Path::parse(expr)?;

                if !literal.is_empty() {
                    pieces.push(ConfigValue::string(origin.clone(), std::mem::take(&mut literal)));
                }
                pieces.push(ConfigValue::reference(origin.clone(), path, optional));
            }
            _ => literal.push('$'),
        }
    }

    if pieces.is_empty() {
        return Ok(ConfigValue::string(origin.clone(), literal));
    }
    if !literal.is_empty() {
        pieces.push(ConfigValue::string(origin.clone(), literal));
    }
    ConfigValue::concatenation(origin.clone(), pieces)
}

/// Consumes characters until the delimiter, returning the collected string.
fn consume_until(chars: &mut std::iter::Peekable<std::str::Chars>, delim: char) -> Option<String> {
    let mut result = String::new();
    for ch in chars.by_ref() {
        if ch == delim {
            return Some(result);
        }
        result.push(ch);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    fn parse(text: &str) -> ConfigValue {
        parse_string(text, &Origin::new("test")).unwrap()
    }

    #[test]
    fn test_plain_string() {
        assert_eq!(parse("hello").as_str(), Some("hello"));
    }

    #[test]
    fn test_whole_string_reference() {
        match parse("${server.host}").kind() {
            ValueKind::Reference(subst) => {
                assert_eq!(subst.path, Path::parse("server.host").unwrap());
                assert!(!subst.optional);
            }
            other => panic!("expected reference, got {other:?}"),
        }
    }

    #[test]
    fn test_optional_reference() {
        match parse("${?HOME}").kind() {
            ValueKind::Reference(subst) => assert!(subst.optional),
            other => panic!("expected reference, got {other:?}"),
        }
    }

    #[test]
    fn test_mixed_text_becomes_concatenation() {
        match parse("http://${host}:${port}/api").kind() {
            ValueKind::Concatenation(pieces) => {
                assert_eq!(pieces.len(), 5);
                assert_eq!(pieces[0].as_str(), Some("http://"));
                assert_eq!(pieces[4].as_str(), Some("/api"));
            }
            other => panic!("expected concatenation, got {other:?}"),
        }
    }

    #[test]
    fn test_escape_sequence() {
        assert_eq!(
            parse("use $${VAR} for env vars").as_str(),
            Some("use ${VAR} for env vars")
        );
        assert_eq!(parse("cost: 5$").as_str(), Some("cost: 5$"));
    }

    #[test]
    fn test_unclosed_reference() {
        let err = parse_string("${oops", &Origin::new("test")).unwrap_err();
        assert!(matches!(err, ConfigError::BadValue { .. }));
    }

    #[test]
    fn test_invalid_reference_path() {
        let err = parse_string("${a..b}", &Origin::new("test")).unwrap_err();
        assert!(matches!(err, ConfigError::BadPath { .. }));
    }
}
