//! Conversion between TOML documents and value trees.

use std::collections::BTreeMap;

use toml::{Table, Value};

use super::interpolate::parse_string;
use crate::value::{Number, NumberValue, ValueKind};
use crate::{ConfigError, ConfigValue, Origin};

/// Converts a parsed TOML table, turning `${...}` strings into substitutions.
pub(crate) fn table_to_value(table: &Table, origin: &Origin) -> Result<ConfigValue, ConfigError> {
    let mut fields = BTreeMap::new();
    for (key, value) in table {
        fields.insert(key.clone(), toml_to_value(value, origin)?);
    }
    Ok(ConfigValue::object(origin.clone(), fields))
}

fn toml_to_value(value: &Value, origin: &Origin) -> Result<ConfigValue, ConfigError> {
    Ok(match value {
        Value::String(s) => parse_string(s, origin)?,
        Value::Integer(i) => ConfigValue::int(origin.clone(), *i),
        // Debug formatting keeps the fraction, so `1.0` still renders as `1.0`.
        Value::Float(f) => {
            ConfigValue::number(origin.clone(), Number::float(*f).with_text(format!("{f:?}")))
        }
        Value::Boolean(b) => ConfigValue::bool(origin.clone(), *b),
        Value::Datetime(dt) => ConfigValue::string(origin.clone(), dt.to_string()),
        Value::Array(items) => ConfigValue::list(
            origin.clone(),
            items
                .iter()
                .map(|item| toml_to_value(item, origin))
                .collect::<Result<_, _>>()?,
        ),
        Value::Table(table) => table_to_value(table, origin)?,
    })
}

/// Converts a resolved tree back to TOML for deserialization.
///
/// TOML has no null, so null fields and list items are left out.
pub(crate) fn value_to_toml(value: &ConfigValue) -> Result<Option<Value>, ConfigError> {
    Ok(match value.kind() {
        ValueKind::Null => None,
        ValueKind::Bool(b) => Some(Value::Boolean(*b)),
        ValueKind::Number(n) => Some(match n.value() {
            NumberValue::Int(i) => Value::Integer(i),
            NumberValue::Float(f) => Value::Float(f),
        }),
        ValueKind::String(s) => Some(Value::String(s.clone())),
        ValueKind::List(list) => {
            let mut items = Vec::with_capacity(list.len());
            for item in list.items() {
                items.extend(value_to_toml(item)?);
            }
            Some(Value::Array(items))
        }
        ValueKind::Object(obj) => {
            let mut table = Table::new();
            for (key, child) in obj.iter() {
                if let Some(converted) = value_to_toml(child)? {
                    table.insert(key.to_string(), converted);
                }
            }
            Some(Value::Table(table))
        }
        _ => {
            return Err(ConfigError::NotResolved(format!(
                "value at {} has unresolved substitutions and cannot be deserialized",
                value.origin()
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Origin {
        Origin::file("test.toml")
    }

    #[test]
    fn test_table_to_value() {
        let table: Table = toml::from_str(
            r#"
            name = "svc"
            port = 8080
            ratio = 0.5
            debug = true
            tags = ["a", "b"]

            [db]
            url = "postgres://${db.host}"
            "#,
        )
        .unwrap();
        let value = table_to_value(&table, &origin()).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj.get("name").and_then(ConfigValue::as_str), Some("svc"));
        assert_eq!(
            obj.get("port").and_then(ConfigValue::as_number).and_then(|n| n.as_i64()),
            Some(8080)
        );
        assert_eq!(obj.get("debug").and_then(ConfigValue::as_bool), Some(true));
        assert_eq!(obj.get("tags").and_then(ConfigValue::as_list).map(|l| l.len()), Some(2));

        let db = obj.get("db").unwrap();
        assert!(!db.is_resolved());
        assert_eq!(db.origin().description(), "test.toml");
    }

    #[test]
    fn test_float_keeps_fraction_in_concatenation() {
        let table: Table = toml::from_str(
            r#"
            x = 1.0
            v = "v${x}"
            "#,
        )
        .unwrap();
        let value = table_to_value(&table, &origin()).unwrap();
        let resolved = crate::resolve(&value, &crate::ResolveOptions::default()).unwrap();
        let obj = resolved.as_object().unwrap();
        assert_eq!(obj.get("v").and_then(ConfigValue::as_str), Some("v1.0"));
        assert_eq!(
            obj.get("x").and_then(ConfigValue::as_number).map(|n| n.as_f64()),
            Some(1.0)
        );
    }

    #[test]
    fn test_value_to_toml_skips_nulls() {
        let mut fields = BTreeMap::new();
        fields.insert("a".to_string(), ConfigValue::int(origin(), 1));
        fields.insert("b".to_string(), ConfigValue::null(origin()));
        let value = ConfigValue::object(origin(), fields);

        let converted = value_to_toml(&value).unwrap().unwrap();
        let table = converted.as_table().unwrap();
        assert_eq!(table.get("a"), Some(&Value::Integer(1)));
        assert!(!table.contains_key("b"));
    }

    #[test]
    fn test_value_to_toml_rejects_unresolved() {
        let table: Table = toml::from_str(r#"a = "${b}""#).unwrap();
        let value = table_to_value(&table, &origin()).unwrap();
        assert!(matches!(value_to_toml(&value), Err(ConfigError::NotResolved(_))));
    }
}
