//! Values stored in the configuration tree

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use super::schema::SectionType;

/// A concrete configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Path(PathBuf),
    List(Vec<ConfigValue>),
}

impl ConfigValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Int(_) => "int",
            ConfigValue::Str(_) => "string",
            ConfigValue::Path(_) => "path",
            ConfigValue::List(_) => "list",
        }
    }

    /// Parse a command-line literal: booleans and integers are recognized,
    /// everything else stays a string and is coerced later against the
    /// declared key kind.
    pub fn parse_literal(raw: &str) -> Self {
        match raw {
            "true" => ConfigValue::Bool(true),
            "false" => ConfigValue::Bool(false),
            _ => raw
                .parse::<i64>()
                .map(ConfigValue::Int)
                .unwrap_or_else(|_| ConfigValue::Str(raw.to_string())),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{b}"),
            ConfigValue::Int(i) => write!(f, "{i}"),
            ConfigValue::Str(s) => write!(f, "{s}"),
            ConfigValue::Path(p) => write!(f, "{}", p.display()),
            ConfigValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// The declared kind of a section key
#[derive(Debug, Clone, Copy)]
pub enum ValueKind {
    Bool,
    Int,
    Str,
    Path,
    StrList,
    PathList,
    /// A nested typed section
    Section(&'static SectionType),
}

impl ValueKind {
    pub fn describe(&self) -> String {
        match self {
            ValueKind::Bool => "bool".into(),
            ValueKind::Int => "int".into(),
            ValueKind::Str => "string".into(),
            ValueKind::Path => "path".into(),
            ValueKind::StrList => "string list".into(),
            ValueKind::PathList => "path list".into(),
            ValueKind::Section(section) => format!("section '{}'", section.name),
        }
    }

    /// Convert a value to this kind, accepting the loose forms produced by
    /// settings files and `--set` literals.
    pub fn coerce(&self, key: &str, value: ConfigValue) -> Result<ConfigValue> {
        let mismatch =
            |found: &ConfigValue| Error::type_mismatch(key, self.describe(), found.kind_name());
        match (self, value) {
            (ValueKind::Bool, ConfigValue::Bool(b)) => Ok(ConfigValue::Bool(b)),
            (ValueKind::Bool, ConfigValue::Str(s)) if s == "true" => Ok(ConfigValue::Bool(true)),
            (ValueKind::Bool, ConfigValue::Str(s)) if s == "false" => Ok(ConfigValue::Bool(false)),
            (ValueKind::Int, ConfigValue::Int(i)) => Ok(ConfigValue::Int(i)),
            (ValueKind::Int, ConfigValue::Str(s)) => s
                .parse::<i64>()
                .map(ConfigValue::Int)
                .map_err(|_| mismatch(&ConfigValue::Str(s))),
            (ValueKind::Str, ConfigValue::Str(s)) => Ok(ConfigValue::Str(s)),
            (ValueKind::Str, ConfigValue::Path(p)) => {
                Ok(ConfigValue::Str(p.to_string_lossy().into_owned()))
            }
            (ValueKind::Str, ConfigValue::Int(i)) => Ok(ConfigValue::Str(i.to_string())),
            (ValueKind::Path, ConfigValue::Path(p)) => Ok(ConfigValue::Path(p)),
            (ValueKind::Path, ConfigValue::Str(s)) => Ok(ConfigValue::Path(PathBuf::from(s))),
            (ValueKind::StrList, ConfigValue::List(items)) => items
                .into_iter()
                .map(|item| ValueKind::Str.coerce(key, item))
                .collect::<Result<Vec<_>>>()
                .map(ConfigValue::List),
            (ValueKind::StrList, ConfigValue::Str(s)) => Ok(ConfigValue::List(
                s.split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(|part| ConfigValue::Str(part.to_string()))
                    .collect(),
            )),
            (ValueKind::PathList, ConfigValue::List(items)) => items
                .into_iter()
                .map(|item| ValueKind::Path.coerce(key, item))
                .collect::<Result<Vec<_>>>()
                .map(ConfigValue::List),
            (ValueKind::PathList, ConfigValue::Str(s)) => Ok(ConfigValue::List(
                std::env::split_paths(&s).map(ConfigValue::Path).collect(),
            )),
            (ValueKind::PathList, ConfigValue::Path(p)) => {
                Ok(ConfigValue::List(vec![ConfigValue::Path(p)]))
            }
            (_, other) => Err(mismatch(&other)),
        }
    }
}

/// Conversion from a stored value into a typed Rust value
pub trait FromConfigValue: Sized {
    fn from_config_value(key: &str, value: ConfigValue) -> Result<Self>;
}

impl FromConfigValue for ConfigValue {
    fn from_config_value(_key: &str, value: ConfigValue) -> Result<Self> {
        Ok(value)
    }
}

impl FromConfigValue for bool {
    fn from_config_value(key: &str, value: ConfigValue) -> Result<Self> {
        match value {
            ConfigValue::Bool(b) => Ok(b),
            other => Err(Error::type_mismatch(key, "bool", other.kind_name())),
        }
    }
}

impl FromConfigValue for i64 {
    fn from_config_value(key: &str, value: ConfigValue) -> Result<Self> {
        match value {
            ConfigValue::Int(i) => Ok(i),
            other => Err(Error::type_mismatch(key, "int", other.kind_name())),
        }
    }
}

impl FromConfigValue for u32 {
    fn from_config_value(key: &str, value: ConfigValue) -> Result<Self> {
        let raw = i64::from_config_value(key, value)?;
        u32::try_from(raw).map_err(|_| Error::type_mismatch(key, "u32", raw.to_string()))
    }
}

impl FromConfigValue for String {
    fn from_config_value(key: &str, value: ConfigValue) -> Result<Self> {
        match value {
            ConfigValue::Str(s) => Ok(s),
            ConfigValue::Path(p) => Ok(p.to_string_lossy().into_owned()),
            other => Err(Error::type_mismatch(key, "string", other.kind_name())),
        }
    }
}

impl FromConfigValue for PathBuf {
    fn from_config_value(key: &str, value: ConfigValue) -> Result<Self> {
        match value {
            ConfigValue::Path(p) => Ok(p),
            ConfigValue::Str(s) => Ok(PathBuf::from(s)),
            other => Err(Error::type_mismatch(key, "path", other.kind_name())),
        }
    }
}

impl<T: FromConfigValue> FromConfigValue for Vec<T> {
    fn from_config_value(key: &str, value: ConfigValue) -> Result<Self> {
        match value {
            ConfigValue::List(items) => items
                .into_iter()
                .map(|item| T::from_config_value(key, item))
                .collect(),
            other => Err(Error::type_mismatch(key, "list", other.kind_name())),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<i32> for ConfigValue {
    fn from(value: i32) -> Self {
        ConfigValue::Int(i64::from(value))
    }
}

impl From<u32> for ConfigValue {
    fn from(value: u32) -> Self {
        ConfigValue::Int(i64::from(value))
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Str(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Str(value)
    }
}

impl From<PathBuf> for ConfigValue {
    fn from(value: PathBuf) -> Self {
        ConfigValue::Path(value)
    }
}

impl From<&Path> for ConfigValue {
    fn from(value: &Path) -> Self {
        ConfigValue::Path(value.to_path_buf())
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(values: Vec<T>) -> Self {
        ConfigValue::List(values.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literal() {
        assert_eq!(ConfigValue::parse_literal("true"), ConfigValue::Bool(true));
        assert_eq!(ConfigValue::parse_literal("17"), ConfigValue::Int(17));
        assert_eq!(
            ConfigValue::parse_literal("src/main"),
            ConfigValue::Str("src/main".into())
        );
    }

    #[test]
    fn test_coerce_path_list_from_string() {
        let joined = std::env::join_paths(["deps", "libs"]).unwrap();
        let value = ValueKind::PathList
            .coerce("convention.deps", ConfigValue::Str(joined.to_string_lossy().into_owned()))
            .unwrap();
        assert_eq!(
            value,
            ConfigValue::List(vec![
                ConfigValue::Path("deps".into()),
                ConfigValue::Path("libs".into()),
            ])
        );
    }

    #[test]
    fn test_coerce_rejects_wrong_kind() {
        let err = ValueKind::Int
            .coerce("compiler.release", ConfigValue::Str("eleven".into()))
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_typed_list_conversion() {
        let value: ConfigValue = vec!["a", "b"].into();
        let strings = Vec::<String>::from_config_value("k", value).unwrap();
        assert_eq!(strings, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_display_list() {
        let value: ConfigValue = vec![1i64, 2, 3].into();
        assert_eq!(value.to_string(), "[1, 2, 3]");
    }
}
