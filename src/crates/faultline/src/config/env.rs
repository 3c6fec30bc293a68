//! Typed reads of prefixed environment variables

use std::env;
use std::fmt::Display;
use std::str::FromStr;

use crate::{FaultlineError, Result};

/// Reads variables named `{prefix}{NAME}`
///
/// Set but empty variables count as unset.
#[derive(Debug, Clone, Copy)]
pub struct EnvReader<'a> {
    prefix: &'a str,
}

impl<'a> EnvReader<'a> {
    pub fn new(prefix: &'a str) -> Self {
        Self { prefix }
    }

    /// Full variable name for `name`
    pub fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name.to_ascii_uppercase())
    }

    pub fn string(&self, name: &str) -> Result<Option<String>> {
        let key = self.key(name);
        match env::var(&key) {
            Ok(value) if value.is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(env::VarError::NotUnicode(_)) => Err(FaultlineError::Config(format!(
                "{} is not valid UTF-8",
                key
            ))),
        }
    }

    pub fn parse<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.string(name)?
            .map(|value| {
                value.parse::<T>().map_err(|e| {
                    FaultlineError::Config(format!("{}={:?}: {}", self.key(name), value, e))
                })
            })
            .transpose()
    }

    /// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, any case
    pub fn flag(&self, name: &str) -> Result<Option<bool>> {
        self.string(name)?
            .map(|value| match value.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(FaultlineError::Config(format!(
                    "{}={:?} is not a boolean",
                    self.key(name),
                    value
                ))),
            })
            .transpose()
    }

    /// Comma separated values, trimmed, blanks dropped
    pub fn list(&self, name: &str) -> Result<Vec<String>> {
        Ok(self
            .string(name)?
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }
}
