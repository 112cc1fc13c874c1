//! Command-line overrides of the form `train.epochs=30` or `+train.seed=7`.
//!
//! A plain override replaces a key that already exists in the YAML document.
//! A `+` prefix adds a key that is not there yet. The right-hand side is read
//! as a YAML scalar or flow collection, so `4`, `adam`, `0.5` and `[64, 32]`
//! all take their natural type.

use std::fmt;
use std::str::FromStr;

use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub path: Vec<String>,
    pub value: Value,
    pub append: bool,
}

impl FromStr for Override {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Override> {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("override '{raw}' is not of the form key=value")))?;

        let (append, key) = match key.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, key),
        };
        let path: Vec<String> = key.trim().split('.').map(str::to_owned).collect();
        if path.iter().any(String::is_empty) {
            return Err(Error::Config(format!("override '{raw}' has an empty key segment")));
        }

        let value = if value.trim().is_empty() {
            Value::Null
        } else {
            serde_yaml::from_str(value)
                .map_err(|e| Error::Config(format!("override '{raw}': cannot parse value: {e}")))?
        };

        Ok(Override { path, value, append })
    }
}

impl fmt::Display for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.append {
            write!(f, "+")?;
        }
        write!(f, "{}", self.path.join("."))
    }
}

impl Override {
    /// Writes this override into `root`, which must be a mapping.
    pub fn apply(&self, root: &mut Value) -> Result<()> {
        let Some((leaf, parents)) = self.path.split_last() else {
            return Err(Error::Config("empty override key".into()));
        };

        let mut node = root;
        for (depth, segment) in parents.iter().enumerate() {
            let map = as_mapping(node, &self.path[..depth])?;
            let key = Value::String(segment.clone());
            if !map.contains_key(&key) {
                if !self.append {
                    return Err(Error::Config(format!(
                        "cannot override '{self}': key '{segment}' does not exist (use '+{}' to add it)",
                        self.path.join(".")
                    )));
                }
                map.insert(key.clone(), Value::Mapping(Mapping::new()));
            }
            node = map
                .get_mut(&key)
                .ok_or_else(|| Error::Config(format!("cannot resolve '{segment}'")))?;
        }

        let map = as_mapping(node, parents)?;
        let key = Value::String(leaf.clone());
        match (map.contains_key(&key), self.append) {
            (false, false) => Err(Error::Config(format!(
                "cannot override '{self}': key does not exist (use '+{}' to add it)",
                self.path.join(".")
            ))),
            (true, true) => Err(Error::Config(format!(
                "cannot add '{}': key already exists (drop the '+' to override it)",
                self.path.join(".")
            ))),
            _ => {
                map.insert(key, self.value.clone());
                Ok(())
            }
        }
    }
}

fn as_mapping<'a>(node: &'a mut Value, at: &[String]) -> Result<&'a mut Mapping> {
    match node {
        Value::Mapping(map) => Ok(map),
        _ => Err(Error::Config(format!(
            "'{}' is not a section and cannot hold nested keys",
            if at.is_empty() { "<root>".to_owned() } else { at.join(".") }
        ))),
    }
}
