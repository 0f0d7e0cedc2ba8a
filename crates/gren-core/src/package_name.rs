//! Package names of the form `author/name`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Why a package name was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("package name '{0}' must have the form author/name")]
    MissingSlash(String),

    #[error("{part} in '{name}' must not be empty")]
    Empty { name: String, part: &'static str },

    #[error("{part} in '{name}' may only contain letters, digits and dashes")]
    BadCharacter { name: String, part: &'static str },

    #[error("{part} in '{name}' must not start or end with a dash")]
    EdgeDash { name: String, part: &'static str },

    #[error("{part} in '{name}' must not contain a double dash")]
    DoubleDash { name: String, part: &'static str },

    #[error("project name in '{0}' must start with a letter and use lowercase letters only")]
    NotLowercase(String),
}

/// A validated `author/name` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageName {
    author: String,
    name: String,
}

impl PackageName {
    pub fn parse(text: &str) -> Result<Self, NameError> {
        let (author, name) = text
            .split_once('/')
            .ok_or_else(|| NameError::MissingSlash(text.to_string()))?;

        check_dashed_alphanumeric(text, author, "author")?;
        check_dashed_alphanumeric(text, name, "project name")?;

        let starts_with_letter = name.chars().next().is_some_and(|c| c.is_ascii_lowercase());
        let lowercase_only = name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !starts_with_letter || !lowercase_only {
            return Err(NameError::NotLowercase(text.to_string()));
        }

        Ok(Self {
            author: author.to_string(),
            name: name.to_string(),
        })
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn check_dashed_alphanumeric(full: &str, part: &str, label: &'static str) -> Result<(), NameError> {
    let name = full.to_string();
    if part.is_empty() {
        return Err(NameError::Empty { name, part: label });
    }
    if !part.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(NameError::BadCharacter { name, part: label });
    }
    if part.starts_with('-') || part.ends_with('-') {
        return Err(NameError::EdgeDash { name, part: label });
    }
    if part.contains("--") {
        return Err(NameError::DoubleDash { name, part: label });
    }
    Ok(())
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.author, self.name)
    }
}

impl FromStr for PackageName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PackageName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PackageName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
