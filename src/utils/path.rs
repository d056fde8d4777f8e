use std::{fmt, str::FromStr};

use itertools::join;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("Invalid channel path '{0}'")]
pub struct PathError(pub String);

pub fn validate_path(path: &str) -> bool {
    path.starts_with('/')
        && path
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '/')
}

/// Name of a channel, such as `/pipeline/jobs`.
///
/// Always starts with a single `/`, with empty segments removed, so
/// `//pipeline//jobs/` and `/pipeline/jobs` name the same channel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChanPath {
    path: String,
}

impl ChanPath {
    pub fn new(path: &str) -> Result<Self, PathError> {
        if !validate_path(path) {
            return Err(PathError(path.to_string()));
        }

        Ok(ChanPath {
            path: format!("/{}", join(Self::split_parts(path), "/")),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn iter_parts(&self) -> impl Iterator<Item = &str> {
        Self::split_parts(&self.path)
    }

    fn split_parts(path: &str) -> impl Iterator<Item = &str> {
        path.split('/').filter(|p| !p.is_empty())
    }

    pub fn is_root(&self) -> bool {
        self.path == "/"
    }
}

impl FromStr for ChanPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChanPath::new(s)
    }
}

impl TryFrom<&str> for ChanPath {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        ChanPath::new(value)
    }
}

impl TryFrom<String> for ChanPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ChanPath::new(&value)
    }
}

impl From<ChanPath> for String {
    fn from(value: ChanPath) -> Self {
        value.path
    }
}

impl AsRef<str> for ChanPath {
    fn as_ref(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for ChanPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
