use std::{fmt, num::NonZeroUsize};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How many values a channel can hold without a receiver taking them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CapacityRepr", into = "CapacityRepr")]
pub enum Capacity {
    /// No buffer: every send completes by direct hand-off to a receiver.
    Rendezvous,
    Bounded(NonZeroUsize),
    Unbounded,
}

impl Capacity {
    /// Maximum buffer length, `None` when unbounded.
    pub fn limit(&self) -> Option<usize> {
        match self {
            Capacity::Rendezvous => Some(0),
            Capacity::Bounded(n) => Some(n.get()),
            Capacity::Unbounded => None,
        }
    }

    pub fn is_rendezvous(&self) -> bool {
        matches!(self, Capacity::Rendezvous)
    }

    pub fn admits(&self, len: usize) -> bool {
        self.limit().map_or(true, |limit| len < limit)
    }
}

impl Default for Capacity {
    fn default() -> Self {
        Capacity::Unbounded
    }
}

impl From<usize> for Capacity {
    fn from(value: usize) -> Self {
        match NonZeroUsize::new(value) {
            Some(n) => Capacity::Bounded(n),
            None => Capacity::Rendezvous,
        }
    }
}

impl From<NonZeroUsize> for Capacity {
    fn from(value: NonZeroUsize) -> Self {
        Capacity::Bounded(value)
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capacity::Rendezvous => write!(f, "0"),
            Capacity::Bounded(n) => write!(f, "{n}"),
            Capacity::Unbounded => write!(f, "unbounded"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid capacity '{0}', expected a non-negative integer or \"unbounded\"")]
pub struct CapacityError(String);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum CapacityRepr {
    Size(usize),
    Named(String),
}

impl TryFrom<CapacityRepr> for Capacity {
    type Error = CapacityError;

    fn try_from(value: CapacityRepr) -> Result<Self, Self::Error> {
        match value {
            CapacityRepr::Size(n) => Ok(n.into()),
            CapacityRepr::Named(name) if name == "unbounded" => Ok(Capacity::Unbounded),
            CapacityRepr::Named(name) => Err(CapacityError(name)),
        }
    }
}

impl From<Capacity> for CapacityRepr {
    fn from(value: Capacity) -> Self {
        match value.limit() {
            Some(n) => CapacityRepr::Size(n),
            None => CapacityRepr::Named("unbounded".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, Serialize)]
    struct Wrapper {
        capacity: Capacity,
    }

    #[test]
    fn test_from_usize() {
        assert_eq!(Capacity::from(0usize), Capacity::Rendezvous);
        assert_eq!(
            Capacity::from(3usize),
            Capacity::Bounded(NonZeroUsize::new(3).unwrap())
        );
    }

    #[test]
    fn test_admits() {
        assert!(!Capacity::Rendezvous.admits(0));
        assert!(Capacity::from(2usize).admits(1));
        assert!(!Capacity::from(2usize).admits(2));
        assert!(Capacity::Unbounded.admits(usize::MAX - 1));
    }

    #[test]
    fn test_deserialize() {
        let w: Wrapper = toml::from_str("capacity = 5").unwrap();
        assert_eq!(w.capacity, Capacity::from(5usize));

        let w: Wrapper = toml::from_str("capacity = 0").unwrap();
        assert_eq!(w.capacity, Capacity::Rendezvous);

        let w: Wrapper = toml::from_str("capacity = \"unbounded\"").unwrap();
        assert_eq!(w.capacity, Capacity::Unbounded);

        assert!(toml::from_str::<Wrapper>("capacity = \"lots\"").is_err());
        assert!(toml::from_str::<Wrapper>("capacity = -1").is_err());
    }

    #[test]
    fn test_serialize() {
        let s = toml::to_string(&Wrapper {
            capacity: Capacity::Unbounded,
        })
        .unwrap();
        assert_eq!(s.trim(), "capacity = \"unbounded\"");

        let s = toml::to_string(&Wrapper {
            capacity: Capacity::from(7usize),
        })
        .unwrap();
        assert_eq!(s.trim(), "capacity = 7");
    }
}
