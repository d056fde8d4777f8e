use std::{collections::BTreeMap, fs, io, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::{
    capacity::Capacity,
    path::{ChanPath, PathError},
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Error parsing channel config from toml")]
    Toml(#[from] toml::de::Error),

    #[error("Error serializing channel config to toml")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid channel path")]
    Path(#[from] PathError),

    #[error("Error reading channel config file")]
    Io(#[from] io::Error),

    #[error("Remapping of channel '{0}' loops back on itself")]
    RemapCycle(ChanPath),
}

/// Settings of a single named channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChanDef {
    /// Falls back to [`ChanConfig::default_capacity`] when missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<Capacity>,
}

/// Declares named channels, their capacities and aliases.
///
/// ```toml
/// default_capacity = 16
///
/// [channels."/pipeline/jobs"]
/// capacity = 5
///
/// [channels."/pipeline/results"]
/// capacity = "unbounded"
///
/// [remap]
/// "/legacy/jobs" = "/pipeline/jobs"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChanConfig {
    #[serde(default)]
    pub default_capacity: Capacity,

    #[serde(default)]
    pub channels: BTreeMap<ChanPath, ChanDef>,

    /// Requests for a key are served by the channel named by its value.
    #[serde(default)]
    pub remap: BTreeMap<ChanPath, ChanPath>,
}

impl ChanConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: ChanConfig = toml::from_str(toml_str)?;
        config.check_remap()?;

        log::debug!(
            "Loaded channel config: {} channels, {} remaps",
            config.channels.len(),
            config.remap.len()
        );

        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let toml_str = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&toml_str)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Name of the channel actually serving requests for `name`.
    pub fn resolve<'a>(&'a self, name: &'a ChanPath) -> &'a ChanPath {
        let mut current = name;

        // Bounded, in case the map was modified after loading.
        for _ in 0..=self.remap.len() {
            match self.remap.get(current) {
                Some(next) => current = next,
                None => break,
            }
        }

        current
    }

    /// Capacity of the channel named `name`, after remapping.
    pub fn capacity_of(&self, name: &ChanPath) -> Capacity {
        self.channels
            .get(self.resolve(name))
            .and_then(|def| def.capacity)
            .unwrap_or(self.default_capacity)
    }

    fn check_remap(&self) -> Result<(), ConfigError> {
        for start in self.remap.keys() {
            let mut current = start;
            for _ in 0..=self.remap.len() {
                match self.remap.get(current) {
                    Some(next) if next == start => {
                        return Err(ConfigError::RemapCycle(start.clone()))
                    }
                    Some(next) => current = next,
                    None => break,
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use anyhow::Result;
    use pretty_assertions::assert_eq;

    use super::*;

    const CONFIG: &str = r#"
default_capacity = 16

[channels."/pipeline/jobs"]
capacity = 5

[channels."/pipeline/results"]
capacity = "unbounded"

[channels."/pipeline/handoff"]
capacity = 0

[channels."/pipeline/other"]

[remap]
"/legacy/jobs" = "/pipeline/jobs"
"/very/old/jobs" = "/legacy/jobs"
"#;

    fn path(s: &str) -> ChanPath {
        ChanPath::new(s).unwrap()
    }

    #[test]
    fn test_parse() -> Result<()> {
        let config = ChanConfig::from_toml(CONFIG)?;

        assert_eq!(config.default_capacity, Capacity::from(16usize));
        assert_eq!(config.channels.len(), 4);
        assert_eq!(config.capacity_of(&path("/pipeline/jobs")), Capacity::from(5usize));
        assert_eq!(config.capacity_of(&path("/pipeline/results")), Capacity::Unbounded);
        assert_eq!(config.capacity_of(&path("/pipeline/handoff")), Capacity::Rendezvous);
        assert_eq!(config.capacity_of(&path("/pipeline/other")), Capacity::from(16usize));
        assert_eq!(config.capacity_of(&path("/not/declared")), Capacity::from(16usize));

        Ok(())
    }

    #[test]
    fn test_remap_chain() -> Result<()> {
        let config = ChanConfig::from_toml(CONFIG)?;

        assert_eq!(config.resolve(&path("/very/old/jobs")), &path("/pipeline/jobs"));
        assert_eq!(config.resolve(&path("/pipeline/jobs")), &path("/pipeline/jobs"));
        assert_eq!(
            config.capacity_of(&path("/legacy/jobs")),
            Capacity::Bounded(NonZeroUsize::new(5).unwrap())
        );

        Ok(())
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let config = ChanConfig::from_toml("")?;
        assert_eq!(config, ChanConfig::default());
        assert_eq!(config.capacity_of(&path("/any")), Capacity::Unbounded);

        Ok(())
    }

    #[test]
    fn test_round_trip() -> Result<()> {
        let config = ChanConfig::from_toml(CONFIG)?;
        let reparsed = ChanConfig::from_toml(&config.to_toml()?)?;
        assert_eq!(reparsed, config);

        Ok(())
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            ChanConfig::from_toml("[channels.\"no_slash\"]"),
            Err(ConfigError::Toml(_))
        ));
        assert!(matches!(
            ChanConfig::from_toml("[channels.\"/a\"]\ncapacity = \"lots\""),
            Err(ConfigError::Toml(_))
        ));
        assert!(matches!(
            ChanConfig::from_toml("unknown_key = 1"),
            Err(ConfigError::Toml(_))
        ));
        assert!(matches!(
            ChanConfig::from_toml("[remap]\n\"/a\" = \"/b\"\n\"/b\" = \"/a\""),
            Err(ConfigError::RemapCycle(_))
        ));
        assert!(matches!(
            ChanConfig::from_file("/this/file/does/not/exist.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
