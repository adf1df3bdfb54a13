//! TOML configuration.
//!
//! ```toml
//! [segment]
//! max_title_len = 50
//! rules = ["numbered-volume", "prologue-epilogue"]
//!
//! [package]
//! font = "embedded"
//! chunk_size = 80
//!
//! [cover]
//! quality = 90
//! ```
//!
//! Every field is optional and falls back to its default.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tracing::{info, warn};

use crate::cover::CoverPolicy;
use crate::epub::PackageConfig;
use crate::error::{Error, Result};
use crate::segment::SegmentConfig;

/// Default config file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "novelpub.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub segment: SegmentConfig,
    pub package: PackageConfig,
    pub cover: CoverPolicy,
}

impl Config {
    /// Read and parse a config file. Missing files and bad TOML are errors.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config = contents.parse()?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Like [`Config::load`], but an absent file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found; using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::epub::FontChoice;
    use crate::segment::TitleRule;

    #[test]
    fn test_empty_config_is_default() {
        let config: Config = "".parse().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.package.language, "ko");
        assert_eq!(config.package.chunk_size, 100);
        assert_eq!(config.segment.limits.max_title_len, 50);
        assert_eq!(config.segment.rules, TitleRule::ALL.to_vec());
        assert_eq!(config.cover.max_width, 1200);
    }

    #[test]
    fn test_partial_config() {
        let config: Config = r#"
            [segment]
            short_title_len = 30
            rules = ["numbered-volume", "digits-only"]

            [package]
            font = "sans-serif"
            font_path = "/usr/share/fonts/RIDIBatang.otf"
            compression_level = 9

            [cover]
            normalize = false
        "#
        .parse()
        .unwrap();

        assert_eq!(config.segment.limits.short_title_len, 30);
        assert_eq!(config.segment.limits.max_title_len, 50);
        assert_eq!(
            config.segment.rules,
            vec![TitleRule::NumberedVolume, TitleRule::DigitsOnly]
        );
        assert_eq!(config.package.font, FontChoice::SansSerif);
        assert_eq!(
            config.package.font_path,
            PathBuf::from("/usr/share/fonts/RIDIBatang.otf")
        );
        assert_eq!(config.package.compression_level, Some(9));
        assert_eq!(config.package.chunk_size, 100);
        assert!(!config.cover.normalize);
        assert_eq!(config.cover.quality, 85);
    }

    #[test]
    fn test_malformed_config() {
        let err = "[package]\nchunk_size = \"lots\"".parse::<Config>().unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = "[segment]\nrules = [\"no-such-rule\"]".parse::<Config>().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "[package]\nchunk_size = 0\n").unwrap();

        assert_eq!(Config::load(&path).unwrap().package.chunk_size, 0);
        assert_eq!(Config::load_or_default(&path).unwrap().package.chunk_size, 0);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        assert!(matches!(Config::load(&path), Err(Error::Io(_))));
        assert_eq!(Config::load_or_default(&path).unwrap(), Config::default());
    }
}
