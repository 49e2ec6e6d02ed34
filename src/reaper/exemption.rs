//! Exemption filter.
//!
//! A channel is exempt when any keyword, minus one leading `#`, appears in
//! its name. Matching is case-sensitive.

use std::path::Path;

use crate::error::ConfigError;

/// Keywords loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct ExemptionList {
    keywords: Vec<String>,
}

impl ExemptionList {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| {
                    let k: String = k.into();
                    k.trim().to_string()
                })
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// One keyword per line. A missing file yields an empty list.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            tracing::info!(path = %path.display(), "No exemption file, nothing is exempt");
            return Ok(Self::default());
        }
        Self::read(path)
    }

    /// Like [`load`](Self::load), but a missing file is an error.
    pub fn load_required(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        Self::read(path)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::new(content.lines()))
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn is_exempt(&self, channel_name: &str) -> bool {
        self.keywords.iter().any(|keyword| {
            let needle = keyword.strip_prefix('#').unwrap_or(keyword);
            channel_name.contains(needle)
        })
    }
}
