//! Operation settings
//!
//! Every field has a default, so an empty JSON object is a valid config.

use crate::error::SiftError;
use serde::{Deserialize, Serialize};

/// How an archive treats a second entry for the same key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Last write wins
    #[default]
    Overwrite,
    /// Keep the first entry and report the second keyword as failed
    Reject,
}

/// Where an archived page lands relative to its target page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Immediately before the target page
    BeforeMarker,
    /// Immediately after the target page
    #[default]
    AfterMarker,
}

impl Placement {
    /// Subtracted from `target_page + inserted` to get the 0-based insert index
    pub fn offset(self) -> u32 {
        match self {
            Placement::BeforeMarker => 1,
            Placement::AfterMarker => 0,
        }
    }
}

/// Which page of the print document a keyword's insertion targets
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InsertAnchor {
    /// The page on which the keyword was found
    #[default]
    MatchPage,
    /// The last page of the record containing the keyword
    RecordEnd { markers: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub case_sensitive: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            case_sensitive: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsertConfig {
    pub placement: Placement,
    /// Follow every inserted page with a blank one unless it lands last
    pub pad_with_blank: bool,
    pub anchor: InsertAnchor,
    pub case_sensitive: bool,
}

impl Default for InsertConfig {
    fn default() -> Self {
        Self {
            placement: Placement::default(),
            pad_with_blank: true,
            anchor: InsertAnchor::default(),
            case_sensitive: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub collision: CollisionPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Parse attempts before giving up
    pub max_attempts: u32,
    /// Individual fix records before giving up
    pub max_fixes: usize,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            max_fixes: 100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftConfig {
    pub search: SearchConfig,
    pub insert: InsertConfig,
    pub archive: ArchiveConfig,
    pub repair: RepairConfig,
}

impl SiftConfig {
    pub fn from_json(json: &str) -> Result<Self, SiftError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SiftError::SerializationError(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SiftError> {
        if self.repair.max_attempts == 0 {
            return Err(SiftError::InvalidInput(
                "repair.max_attempts must be at least 1".into(),
            ));
        }
        if self.repair.max_fixes == 0 {
            return Err(SiftError::InvalidInput(
                "repair.max_fixes must be at least 1".into(),
            ));
        }
        if let InsertAnchor::RecordEnd { markers } = &self.insert.anchor {
            if markers.iter().all(|m| m.trim().is_empty()) {
                return Err(SiftError::InvalidInput(
                    "insert.anchor.record_end needs at least one marker".into(),
                ));
            }
        }
        Ok(())
    }
}
