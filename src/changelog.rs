//! Changelog Parser: turns the provider's free-text release history into
//! structured, per-version, per-domain change entries.
//!
//! The format is line-oriented: a version-header line opens a block, bold
//! domain headings tag the bullets beneath them, and the provider's own
//! marker substring flags breaking entries. A block with no recognizable
//! bullets yields zero entries.

use crate::config::ChangelogConfig;
use crate::error::SyncError;
use crate::model::{ChangelogEntry, ReleaseVersion};
use regex::Regex;

#[derive(Debug, Clone, PartialEq)]
pub struct VersionBlock {
    pub version: String,
    pub date: String,
    pub entries: Vec<ChangelogEntry>,
}

pub struct ChangelogParser {
    version_header: Regex,
    domain_heading: Regex,
    breaking_marker: String,
}

impl ChangelogParser {
    pub fn new(config: &ChangelogConfig) -> Result<Self, SyncError> {
        let version_header = Regex::new(&config.version_header)
            .map_err(|e| SyncError::Config(format!("bad version_header regex: {e}")))?;
        let domain_heading = Regex::new(&config.domain_heading)
            .map_err(|e| SyncError::Config(format!("bad domain_heading regex: {e}")))?;
        Ok(Self {
            version_header,
            domain_heading,
            breaking_marker: config.breaking_marker.clone(),
        })
    }

    /// All version blocks in file order (newest first by convention).
    pub fn parse(&self, text: &str) -> Vec<VersionBlock> {
        let mut blocks: Vec<VersionBlock> = Vec::new();
        let mut current_domain: Option<String> = None;

        for line in text.lines() {
            if let Some(caps) = self.version_header.captures(line) {
                blocks.push(VersionBlock {
                    version: caps
                        .name("version")
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default(),
                    date: caps
                        .name("date")
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default(),
                    entries: Vec::new(),
                });
                current_domain = None;
                continue;
            }
            let Some(block) = blocks.last_mut() else {
                // Prose before the first version header.
                continue;
            };
            if let Some(caps) = self.domain_heading.captures(line) {
                current_domain = Some(caps["domain"].to_string());
                continue;
            }
            if let Some(description) = line.trim_start().strip_prefix("- ") {
                // Bullets outside any domain heading are not part of the
                // provider convention and are dropped.
                let Some(domain) = current_domain.clone() else {
                    continue;
                };
                let description = description.trim().to_string();
                if description.is_empty() {
                    continue;
                }
                let is_breaking = description.contains(&self.breaking_marker);
                block.entries.push(ChangelogEntry {
                    version: block.version.clone(),
                    date: block.date.clone(),
                    domain,
                    description,
                    is_breaking,
                });
            }
        }
        blocks
    }

    /// Entries from the current version's block walking backward to, and
    /// excluding, the prior version's block. With no prior version only
    /// the current block contributes.
    pub fn entries_between(
        &self,
        text: &str,
        current: &str,
        previous: Option<&str>,
    ) -> Vec<ChangelogEntry> {
        let current_version = ReleaseVersion::parse(current);
        let previous_version = previous.map(ReleaseVersion::parse);

        let mut entries = Vec::new();
        for block in self.parse(text) {
            let block_version = ReleaseVersion::parse(&block.version);
            if block_version > current_version {
                continue;
            }
            let in_range = match &previous_version {
                Some(prev) => block_version > *prev,
                None => block_version == current_version,
            };
            if in_range {
                entries.extend(block.entries);
            }
        }
        entries
    }
}
