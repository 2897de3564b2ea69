//! Version Diff Engine: set algebra over two snapshots plus correlated
//! changelog entries.
//!
//! Output is sparse: endpoints whose parameter shape is unchanged produce
//! no entry. With no prior snapshot the report degrades to an explicit
//! baseline, never an error.

use crate::changelog::ChangelogParser;
use crate::config::ChangelogConfig;
use crate::error::SyncError;
use crate::model::{DriftReport, Endpoint, ParamChange, ParamDef, ParamLocation, Snapshot};
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::info;

/// Diff the current snapshot against its predecessor.
pub fn diff_snapshots(
    current: &Snapshot,
    previous: Option<&Snapshot>,
    changelog_text: &str,
    changelog_config: &ChangelogConfig,
) -> Result<DriftReport, SyncError> {
    let parser = ChangelogParser::new(changelog_config)?;

    let Some(previous) = previous else {
        info!(version = %current.version, "no prior snapshot; producing baseline report");
        let changelog_entries = parser.entries_between(changelog_text, &current.version, None);
        let breaking_changes = changelog_entries
            .iter()
            .filter(|e| e.is_breaking)
            .cloned()
            .collect();
        return Ok(DriftReport {
            current_version: current.version.clone(),
            previous_version: None,
            baseline: true,
            generated_at: Utc::now(),
            new_endpoints: Vec::new(),
            removed_endpoints: Vec::new(),
            param_changes: Vec::new(),
            breaking_changes,
            changelog_entries,
        });
    };

    let new_endpoints: Vec<String> = current
        .endpoints
        .keys()
        .filter(|k| !previous.endpoints.contains_key(*k))
        .cloned()
        .collect();
    let removed_endpoints: Vec<String> = previous
        .endpoints
        .keys()
        .filter(|k| !current.endpoints.contains_key(*k))
        .cloned()
        .collect();

    let mut param_changes = Vec::new();
    for (key, current_endpoint) in &current.endpoints {
        let Some(previous_endpoint) = previous.endpoints.get(key) else {
            continue;
        };
        if let Some(change) = param_change(key, previous_endpoint, current_endpoint) {
            param_changes.push(change);
        }
    }

    let changelog_entries = parser.entries_between(
        changelog_text,
        &current.version,
        Some(previous.version.as_str()),
    );
    let breaking_changes = changelog_entries
        .iter()
        .filter(|e| e.is_breaking)
        .cloned()
        .collect();

    info!(
        current = %current.version,
        previous = %previous.version,
        new = new_endpoints.len(),
        removed = removed_endpoints.len(),
        changed = param_changes.len(),
        "snapshot diff complete"
    );

    Ok(DriftReport {
        current_version: current.version.clone(),
        previous_version: Some(previous.version.clone()),
        baseline: false,
        generated_at: Utc::now(),
        new_endpoints,
        removed_endpoints,
        param_changes,
        breaking_changes,
        changelog_entries,
    })
}

/// Combined query + body parameters keyed by exact name.
fn request_params_by_name(endpoint: &Endpoint) -> BTreeMap<&str, &ParamDef> {
    endpoint
        .parameters
        .iter()
        .filter(|p| p.location == ParamLocation::Query)
        .chain(endpoint.request_body.iter())
        .map(|p| (p.name.as_str(), p))
        .collect()
}

/// A change entry when the symmetric difference of the two endpoints'
/// parameter-name sets is non-empty, `None` otherwise.
fn param_change(key: &str, previous: &Endpoint, current: &Endpoint) -> Option<ParamChange> {
    let previous_params = request_params_by_name(previous);
    let current_params = request_params_by_name(current);

    let added: Vec<ParamDef> = current_params
        .iter()
        .filter(|(name, _)| !previous_params.contains_key(**name))
        .map(|(_, p)| (*p).clone())
        .collect();
    let removed: Vec<ParamDef> = previous_params
        .iter()
        .filter(|(name, _)| !current_params.contains_key(**name))
        .map(|(_, p)| (*p).clone())
        .collect();

    if added.is_empty() && removed.is_empty() {
        return None;
    }
    Some(ParamChange {
        endpoint: key.to_string(),
        added,
        removed,
    })
}
