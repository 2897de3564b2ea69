//! Pipeline orchestration: a linear, idempotent run of
//! fetch/normalize → scan → match → diff/analyze → report.
//!
//! Sync-state is loaded at the start and committed only after every stage
//! has succeeded; a failed stage leaves no partial artifact and no state
//! change. Re-running against an unchanged release short-circuits to a
//! no-op unless forced.

use crate::config::SyncConfig;
use crate::coverage::analyze_coverage;
use crate::diff::diff_snapshots;
use crate::error::SyncError;
use crate::inventory::scan_inventory;
use crate::matcher::bootstrap_map;
use crate::model::{CoverageAnalysis, MapperStats};
use crate::report::SyncReport;
use crate::spec::{
    build_snapshot, ChangelogSource, DirSpecSource, HttpSpecSource, NpmPackageSource,
    PackageVersionSource, SpecSource, StaticPackageVersions, UNKNOWN_VERSION,
};
use crate::store::ArtifactStore;
use chrono::Utc;
use tracing::{info, warn};

/// External collaborators the pipeline talks to. Injected so tests and
/// offline runs never touch the network.
pub struct Collaborators {
    pub spec: Box<dyn SpecSource>,
    pub changelog: Box<dyn ChangelogSource>,
    pub packages: Box<dyn PackageVersionSource>,
}

impl Collaborators {
    pub fn from_config(config: &SyncConfig) -> Self {
        match &config.spec_dir {
            Some(dir) => Self {
                spec: Box::new(DirSpecSource::new(dir.clone())),
                changelog: Box::new(DirSpecSource::new(dir.clone())),
                packages: Box::new(StaticPackageVersions::default()),
            },
            None => Self {
                spec: Box::new(HttpSpecSource::new(
                    config.spec_url_template.clone(),
                    config.changelog_url_template.clone(),
                )),
                changelog: Box::new(HttpSpecSource::new(
                    config.spec_url_template.clone(),
                    config.changelog_url_template.clone(),
                )),
                packages: Box::new(NpmPackageSource::new()),
            },
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct SyncOptions {
    /// Proceed even when the release matches the last-synced one.
    pub force: bool,
    /// Regenerate the tool-endpoint map even if a curated one exists.
    pub remap: bool,
    pub release: Option<String>,
}

#[derive(Debug)]
pub enum SyncOutcome {
    /// The detected release matches the last-synced one; nothing ran.
    NoOp { version: String },
    Completed {
        version: String,
        report: Box<SyncReport>,
    },
}

/// Run the full pipeline once.
pub async fn run_sync(
    config: &SyncConfig,
    collaborators: &Collaborators,
    options: &SyncOptions,
) -> Result<SyncOutcome, SyncError> {
    let store = ArtifactStore::new(&config.data_dir);
    let mut state = store.load_sync_state()?;

    let release = resolve_release(config, collaborators, options.release.as_deref()).await?;
    if !options.force && state.last_synced_version.as_deref() == Some(release.as_str()) {
        info!(release, "release unchanged since last sync; nothing to do");
        return Ok(SyncOutcome::NoOp { version: release });
    }

    // Stage 1: normalize the provider spec into a snapshot.
    let snapshot = build_snapshot(
        collaborators.spec.as_ref(),
        &release,
        &config.domains,
        config.fetch_concurrency,
    )
    .await?;
    store.save_snapshot(&snapshot)?;
    info!(
        release,
        endpoints = snapshot.endpoint_count,
        "snapshot persisted"
    );

    // Stage 2: scan the wrapper sources.
    config.ensure_tools_dir()?;
    let inventory = scan_inventory(&config.tools_dir, &config.scan)?;
    store.save_inventory(&inventory)?;
    info!(tools = inventory.len(), "inventory persisted");

    // Stage 3: bootstrap the map when absent or explicitly requested.
    // An existing map is treated as human-curated and left untouched.
    let (map, mapper_stats) = if options.remap || !store.map_exists() {
        let result = bootstrap_map(&snapshot, &inventory, &config.matcher);
        store.save_map(&result.map)?;
        (result.map, Some(result.stats))
    } else {
        (store.load_map()?, None)
    };

    // Stage 4: diff against the closest predecessor.
    let previous = store.previous_snapshot(&release)?;
    let changelog_text = collaborators.changelog.fetch_changelog(&release).await;
    let drift = diff_snapshots(
        &snapshot,
        previous.as_ref(),
        &changelog_text,
        &config.changelog,
    )?;

    // Stage 5: coverage against the (possibly curated) map.
    let coverage = analyze_coverage(&snapshot, &map, &inventory, &config.matcher);

    let mut report = SyncReport::new(drift).with_coverage(coverage);
    if let Some(stats) = mapper_stats {
        report = report.with_mapper_stats(stats);
    }
    if changelog_text.is_empty() {
        report.notes.push(
            "changelog unavailable or empty; breaking-change detection yielded no entries"
                .to_string(),
        );
    }
    store.save_report(&report)?;
    store.save_report_markdown(&report.render_markdown())?;

    // Commit sync-state only now that every stage has succeeded.
    state.package_versions.clear();
    for package in &config.packages {
        let version = collaborators.packages.package_version(package).await;
        if version == UNKNOWN_VERSION {
            warn!(package, "package version could not be resolved");
        }
        state.package_versions.insert(package.clone(), version);
    }
    state.last_synced_version = Some(release.clone());
    state.updated_at = Some(Utc::now());
    store.save_sync_state(&state)?;

    Ok(SyncOutcome::Completed {
        version: release,
        report: Box::new(report),
    })
}

/// Run only the bootstrap mapper against a persisted snapshot, rescanning
/// the inventory first.
pub async fn run_bootstrap(
    config: &SyncConfig,
    release: Option<&str>,
) -> Result<MapperStats, SyncError> {
    let store = ArtifactStore::new(&config.data_dir);
    let version = resolve_persisted_version(&store, release)?;
    let snapshot = store.load_snapshot(&version)?;

    config.ensure_tools_dir()?;
    let inventory = scan_inventory(&config.tools_dir, &config.scan)?;
    store.save_inventory(&inventory)?;

    let result = bootstrap_map(&snapshot, &inventory, &config.matcher);
    store.save_map(&result.map)?;
    Ok(result.stats)
}

/// Recompute coverage from persisted artifacts only.
pub fn run_coverage(config: &SyncConfig) -> Result<CoverageAnalysis, SyncError> {
    let store = ArtifactStore::new(&config.data_dir);
    let version = resolve_persisted_version(&store, None)?;
    let snapshot = store.load_snapshot(&version)?;
    let map = store.load_map()?;
    let inventory = store.load_inventory()?;
    Ok(analyze_coverage(&snapshot, &map, &inventory, &config.matcher))
}

/// Diff a persisted snapshot against its predecessor and refresh the
/// report artifacts.
pub async fn run_diff(
    config: &SyncConfig,
    collaborators: &Collaborators,
    release: Option<&str>,
) -> Result<SyncReport, SyncError> {
    let store = ArtifactStore::new(&config.data_dir);
    let version = resolve_persisted_version(&store, release)?;
    let snapshot = store.load_snapshot(&version)?;
    let previous = store.previous_snapshot(&version)?;
    let changelog_text = collaborators.changelog.fetch_changelog(&version).await;

    let drift = diff_snapshots(
        &snapshot,
        previous.as_ref(),
        &changelog_text,
        &config.changelog,
    )?;
    let report = SyncReport::new(drift);
    store.save_report(&report)?;
    store.save_report_markdown(&report.render_markdown())?;
    Ok(report)
}

/// The release to operate on: explicit, else detected from the first
/// tracked package.
async fn resolve_release(
    config: &SyncConfig,
    collaborators: &Collaborators,
    explicit: Option<&str>,
) -> Result<String, SyncError> {
    if let Some(release) = explicit {
        return Ok(release.to_string());
    }
    let Some(package) = config.packages.first() else {
        return Err(SyncError::Config(
            "no release given and no packages configured to detect one from".to_string(),
        ));
    };
    let version = collaborators.packages.package_version(package).await;
    if version == UNKNOWN_VERSION {
        return Err(SyncError::Config(format!(
            "no release given and the version of package `{package}` could not be detected"
        )));
    }
    Ok(version)
}

fn resolve_persisted_version(
    store: &ArtifactStore,
    release: Option<&str>,
) -> Result<String, SyncError> {
    match release {
        Some(version) => Ok(version.to_string()),
        None => store
            .latest_snapshot_version()?
            .ok_or_else(|| SyncError::MissingArtifact {
                path: store.snapshot_path("<version>"),
                produced_by: "toolsync sync".to_string(),
            }),
    }
}
