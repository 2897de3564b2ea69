use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_TOOLS_DIR: &str = "tools/src";
const DEFAULT_FETCH_CONCURRENCY: usize = 4;

const DEFAULT_SPEC_URL_TEMPLATE: &str =
    "https://raw.githubusercontent.com/twilio/twilio-oai/{version}/spec/json/twilio_{domain}.json";
const DEFAULT_CHANGELOG_URL_TEMPLATE: &str =
    "https://raw.githubusercontent.com/twilio/twilio-oai/{version}/CHANGES.md";

/// Full runtime configuration: CLI over config file over defaults.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub data_dir: PathBuf,
    pub tools_dir: PathBuf,
    /// API domains to track, one spec document each per release.
    pub domains: Vec<String>,
    /// URL with `{version}` and `{domain}` placeholders.
    pub spec_url_template: String,
    /// URL with a `{version}` placeholder.
    pub changelog_url_template: String,
    /// When set, spec documents are read from this directory instead of
    /// the network: `{spec_dir}/{version}/{domain}.json`.
    pub spec_dir: Option<PathBuf>,
    /// Provider SDK packages whose versions are recorded in sync-state.
    pub packages: Vec<String>,
    pub fetch_concurrency: usize,
    pub scan: ScanConfig,
    pub matcher: MatcherConfig,
    pub changelog: ChangelogConfig,
}

/// Lexical-scan markers. Pure data so the scanner stays host-language
/// agnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Exact delimiter opening one tool definition.
    pub definition_marker: String,
    /// Identifier of the provider client object in wrapper source.
    pub client_object: String,
    /// Marker introducing the parameter-schema sub-block.
    pub schema_marker: String,
    /// File names excluded from scanning (non-API helper tools).
    pub excluded_files: BTreeSet<String>,
    /// Source file extensions considered by the scan.
    pub extensions: BTreeSet<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            definition_marker: "server.tool(".to_string(),
            client_object: "client".to_string(),
            schema_marker: "inputSchema:".to_string(),
            excluded_files: BTreeSet::new(),
            extensions: ["ts", "js"].into_iter().map(str::to_string).collect(),
        }
    }
}

/// Scoring thresholds and lookup tables for the Bootstrap Mapper.
///
/// The threshold constants are empirically tuned values carried over from
/// the curated mapping history; they are configuration, not derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Minimum score to accept a match at all.
    pub min_score: u32,
    /// Accepted matches strictly below this score are flagged for review.
    pub low_confidence_score: u32,
    pub method_bonus: u32,
    pub noun_bonus: u32,
    pub resource_bonus: u32,
    pub shape_bonus: u32,
    pub param_bonus: u32,
    pub operation_prefix_bonus: u32,
    /// Source file name → domains its tools may match. Files absent from
    /// the table are unconstrained.
    pub domain_gates: BTreeMap<String, BTreeSet<String>>,
    /// Singularized tool noun → path segment it implies.
    pub noun_segments: BTreeMap<String, String>,
    /// Path placeholders that legitimately terminate collection endpoints
    /// (account/service/workspace scoping identifiers).
    pub scoping_placeholders: BTreeSet<String>,
    /// Parameter names ignored by overlap scoring and drift (lowercase).
    pub pagination_params: BTreeSet<String>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        let noun_segments = [
            ("message", "Messages"),
            ("sms", "Messages"),
            ("call", "Calls"),
            ("recording", "Recordings"),
            ("transcription", "Transcriptions"),
            ("conference", "Conferences"),
            ("participant", "Participants"),
            ("queue", "Queues"),
            ("address", "Addresses"),
            ("application", "Applications"),
            ("key", "Keys"),
            ("account", "Accounts"),
            ("incoming_phone_number", "IncomingPhoneNumbers"),
            ("phone_number", "IncomingPhoneNumbers"),
            ("available_phone_number", "AvailablePhoneNumbers"),
            ("verification", "Verifications"),
            ("verification_check", "VerificationCheck"),
            ("service", "Services"),
            ("usage_record", "Usage/Records"),
            ("usage_trigger", "Usage/Triggers"),
            ("media", "Media"),
            ("feedback", "Feedback"),
        ]
        .into_iter()
        .map(|(noun, segment)| (noun.to_string(), segment.to_string()))
        .collect();

        Self {
            min_score: 40,
            low_confidence_score: 60,
            method_bonus: 25,
            noun_bonus: 50,
            resource_bonus: 30,
            shape_bonus: 10,
            param_bonus: 5,
            operation_prefix_bonus: 5,
            domain_gates: BTreeMap::new(),
            noun_segments,
            scoping_placeholders: ["AccountSid", "ServiceSid", "WorkspaceSid"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            pagination_params: ["page", "pagesize", "pagetoken", "limit"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Changelog lexical conventions, per the provider's release-notes format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangelogConfig {
    /// Regex with `date` and `version` capture groups matching a
    /// version-header line.
    pub version_header: String,
    /// Regex with a `domain` capture group matching a domain heading.
    pub domain_heading: String,
    /// Substring marking an entry as breaking.
    pub breaking_marker: String,
}

impl Default for ChangelogConfig {
    fn default() -> Self {
        Self {
            version_header: r"^\[(?P<date>\d{4}-\d{2}-\d{2})\]\s+Version\s+(?P<version>\S+)"
                .to_string(),
            domain_heading: r"^\*\*(?P<domain>[A-Za-z][\w ]*)\*\*\s*$".to_string(),
            breaking_marker: "**(breaking change)**".to_string(),
        }
    }
}

impl SyncConfig {
    pub fn from_args(args: &CommonArgs) -> Result<Self> {
        let file_config = if let Some(path) = args.config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let data_dir = args
            .data_dir
            .clone()
            .or(file_config.data_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let tools_dir = args
            .tools_dir
            .clone()
            .or(file_config.tools_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TOOLS_DIR));

        let domains = args
            .domains
            .clone()
            .or(file_config.domains)
            .unwrap_or_default()
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect::<Vec<_>>();
        anyhow::ensure!(
            !domains.is_empty(),
            "at least one tracked domain must be configured"
        );

        let fetch_concurrency = file_config
            .fetch_concurrency
            .unwrap_or(DEFAULT_FETCH_CONCURRENCY)
            .max(1);

        Ok(Self {
            data_dir,
            tools_dir,
            domains,
            spec_url_template: file_config
                .spec_url_template
                .unwrap_or_else(|| DEFAULT_SPEC_URL_TEMPLATE.to_string()),
            changelog_url_template: file_config
                .changelog_url_template
                .unwrap_or_else(|| DEFAULT_CHANGELOG_URL_TEMPLATE.to_string()),
            spec_dir: args.spec_dir.clone().or(file_config.spec_dir),
            packages: file_config.packages.unwrap_or_default(),
            fetch_concurrency,
            scan: file_config.scan.unwrap_or_default(),
            matcher: file_config.matcher.unwrap_or_default(),
            changelog: file_config.changelog.unwrap_or_default(),
        })
    }

    pub fn ensure_tools_dir(&self) -> Result<()> {
        anyhow::ensure!(
            self.tools_dir.is_dir(),
            "tools directory {:?} does not exist",
            self.tools_dir
        );
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(name = "toolsync", about = "Provider API sync for MCP tool wrappers", version)]
pub struct CliArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Default, Clone)]
pub struct CommonArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)",
        global = true
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "TOOLSYNC_DATA_DIR",
        value_name = "DIR",
        help = "Directory holding persisted snapshots, maps and reports",
        global = true
    )]
    pub data_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "TOOLSYNC_TOOLS_DIR",
        value_name = "DIR",
        help = "Directory of wrapper tool source files to scan",
        global = true
    )]
    pub tools_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "TOOLSYNC_DOMAINS",
        value_name = "DOMAIN",
        value_delimiter = ',',
        help = "Comma-separated list of API domains to track",
        global = true
    )]
    pub domains: Option<Vec<String>>,

    #[arg(
        long,
        env = "TOOLSYNC_SPEC_DIR",
        value_name = "DIR",
        help = "Read spec documents from a local directory instead of the network",
        global = true
    )]
    pub spec_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full pipeline: normalize, scan, diff, analyze, report.
    Sync {
        #[arg(long, help = "Proceed even when the release matches the last-synced one")]
        force: bool,
        #[arg(long, help = "Regenerate the tool-endpoint map even if one exists")]
        remap: bool,
        #[arg(long, value_name = "VERSION", help = "Release to sync (default: latest)")]
        release: Option<String>,
    },
    /// Run only the heuristic matcher against an existing snapshot.
    Bootstrap {
        #[arg(long, value_name = "VERSION")]
        release: Option<String>,
    },
    /// Recompute coverage from the persisted map and latest snapshot.
    Coverage,
    /// Diff the latest snapshot against its predecessor.
    Diff {
        #[arg(long, value_name = "VERSION")]
        release: Option<String>,
    },
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    data_dir: Option<PathBuf>,
    tools_dir: Option<PathBuf>,
    domains: Option<Vec<String>>,
    spec_url_template: Option<String>,
    changelog_url_template: Option<String>,
    spec_dir: Option<PathBuf>,
    packages: Option<Vec<String>>,
    fetch_concurrency: Option<usize>,
    scan: Option<ScanConfig>,
    matcher: Option<MatcherConfig>,
    changelog: Option<ChangelogConfig>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    anyhow::ensure!(path.exists(), "config file {:?} does not exist", path);
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}
