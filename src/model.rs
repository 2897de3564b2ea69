use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    JsonSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Body,
}

/// One declared parameter of a provider operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ParamDef {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParamLocation,
    pub required: bool,
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// One provider API operation, keyed by `domain:method:path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Endpoint {
    pub domain: String,
    pub path: String,
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub operation_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default)]
    pub deprecated: bool,
    /// Path and query parameters, in declaration order.
    #[serde(default)]
    pub parameters: Vec<ParamDef>,
    /// Request-body fields, in declaration order.
    #[serde(default)]
    pub request_body: Vec<ParamDef>,
}

impl Endpoint {
    pub fn key(&self) -> String {
        endpoint_key(&self.domain, self.method, &self.path)
    }

    /// Combined query + body parameter names, lowercased, for matching
    /// and drift computations. Path parameters are excluded.
    pub fn request_param_names(&self) -> BTreeSet<String> {
        self.parameters
            .iter()
            .filter(|p| p.location == ParamLocation::Query)
            .chain(self.request_body.iter())
            .map(|p| p.name.to_ascii_lowercase())
            .collect()
    }

    /// Query + body `ParamDef`s by lowercased name.
    pub fn request_params(&self) -> BTreeMap<String, &ParamDef> {
        self.parameters
            .iter()
            .filter(|p| p.location == ParamLocation::Query)
            .chain(self.request_body.iter())
            .map(|p| (p.name.to_ascii_lowercase(), p))
            .collect()
    }
}

pub fn endpoint_key(domain: &str, method: HttpMethod, path: &str) -> String {
    format!("{domain}:{method}:{path}")
}

/// One versioned, complete capture of the provider's endpoint universe.
///
/// `endpoints` is a `BTreeMap` so a snapshot built from the same documents
/// always serializes identically.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Snapshot {
    pub version: String,
    pub fetched_at: DateTime<Utc>,
    pub endpoint_count: usize,
    pub domain_counts: BTreeMap<String, usize>,
    pub endpoints: BTreeMap<String, Endpoint>,
}

impl Snapshot {
    pub fn new(version: impl Into<String>, endpoints: BTreeMap<String, Endpoint>) -> Self {
        let mut domain_counts: BTreeMap<String, usize> = BTreeMap::new();
        for endpoint in endpoints.values() {
            *domain_counts.entry(endpoint.domain.clone()).or_default() += 1;
        }
        Self {
            version: version.into(),
            fetched_at: Utc::now(),
            endpoint_count: endpoints.len(),
            domain_counts,
            endpoints,
        }
    }
}

/// One locally declared wrapper tool, as extracted by the inventory scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ToolInventoryEntry {
    /// Unique wrapper identifier users invoke.
    pub name: String,
    /// Originating source file name; drives the domain-gating rule.
    pub file: String,
    /// Normalized client call signatures, instance identifiers stripped.
    pub sdk_calls: BTreeSet<String>,
    /// Top-level declared input parameter names.
    pub params: BTreeSet<String>,
}

/// Persisted reconciliation result for one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ToolMapping {
    /// Endpoint keys this tool implements. Empty means "unmapped, needs
    /// manual attention" and is a valid state, not an error.
    pub endpoints: Vec<String>,
    /// The call signature that produced the best-scoring match.
    pub sdk_path: String,
}

/// Tool name → mapping, in inventory order.
pub type ToolEndpointMap = IndexMap<String, ToolMapping>;

/// Statistics from one Bootstrap Mapper run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MapperStats {
    pub tools_total: usize,
    pub tools_mapped: usize,
    pub tools_unmapped: usize,
    /// Matches scoring inside the low-confidence band, for human review.
    pub low_confidence: Vec<LowConfidenceMatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LowConfidenceMatch {
    pub tool: String,
    pub endpoint: String,
    pub score: u32,
}

/// One recorded provider change from the release history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChangelogEntry {
    pub version: String,
    pub date: String,
    pub domain: String,
    pub description: String,
    pub is_breaking: bool,
}

/// One endpoint whose parameter shape changed between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ParamChange {
    pub endpoint: String,
    pub added: Vec<ParamDef>,
    pub removed: Vec<ParamDef>,
}

/// Version-over-version drift between two snapshots, plus correlated
/// changelog entries. Recomputed on demand, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DriftReport {
    pub current_version: String,
    pub previous_version: Option<String>,
    /// True when no prior snapshot existed; all diff lists are empty and
    /// no comparison was performed.
    pub baseline: bool,
    pub generated_at: DateTime<Utc>,
    pub new_endpoints: Vec<String>,
    pub removed_endpoints: Vec<String>,
    pub param_changes: Vec<ParamChange>,
    pub breaking_changes: Vec<ChangelogEntry>,
    pub changelog_entries: Vec<ChangelogEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DomainCoverage {
    pub domain: String,
    pub mapped: usize,
    pub total: usize,
    pub percent: f64,
}

/// Parameter drift for one mapped tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ToolDrift {
    pub tool: String,
    /// Endpoint parameters the tool does not expose.
    pub missing_in_tool: Vec<String>,
    /// Tool parameters not found on any mapped endpoint. Informational;
    /// may be intentional client-side convenience fields.
    pub extra_in_tool: Vec<String>,
}

/// Coverage and drift metrics for one snapshot against the current map.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CoverageAnalysis {
    pub snapshot_version: String,
    pub generated_at: DateTime<Utc>,
    pub covered_endpoints: usize,
    pub total_endpoints: usize,
    pub global_percent: f64,
    pub domains: Vec<DomainCoverage>,
    pub tool_drift: Vec<ToolDrift>,
    pub unmapped_endpoints: Vec<String>,
}

/// Running sync-state record: loaded at pipeline start, rewritten at
/// pipeline end only on success.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SyncState {
    pub last_synced_version: Option<String>,
    #[serde(default)]
    pub package_versions: BTreeMap<String, String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Ordering key for opaque release identifiers. Semver-style identifiers
/// order numerically; anything else falls back to lexicographic order
/// after all parsed versions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReleaseVersion {
    Semver(u64, u64, u64),
    Opaque(String),
}

impl ReleaseVersion {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim().trim_start_matches('v');
        let mut parts = trimmed.split('.');
        let nums: Option<Vec<u64>> = parts
            .by_ref()
            .take(3)
            .map(|p| p.parse::<u64>().ok())
            .collect();
        match nums.as_deref() {
            Some([major]) => ReleaseVersion::Semver(*major, 0, 0),
            Some([major, minor]) => ReleaseVersion::Semver(*major, *minor, 0),
            Some([major, minor, patch]) if parts.next().is_none() => {
                ReleaseVersion::Semver(*major, *minor, *patch)
            }
            _ => ReleaseVersion::Opaque(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseVersion::Semver(a, b, c) => write!(f, "{a}.{b}.{c}"),
            ReleaseVersion::Opaque(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, location: ParamLocation) -> ParamDef {
        ParamDef {
            name: name.to_string(),
            location,
            required: false,
            param_type: "string".to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn endpoint_key_format() {
        let ep = Endpoint {
            domain: "msg".into(),
            path: "/Messages".into(),
            method: HttpMethod::Post,
            operation_id: String::new(),
            summary: String::new(),
            deprecated: false,
            parameters: vec![],
            request_body: vec![],
        };
        assert_eq!(ep.key(), "msg:post:/Messages");
    }

    #[test]
    fn request_param_names_exclude_path_params() {
        let ep = Endpoint {
            domain: "msg".into(),
            path: "/Messages/{Sid}".into(),
            method: HttpMethod::Get,
            operation_id: String::new(),
            summary: String::new(),
            deprecated: false,
            parameters: vec![
                param("Sid", ParamLocation::Path),
                param("PageSize", ParamLocation::Query),
            ],
            request_body: vec![param("Body", ParamLocation::Body)],
        };
        let names = ep.request_param_names();
        assert!(names.contains("pagesize"));
        assert!(names.contains("body"));
        assert!(!names.contains("sid"));
    }

    #[test]
    fn snapshot_counts_match_endpoints() {
        let ep = Endpoint {
            domain: "msg".into(),
            path: "/Messages".into(),
            method: HttpMethod::Post,
            operation_id: String::new(),
            summary: String::new(),
            deprecated: false,
            parameters: vec![],
            request_body: vec![],
        };
        let mut map = BTreeMap::new();
        map.insert(ep.key(), ep);
        let snapshot = Snapshot::new("1.0.0", map);
        assert_eq!(snapshot.endpoint_count, 1);
        assert_eq!(snapshot.domain_counts.get("msg"), Some(&1));
    }

    #[test]
    fn release_version_ordering() {
        let a = ReleaseVersion::parse("1.38.0");
        let b = ReleaseVersion::parse("1.40.0");
        let c = ReleaseVersion::parse("v2.0.1");
        assert!(a < b);
        assert!(b < c);
        assert_eq!(c, ReleaseVersion::Semver(2, 0, 1));
    }

    #[test]
    fn release_version_opaque_fallback() {
        let opaque = ReleaseVersion::parse("2024-01-rc1");
        assert_matches::assert_matches!(opaque, ReleaseVersion::Opaque(_));
        // Parsed versions sort before opaque identifiers.
        assert!(ReleaseVersion::parse("9.9.9") < opaque);
    }

    #[test]
    fn http_method_roundtrip() {
        let json = serde_json::to_string(&HttpMethod::Delete).unwrap();
        assert_eq!(json, "\"delete\"");
        assert_eq!(HttpMethod::Post.to_string(), "post");
    }
}
