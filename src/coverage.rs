//! Coverage Analyzer: coverage percentages and per-tool parameter drift
//! from the current snapshot, the curated tool-endpoint map, and the tool
//! inventory.

use crate::config::MatcherConfig;
use crate::model::{
    CoverageAnalysis, DomainCoverage, Snapshot, ToolDrift, ToolEndpointMap, ToolInventoryEntry,
};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Parameter names of the form `Item1.Field`: numbered repeating groups
/// the provider enumerates per index but a tool exposes once as an array.
/// Excluded from drift entirely.
static INDEXED_FAMILY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]+[0-9]+\..+").expect("indexed family regex"));

pub fn analyze_coverage(
    snapshot: &Snapshot,
    map: &ToolEndpointMap,
    inventory: &[ToolInventoryEntry],
    config: &MatcherConfig,
) -> CoverageAnalysis {
    // Distinct mapped keys, restricted to endpoints that still exist in
    // the current snapshot (the curated map may reference retired keys).
    let mapped_keys: BTreeSet<&str> = map
        .values()
        .flat_map(|mapping| mapping.endpoints.iter())
        .map(String::as_str)
        .filter(|key| snapshot.endpoints.contains_key(*key))
        .collect();

    let total = snapshot.endpoint_count;
    let covered = mapped_keys.len();
    let global_percent = percent(covered, total);

    let mut domain_mapped: BTreeMap<&str, usize> = BTreeMap::new();
    for key in &mapped_keys {
        if let Some(endpoint) = snapshot.endpoints.get(*key) {
            *domain_mapped.entry(endpoint.domain.as_str()).or_default() += 1;
        }
    }
    let domains = snapshot
        .domain_counts
        .iter()
        .map(|(domain, total)| {
            let mapped = domain_mapped.get(domain.as_str()).copied().unwrap_or(0);
            DomainCoverage {
                domain: domain.clone(),
                mapped,
                total: *total,
                percent: percent(mapped, *total),
            }
        })
        .collect();

    let inventory_by_name: BTreeMap<&str, &ToolInventoryEntry> =
        inventory.iter().map(|t| (t.name.as_str(), t)).collect();

    let mut tool_drift = Vec::new();
    for (name, mapping) in map {
        if mapping.endpoints.is_empty() {
            continue;
        }
        let Some(tool) = inventory_by_name.get(name.as_str()) else {
            continue;
        };
        if let Some(drift) = compute_tool_drift(name, tool, &mapping.endpoints, snapshot, config) {
            tool_drift.push(drift);
        }
    }

    let unmapped_endpoints: Vec<String> = snapshot
        .endpoints
        .keys()
        .filter(|key| !mapped_keys.contains(key.as_str()))
        .cloned()
        .collect();

    info!(
        covered,
        total,
        global_percent,
        drifting_tools = tool_drift.len(),
        "coverage analysis complete"
    );

    CoverageAnalysis {
        snapshot_version: snapshot.version.clone(),
        generated_at: Utc::now(),
        covered_endpoints: covered,
        total_endpoints: total,
        global_percent,
        domains,
        tool_drift,
        unmapped_endpoints,
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64) * 100.0
}

/// Drift for one mapped tool, or `None` when it exposes every expected
/// parameter and declares no extras.
fn compute_tool_drift(
    name: &str,
    tool: &ToolInventoryEntry,
    endpoint_keys: &[String],
    snapshot: &Snapshot,
    config: &MatcherConfig,
) -> Option<ToolDrift> {
    let tool_params: BTreeSet<String> =
        tool.params.iter().map(|p| p.to_ascii_lowercase()).collect();

    // Union of expected parameters across every mapped endpoint, keyed by
    // lowercased name but reported in the provider's casing.
    let mut expected: BTreeMap<String, String> = BTreeMap::new();
    let mut endpoint_param_names: BTreeSet<String> = BTreeSet::new();
    for key in endpoint_keys {
        let Some(endpoint) = snapshot.endpoints.get(key) else {
            continue;
        };
        for (lower, param) in endpoint.request_params() {
            endpoint_param_names.insert(lower.clone());
            if config.pagination_params.contains(&lower) {
                continue;
            }
            if INDEXED_FAMILY.is_match(&param.name) {
                continue;
            }
            expected.entry(lower).or_insert_with(|| param.name.clone());
        }
    }

    let missing_in_tool: Vec<String> = expected
        .iter()
        .filter(|(lower, _)| !tool_params.contains(*lower))
        .map(|(_, original)| original.clone())
        .collect();
    let extra_in_tool: Vec<String> = tool
        .params
        .iter()
        .filter(|p| {
            let lower = p.to_ascii_lowercase();
            !endpoint_param_names.contains(&lower)
                && !config.pagination_params.contains(&lower)
        })
        .cloned()
        .collect();

    if missing_in_tool.is_empty() && extra_in_tool.is_empty() {
        return None;
    }
    Some(ToolDrift {
        tool: name.to_string(),
        missing_in_tool,
        extra_in_tool,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Endpoint, HttpMethod, ParamDef, ParamLocation, ToolMapping};

    fn body_param(name: &str) -> ParamDef {
        ParamDef {
            name: name.to_string(),
            location: ParamLocation::Body,
            required: false,
            param_type: "string".to_string(),
            description: String::new(),
        }
    }

    fn endpoint(domain: &str, method: HttpMethod, path: &str, body: &[&str]) -> Endpoint {
        Endpoint {
            domain: domain.to_string(),
            path: path.to_string(),
            method,
            operation_id: String::new(),
            summary: String::new(),
            deprecated: false,
            parameters: vec![],
            request_body: body.iter().map(|n| body_param(n)).collect(),
        }
    }

    fn snapshot_of(endpoints: Vec<Endpoint>) -> Snapshot {
        let map: BTreeMap<String, Endpoint> =
            endpoints.into_iter().map(|e| (e.key(), e)).collect();
        Snapshot::new("1.0.0", map)
    }

    fn tool(name: &str, params: &[&str]) -> ToolInventoryEntry {
        ToolInventoryEntry {
            name: name.to_string(),
            file: "tools.ts".to_string(),
            sdk_calls: BTreeSet::new(),
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn mapping(keys: &[&str]) -> ToolMapping {
        ToolMapping {
            endpoints: keys.iter().map(|k| k.to_string()).collect(),
            sdk_path: String::new(),
        }
    }

    #[test]
    fn global_and_domain_coverage() {
        let snapshot = snapshot_of(vec![
            endpoint("msg", HttpMethod::Post, "/Messages", &[]),
            endpoint("msg", HttpMethod::Get, "/Messages", &[]),
            endpoint("voice", HttpMethod::Post, "/Calls", &[]),
            endpoint("voice", HttpMethod::Get, "/Calls", &[]),
        ]);
        let mut map = ToolEndpointMap::new();
        map.insert("send_sms".into(), mapping(&["msg:post:/Messages"]));
        map.insert("list_sms".into(), mapping(&["msg:get:/Messages"]));
        let inventory = vec![tool("send_sms", &[]), tool("list_sms", &[])];

        let analysis = analyze_coverage(&snapshot, &map, &inventory, &MatcherConfig::default());
        assert_eq!(analysis.covered_endpoints, 2);
        assert_eq!(analysis.total_endpoints, 4);
        assert!((analysis.global_percent - 50.0).abs() < f64::EPSILON);

        let msg = analysis.domains.iter().find(|d| d.domain == "msg").unwrap();
        assert_eq!((msg.mapped, msg.total), (2, 2));
        assert!((msg.percent - 100.0).abs() < f64::EPSILON);
        let voice = analysis.domains.iter().find(|d| d.domain == "voice").unwrap();
        assert_eq!((voice.mapped, voice.total), (0, 2));

        assert_eq!(
            analysis.unmapped_endpoints,
            vec!["voice:get:/Calls", "voice:post:/Calls"]
        );
    }

    #[test]
    fn coverage_bounds_hold() {
        let snapshot = snapshot_of(vec![endpoint("msg", HttpMethod::Post, "/Messages", &[])]);
        let empty_map = ToolEndpointMap::new();
        let analysis = analyze_coverage(&snapshot, &empty_map, &[], &MatcherConfig::default());
        assert_eq!(analysis.global_percent, 0.0);

        let mut full_map = ToolEndpointMap::new();
        full_map.insert("send_sms".into(), mapping(&["msg:post:/Messages"]));
        let analysis =
            analyze_coverage(&snapshot, &full_map, &[tool("send_sms", &[])], &MatcherConfig::default());
        assert!((analysis.global_percent - 100.0).abs() < f64::EPSILON);

        // Empty snapshot never divides by zero.
        let analysis = analyze_coverage(
            &snapshot_of(vec![]),
            &full_map,
            &[tool("send_sms", &[])],
            &MatcherConfig::default(),
        );
        assert_eq!(analysis.global_percent, 0.0);
    }

    #[test]
    fn coverage_non_decreasing_when_mapping_added() {
        let snapshot = snapshot_of(vec![
            endpoint("msg", HttpMethod::Post, "/Messages", &[]),
            endpoint("voice", HttpMethod::Post, "/Calls", &[]),
        ]);
        let mut map = ToolEndpointMap::new();
        map.insert("send_sms".into(), mapping(&["msg:post:/Messages"]));
        let before =
            analyze_coverage(&snapshot, &map, &[tool("send_sms", &[])], &MatcherConfig::default());
        map.insert("create_call".into(), mapping(&["voice:post:/Calls"]));
        let after = analyze_coverage(
            &snapshot,
            &map,
            &[tool("send_sms", &[]), tool("create_call", &[])],
            &MatcherConfig::default(),
        );
        assert!(after.global_percent >= before.global_percent);
    }

    #[test]
    fn missing_and_extra_params_reported() {
        let snapshot = snapshot_of(vec![endpoint(
            "msg",
            HttpMethod::Post,
            "/Messages",
            &["To", "From", "Body", "StatusCallback"],
        )]);
        let mut map = ToolEndpointMap::new();
        map.insert("send_sms".into(), mapping(&["msg:post:/Messages"]));
        let inventory = vec![tool("send_sms", &["to", "from", "body", "dryRun"])];

        let analysis = analyze_coverage(&snapshot, &map, &inventory, &MatcherConfig::default());
        assert_eq!(analysis.tool_drift.len(), 1);
        let drift = &analysis.tool_drift[0];
        assert_eq!(drift.missing_in_tool, vec!["StatusCallback"]);
        assert_eq!(drift.extra_in_tool, vec!["dryRun"]);
    }

    #[test]
    fn indexed_family_params_excluded_from_drift() {
        let snapshot = snapshot_of(vec![endpoint(
            "media",
            HttpMethod::Post,
            "/Compositions",
            &["Track1.Name", "Track2.Name", "Format"],
        )]);
        let mut map = ToolEndpointMap::new();
        map.insert("create_composition".into(), mapping(&["media:post:/Compositions"]));
        let inventory = vec![tool("create_composition", &["format"])];

        let analysis = analyze_coverage(&snapshot, &map, &inventory, &MatcherConfig::default());
        // Format is covered and the indexed family is exempt, so there is
        // no drift at all.
        assert!(analysis.tool_drift.is_empty());
    }

    #[test]
    fn pagination_params_excluded_from_drift() {
        let snapshot = snapshot_of(vec![endpoint(
            "msg",
            HttpMethod::Get,
            "/Messages",
            &["PageSize", "To"],
        )]);
        let mut map = ToolEndpointMap::new();
        map.insert("list_sms".into(), mapping(&["msg:get:/Messages"]));
        let inventory = vec![tool("list_sms", &["to"])];

        let analysis = analyze_coverage(&snapshot, &map, &inventory, &MatcherConfig::default());
        assert!(analysis.tool_drift.is_empty());
    }

    #[test]
    fn stale_map_keys_do_not_inflate_coverage() {
        let snapshot = snapshot_of(vec![endpoint("msg", HttpMethod::Post, "/Messages", &[])]);
        let mut map = ToolEndpointMap::new();
        map.insert(
            "send_sms".into(),
            mapping(&["msg:post:/Messages", "msg:post:/Retired"]),
        );
        let analysis =
            analyze_coverage(&snapshot, &map, &[tool("send_sms", &[])], &MatcherConfig::default());
        assert_eq!(analysis.covered_endpoints, 1);
        assert!(analysis.global_percent <= 100.0);
    }
}
