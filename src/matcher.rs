//! Heuristic Matcher (Bootstrap Mapper): scores every tool call signature
//! against every snapshot endpoint and persists the best matches.
//!
//! The output is a starting point for human curation, not ground truth:
//! unmapped tools and low-confidence matches are surfaced in the run
//! statistics for manual follow-up. Given the same snapshot and inventory
//! the mapper produces an identical map on every run; candidates are
//! enumerated in sorted key order and a strictly greater score is required
//! to displace the current best, so ties break to the first candidate.

use crate::config::MatcherConfig;
use crate::model::{
    Endpoint, HttpMethod, LowConfidenceMatch, MapperStats, Snapshot, ToolEndpointMap,
    ToolInventoryEntry, ToolMapping,
};
use tracing::{debug, info};

/// Leading tokens recognized as verbs when splitting a tool name into
/// verb + compound noun.
const VERB_TOKENS: &[&str] = &[
    "create", "add", "send", "make", "start", "trigger", "associate", "delete", "remove", "update",
    "configure", "get", "fetch", "list", "search", "each", "page",
];

/// Trailing call-signature verbs that imply an HTTP method.
const CALL_VERB_METHODS: &[(&str, HttpMethod)] = &[
    ("create", HttpMethod::Post),
    ("list", HttpMethod::Get),
    ("fetch", HttpMethod::Get),
    ("each", HttpMethod::Get),
    ("page", HttpMethod::Get),
    ("update", HttpMethod::Post),
    ("remove", HttpMethod::Delete),
    ("delete", HttpMethod::Delete),
];

const INSTANCE_VERBS: &[&str] = &["fetch", "update", "remove", "delete", "get", "configure"];
const COLLECTION_VERBS: &[&str] = &[
    "list", "create", "add", "send", "make", "start", "trigger", "search",
];

#[derive(Debug)]
pub struct BootstrapResult {
    pub map: ToolEndpointMap,
    pub stats: MapperStats,
}

/// Produce a tool-endpoint map from one snapshot and the tool inventory.
pub fn bootstrap_map(
    snapshot: &Snapshot,
    inventory: &[ToolInventoryEntry],
    config: &MatcherConfig,
) -> BootstrapResult {
    let mut map = ToolEndpointMap::new();
    let mut stats = MapperStats {
        tools_total: inventory.len(),
        ..Default::default()
    };

    for tool in inventory {
        let mut endpoints: Vec<String> = Vec::new();
        // (score, call) of the best accepted match; ties keep the first.
        let mut best_accepted: Option<(u32, String)> = None;

        for call in &tool.sdk_calls {
            let mut best: Option<(&str, u32)> = None;
            for (key, endpoint) in &snapshot.endpoints {
                let score = score_endpoint(tool, call, endpoint, config);
                if score > best.map_or(0, |(_, s)| s) {
                    best = Some((key.as_str(), score));
                }
            }

            let Some((key, score)) = best else { continue };
            if score < config.min_score {
                debug!(tool = %tool.name, call = %call, score, "best candidate below threshold");
                continue;
            }
            if score < config.low_confidence_score {
                stats.low_confidence.push(LowConfidenceMatch {
                    tool: tool.name.clone(),
                    endpoint: key.to_string(),
                    score,
                });
            }
            if !endpoints.iter().any(|k| k == key) {
                endpoints.push(key.to_string());
            }
            if best_accepted.as_ref().map_or(true, |(s, _)| score > *s) {
                best_accepted = Some((score, call.clone()));
            }
        }

        let sdk_path = best_accepted
            .map(|(_, call)| call)
            .or_else(|| tool.sdk_calls.iter().next().cloned())
            .unwrap_or_default();

        if endpoints.is_empty() {
            stats.tools_unmapped += 1;
        } else {
            stats.tools_mapped += 1;
        }
        map.insert(tool.name.clone(), ToolMapping { endpoints, sdk_path });
    }

    info!(
        total = stats.tools_total,
        mapped = stats.tools_mapped,
        unmapped = stats.tools_unmapped,
        low_confidence = stats.low_confidence.len(),
        "bootstrap mapping complete"
    );
    BootstrapResult { map, stats }
}

/// Score one `(tool, call-signature)` pair against one candidate endpoint.
pub fn score_endpoint(
    tool: &ToolInventoryEntry,
    sdk_call: &str,
    endpoint: &Endpoint,
    config: &MatcherConfig,
) -> u32 {
    // Domain gate: a hard reject no other signal can overcome.
    if let Some(allowed) = config.domain_gates.get(&tool.file) {
        if !allowed.contains(&endpoint.domain) {
            return 0;
        }
    }

    let mut score = 0;
    let name_tokens: Vec<&str> = tool.name.split('_').filter(|t| !t.is_empty()).collect();
    let first_verb = name_tokens
        .first()
        .copied()
        .filter(|t| VERB_TOKENS.contains(t));
    let call_verb = trailing_call_verb(sdk_call);

    // HTTP method agreement: awarded once even when both inferences hit.
    let call_method = call_verb.and_then(method_from_call_verb);
    let name_method = Some(method_from_name_verb(first_verb));
    if call_method == Some(endpoint.method) || name_method == Some(endpoint.method) {
        score += config.method_bonus;
    }

    // Noun-to-path-segment lookup on the verb-stripped tool name.
    if let Some(segment) = noun_segment(&name_tokens, config) {
        if contains_ignore_case(&endpoint.path, &segment) {
            score += config.noun_bonus;
        }
    }

    // Call-signature resource appears in the path. Short tokens are
    // skipped to avoid false positives.
    if let Some(resource) = last_resource_segment(sdk_call) {
        if resource.len() >= 4 && contains_ignore_case(&endpoint.path, resource) {
            score += config.resource_bonus;
        }
    }

    // Shape heuristics, independent of each other.
    let implies_instance = first_verb.is_some_and(|v| INSTANCE_VERBS.contains(&v))
        || call_verb.is_some_and(|v| INSTANCE_VERBS.contains(&v));
    if implies_instance && ends_with_placeholder(&endpoint.path).is_some() {
        score += config.shape_bonus;
    }
    let implies_collection = first_verb.is_some_and(|v| COLLECTION_VERBS.contains(&v))
        || call_verb.is_some_and(|v| COLLECTION_VERBS.contains(&v));
    if implies_collection {
        let collection_shaped = match ends_with_placeholder(&endpoint.path) {
            None => true,
            Some(placeholder) => config.scoping_placeholders.contains(placeholder),
        };
        if collection_shaped {
            score += config.shape_bonus;
        }
    }

    // Parameter-name overlap, pagination parameters excluded.
    let endpoint_params = endpoint.request_param_names();
    let overlap = tool
        .params
        .iter()
        .map(|p| p.to_ascii_lowercase())
        .filter(|p| !config.pagination_params.contains(p))
        .filter(|p| endpoint_params.contains(p))
        .count() as u32;
    score += overlap * config.param_bonus;

    // Operation-identifier prefix.
    if let Some(verb) = first_verb {
        if endpoint
            .operation_id
            .to_ascii_lowercase()
            .starts_with(verb)
        {
            score += config.operation_prefix_bonus;
        }
    }

    score
}

/// Last dotted segment of a call signature when it is a known verb.
fn trailing_call_verb(sdk_call: &str) -> Option<&str> {
    sdk_call
        .rsplit('.')
        .next()
        .filter(|last| VERB_TOKENS.contains(last))
}

fn method_from_call_verb(verb: &str) -> Option<HttpMethod> {
    CALL_VERB_METHODS
        .iter()
        .find(|(v, _)| *v == verb)
        .map(|(_, m)| *m)
}

/// Method implied by the tool name's leading verb token; everything not
/// explicitly write-shaped reads.
fn method_from_name_verb(verb: Option<&str>) -> HttpMethod {
    match verb {
        Some("create" | "add" | "send" | "make" | "start" | "trigger" | "associate") => {
            HttpMethod::Post
        }
        Some("delete" | "remove") => HttpMethod::Delete,
        Some("update" | "configure") => HttpMethod::Post,
        _ => HttpMethod::Get,
    }
}

/// Strip leading verb tokens, then look the remaining compound noun up in
/// the noun→segment table, raw first and singularized second.
fn noun_segment(name_tokens: &[&str], config: &MatcherConfig) -> Option<String> {
    let noun_tokens: Vec<&str> = name_tokens
        .iter()
        .skip_while(|t| VERB_TOKENS.contains(*t))
        .copied()
        .collect();
    if noun_tokens.is_empty() {
        return None;
    }
    let noun = noun_tokens.join("_");
    if let Some(segment) = config.noun_segments.get(&noun) {
        return Some(segment.clone());
    }
    config.noun_segments.get(&singularize(&noun)).cloned()
}

/// Trailing-s / -ies singularization; no full morphological analysis.
fn singularize(noun: &str) -> String {
    if let Some(stem) = noun.strip_suffix("ies") {
        return format!("{stem}y");
    }
    if noun.len() > 1 && noun.ends_with('s') && !noun.ends_with("ss") {
        return noun[..noun.len() - 1].to_string();
    }
    noun.to_string()
}

/// Last dotted segment of the call chain that is not a verb, skipping the
/// client object itself.
fn last_resource_segment(sdk_call: &str) -> Option<&str> {
    sdk_call
        .split('.')
        .skip(1)
        .filter(|segment| !VERB_TOKENS.contains(segment))
        .last()
}

/// The placeholder name when the path ends in `{Param}`.
fn ends_with_placeholder(path: &str) -> Option<&str> {
    let stripped = path.strip_suffix('}')?;
    let open = stripped.rfind('{')?;
    Some(&stripped[open + 1..])
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ParamDef, ParamLocation};
    use std::collections::{BTreeMap, BTreeSet};

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

    fn tool(name: &str, file: &str, calls: &[&str], params: &[&str]) -> ToolInventoryEntry {
        ToolInventoryEntry {
            name: name.to_string(),
            file: file.to_string(),
            sdk_calls: calls.iter().map(|c| c.to_string()).collect(),
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn snapshot_of(endpoints: Vec<Endpoint>) -> Snapshot {
        let map: BTreeMap<String, Endpoint> =
            endpoints.into_iter().map(|e| (e.key(), e)).collect();
        Snapshot::new("1.0.0", map)
    }

    #[test]
    fn send_sms_matches_create_message() {
        let config = MatcherConfig::default();
        let ep = endpoint(
            "msg",
            HttpMethod::Post,
            "/Messages",
            &["To", "From", "Body", "StatusCallback"],
        );
        let tool = tool(
            "send_sms",
            "sms.ts",
            &["client.messages.create"],
            &["to", "from", "body"],
        );
        let score = score_endpoint(&tool, "client.messages.create", &ep, &config);
        // method 25 + noun 50 + resource 30 + collection shape 10 + 3 params.
        assert_eq!(score, 25 + 50 + 30 + 10 + 15);

        let result = bootstrap_map(&snapshot_of(vec![ep]), &[tool], &config);
        let mapping = &result.map["send_sms"];
        assert_eq!(mapping.endpoints, vec!["msg:post:/Messages"]);
        assert_eq!(mapping.sdk_path, "client.messages.create");
        assert_eq!(result.stats.tools_mapped, 1);
    }

    #[test]
    fn domain_gate_is_absolute() {
        let mut config = MatcherConfig::default();
        config.domain_gates.insert(
            "verify.ts".to_string(),
            BTreeSet::from(["verify".to_string()]),
        );
        // An endpoint that would score high on every other signal.
        let ep = endpoint(
            "voice",
            HttpMethod::Post,
            "/Messages",
            &["To", "From", "Body"],
        );
        let tool = tool(
            "send_sms",
            "verify.ts",
            &["client.messages.create"],
            &["to", "from", "body"],
        );
        assert_eq!(score_endpoint(&tool, "client.messages.create", &ep, &config), 0);

        let result = bootstrap_map(&snapshot_of(vec![ep]), &[tool], &config);
        assert!(result.map["send_sms"].endpoints.is_empty());
        assert_eq!(result.stats.tools_unmapped, 1);
    }

    #[test]
    fn ungated_files_are_unconstrained() {
        let mut config = MatcherConfig::default();
        config.domain_gates.insert(
            "verify.ts".to_string(),
            BTreeSet::from(["verify".to_string()]),
        );
        let ep = endpoint("voice", HttpMethod::Post, "/Messages", &[]);
        let tool = tool("send_sms", "other.ts", &["client.messages.create"], &[]);
        assert!(score_endpoint(&tool, "client.messages.create", &ep, &config) > 0);
    }

    #[test]
    fn instance_shape_requires_trailing_placeholder() {
        let config = MatcherConfig::default();
        let instance = endpoint("msg", HttpMethod::Get, "/Messages/{Sid}", &[]);
        let collection = endpoint("msg", HttpMethod::Get, "/Messages", &[]);
        let tool = tool("fetch_sms", "sms.ts", &["client.messages.fetch"], &["sid"]);

        let instance_score = score_endpoint(&tool, "client.messages.fetch", &instance, &config);
        let collection_score = score_endpoint(&tool, "client.messages.fetch", &collection, &config);
        assert_eq!(instance_score - collection_score, config.shape_bonus);
    }

    #[test]
    fn scoping_placeholder_still_collection_shaped() {
        let config = MatcherConfig::default();
        let scoped = endpoint(
            "verify",
            HttpMethod::Post,
            "/Services/{ServiceSid}",
            &["FriendlyName"],
        );
        let non_scoped = endpoint(
            "verify",
            HttpMethod::Post,
            "/Services/{Sid}",
            &["FriendlyName"],
        );
        let tool = tool(
            "create_service",
            "verify.ts",
            &["client.verify.services.create"],
            &["friendlyName"],
        );
        // The exempted scoping placeholder keeps the collection bonus; an
        // ordinary trailing placeholder forfeits it.
        let scoped_score = score_endpoint(&tool, "client.verify.services.create", &scoped, &config);
        let plain_score =
            score_endpoint(&tool, "client.verify.services.create", &non_scoped, &config);
        assert_eq!(scoped_score - plain_score, config.shape_bonus);
    }

    #[test]
    fn pagination_params_do_not_count_toward_overlap() {
        let config = MatcherConfig::default();
        let ep = endpoint("msg", HttpMethod::Get, "/Messages", &["PageSize", "To"]);
        let with_pagination = tool(
            "list_sms",
            "sms.ts",
            &["client.messages.list"],
            &["pageSize", "to"],
        );
        let without = tool("list_sms", "sms.ts", &["client.messages.list"], &["to"]);
        assert_eq!(
            score_endpoint(&with_pagination, "client.messages.list", &ep, &config),
            score_endpoint(&without, "client.messages.list", &ep, &config)
        );
    }

    #[test]
    fn short_resource_tokens_skip_resource_bonus() {
        let config = MatcherConfig::default();
        let ep = endpoint("api", HttpMethod::Get, "/Keys/{Sid}", &[]);
        let tool = tool("fetch_key", "api.ts", &["client.key.fetch"], &[]);
        // "key" is 3 chars, below the 4-char floor.
        let score = score_endpoint(&tool, "client.key.fetch", &ep, &config);
        assert!(score < config.resource_bonus + config.noun_bonus + config.method_bonus);
    }

    #[test]
    fn operation_prefix_bonus_applies() {
        let config = MatcherConfig::default();
        let mut ep = endpoint("msg", HttpMethod::Post, "/Messages", &[]);
        ep.operation_id = "CreateMessage".to_string();
        let tool = tool("create_message", "sms.ts", &["client.messages.create"], &[]);
        let with_op = score_endpoint(&tool, "client.messages.create", &ep, &config);
        ep.operation_id = "SendIt".to_string();
        let without = score_endpoint(&tool, "client.messages.create", &ep, &config);
        assert_eq!(with_op - without, config.operation_prefix_bonus);
    }

    #[test]
    fn below_threshold_yields_empty_mapping() {
        let config = MatcherConfig::default();
        let ep = endpoint("voice", HttpMethod::Post, "/Calls", &[]);
        let tool = tool("frobnicate_widget", "misc.ts", &["client.widgets.frob"], &[]);
        let result = bootstrap_map(&snapshot_of(vec![ep]), &[tool], &config);
        let mapping = &result.map["frobnicate_widget"];
        assert!(mapping.endpoints.is_empty());
        assert_eq!(mapping.sdk_path, "client.widgets.frob");
        assert_eq!(result.stats.tools_unmapped, 1);
    }

    #[test]
    fn low_confidence_band_is_flagged_but_accepted() {
        let config = MatcherConfig::default();
        // method (25) + collection shape (10) + one param (5) = 40.
        let ep = endpoint("fax", HttpMethod::Post, "/Faxes", &["Quality"]);
        let tool = tool("send_document", "fax.ts", &["client.documents.create"], &["quality"]);
        let result = bootstrap_map(&snapshot_of(vec![ep]), &[tool], &config);
        assert_eq!(result.map["send_document"].endpoints.len(), 1);
        assert_eq!(result.stats.low_confidence.len(), 1);
        assert_eq!(result.stats.low_confidence[0].score, 40);
    }

    #[test]
    fn mapper_is_deterministic() {
        let config = MatcherConfig::default();
        let endpoints = vec![
            endpoint("msg", HttpMethod::Post, "/Messages", &["To", "From", "Body"]),
            endpoint("msg", HttpMethod::Get, "/Messages", &[]),
            endpoint("msg", HttpMethod::Get, "/Messages/{Sid}", &[]),
            endpoint("voice", HttpMethod::Post, "/Calls", &["To", "From", "Url"]),
        ];
        let inventory = vec![
            tool("send_sms", "sms.ts", &["client.messages.create"], &["to", "from", "body"]),
            tool("list_sms", "sms.ts", &["client.messages.list", "client.messages.each"], &[]),
            tool("create_call", "voice.ts", &["client.calls.create"], &["to", "from", "url"]),
        ];
        let snapshot = snapshot_of(endpoints);

        let first = bootstrap_map(&snapshot, &inventory, &config);
        let second = bootstrap_map(&snapshot, &inventory, &config);
        assert_eq!(
            serde_json::to_string(&first.map).unwrap(),
            serde_json::to_string(&second.map).unwrap()
        );
    }

    #[test]
    fn ties_break_to_first_candidate_in_key_order() {
        let config = MatcherConfig::default();
        // Two endpoints that score identically for the tool.
        let a = endpoint("msg", HttpMethod::Post, "/Messages/AAA", &[]);
        let b = endpoint("msg", HttpMethod::Post, "/Messages/BBB", &[]);
        let tool = tool("send_sms", "sms.ts", &["client.messages.create"], &[]);
        let snapshot = snapshot_of(vec![b, a]);

        let result = bootstrap_map(&snapshot, &[tool], &config);
        // BTreeMap key order puts /Messages/AAA first.
        assert_eq!(result.map["send_sms"].endpoints, vec!["msg:post:/Messages/AAA"]);
    }

    #[test]
    fn singularize_handles_ies_and_trailing_s() {
        assert_eq!(singularize("queries"), "query");
        assert_eq!(singularize("messages"), "message");
        assert_eq!(singularize("address"), "address");
        assert_eq!(singularize("sms"), "sm");
    }
}
