//! Report Assembler: aggregates the drift report, coverage analysis and
//! mapper statistics into the persisted report document and a short
//! markdown summary. Intentionally thin; all computation happens
//! upstream.

use crate::model::{CoverageAnalysis, DriftReport, MapperStats};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncReport {
    pub drift: DriftReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapper_stats: Option<MapperStats>,
    /// Degradations worth a human's attention (baseline run, empty
    /// changelog, unmapped tools).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl SyncReport {
    pub fn new(drift: DriftReport) -> Self {
        let mut notes = Vec::new();
        if drift.baseline {
            notes.push("baseline run: no prior snapshot, no comparison performed".to_string());
        }
        Self {
            drift,
            coverage: None,
            mapper_stats: None,
            notes,
        }
    }

    pub fn with_coverage(mut self, coverage: CoverageAnalysis) -> Self {
        self.coverage = Some(coverage);
        self
    }

    pub fn with_mapper_stats(mut self, stats: MapperStats) -> Self {
        if stats.tools_unmapped > 0 {
            self.notes.push(format!(
                "{} tool(s) could not be mapped automatically and need manual mapping",
                stats.tools_unmapped
            ));
        }
        self.mapper_stats = Some(stats);
        self
    }

    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        let drift = &self.drift;
        let _ = writeln!(out, "# API drift report — {}", drift.current_version);
        match &drift.previous_version {
            Some(previous) => {
                let _ = writeln!(out, "\nCompared against `{previous}`.\n");
            }
            None => {
                let _ = writeln!(out, "\nBaseline run; no comparison performed.\n");
            }
        }

        let _ = writeln!(out, "## Endpoints");
        let _ = writeln!(out, "- new: {}", drift.new_endpoints.len());
        let _ = writeln!(out, "- removed: {}", drift.removed_endpoints.len());
        let _ = writeln!(out, "- parameter changes: {}", drift.param_changes.len());
        for key in &drift.new_endpoints {
            let _ = writeln!(out, "  - added `{key}`");
        }
        for key in &drift.removed_endpoints {
            let _ = writeln!(out, "  - removed `{key}`");
        }
        for change in &drift.param_changes {
            let added: Vec<&str> = change.added.iter().map(|p| p.name.as_str()).collect();
            let removed: Vec<&str> = change.removed.iter().map(|p| p.name.as_str()).collect();
            let _ = writeln!(
                out,
                "  - `{}`: +[{}] -[{}]",
                change.endpoint,
                added.join(", "),
                removed.join(", ")
            );
        }

        if !drift.breaking_changes.is_empty() {
            let _ = writeln!(out, "\n## Breaking changes");
            for entry in &drift.breaking_changes {
                let _ = writeln!(out, "- **{}**: {}", entry.domain, entry.description);
            }
        }

        if let Some(coverage) = &self.coverage {
            let _ = writeln!(out, "\n## Coverage");
            let _ = writeln!(
                out,
                "- global: {:.1}% ({}/{})",
                coverage.global_percent, coverage.covered_endpoints, coverage.total_endpoints
            );
            for domain in &coverage.domains {
                let _ = writeln!(
                    out,
                    "- {}: {:.1}% ({}/{})",
                    domain.domain, domain.percent, domain.mapped, domain.total
                );
            }
            if !coverage.tool_drift.is_empty() {
                let _ = writeln!(out, "\n## Parameter drift");
                for drift in &coverage.tool_drift {
                    if !drift.missing_in_tool.is_empty() {
                        let _ = writeln!(
                            out,
                            "- `{}` missing: {}",
                            drift.tool,
                            drift.missing_in_tool.join(", ")
                        );
                    }
                    if !drift.extra_in_tool.is_empty() {
                        let _ = writeln!(
                            out,
                            "- `{}` extra: {}",
                            drift.tool,
                            drift.extra_in_tool.join(", ")
                        );
                    }
                }
            }
        }

        if !self.notes.is_empty() {
            let _ = writeln!(out, "\n## Notes");
            for note in &self.notes {
                let _ = writeln!(out, "- {note}");
            }
        }
        out
    }
}
