//! External collaborators: spec documents, changelog text and package
//! versions. Only spec transport failures are fatal; the changelog and
//! package sources degrade to well-defined sentinels.

use crate::error::SyncError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Sentinel returned by [`PackageVersionSource`] when a version cannot be
/// resolved.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Outcome of fetching one domain's spec document.
#[derive(Debug)]
pub enum SpecFetch {
    Document(Value),
    /// The provider does not publish this domain for this release.
    /// Non-fatal: the domain contributes zero endpoints.
    NotFound,
}

#[async_trait]
pub trait SpecSource: Send + Sync {
    async fn fetch_spec(&self, version: &str, domain: &str) -> Result<SpecFetch, SyncError>;
}

#[async_trait]
pub trait ChangelogSource: Send + Sync {
    /// Raw changelog text, or an empty string on fetch failure.
    async fn fetch_changelog(&self, version: &str) -> String;
}

#[async_trait]
pub trait PackageVersionSource: Send + Sync {
    /// Resolved package version, or [`UNKNOWN_VERSION`] on failure.
    async fn package_version(&self, package: &str) -> String;
}

/// Network-backed source using the provider's published raw URLs.
pub struct HttpSpecSource {
    client: reqwest::Client,
    spec_url_template: String,
    changelog_url_template: String,
}

impl HttpSpecSource {
    pub fn new(spec_url_template: String, changelog_url_template: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            spec_url_template,
            changelog_url_template,
        }
    }

    fn spec_url(&self, version: &str, domain: &str) -> String {
        self.spec_url_template
            .replace("{version}", version)
            .replace("{domain}", domain)
    }
}

#[async_trait]
impl SpecSource for HttpSpecSource {
    async fn fetch_spec(&self, version: &str, domain: &str) -> Result<SpecFetch, SyncError> {
        let url = self.spec_url(version, domain);
        debug!(%url, domain, "fetching spec document");
        let response = self.client.get(&url).send().await.map_err(|e| {
            SyncError::transport(format!("spec {domain}"), version, e.to_string())
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(SpecFetch::NotFound);
        }
        if !response.status().is_success() {
            return Err(SyncError::transport(
                format!("spec {domain}"),
                version,
                format!("HTTP {}", response.status()),
            ));
        }
        let doc = response.json::<Value>().await.map_err(|e| {
            SyncError::transport(format!("spec {domain}"), version, e.to_string())
        })?;
        Ok(SpecFetch::Document(doc))
    }
}

#[async_trait]
impl ChangelogSource for HttpSpecSource {
    async fn fetch_changelog(&self, version: &str) -> String {
        let url = self.changelog_url_template.replace("{version}", version);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                response.text().await.unwrap_or_default()
            }
            Ok(response) => {
                warn!(%url, status = %response.status(), "changelog fetch failed");
                String::new()
            }
            Err(error) => {
                warn!(%url, %error, "changelog fetch failed");
                String::new()
            }
        }
    }
}

/// Directory-backed source for offline runs and tests:
/// `{root}/{version}/{domain}.json` and `{root}/{version}/CHANGES.md`.
pub struct DirSpecSource {
    root: PathBuf,
}

impl DirSpecSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn spec_path(&self, version: &str, domain: &str) -> PathBuf {
        self.root.join(version).join(format!("{domain}.json"))
    }
}

#[async_trait]
impl SpecSource for DirSpecSource {
    async fn fetch_spec(&self, version: &str, domain: &str) -> Result<SpecFetch, SyncError> {
        let path = self.spec_path(version, domain);
        if !path.exists() {
            return Ok(SpecFetch::NotFound);
        }
        let contents = tokio::fs::read_to_string(&path).await?;
        let doc = serde_json::from_str(&contents).map_err(|e| SyncError::MalformedSpec {
            domain: domain.to_string(),
            message: e.to_string(),
        })?;
        Ok(SpecFetch::Document(doc))
    }
}

#[async_trait]
impl ChangelogSource for DirSpecSource {
    async fn fetch_changelog(&self, version: &str) -> String {
        let versioned = self.root.join(version).join("CHANGES.md");
        let fallback = self.root.join("CHANGES.md");
        for path in [versioned, fallback] {
            if let Ok(text) = tokio::fs::read_to_string(&path).await {
                return text;
            }
        }
        String::new()
    }
}

/// Resolves package versions from the npm registry.
pub struct NpmPackageSource {
    client: reqwest::Client,
    registry_url: String,
}

impl NpmPackageSource {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            registry_url: "https://registry.npmjs.org".to_string(),
        }
    }

    pub fn with_registry(registry_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            registry_url,
        }
    }
}

impl Default for NpmPackageSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PackageVersionSource for NpmPackageSource {
    async fn package_version(&self, package: &str) -> String {
        let url = format!("{}/{}/latest", self.registry_url, package);
        let resolved = async {
            let body = self
                .client
                .get(&url)
                .send()
                .await
                .ok()?
                .error_for_status()
                .ok()?
                .json::<Value>()
                .await
                .ok()?;
            body.get("version")?.as_str().map(str::to_string)
        }
        .await;

        match resolved {
            Some(version) => version,
            None => {
                warn!(package, "failed to resolve package version");
                UNKNOWN_VERSION.to_string()
            }
        }
    }
}

/// Fixed package versions for offline runs; anything unlisted resolves to
/// the unknown sentinel.
#[derive(Debug, Default)]
pub struct StaticPackageVersions {
    versions: std::collections::BTreeMap<String, String>,
}

impl StaticPackageVersions {
    pub fn new(versions: std::collections::BTreeMap<String, String>) -> Self {
        Self { versions }
    }
}

#[async_trait]
impl PackageVersionSource for StaticPackageVersions {
    async fn package_version(&self, package: &str) -> String {
        self.versions
            .get(package)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dir_source_missing_domain_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirSpecSource::new(dir.path().to_path_buf());
        let outcome = source.fetch_spec("1.0.0", "ghost").await.unwrap();
        assert_matches::assert_matches!(outcome, SpecFetch::NotFound);
    }

    #[tokio::test]
    async fn dir_source_reads_document() {
        let dir = tempfile::tempdir().unwrap();
        let version_dir = dir.path().join("1.0.0");
        std::fs::create_dir_all(&version_dir).unwrap();
        std::fs::write(version_dir.join("msg.json"), r#"{"paths": {}}"#).unwrap();

        let source = DirSpecSource::new(dir.path().to_path_buf());
        let outcome = source.fetch_spec("1.0.0", "msg").await.unwrap();
        assert_matches::assert_matches!(outcome, SpecFetch::Document(_));
    }

    #[tokio::test]
    async fn dir_source_malformed_document_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let version_dir = dir.path().join("1.0.0");
        std::fs::create_dir_all(&version_dir).unwrap();
        std::fs::write(version_dir.join("msg.json"), "not json").unwrap();

        let source = DirSpecSource::new(dir.path().to_path_buf());
        let error = source.fetch_spec("1.0.0", "msg").await.unwrap_err();
        assert_eq!(error.category(), "malformed_spec");
    }

    #[tokio::test]
    async fn dir_source_changelog_empty_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirSpecSource::new(dir.path().to_path_buf());
        assert_eq!(source.fetch_changelog("1.0.0").await, "");
    }
}
