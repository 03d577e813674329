// ─── Pack Index ───
// The portable modpack manifest (modrinth.index.json) consumed by
// Modrinth-compatible launchers.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::downloader::DownloadRecord;
use crate::core::error::{PackError, PackResult};
use crate::core::manifest::PackManifest;
use crate::core::registry::EnvSupport;
use crate::core::resolver::ResolvedArtifact;

pub const INDEX_FILE: &str = "modrinth.index.json";
pub const FORMAT_VERSION: u32 = 1;

/// Loader dependency keys the format recognizes.
const LOADER_KEYS: [&str; 4] = ["fabric-loader", "quilt-loader", "forge", "neoforge"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackIndex {
    pub format_version: u32,
    pub game: String,
    pub version_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub files: Vec<IndexFile>,
    pub dependencies: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFile {
    /// Relative install path inside the pack (e.g. `mods/sodium.jar`).
    pub path: String,
    pub hashes: IndexHashes,
    pub downloads: Vec<String>,
    pub file_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<EnvSupport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexHashes {
    pub sha1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha512: Option<String>,
}

/// Assembles verified download records into the final index. Pure
/// aggregation: the only I/O is the final atomic write.
pub struct IndexBuilder {
    name: String,
    version_id: String,
    minecraft: String,
    loader_key: String,
    loader_version: String,
}

impl IndexBuilder {
    pub fn new(manifest: &PackManifest, version_id: impl Into<String>) -> Self {
        Self {
            name: manifest.name.clone(),
            version_id: version_id.into(),
            minecraft: manifest.minecraft.clone(),
            loader_key: manifest.loader.index_key().to_string(),
            loader_version: manifest.loader_version.clone(),
        }
    }

    /// Build the index from the verified records and their originating
    /// artifacts. Unverified records are never indexed.
    pub fn build(
        &self,
        artifacts: &[ResolvedArtifact],
        records: &[DownloadRecord],
    ) -> PackResult<PackIndex> {
        let by_filename: HashMap<&str, &ResolvedArtifact> = artifacts
            .iter()
            .map(|a| (a.filename.as_str(), a))
            .collect();

        let mut files = Vec::new();
        for record in records.iter().filter(|r| r.verified) {
            let Some(filename) = record.path.file_name().and_then(|n| n.to_str()) else {
                return Err(PackError::InvalidIndex(format!(
                    "record for '{}' has no usable filename",
                    record.identifier
                )));
            };
            let Some(artifact) = by_filename.get(filename) else {
                return Err(PackError::InvalidIndex(format!(
                    "no artifact known for downloaded file '{filename}'"
                )));
            };

            let sha1 = artifact
                .sha1
                .clone()
                .ok_or_else(|| PackError::HashMissing(artifact.identifier.clone()))?;

            files.push(IndexFile {
                path: format!("mods/{filename}"),
                hashes: IndexHashes {
                    sha1,
                    sha512: artifact.sha512.clone(),
                },
                downloads: vec![artifact.url.clone()],
                file_size: record.bytes_written,
                env: Some(artifact.env),
            });
        }

        // Stable file order regardless of download completion order.
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let mut dependencies = BTreeMap::new();
        dependencies.insert(self.loader_key.clone(), self.loader_version.clone());
        dependencies.insert("minecraft".to_string(), self.minecraft.clone());

        let index = PackIndex {
            format_version: FORMAT_VERSION,
            game: "minecraft".to_string(),
            version_id: self.version_id.clone(),
            name: self.name.clone(),
            summary: None,
            files,
            dependencies,
        };

        for warning in validate(&index)? {
            warn!("Pack index: {}", warning);
        }

        Ok(index)
    }
}

/// Check required fields and the path security invariant.
///
/// Returns the non-fatal findings (missing sha512 / env data); anything
/// a launcher would reject is an error.
pub fn validate(index: &PackIndex) -> PackResult<Vec<String>> {
    let mut warnings = Vec::new();

    if index.game.is_empty() || index.name.is_empty() || index.version_id.is_empty() {
        return Err(PackError::InvalidIndex(
            "game, name, and versionId are required".to_string(),
        ));
    }
    if !index.dependencies.contains_key("minecraft") {
        return Err(PackError::InvalidIndex(
            "dependencies missing minecraft version".to_string(),
        ));
    }
    if !LOADER_KEYS.iter().any(|k| index.dependencies.contains_key(*k)) {
        return Err(PackError::InvalidIndex(
            "dependencies missing a mod loader".to_string(),
        ));
    }

    for file in &index.files {
        check_path(&file.path)?;
        if file.hashes.sha1.is_empty() {
            return Err(PackError::InvalidIndex(format!(
                "'{}' is missing its sha1 hash",
                file.path
            )));
        }
        if file.downloads.is_empty() {
            return Err(PackError::InvalidIndex(format!(
                "'{}' has no download URL",
                file.path
            )));
        }
        if file.hashes.sha512.is_none() {
            warnings.push(format!("'{}' has no sha512 hash", file.path));
        }
        if file.env.is_none() {
            warnings.push(format!("'{}' has no environment data", file.path));
        }
    }

    Ok(warnings)
}

/// File paths must stay inside the pack: no `..` segments and no
/// leading separator.
fn check_path(path: &str) -> PackResult<()> {
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(PackError::UnsafePath(path.to_string()));
    }
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(PackError::UnsafePath(path.to_string()));
    }
    Ok(())
}

/// Serialize and write atomically (temp file + rename) so a packaging
/// step never reads a torn index.
pub async fn write_index(index: &PackIndex, dir: &Path) -> PackResult<PathBuf> {
    let json = serde_json::to_string_pretty(index)?;
    let path = dir.join(INDEX_FILE);
    let tmp = dir.join(format!(".{INDEX_FILE}.tmp"));

    tokio::fs::write(&tmp, json).await.map_err(|e| PackError::Io {
        path: tmp.clone(),
        source: e,
    })?;
    if let Err(e) = tokio::fs::rename(&tmp, &path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(PackError::Io { path, source: e });
    }

    info!("Wrote pack index: {:?}", path);
    Ok(path)
}

/// Read an index back from a pack directory. Malformed JSON surfaces as
/// a `Json` error for the caller to handle; it is not retried.
pub async fn read_index(dir: &Path) -> PackResult<PackIndex> {
    let path = dir.join(INDEX_FILE);
    let raw = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| PackError::Io { path, source: e })?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::Loader;
    use crate::core::registry::{EnvSupport, SideSupport};

    fn manifest() -> PackManifest {
        PackManifest::new("testpack", "1.21.1", Loader::Fabric, "0.16.9")
    }

    fn artifact(filename: &str) -> ResolvedArtifact {
        ResolvedArtifact {
            identifier: filename.trim_end_matches(".jar").to_string(),
            project_id: "p".to_string(),
            version_id: "v".to_string(),
            filename: filename.to_string(),
            url: format!("https://cdn.example/{filename}"),
            sha1: Some("a".repeat(40)),
            sha512: Some("b".repeat(128)),
            size: 10,
            dependencies: Vec::new(),
            env: EnvSupport {
                client: SideSupport::Required,
                server: SideSupport::Optional,
            },
        }
    }

    fn record(filename: &str, verified: bool) -> DownloadRecord {
        DownloadRecord {
            identifier: filename.trim_end_matches(".jar").to_string(),
            path: PathBuf::from("mods").join(filename),
            verified,
            bytes_written: 10,
            error: None,
        }
    }

    #[test]
    fn build_indexes_only_verified_records() {
        let artifacts = vec![artifact("sodium.jar"), artifact("lithium.jar")];
        let records = vec![record("sodium.jar", true), record("lithium.jar", false)];

        let index = IndexBuilder::new(&manifest(), "1.0.0")
            .build(&artifacts, &records)
            .unwrap();

        assert_eq!(index.files.len(), 1);
        assert_eq!(index.files[0].path, "mods/sodium.jar");
        assert_eq!(index.dependencies.get("fabric-loader").unwrap(), "0.16.9");
        assert_eq!(index.dependencies.get("minecraft").unwrap(), "1.21.1");
    }

    #[test]
    fn build_orders_files_by_path() {
        let artifacts = vec![artifact("zeta.jar"), artifact("alpha.jar")];
        let records = vec![record("zeta.jar", true), record("alpha.jar", true)];

        let index = IndexBuilder::new(&manifest(), "1.0.0")
            .build(&artifacts, &records)
            .unwrap();

        let paths: Vec<&str> = index.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["mods/alpha.jar", "mods/zeta.jar"]);
    }

    #[test]
    fn round_trip_preserves_files_and_dependencies() {
        let artifacts = vec![artifact("sodium.jar")];
        let records = vec![record("sodium.jar", true)];
        let index = IndexBuilder::new(&manifest(), "1.0.0")
            .build(&artifacts, &records)
            .unwrap();

        let json = serde_json::to_string_pretty(&index).unwrap();
        let parsed: PackIndex = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.files.len(), index.files.len());
        assert_eq!(parsed.files[0].hashes.sha1, index.files[0].hashes.sha1);
        assert_eq!(parsed.files[0].hashes.sha512, index.files[0].hashes.sha512);
        assert_eq!(parsed.dependencies, index.dependencies);
        assert_eq!(parsed.format_version, FORMAT_VERSION);
    }

    #[test]
    fn serialized_field_names_follow_the_format() {
        let artifacts = vec![artifact("sodium.jar")];
        let records = vec![record("sodium.jar", true)];
        let index = IndexBuilder::new(&manifest(), "1.0.0")
            .build(&artifacts, &records)
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&index).unwrap()).unwrap();

        assert!(value.get("formatVersion").is_some());
        assert!(value.get("versionId").is_some());
        assert!(value["files"][0].get("fileSize").is_some());
        assert_eq!(value["files"][0]["env"]["client"], "required");
    }

    #[test]
    fn validate_rejects_traversal_paths() {
        let artifacts = vec![artifact("sodium.jar")];
        let records = vec![record("sodium.jar", true)];
        let mut index = IndexBuilder::new(&manifest(), "1.0.0")
            .build(&artifacts, &records)
            .unwrap();

        index.files[0].path = "mods/../../etc/passwd".to_string();
        assert!(matches!(validate(&index), Err(PackError::UnsafePath(_))));

        index.files[0].path = "/mods/sodium.jar".to_string();
        assert!(matches!(validate(&index), Err(PackError::UnsafePath(_))));
    }

    #[test]
    fn validate_requires_a_loader_dependency() {
        let mut index = IndexBuilder::new(&manifest(), "1.0.0").build(&[], &[]).unwrap();
        index.dependencies.remove("fabric-loader");

        assert!(matches!(validate(&index), Err(PackError::InvalidIndex(_))));
    }

    #[test]
    fn validate_warns_on_missing_sha512_and_env() {
        let artifacts = vec![artifact("sodium.jar")];
        let records = vec![record("sodium.jar", true)];
        let mut index = IndexBuilder::new(&manifest(), "1.0.0")
            .build(&artifacts, &records)
            .unwrap();

        index.files[0].hashes.sha512 = None;
        index.files[0].env = None;

        let warnings = validate(&index).unwrap();
        assert_eq!(warnings.len(), 2);
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = vec![artifact("sodium.jar")];
        let records = vec![record("sodium.jar", true)];
        let index = IndexBuilder::new(&manifest(), "1.0.0")
            .build(&artifacts, &records)
            .unwrap();

        write_index(&index, dir.path()).await.unwrap();
        let loaded = read_index(dir.path()).await.unwrap();

        assert_eq!(loaded.name, "testpack");
        assert_eq!(loaded.files.len(), 1);
        // No temp file left behind.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
