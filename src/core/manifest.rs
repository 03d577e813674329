use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::{PackError, PackResult};

/// File name of the pack project file inside a pack directory.
pub const MANIFEST_FILE: &str = "packsmith.json";

/// Supported mod loaders — strongly typed, no magic strings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Loader {
    Fabric,
    Quilt,
    Forge,
    NeoForge,
}

impl Loader {
    /// Dependency key the pack index format uses for this loader.
    pub fn index_key(&self) -> &'static str {
        match self {
            Loader::Fabric => "fabric-loader",
            Loader::Quilt => "quilt-loader",
            Loader::Forge => "forge",
            Loader::NeoForge => "neoforge",
        }
    }

    /// Registry facet value (search and version filtering).
    pub fn facet(&self) -> &'static str {
        match self {
            Loader::Fabric => "fabric",
            Loader::Quilt => "quilt",
            Loader::Forge => "forge",
            Loader::NeoForge => "neoforge",
        }
    }
}

impl fmt::Display for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.facet())
    }
}

impl FromStr for Loader {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fabric" => Ok(Loader::Fabric),
            "quilt" => Ok(Loader::Quilt),
            "forge" => Ok(Loader::Forge),
            "neoforge" => Ok(Loader::NeoForge),
            other => Err(PackError::UnknownLoader(other.to_string())),
        }
    }
}

/// The pack project file: everything the user has declared about a pack.
///
/// Lives as `packsmith.json` in the pack directory. The mod list holds
/// registry identifiers (slugs); `resolve` rewrites it to the pinned,
/// dependency-complete set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackManifest {
    pub name: String,
    pub minecraft: String,
    pub loader: Loader,
    pub loader_version: String,
    #[serde(default)]
    pub mods: Vec<String>,
}

impl PackManifest {
    pub fn new(
        name: impl Into<String>,
        minecraft: impl Into<String>,
        loader: Loader,
        loader_version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            minecraft: minecraft.into(),
            loader,
            loader_version: loader_version.into(),
            mods: Vec::new(),
        }
    }

    /// Load the manifest from a pack directory.
    pub async fn load(dir: &Path) -> PackResult<Self> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Err(PackError::ManifestNotFound(path));
        }
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| PackError::Io { path, source: e })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Persist the manifest atomically (temp file + rename), so a crash
    /// mid-write never corrupts the project file.
    pub async fn save(&self, dir: &Path) -> PackResult<()> {
        let path = dir.join(MANIFEST_FILE);
        let tmp = dir.join(format!(".{}.{}.tmp", MANIFEST_FILE, Uuid::new_v4()));
        let json = serde_json::to_string_pretty(self)?;

        tokio::fs::write(&tmp, json).await.map_err(|e| PackError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(PackError::Io { path, source: e });
        }
        Ok(())
    }

    /// Add an identifier unless it is already listed. Returns whether
    /// the list changed.
    pub fn add_mod(&mut self, identifier: impl Into<String>) -> bool {
        let identifier = identifier.into();
        if self.mods.iter().any(|m| m == &identifier) {
            return false;
        }
        self.mods.push(identifier);
        true
    }

    /// Path of the directory mods are downloaded into.
    pub fn mods_dir(&self, pack_dir: &Path) -> PathBuf {
        pack_dir.join("mods")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_index_keys() {
        assert_eq!(Loader::Fabric.index_key(), "fabric-loader");
        assert_eq!(Loader::Quilt.index_key(), "quilt-loader");
        assert_eq!(Loader::Forge.index_key(), "forge");
        assert_eq!(Loader::NeoForge.index_key(), "neoforge");
    }

    #[test]
    fn loader_from_str_is_case_insensitive() {
        assert_eq!("Fabric".parse::<Loader>().unwrap(), Loader::Fabric);
        assert_eq!("NEOFORGE".parse::<Loader>().unwrap(), Loader::NeoForge);
        assert!("optifine".parse::<Loader>().is_err());
    }

    #[test]
    fn add_mod_deduplicates() {
        let mut manifest = PackManifest::new("test", "1.21.1", Loader::Fabric, "0.16.9");
        assert!(manifest.add_mod("sodium"));
        assert!(!manifest.add_mod("sodium"));
        assert_eq!(manifest.mods, vec!["sodium"]);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = PackManifest::new("roundtrip", "1.21.1", Loader::Quilt, "0.27.1");
        manifest.add_mod("sodium");
        manifest.add_mod("lithium");

        manifest.save(dir.path()).await.unwrap();
        let loaded = PackManifest::load(dir.path()).await.unwrap();

        assert_eq!(loaded.name, "roundtrip");
        assert_eq!(loaded.loader, Loader::Quilt);
        assert_eq!(loaded.mods, vec!["sodium", "lithium"]);
    }

    #[tokio::test]
    async fn load_missing_manifest_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PackManifest::load(dir.path()).await.unwrap_err();
        assert!(matches!(err, PackError::ManifestNotFound(_)));
    }
}
