use std::collections::HashSet;
use std::path::{Path, PathBuf};

use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use sha1::{Digest, Sha1};
use sha2::Sha512;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::error::{PackError, PackResult};
use crate::core::http::get_with_retry;
use crate::core::resolver::ResolvedArtifact;

/// Outcome of one artifact fetch. Finalized exactly once when the fetch
/// completes; never mutated afterward.
#[derive(Debug)]
pub struct DownloadRecord {
    pub identifier: String,
    /// Final path the file lives at (or would have lived at).
    pub path: PathBuf,
    pub verified: bool,
    pub bytes_written: u64,
    pub error: Option<PackError>,
}

#[derive(Debug, Default)]
pub struct DownloadReport {
    pub records: Vec<DownloadRecord>,
}

impl DownloadReport {
    pub fn verified(&self) -> impl Iterator<Item = &DownloadRecord> {
        self.records.iter().filter(|r| r.verified)
    }

    pub fn failures(&self) -> impl Iterator<Item = &DownloadRecord> {
        self.records.iter().filter(|r| !r.verified)
    }

    pub fn all_verified(&self) -> bool {
        self.records.iter().all(|r| r.verified)
    }
}

/// Concurrent, hash-validated downloader.
///
/// Bytes are verified in memory, staged to a temporary name inside the
/// destination directory, and promoted by atomic rename — the final
/// filename never holds unverified or partial content. One artifact's
/// failure never cancels its siblings; the caller gets a complete
/// per-artifact report.
pub struct Downloader {
    client: Client,
    /// Maximum number of parallel downloads.
    concurrency: usize,
}

impl Downloader {
    /// The session is owned by the caller and lent for this run.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            concurrency: 8,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Fetch and verify every artifact into `dest_dir`.
    ///
    /// The destination directory is exclusively this run's; concurrent
    /// runs against the same directory must be serialized by the caller.
    pub async fn download_all(
        &self,
        artifacts: &[ResolvedArtifact],
        dest_dir: &Path,
    ) -> PackResult<DownloadReport> {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| PackError::Io {
                path: dest_dir.to_path_buf(),
                source: e,
            })?;

        let unique = dedup_by_filename(artifacts);

        info!(
            "Downloading {} file(s), concurrency={}",
            unique.len(),
            self.concurrency
        );

        let records = stream::iter(unique)
            .map(|artifact| async move { self.download_one(artifact, dest_dir).await })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        Ok(DownloadReport { records })
    }

    /// Fetch one artifact; always produces a finalized record.
    async fn download_one(&self, artifact: &ResolvedArtifact, dest_dir: &Path) -> DownloadRecord {
        let final_path = dest_dir.join(&artifact.filename);

        match self.fetch_and_commit(artifact, dest_dir, &final_path).await {
            Ok(bytes_written) => {
                debug!("Downloaded: {} -> {:?}", artifact.url, final_path);
                DownloadRecord {
                    identifier: artifact.identifier.clone(),
                    path: final_path,
                    verified: true,
                    bytes_written,
                    error: None,
                }
            }
            Err(error) => {
                warn!("Download failed for '{}': {}", artifact.identifier, error);
                DownloadRecord {
                    identifier: artifact.identifier.clone(),
                    path: final_path,
                    verified: false,
                    bytes_written: 0,
                    error: Some(error),
                }
            }
        }
    }

    async fn fetch_and_commit(
        &self,
        artifact: &ResolvedArtifact,
        dest_dir: &Path,
        final_path: &Path,
    ) -> PackResult<u64> {
        // Registry-supplied filenames must stay inside the destination
        // directory.
        if artifact.filename == ".." || artifact.filename.contains(['/', '\\']) {
            return Err(PackError::UnsafePath(artifact.filename.clone()));
        }

        let response = get_with_retry(&self.client, &artifact.url).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PackError::DownloadFailed {
                url: artifact.url.clone(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        commit_bytes(&bytes, artifact, dest_dir, final_path).await
    }
}

/// Artifacts reached via different dependency paths can share a final
/// filename; each final name is fetched once.
fn dedup_by_filename(artifacts: &[ResolvedArtifact]) -> Vec<&ResolvedArtifact> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut unique = Vec::new();
    for artifact in artifacts {
        if seen.insert(artifact.filename.as_str()) {
            unique.push(artifact);
        } else {
            debug!("Skipping duplicate filename: {}", artifact.filename);
        }
    }
    unique
}

/// Verify digests, then stage and atomically promote the file.
///
/// Verification happens on the in-memory buffer before anything is
/// written, so a mismatching artifact leaves no trace on disk.
async fn commit_bytes(
    bytes: &[u8],
    artifact: &ResolvedArtifact,
    dest_dir: &Path,
    final_path: &Path,
) -> PackResult<u64> {
    verify_digests(bytes, artifact, final_path)?;

    // Stage inside the destination directory; rename is atomic only
    // within one filesystem.
    let staging = dest_dir.join(format!(".{}.{}.part", artifact.filename, Uuid::new_v4()));

    // Write inside a block so the handle is dropped before the rename.
    {
        let mut file = tokio::fs::File::create(&staging)
            .await
            .map_err(|e| PackError::Io {
                path: staging.clone(),
                source: e,
            })?;
        if let Err(e) = file.write_all(bytes).await {
            drop(file);
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(PackError::Io {
                path: staging.clone(),
                source: e,
            });
        }
        if let Err(e) = file.flush().await {
            drop(file);
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(PackError::Io {
                path: staging.clone(),
                source: e,
            });
        }
    }

    if let Err(e) = tokio::fs::rename(&staging, final_path).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(PackError::Io {
            path: final_path.to_path_buf(),
            source: e,
        });
    }

    Ok(bytes.len() as u64)
}

/// sha1 is mandatory; sha512 is verified when declared, and its absence
/// is a soft warning only.
fn verify_digests(bytes: &[u8], artifact: &ResolvedArtifact, path: &Path) -> PackResult<()> {
    let Some(expected_sha1) = artifact.sha1.as_deref() else {
        return Err(PackError::HashMissing(artifact.identifier.clone()));
    };

    let mut hasher = Sha1::new();
    hasher.update(bytes);
    let actual = hex::encode(hasher.finalize());
    if !actual.eq_ignore_ascii_case(expected_sha1) {
        return Err(PackError::HashMismatch {
            algo: "sha1",
            path: path.to_path_buf(),
            expected: expected_sha1.to_string(),
            actual,
        });
    }

    match artifact.sha512.as_deref() {
        Some(expected) => {
            let mut hasher = Sha512::new();
            hasher.update(bytes);
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(PackError::HashMismatch {
                    algo: "sha512",
                    path: path.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
        None => warn!(
            "No sha512 declared for '{}'; primary digest only",
            artifact.identifier
        ),
    }

    Ok(())
}
