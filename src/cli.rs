// Thin command glue over the core: load the manifest, run one core
// operation, report. No resolution or download logic lives here.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::warn;

use crate::core::downloader::Downloader;
use crate::core::error::{PackError, PackResult};
use crate::core::http::build_http_client;
use crate::core::index::{self, IndexBuilder};
use crate::core::manifest::{Loader, PackManifest, MANIFEST_FILE};
use crate::core::policy::{DefaultPolicySchema, PolicyEngine};
use crate::core::registry::{ModrinthClient, Registry, RegistryConfig};
use crate::core::resolver::{best_match, match_score, DependencyResolver, CONFIDENT_SCORE};

/// Initial versionId stamped into a fresh pack index.
const INITIAL_VERSION_ID: &str = "1.0.0";

#[derive(Parser)]
#[command(
    name = "packsmith",
    version,
    about = "Minecraft modpack resolver and builder for the Modrinth registry"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Pack directory (defaults to the current directory).
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new pack manifest and skeleton index.
    Init {
        name: String,
        #[arg(long, default_value = "1.21.1")]
        minecraft: String,
        #[arg(long, default_value = "fabric")]
        loader: Loader,
        #[arg(long, default_value = "0.16.9")]
        loader_version: String,
    },
    /// Search the registry and add a mod to the manifest.
    Add { name: String },
    /// Show what the compatibility policy would change, without applying.
    Plan {
        #[arg(long)]
        policy: Option<PathBuf>,
    },
    /// Expand the mod list per policy and pin every dependency.
    Resolve {
        #[arg(long)]
        policy: Option<PathBuf>,
        /// Also follow optional dependencies.
        #[arg(long)]
        include_optional: bool,
        /// Abort on the first resolution failure.
        #[arg(long)]
        strict: bool,
    },
    /// Resolve, download and verify all files, then write the index.
    Build {
        #[arg(long)]
        policy: Option<PathBuf>,
        #[arg(long)]
        include_optional: bool,
        #[arg(long)]
        strict: bool,
    },
    /// Validate an existing pack index.
    Check,
}

pub async fn run(cli: Cli) -> PackResult<()> {
    let dir = cli.dir.unwrap_or_else(|| PathBuf::from("."));

    match cli.command {
        Command::Init {
            name,
            minecraft,
            loader,
            loader_version,
        } => init(&dir, &name, &minecraft, loader, &loader_version).await,
        Command::Add { name } => add(&dir, &name).await,
        Command::Plan { policy } => plan(&dir, policy.as_deref()).await,
        Command::Resolve {
            policy,
            include_optional,
            strict,
        } => resolve(&dir, policy.as_deref(), include_optional, strict).await,
        Command::Build {
            policy,
            include_optional,
            strict,
        } => build(&dir, policy.as_deref(), include_optional, strict).await,
        Command::Check => check(&dir).await,
    }
}

async fn init(
    dir: &Path,
    name: &str,
    minecraft: &str,
    loader: Loader,
    loader_version: &str,
) -> PackResult<()> {
    let pack_dir = dir.join(name);
    if pack_dir.exists() {
        return Err(PackError::PackExists(name.to_string()));
    }

    let manifest = PackManifest::new(name, minecraft, loader, loader_version);
    tokio::fs::create_dir_all(manifest.mods_dir(&pack_dir))
        .await
        .map_err(|e| PackError::Io {
            path: pack_dir.clone(),
            source: e,
        })?;
    manifest.save(&pack_dir).await?;

    // Skeleton index: correct metadata, no files yet.
    let index = IndexBuilder::new(&manifest, INITIAL_VERSION_ID).build(&[], &[])?;
    index::write_index(&index, &pack_dir).await?;

    println!("Created pack '{}' at {}", name, pack_dir.display());
    println!("  minecraft {minecraft} | {loader} {loader_version}");
    Ok(())
}

async fn add(dir: &Path, name: &str) -> PackResult<()> {
    let mut manifest = PackManifest::load(dir).await?;
    let client = build_http_client()?;
    let registry = ModrinthClient::new(client, RegistryConfig::default());

    let results = registry
        .search(name, &manifest.minecraft, manifest.loader.facet(), 10)
        .await?;
    if results.hits.is_empty() {
        return Err(PackError::NotFound(name.to_string()));
    }

    let Some((hit, score)) = best_match(name, &results.hits) else {
        return Err(scored_candidates_error(name, &results));
    };
    if score < CONFIDENT_SCORE && results.hits.len() > 1 {
        return Err(scored_candidates_error(name, &results));
    }

    let confidence = match score {
        80.. => "high",
        60..=79 => "medium",
        _ => "low",
    };
    println!("Found: {} ({confidence} confidence)", hit.slug);

    if manifest.add_mod(hit.slug.clone()) {
        manifest.save(dir).await?;
        println!("Added '{}' to {}", hit.slug, MANIFEST_FILE);
    } else {
        println!("'{}' is already in the manifest", hit.slug);
    }
    Ok(())
}

fn scored_candidates_error(
    name: &str,
    results: &crate::core::registry::SearchResults,
) -> PackError {
    let mut candidates: Vec<(String, u32)> = results
        .hits
        .iter()
        .map(|hit| (hit.slug.clone(), match_score(name, &hit.slug, &hit.title)))
        .collect();
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    candidates.truncate(5);
    PackError::AmbiguousMatch {
        query: name.to_string(),
        candidates,
    }
}

/// Load the policy engine. An explicit path must load; the default
/// location is optional and its absence means "no rules".
fn load_policy(explicit: Option<&Path>) -> PackResult<PolicyEngine> {
    match explicit {
        Some(path) => PolicyEngine::load(path, &DefaultPolicySchema),
        None => {
            let default_path = dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("packsmith")
                .join("policy.json");
            if default_path.exists() {
                PolicyEngine::load(&default_path, &DefaultPolicySchema)
            } else {
                Ok(PolicyEngine::empty())
            }
        }
    }
}

async fn plan(dir: &Path, policy_path: Option<&Path>) -> PackResult<()> {
    let manifest = PackManifest::load(dir).await?;
    let policy = load_policy(policy_path)?;

    let requested: HashSet<String> = manifest.mods.iter().cloned().collect();
    let diff = policy.diff(&requested);

    if diff.added.is_empty() && diff.removed.is_empty() {
        println!("Policy would change nothing");
        return Ok(());
    }
    for added in &diff.added {
        println!("+ {added}");
    }
    for removed in &diff.removed {
        println!("- {removed}");
    }
    Ok(())
}

async fn resolve(
    dir: &Path,
    policy_path: Option<&Path>,
    include_optional: bool,
    strict: bool,
) -> PackResult<()> {
    let mut manifest = PackManifest::load(dir).await?;
    let policy = load_policy(policy_path)?;
    let client = build_http_client()?;
    let registry = ModrinthClient::new(client, RegistryConfig::default());

    let report = resolve_with(&manifest, &policy, &registry, include_optional, strict).await?;

    for failure in &report.failures {
        eprintln!("failed: {} ({})", failure.identifier, failure.error);
    }

    manifest.mods = report.identifiers();
    manifest.save(dir).await?;
    println!(
        "Resolved {} mod(s), {} failure(s)",
        manifest.mods.len(),
        report.failures.len()
    );
    Ok(())
}

async fn resolve_with(
    manifest: &PackManifest,
    policy: &PolicyEngine,
    registry: &dyn Registry,
    include_optional: bool,
    strict: bool,
) -> PackResult<crate::core::resolver::ResolutionReport> {
    let requested: HashSet<String> = manifest.mods.iter().cloned().collect();
    let mut expanded: Vec<String> = policy.apply(&requested).into_iter().collect();
    expanded.sort();

    DependencyResolver::new(registry, &manifest.minecraft, manifest.loader.facet())
        .include_optional(include_optional)
        .strict(strict)
        .resolve(&expanded)
        .await
}

async fn build(
    dir: &Path,
    policy_path: Option<&Path>,
    include_optional: bool,
    strict: bool,
) -> PackResult<()> {
    let manifest = PackManifest::load(dir).await?;
    let policy = load_policy(policy_path)?;
    let client = build_http_client()?;
    let registry = ModrinthClient::new(client.clone(), RegistryConfig::default());

    let report = resolve_with(&manifest, &policy, &registry, include_optional, strict).await?;
    for failure in &report.failures {
        eprintln!("unresolved: {} ({})", failure.identifier, failure.error);
    }

    let downloader = Downloader::new(client);
    let mods_dir = manifest.mods_dir(dir);
    let downloads = downloader.download_all(&report.artifacts, &mods_dir).await?;

    for failed in downloads.failures() {
        eprintln!(
            "download failed: {} ({})",
            failed.identifier,
            failed
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default()
        );
    }

    let index = IndexBuilder::new(&manifest, INITIAL_VERSION_ID)
        .build(&report.artifacts, &downloads.records)?;
    index::write_index(&index, dir).await?;

    let verified = downloads.verified().count();
    println!(
        "Built '{}': {} file(s) verified, {} resolution failure(s), {} download failure(s)",
        manifest.name,
        verified,
        report.failures.len(),
        downloads.failures().count()
    );

    if !report.is_complete() || !downloads.all_verified() {
        warn!("Build finished with failures; the pack is incomplete");
        std::process::exit(1);
    }
    Ok(())
}

async fn check(dir: &Path) -> PackResult<()> {
    let index = index::read_index(dir).await?;
    let warnings = index::validate(&index)?;

    println!(
        "{}: {} file(s), minecraft {}",
        index.name,
        index.files.len(),
        index
            .dependencies
            .get("minecraft")
            .map(String::as_str)
            .unwrap_or("?")
    );
    for warning in &warnings {
        println!("warning: {warning}");
    }
    if warnings.is_empty() {
        println!("All checks passed");
    }
    Ok(())
}
