use std::collections::HashSet;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::matching::{best_match, match_score, CONFIDENT_SCORE};
use crate::core::error::{PackError, PackResult};
use crate::core::registry::{DependencyKind, EnvSupport, Project, Registry};

/// How many registry lookups may be in flight at once.
const RESOLVE_CONCURRENCY: usize = 8;

/// Hits requested per fuzzy search.
const SEARCH_LIMIT: u32 = 10;

/// One concrete, version-pinned downloadable unit. Immutable once the
/// resolver has produced it.
#[derive(Debug, Clone)]
pub struct ResolvedArtifact {
    /// Canonical registry slug.
    pub identifier: String,
    pub project_id: String,
    pub version_id: String,
    pub filename: String,
    pub url: String,
    pub sha1: Option<String>,
    pub sha512: Option<String>,
    pub size: u64,
    /// Slugs of the dependencies this artifact pulled in.
    pub dependencies: Vec<String>,
    pub env: EnvSupport,
}

/// Why one requested identifier could not be resolved.
#[derive(Debug)]
pub struct ResolutionFailure {
    pub identifier: String,
    pub error: PackError,
}

/// The resolver's full output: the closed artifact set in first-discovery
/// order, plus every identifier it could not satisfy. A report with
/// failures must never be treated as a complete graph.
#[derive(Debug, Default)]
pub struct ResolutionReport {
    pub artifacts: Vec<ResolvedArtifact>,
    pub failures: Vec<ResolutionFailure>,
}

impl ResolutionReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Pinned identifiers, sorted for stable manifest output.
    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .artifacts
            .iter()
            .map(|a| a.identifier.clone())
            .collect();
        ids.sort();
        ids
    }
}

/// What one identifier contributed: its artifact and the dependency
/// slugs to enqueue for the next wave.
struct Resolution {
    artifact: ResolvedArtifact,
    next: Vec<String>,
}

/// Expands an identifier set into a closed, version-pinned artifact set
/// against one registry snapshot.
///
/// Expansion is breadth-first in waves: queries within a wave run
/// concurrently, graph mutation happens between waves on this task, so
/// the logical discovery order is deterministic and no two completions
/// race on "is this identifier already resolved".
pub struct DependencyResolver<'a> {
    registry: &'a dyn Registry,
    game_version: String,
    loader: String,
    include_optional: bool,
    strict: bool,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(
        registry: &'a dyn Registry,
        game_version: impl Into<String>,
        loader: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            game_version: game_version.into(),
            loader: loader.into(),
            include_optional: false,
            strict: false,
        }
    }

    /// Also follow `optional` dependencies. Off by default to avoid
    /// pack bloat; `required` is always followed, `embedded` and
    /// `incompatible` never are.
    pub fn include_optional(mut self, yes: bool) -> Self {
        self.include_optional = yes;
        self
    }

    /// Abort the whole run on the first failure instead of accumulating
    /// a per-identifier report. In-flight queries are dropped.
    pub fn strict(mut self, yes: bool) -> Self {
        self.strict = yes;
        self
    }

    /// Resolve every identifier and all transitive dependencies.
    ///
    /// An identifier reached through several paths is resolved once:
    /// the first resolution wins and later requests are satisfied from
    /// the graph, differing constraints are not reconciled.
    pub async fn resolve(&self, identifiers: &[String]) -> PackResult<ResolutionReport> {
        let mut report = ResolutionReport::default();
        // Everything ever enqueued, under both the requested spelling
        // and the canonical slug.
        let mut visited: HashSet<String> = HashSet::new();
        // Slugs with an artifact in the graph.
        let mut resolved: HashSet<String> = HashSet::new();

        let mut wave: Vec<String> = Vec::new();
        for identifier in identifiers {
            if visited.insert(identifier.clone()) {
                wave.push(identifier.clone());
            }
        }

        info!(
            "Resolving {} identifier(s) for {}/{}",
            wave.len(),
            self.game_version,
            self.loader
        );

        while !wave.is_empty() {
            let current = std::mem::take(&mut wave);
            debug!("Resolution wave: {:?}", current);

            let mut outcomes = {
                let mut stream = stream::iter(current.into_iter().enumerate())
                    .map(|(position, identifier)| async move {
                        let outcome = self.resolve_one(&identifier).await;
                        (position, identifier, outcome)
                    })
                    .buffer_unordered(RESOLVE_CONCURRENCY);

                let mut collected = Vec::new();
                while let Some((position, identifier, outcome)) = stream.next().await {
                    match outcome {
                        Err(error) if self.strict => {
                            // Dropping the stream cancels the wave's
                            // remaining in-flight queries.
                            warn!("Aborting resolution: '{}' failed: {}", identifier, error);
                            return Err(error);
                        }
                        outcome => collected.push((position, identifier, outcome)),
                    }
                }
                collected
            };

            // Re-establish breadth-first discovery order before touching
            // the graph; completions arrive out of order.
            outcomes.sort_by_key(|(position, ..)| *position);

            for (_, identifier, outcome) in outcomes {
                match outcome {
                    Ok(resolution) => {
                        let slug = resolution.artifact.identifier.clone();
                        if !resolved.insert(slug.clone()) {
                            debug!("'{}' already resolved; first resolution wins", identifier);
                            continue;
                        }
                        visited.insert(slug);
                        for dep in &resolution.next {
                            if visited.insert(dep.clone()) {
                                wave.push(dep.clone());
                            }
                        }
                        report.artifacts.push(resolution.artifact);
                    }
                    Err(error) => {
                        warn!("Failed to resolve '{}': {}", identifier, error);
                        report.failures.push(ResolutionFailure { identifier, error });
                    }
                }
            }
        }

        info!(
            "Resolved {} artifact(s), {} failure(s)",
            report.artifacts.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Resolve a single identifier to its best matching version.
    async fn resolve_one(&self, identifier: &str) -> PackResult<Resolution> {
        let project = self.locate_project(identifier).await?;

        let versions = self
            .registry
            .versions(&project.slug, &self.game_version, &self.loader)
            .await?;

        // Most recently published among the compatible versions; an
        // empty intersection is a failure, never a silent substitution.
        let best = versions
            .iter()
            .filter(|v| v.supports(&self.game_version, &self.loader))
            .max_by_key(|v| v.date_published)
            .ok_or_else(|| PackError::IncompatibleVersion {
                identifier: project.slug.clone(),
                game_version: self.game_version.clone(),
                loader: self.loader.clone(),
            })?;

        let file = best
            .primary_file()
            .ok_or_else(|| PackError::MissingPrimaryFile {
                identifier: project.slug.clone(),
                version_id: best.id.clone(),
            })?;

        let mut dependencies = Vec::new();
        for dep in &best.dependencies {
            let follow = match dep.dependency_type {
                DependencyKind::Required => true,
                DependencyKind::Optional => self.include_optional,
                DependencyKind::Embedded | DependencyKind::Incompatible => false,
            };
            if !follow {
                continue;
            }
            let Some(project_id) = dep.project_id.as_deref() else {
                warn!(
                    "Dependency of '{}' carries no project id; skipping",
                    project.slug
                );
                continue;
            };
            let dep_project = self.registry.project(project_id).await?;
            dependencies.push(dep_project.slug);
        }

        debug!(
            "Pinned '{}' to version {} ({})",
            project.slug, best.id, file.filename
        );

        Ok(Resolution {
            artifact: ResolvedArtifact {
                identifier: project.slug.clone(),
                project_id: project.id,
                version_id: best.id.clone(),
                filename: file.filename.clone(),
                url: file.url.clone(),
                sha1: file.hashes.sha1.clone(),
                sha512: file.hashes.sha512.clone(),
                size: file.size,
                dependencies: dependencies.clone(),
                env: EnvSupport {
                    client: project.client_side,
                    server: project.server_side,
                },
            },
            next: dependencies,
        })
    }

    /// Canonicalize an identifier: exact slug lookup first, fuzzy search
    /// as the fallback for human-entered names.
    async fn locate_project(&self, identifier: &str) -> PackResult<Project> {
        match self.registry.project(identifier).await {
            Ok(project) => return Ok(project),
            Err(PackError::RegistryStatus { status: 404, .. }) => {}
            Err(e) => return Err(e),
        }

        let results = self
            .registry
            .search(identifier, &self.game_version, &self.loader, SEARCH_LIMIT)
            .await?;
        if results.hits.is_empty() {
            return Err(PackError::NotFound(identifier.to_string()));
        }

        match best_match(identifier, &results.hits) {
            Some((hit, score)) if score >= CONFIDENT_SCORE || results.hits.len() == 1 => {
                if score < CONFIDENT_SCORE {
                    warn!(
                        "Low-confidence match '{}' -> '{}' (score {})",
                        identifier, hit.slug, score
                    );
                } else {
                    info!("Matched '{}' -> '{}' (score {})", identifier, hit.slug, score);
                }
                self.registry.project(&hit.slug).await
            }
            // No winner, or a sub-confidence score with alternatives:
            // surface the scored candidates instead of guessing.
            _ => {
                let mut candidates: Vec<(String, u32)> = results
                    .hits
                    .iter()
                    .map(|hit| {
                        (hit.slug.clone(), match_score(identifier, &hit.slug, &hit.title))
                    })
                    .collect();
                candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                candidates.truncate(5);
                Err(PackError::AmbiguousMatch {
                    query: identifier.to_string(),
                    candidates,
                })
            }
        }
    }
}
