pub mod client;
pub mod models;

pub use client::{ModrinthClient, Registry, RegistryConfig, MODRINTH_API_BASE};
pub use models::{
    DependencyKind, EnvSupport, FileHashes, Project, SearchHit, SearchResults, SideSupport,
    VersionDependency, VersionFile, VersionRecord,
};
