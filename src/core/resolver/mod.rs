pub mod matching;
pub mod resolve;

pub use matching::{best_match, match_score, normalize, CONFIDENT_SCORE};
pub use resolve::{
    DependencyResolver, ResolutionFailure, ResolutionReport, ResolvedArtifact,
};
