pub mod engine;
pub mod schema;

pub use engine::{PolicyDiff, PolicyEngine, PolicyRule};
pub use schema::{DefaultPolicySchema, PolicyValidator};
