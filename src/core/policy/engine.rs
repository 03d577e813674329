use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use super::schema::PolicyValidator;
use crate::core::error::{PackError, PackResult};

/// One compatibility rule, keyed by mod identifier in the policy
/// document. Normalization guarantees neither set contains the rule's
/// own key.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyRule {
    pub conflicts: HashSet<String>,
    pub sub_mods: HashSet<String>,
}

/// What `apply` would change, as a pure derived view.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PolicyDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Applies conflict / sub-mod compatibility rules to a mod set.
///
/// Sub-mods are injected transitively; conflicts are then pruned, but
/// only among injected (implicit) identifiers — a mod the user asked
/// for is never auto-removed.
pub struct PolicyEngine {
    rules: HashMap<String, PolicyRule>,
}

impl PolicyEngine {
    /// Load rules from a policy document on disk, validating before use.
    ///
    /// Any load, parse, or schema failure is fatal: the engine never
    /// partially initializes.
    pub fn load(path: &Path, validator: &dyn PolicyValidator) -> PackResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PackError::Policy(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut doc: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| PackError::Policy(format!("failed to parse {}: {}", path.display(), e)))?;

        // Strip schema metadata — not part of the runtime rules.
        if let Some(obj) = doc.as_object_mut() {
            obj.remove("$schema");
        }

        validator.validate(&doc).map_err(PackError::Policy)?;

        let rules: HashMap<String, PolicyRule> = serde_json::from_value(doc)
            .map_err(|e| PackError::Policy(format!("failed to decode rules: {e}")))?;

        info!("Loaded {} policy rule(s) from {}", rules.len(), path.display());
        Ok(Self::from_rules(rules))
    }

    /// Build directly from in-memory rules. Used by tests and by callers
    /// that run without a policy document.
    pub fn from_rules(mut rules: HashMap<String, PolicyRule>) -> Self {
        // No self-conflict / self-dependency.
        for (key, rule) in rules.iter_mut() {
            rule.conflicts.remove(key.as_str());
            rule.sub_mods.remove(key.as_str());
        }
        Self { rules }
    }

    /// An engine with no rules: `apply` is the identity.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Apply policy to a mod set: inject sub-mods transitively, then
    /// prune conflicts among the injected ones. The requested
    /// identifiers are always retained.
    pub fn apply(&self, requested: &HashSet<String>) -> HashSet<String> {
        let mut active: HashSet<String> = requested.clone();
        let mut implicit: HashSet<String> = HashSet::new();

        // 1. Sub-mod expansion over a worklist. Membership in `active`
        //    gates enqueueing, so each identifier enters at most once
        //    and the loop terminates.
        let mut worklist: VecDeque<String> = active.iter().cloned().collect();
        while let Some(current) = worklist.pop_front() {
            let Some(rule) = self.rules.get(&current) else {
                continue;
            };
            for sub in &rule.sub_mods {
                if !active.contains(sub) {
                    active.insert(sub.clone());
                    implicit.insert(sub.clone());
                    worklist.push_back(sub.clone());
                }
            }
        }

        // 2. Conflict pass over a lexicographically sorted snapshot, so
        //    the outcome between mutually conflicting implicit mods does
        //    not depend on map iteration order. Only implicit mods lose.
        let snapshot: BTreeSet<String> = active.iter().cloned().collect();
        for identifier in &snapshot {
            if !active.contains(identifier) {
                continue;
            }
            let Some(rule) = self.rules.get(identifier) else {
                continue;
            };
            let mut listed: Vec<&String> = rule.conflicts.iter().collect();
            listed.sort();
            for conflict in listed {
                if active.contains(conflict) && implicit.contains(conflict) {
                    debug!(
                        "Policy drops implicit '{}' (conflicts with '{}')",
                        conflict, identifier
                    );
                    active.remove(conflict);
                    implicit.remove(conflict);
                }
            }
        }

        active
    }

    /// Show what `apply` would change without applying it anywhere.
    pub fn diff(&self, requested: &HashSet<String>) -> PolicyDiff {
        let after = self.apply(requested);

        let mut added: Vec<String> = after.difference(requested).cloned().collect();
        let mut removed: Vec<String> = requested.difference(&after).cloned().collect();
        added.sort();
        removed.sort();

        PolicyDiff { added, removed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(rules: &[(&str, &[&str], &[&str])]) -> PolicyEngine {
        let map = rules
            .iter()
            .map(|(key, conflicts, sub_mods)| {
                (
                    key.to_string(),
                    PolicyRule {
                        conflicts: conflicts.iter().map(|s| s.to_string()).collect(),
                        sub_mods: sub_mods.iter().map(|s| s.to_string()).collect(),
                    },
                )
            })
            .collect();
        PolicyEngine::from_rules(map)
    }

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn apply_retains_every_requested_identifier() {
        let engine = engine(&[("sodium", &["optifine"], &["lithium"])]);
        let requested = set(&["sodium", "optifine"]);

        let active = engine.apply(&requested);

        // Explicit mods always survive, even mutual conflicts.
        assert!(requested.is_subset(&active));
    }

    #[test]
    fn apply_expands_sub_mods_transitively() {
        let engine = engine(&[
            ("sodium", &[], &["lithium"]),
            ("lithium", &[], &["phosphor"]),
        ]);

        let active = engine.apply(&set(&["sodium"]));

        assert_eq!(active, set(&["sodium", "lithium", "phosphor"]));
    }

    #[test]
    fn apply_is_idempotent() {
        let engine = engine(&[
            ("sodium", &[], &["lithium", "sodium-extra"]),
            ("sodium-extra", &["magnesium"], &[]),
            ("iris", &[], &["sodium"]),
        ]);

        let once = engine.apply(&set(&["sodium", "iris"]));
        let twice = engine.apply(&once);

        assert_eq!(once, twice);
    }

    #[test]
    fn implicit_sub_mod_cannot_evict_its_explicit_parent() {
        // {A: {sub_mods:[B]}, B: {conflicts:[A]}}, input {A} -> {A, B}
        let engine = engine(&[("a", &[], &["b"]), ("b", &["a"], &[])]);

        let active = engine.apply(&set(&["a"]));

        assert_eq!(active, set(&["a", "b"]));
    }

    #[test]
    fn conflicts_only_remove_implicit_members() {
        let engine = engine(&[
            ("sodium", &[], &["magnesium"]),
            ("iris", &["magnesium"], &[]),
        ]);

        let active = engine.apply(&set(&["sodium", "iris"]));

        assert_eq!(active, set(&["sodium", "iris"]));
    }

    #[test]
    fn mutual_implicit_conflict_resolves_deterministically() {
        // Both b and c are injected and conflict with each other. The
        // sorted snapshot visits 'b' first, so 'c' is evicted.
        let engine = engine(&[
            ("root", &[], &["b", "c"]),
            ("b", &["c"], &[]),
            ("c", &["b"], &[]),
        ]);

        for _ in 0..16 {
            let active = engine.apply(&set(&["root"]));
            assert_eq!(active, set(&["root", "b"]));
        }
    }

    #[test]
    fn normalization_strips_self_references() {
        let engine = engine(&[("sodium", &["sodium"], &["sodium"])]);

        let active = engine.apply(&set(&["sodium"]));

        assert_eq!(active, set(&["sodium"]));
    }

    #[test]
    fn diff_reports_sorted_additions() {
        let engine = engine(&[("iris", &[], &["zeta", "alpha"])]);

        let diff = engine.diff(&set(&["iris"]));

        assert_eq!(diff.added, vec!["alpha", "zeta"]);
        assert!(diff.removed.is_empty());
    }
}
