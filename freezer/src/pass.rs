// pass.rs — Resolver passes: descriptors, dependency order, artifact IDs
//
// Declares the resolver's passes (loading the model is outside the runner),
// their dependency edges, and the artifacts they produce. Used by the
// pipeline runner to compute the minimal pass subset for each --emit target.

use std::collections::HashSet;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each resolver pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    Merge,
    Reconcile,
    Splice,
}

/// Machine-readable artifact identifiers. Each maps to a field of
/// `FreezeState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Overrides,  // Vec<OverrideSpec>
    Resolution, // Resolution
    Spliced,    // SpliceResult
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a resolver pass.
pub struct PassDescriptor {
    /// Human-readable name for verbose output and reporter events.
    pub name: &'static str,
    /// Pass dependencies (other passes whose outputs this pass consumes).
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// What invalidates this pass's output.
    pub invalidation_key: &'static str,
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::Merge => PassDescriptor {
            name: "merge",
            inputs: &[],
            outputs: &[ArtifactId::Overrides],
            invalidation_key: "input + freeze_placeholder_with_value + input_shape",
            invariants: "override text parsed, input shapes attached",
        },
        PassId::Reconcile => PassDescriptor {
            name: "reconcile",
            inputs: &[PassId::Merge],
            outputs: &[ArtifactId::Resolution],
            invalidation_key: "overrides + graph",
            invariants: "no duplicates, every target located, types and shapes resolved",
        },
        PassId::Splice => PassDescriptor {
            name: "splice",
            inputs: &[PassId::Reconcile],
            outputs: &[ArtifactId::Spliced],
            invalidation_key: "resolution + graph",
            invariants: "dead nodes pruned, metadata re-propagated",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 3] = [PassId::Merge, PassId::Reconcile, PassId::Splice];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_passes_merge_is_minimal() {
        assert_eq!(required_passes(PassId::Merge), vec![PassId::Merge]);
    }

    #[test]
    fn required_passes_splice_includes_all() {
        assert_eq!(
            required_passes(PassId::Splice),
            vec![PassId::Merge, PassId::Reconcile, PassId::Splice]
        );
    }

    #[test]
    fn all_descriptors_have_outputs() {
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            assert!(
                !desc.outputs.is_empty(),
                "pass {:?} has no outputs declared",
                pass
            );
        }
    }

    #[test]
    fn dependency_edges_are_consistent() {
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            for dep in desc.inputs {
                let dep_passes = required_passes(*pass);
                let dep_pos = dep_passes.iter().position(|p| p == dep);
                let self_pos = dep_passes.iter().position(|p| p == pass);
                assert!(
                    dep_pos.unwrap() < self_pos.unwrap(),
                    "{:?} depends on {:?} but it comes later in topological order",
                    pass,
                    dep
                );
            }
        }
    }
}
