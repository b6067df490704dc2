// pipeline.rs — Resolver state and pass orchestration
//
// Holds all pass artifacts and runs the minimal set of passes for a given
// terminal PassId.
//
// Preconditions: the graph and options must be set before calling run_pipeline.
// Postconditions: all artifacts for required passes are populated, or the
//                 failing pass and its error are returned.
// Failure modes: any pass returning a FreezeError.
// Side effects: reports warnings, usage events and pass timings to the
//               caller's Reporter.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::ast::OverrideSpec;
use crate::diag::Diagnostic;
use crate::error::{ErrorKind, FreezeError};
use crate::graph::Graph;
use crate::model::{self, ModelError};
use crate::options::{collect_overrides, FreezeOptions};
use crate::pass::{descriptor, required_passes, PassId};
use crate::reconcile::{reconcile, InputMode, Resolution, ResolvedInput};
use crate::report::Reporter;
use crate::splice::{splice, SpliceResult};

// ── Artifact storage ───────────────────────────────────────────────────────

/// Holds the input graph, the options, every pass artifact, and the warnings
/// accumulated so far.
pub struct FreezeState {
    pub graph: Graph,
    pub options: FreezeOptions,
    pub overrides: Option<Vec<OverrideSpec>>,
    pub resolution: Option<Resolution>,
    pub spliced: Option<SpliceResult>,
    pub diagnostics: Vec<Diagnostic>,
}

impl FreezeState {
    pub fn new(graph: Graph, options: FreezeOptions) -> Self {
        Self {
            graph,
            options,
            overrides: None,
            resolution: None,
            spliced: None,
            diagnostics: Vec::new(),
        }
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Pipeline execution failed in a pass.
#[derive(Debug)]
pub struct PipelineError {
    /// The pass that produced the error.
    pub failing_pass: PassId,
    pub error: FreezeError,
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for reproducible freezing and cache-key use.
///
/// `override_hash`: SHA-256 of the canonical option text.
/// `graph_fingerprint`: SHA-256 of the finalized graph's compact JSON.
/// `tool_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub override_hash: [u8; 32],
    pub graph_fingerprint: [u8; 32],
    pub tool_version: &'static str,
}

#[derive(Serialize)]
struct BuildInfo<'a> {
    override_hash: String,
    graph_fingerprint: String,
    tool_version: &'a str,
}

impl Provenance {
    /// Hex string of the override hash (64 characters).
    pub fn override_hash_hex(&self) -> String {
        bytes_to_hex(&self.override_hash)
    }

    /// Hex string of the graph fingerprint (64 characters).
    pub fn graph_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.graph_fingerprint)
    }

    /// Serialize provenance as a JSON string for `--emit build-info`.
    pub fn to_json(&self) -> Result<String, ModelError> {
        let info = BuildInfo {
            override_hash: self.override_hash_hex(),
            graph_fingerprint: self.graph_fingerprint_hex(),
            tool_version: self.tool_version,
        };
        Ok(serde_json::to_string_pretty(&info)? + "\n")
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(text: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Compute provenance from the options and the finalized graph.
pub fn compute_provenance(options: &FreezeOptions, graph: &Graph) -> Result<Provenance, ModelError> {
    Ok(Provenance {
        override_hash: sha256(&options.canonical_text()),
        graph_fingerprint: sha256(&model::canonical_json(graph)?),
        tool_version: env!("CARGO_PKG_VERSION"),
    })
}

// ── Pipeline runner ────────────────────────────────────────────────────────

fn finish_pass(
    state: &mut FreezeState,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: Duration,
    reporter: &mut dyn Reporter,
) {
    for d in &diags {
        reporter.diagnostic(d);
    }
    state.diagnostics.extend(diags);
    reporter.pass_complete(descriptor(pass_id).name, elapsed);
}

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute → report diagnostics → report timing.
/// Stops at the first failing pass.
pub fn run_pipeline(
    state: &mut FreezeState,
    terminal: PassId,
    reporter: &mut dyn Reporter,
) -> Result<(), PipelineError> {
    for pass_id in required_passes(terminal) {
        let fail = |error: FreezeError| PipelineError {
            failing_pass: pass_id,
            error,
        };
        let t = Instant::now();
        match pass_id {
            PassId::Merge => {
                let overrides = collect_overrides(&state.options, &state.graph).map_err(fail)?;
                state.overrides = Some(overrides);
                finish_pass(state, pass_id, Vec::new(), t.elapsed(), reporter);
            }
            PassId::Reconcile => {
                let overrides = state.overrides.as_deref().unwrap_or_default();
                let resolution = reconcile(overrides, &state.graph).map_err(fail)?;
                let elapsed = t.elapsed();
                for input in &resolution.inputs {
                    if input.mode != InputMode::PassThrough {
                        reporter.send_event("freezer", input.mode.label(), &input.name);
                    }
                }
                let diags = resolution.warnings.clone();
                state.resolution = Some(resolution);
                finish_pass(state, pass_id, diags, elapsed, reporter);
            }
            PassId::Splice => {
                let inputs = state
                    .resolution
                    .as_ref()
                    .map(|r| r.inputs.as_slice())
                    .unwrap_or_default();
                let result = splice(&state.graph, inputs).map_err(fail)?;
                let elapsed = t.elapsed();
                let diags = result.warnings.clone();
                state.spliced = Some(result);
                finish_pass(state, pass_id, diags, elapsed, reporter);
            }
        }
    }
    Ok(())
}

// ── One-shot entry point ───────────────────────────────────────────────────

/// A finalized graph plus what happened to each input.
#[derive(Debug, Clone)]
pub struct FreezeOutput {
    pub graph: Graph,
    pub inputs: Vec<ResolvedInput>,
    pub pruned: Vec<String>,
    pub warnings: Vec<Diagnostic>,
}

/// Apply `options` to a copy of `graph`. The caller's graph is not modified.
pub fn freeze(
    graph: &Graph,
    options: &FreezeOptions,
    reporter: &mut dyn Reporter,
) -> Result<FreezeOutput, FreezeError> {
    let mut state = FreezeState::new(graph.clone(), options.clone());
    run_pipeline(&mut state, PassId::Splice, reporter).map_err(|e| e.error)?;
    let inputs = state.resolution.map(|r| r.inputs).unwrap_or_default();
    let spliced = state
        .spliced
        .ok_or_else(|| FreezeError::new(ErrorKind::GraphSplice, "splice produced no graph"))?;
    Ok(FreezeOutput {
        graph: spliced.graph,
        inputs,
        pruned: spliced.pruned,
        warnings: state.diagnostics,
    })
}
