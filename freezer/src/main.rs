use clap::Parser;
use std::path::PathBuf;

use freezer::engine::{InferenceEngine, ReferenceEngine};
use freezer::options::FreezeOptions;
use freezer::pass::PassId;
use freezer::pipeline::{compute_provenance, run_pipeline, FreezeState};
use freezer::report::StderrReporter;

#[derive(Debug, Clone, clap::ValueEnum)]
enum EmitStage {
    Overrides,
    Resolved,
    Graph,
    Json,
    Dot,
    BuildInfo,
}

#[derive(Parser, Debug)]
#[command(
    name = "freezer",
    version,
    about = "Freeze, retype, reshape and cut the inputs of a computation graph"
)]
struct Cli {
    /// Input model (JSON graph)
    model: PathBuf,

    /// Inputs to keep, rename, retype, reshape, freeze, or cut at:
    /// `name[shape]{type}->value`, comma separated
    #[arg(long)]
    input: Option<String>,

    /// Placeholders to replace with constants: `name->value`, comma separated
    #[arg(long)]
    freeze_placeholder_with_value: Option<String>,

    /// Shapes for the --input entries, in order: `[1 3],[2]` or `(1,3),(2)`
    #[arg(long)]
    input_shape: Option<String>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Graph)]
    emit: EmitStage,

    /// Evaluate the finalized graph with these feeds (JSON) and write the
    /// outputs instead of the emitted stage
    #[arg(long)]
    run: Option<PathBuf>,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print passes and timing
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        eprintln!("freezer: model = {}", cli.model.display());
        eprintln!("freezer: emit  = {:?}", cli.emit);
    }

    // ── Load model ──
    let graph = match freezer::model::load_graph(&cli.model) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("freezer: error: {}", e);
            std::process::exit(2);
        }
    };

    if cli.verbose {
        eprintln!(
            "freezer: loaded {} nodes, {} inputs",
            graph.len(),
            graph.placeholders().count()
        );
    }

    // ── Resolve ──
    let options = FreezeOptions {
        input: cli.input.clone(),
        freeze_placeholder_with_value: cli.freeze_placeholder_with_value.clone(),
        input_shape: cli.input_shape.clone(),
    };
    let terminal = match (&cli.emit, &cli.run) {
        (_, Some(_)) => PassId::Splice,
        (EmitStage::Overrides, None) => PassId::Merge,
        (EmitStage::Resolved, None) => PassId::Reconcile,
        _ => PassId::Splice,
    };
    let mut reporter = StderrReporter::new(cli.verbose);
    let mut state = FreezeState::new(graph, options);
    if let Err(e) = run_pipeline(&mut state, terminal, &mut reporter) {
        eprintln!("freezer: {}", e.error.to_diagnostic());
        std::process::exit(1);
    }

    // ── Emit ──
    let text = match emit(&cli, &state) {
        Ok(t) => t,
        Err((code, message)) => {
            eprintln!("freezer: error: {}", message);
            std::process::exit(code);
        }
    };

    match &cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, text) {
                eprintln!("freezer: error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
        }
        None => print!("{}", text),
    }
}

/// Render the requested artifact. Errors carry the exit code.
fn emit(cli: &Cli, state: &FreezeState) -> Result<String, (i32, String)> {
    let spliced = || {
        state
            .spliced
            .as_ref()
            .map(|s| &s.graph)
            .ok_or((1, "no finalized graph".to_string()))
    };

    if let Some(path) = &cli.run {
        let feeds = freezer::model::load_feeds(path).map_err(|e| (2, e.to_string()))?;
        let outputs = ReferenceEngine
            .infer(spliced()?, &feeds)
            .map_err(|e| (1, e.to_string()))?;
        return freezer::model::feeds_to_json(&outputs)
            .map(|s| s + "\n")
            .map_err(|e| (2, e.to_string()));
    }

    let mut out = String::new();
    match cli.emit {
        EmitStage::Overrides => {
            for o in state.overrides.iter().flatten() {
                out.push_str(&format!("{o}\n"));
            }
        }
        EmitStage::Resolved => {
            for input in state.resolution.iter().flat_map(|r| &r.inputs) {
                out.push_str(&format!("{input}\n"));
            }
        }
        EmitStage::Graph => out = format!("{}\n", spliced()?),
        EmitStage::Json => {
            out = freezer::model::to_json(spliced()?).map_err(|e| (2, e.to_string()))? + "\n";
        }
        EmitStage::Dot => out = freezer::dot::emit_dot(spliced()?),
        EmitStage::BuildInfo => {
            out = compute_provenance(&state.options, spliced()?)
                .and_then(|p| p.to_json())
                .map_err(|e| (2, e.to_string()))?;
        }
    }
    Ok(out)
}
