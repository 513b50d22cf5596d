use clap::Parser;
use std::path::PathBuf;

use symshape::pass::PassId;
use symshape::pipeline::{self, CompilationState, PipelineOptions};

#[derive(Debug, Clone, clap::ValueEnum)]
enum EmitStage {
    /// Parsed syntax tree
    Ast,
    /// Resolved graphs, before symbols are built
    Graph,
    /// Canonical symbol dump
    Symbols,
    /// Expression table only
    Exprs,
    /// Structured JSON report
    Json,
    /// No-effect nodes and duplicate shape computations
    Redundant,
    /// Source hash and rule registry fingerprint
    BuildInfo,
    /// Concrete shapes for the `--input` shapes
    Infer,
}

#[derive(Parser, Debug)]
#[command(
    name = "symc",
    version,
    about = "Symbolic shape checker: propagates symbolic shapes and values through .sym graph files"
)]
struct Cli {
    /// Input .sym source file
    source: PathBuf,

    /// Entry graph (default: `main`, else the last graph in the file)
    #[arg(short, long)]
    entry: Option<String>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Symbols)]
    emit: EmitStage,

    /// Concrete shape of one entry parameter, comma-separated (e.g. `3,128`;
    /// empty for a scalar). Repeat once per parameter, in order.
    #[arg(long = "input", value_name = "DIMS")]
    inputs: Vec<String>,

    /// Print phases and timing
    #[arg(long)]
    verbose: bool,
}

fn parse_dims(text: &str) -> Result<Vec<i64>, String> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    text.split(',')
        .map(|d| {
            d.trim()
                .parse::<i64>()
                .map_err(|e| format!("bad dimension '{}': {}", d.trim(), e))
        })
        .collect()
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        eprintln!("symc: source = {}", cli.source.display());
        eprintln!("symc: emit   = {:?}", cli.emit);
    }

    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("symc: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };

    let rules = symshape::rule::global();
    if cli.verbose {
        eprintln!("symc: {} operation rules registered", rules.len());
    }

    if let EmitStage::BuildInfo = cli.emit {
        print!("{}", pipeline::compute_provenance(&source, rules).to_json());
        return;
    }

    // ── Parse ──
    let ast = match pipeline::parse_source(&source) {
        Ok(ast) => ast,
        Err(diags) => {
            for d in &diags {
                eprintln!("symc: {}", symshape::diag::render(d, &source));
            }
            std::process::exit(1);
        }
    };
    if cli.verbose {
        eprintln!("symc: parsed {} graphs", ast.graphs.len());
    }
    if let EmitStage::Ast = cli.emit {
        println!("{:#?}", ast);
        return;
    }

    // ── Passes ──
    let terminal = match cli.emit {
        EmitStage::Graph => PassId::Resolve,
        EmitStage::Redundant => PassId::Redundancy,
        _ => PassId::Build,
    };
    let options = PipelineOptions {
        entry: cli.entry.as_deref(),
        rules,
        verbose: cli.verbose,
    };
    let mut state = CompilationState::new(ast);
    let result = pipeline::run_pipeline(&mut state, terminal, &options, |_, diags| {
        for d in diags {
            eprintln!("symc: {}", symshape::diag::render(d, &source));
        }
    });
    if result.is_err() {
        std::process::exit(1);
    }

    let (Some(program), Some(entry)) = (state.program.as_ref(), state.entry) else {
        eprintln!("symc: error: pipeline produced no program");
        std::process::exit(1);
    };
    match cli.emit {
        EmitStage::Graph => print!("{}", program),
        EmitStage::Symbols => print!("{}", symshape::dump::dump(program, entry)),
        EmitStage::Exprs => print!("{}", symshape::dump::dump_exprs(program, entry)),
        EmitStage::Json => println!(
            "{}",
            symshape::dump::report_json(program, entry, state.build.as_ref())
        ),
        EmitStage::Redundant => {
            if let Some(findings) = &state.findings {
                print!("{}", findings.render(program));
            }
        }
        EmitStage::Infer => {
            let parsed: Result<Vec<_>, _> = cli.inputs.iter().map(|t| parse_dims(t)).collect();
            let inputs = match parsed {
                Ok(inputs) => inputs,
                Err(e) => {
                    eprintln!("symc: error: --input: {e}");
                    std::process::exit(2);
                }
            };
            match symshape::infer::infer(program, entry, &inputs) {
                Ok(inference) => print!("{}", inference.render(program, entry)),
                Err(e) => {
                    eprintln!("symc: error: {e}");
                    std::process::exit(1);
                }
            }
        }
        EmitStage::Ast | EmitStage::BuildInfo => {}
    }
}
