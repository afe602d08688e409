//! opsight - export model graphs and run them with event tracing.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::Rng;

use opsight::demo::{demo_graph, DEMO_NAMES};
use opsight::executor::Executor;
use opsight::graph::Graph;
use opsight::program::lower;
use opsight::record::generate_record;
use opsight::tensor::Tensor;
use opsight::tracer::EventTracer;

#[derive(Parser)]
#[command(name = "opsight")]
#[command(about = "Export and run compiled model graphs with event tracing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a model graph to a lowered program
    Export {
        /// Name of a built-in demo model
        #[arg(short, long, conflicts_with = "graph")]
        model: Option<String>,

        /// Path to a graph JSON file to export instead of a demo model
        #[arg(long)]
        graph: Option<PathBuf>,

        /// Output path for the lowered program
        #[arg(short, long)]
        output: PathBuf,

        /// Also generate a graph record at this path
        #[arg(long)]
        record: Option<PathBuf>,
    },
    /// Run a lowered program against random sample inputs
    Run {
        /// Path to the lowered program
        #[arg(long)]
        model_path: PathBuf,

        /// Enable event tracing and write the runtime trace to this path
        #[arg(long)]
        trace: Option<PathBuf>,

        /// Number of times to run the program
        #[arg(long, default_value = "1")]
        iterations: u32,
    },
}

fn cmd_export(
    model: Option<String>,
    graph_path: Option<PathBuf>,
    output: PathBuf,
    record: Option<PathBuf>,
) -> Result<()> {
    let graph = match (model, graph_path) {
        (_, Some(path)) => Graph::from_file(&path)?,
        (Some(name), None) => demo_graph(&name)?,
        (None, None) => bail!(
            "Nothing to export: pass --graph or -m with one of: {}",
            DEMO_NAMES.join(", ")
        ),
    };

    let program = lower(&graph)?;
    program.write_to_file(&output)?;
    println!(
        "Exported '{}' ({} instructions) to {}",
        program.name,
        program.num_instructions(),
        output.display()
    );

    if let Some(record_path) = record {
        generate_record(&record_path, &graph, &program, None)?;
        println!("Generated graph record at {}", record_path.display());
    }
    Ok(())
}

fn sample_inputs(shapes: &BTreeMap<String, Vec<usize>>) -> Result<BTreeMap<String, Tensor>> {
    let mut rng = rand::rng();
    let mut inputs = BTreeMap::new();
    for (name, shape) in shapes {
        let numel: usize = shape.iter().product();
        let data = (0..numel)
            .map(|_| rng.random_range(-1.0f32..1.0f32))
            .collect();
        inputs.insert(name.clone(), Tensor::new(shape.clone(), data)?);
    }
    Ok(inputs)
}

fn cmd_run(model_path: PathBuf, trace: Option<PathBuf>, iterations: u32) -> Result<()> {
    if iterations == 0 {
        bail!("--iterations must be at least 1");
    }
    let executor = Executor::load(&model_path)?;
    let inputs = sample_inputs(&executor.program().input_shapes)
        .context("Failed to build sample inputs")?;

    let mut outputs = BTreeMap::new();
    match trace {
        Some(trace_path) => {
            let mut tracer = EventTracer::new(&executor.program().name);
            for _ in 0..iterations {
                outputs = executor.run_traced(&inputs, &mut tracer)?;
            }
            let run_trace = tracer.finish();
            println!(
                "Traced {} events across {} runs",
                run_trace.num_events(),
                run_trace.runs.len()
            );
            run_trace.write_to_file(&trace_path)?;
            println!("Wrote runtime trace to {}", trace_path.display());
        }
        None => {
            for _ in 0..iterations {
                outputs = executor.run(&inputs)?;
            }
        }
    }

    for (name, tensor) in &outputs {
        println!("output '{}': shape {:?}", name, tensor.shape());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Export {
            model,
            graph,
            output,
            record,
        } => cmd_export(model, graph, output, record),
        Commands::Run {
            model_path,
            trace,
            iterations,
        } => cmd_run(model_path, trace, iterations),
    }
}
