//! dagscribe CLI - compile graph manifests into DAGMan files

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;

use dagscribe::{
    find_rescue_file, rescue, write_dag, DagError, DagWriter, FixSuggestion, GraphManifest,
    DEFAULT_DAG_FILE_NAME,
};

#[derive(Parser)]
#[command(name = "dagscribe")]
#[command(about = "Build, validate and write HTCondor DAGMan workflow graphs")]
#[command(version)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the DAG file and its submit files
    Write {
        /// Path to the graph manifest (.yaml)
        manifest: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// DAG file name
        #[arg(short, long, default_value = DEFAULT_DAG_FILE_NAME)]
        file: String,

        /// Apply the newest rescue file found in the output directory first
        #[arg(long)]
        rescue: bool,
    },

    /// Print a table of the graph's nodes and edges
    Describe {
        /// Path to the graph manifest (.yaml)
        manifest: PathBuf,
    },

    /// Build the graph and expand every edge without writing anything
    Validate {
        /// Path to the graph manifest (.yaml)
        manifest: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Write {
            manifest,
            out,
            file,
            rescue,
        } => write_command(&manifest, &out, &file, rescue),
        Commands::Describe { manifest } => describe_command(&manifest),
        Commands::Validate { manifest } => validate_command(&manifest),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.downcast_ref::<DagError>().and_then(|e| e.fix_suggestion()) {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn load(manifest: &Path) -> anyhow::Result<GraphManifest> {
    GraphManifest::from_path(manifest)
        .with_context(|| format!("failed to load manifest {}", manifest.display()))
}

fn write_command(manifest: &Path, out: &Path, file: &str, use_rescue: bool) -> anyhow::Result<()> {
    let manifest = load(manifest)?;
    let formatter = manifest.formatter()?;
    let mut graph = manifest.build_graph()?;

    if use_rescue {
        let rescue_file = find_rescue_file(out, file)?;
        println!("{} Applying {}", "→".cyan(), rescue_file.display());
        rescue(&mut graph, &rescue_file, &formatter)?;
    }

    let path = write_dag(&graph, out, file, &formatter)?;
    println!("{} Wrote {}", "✓".green(), path.display());
    Ok(())
}

fn describe_command(manifest: &Path) -> anyhow::Result<()> {
    let graph = load(manifest)?.build_graph()?;
    print!("{}", graph.describe());
    Ok(())
}

fn validate_command(manifest: &Path) -> anyhow::Result<()> {
    let manifest = load(manifest)?;
    let formatter = manifest.formatter()?;
    let graph = manifest.build_graph()?;
    DagWriter::new(&graph, &formatter).render()?;

    println!("{} Graph is valid", "✓".green());
    println!("  Nodes: {}", graph.len());
    println!("  Edges: {}", graph.edges().count());
    println!(
        "  Final: {}",
        graph.final_node().map(|f| f.name()).unwrap_or("(none)")
    );
    Ok(())
}
