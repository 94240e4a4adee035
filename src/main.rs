//! callgraph CLI entry point

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "callgraph")]
#[command(about = "Incremental method call graphs with automatic layout", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project root path (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and lay out a call graph, printing it as JSON
    Build(BuildArgs),
    /// Print the callers or callees of a method without laying anything out
    Closure {
        /// Qualified name, e.g. `Engine::run`
        method: String,

        #[arg(short, long, value_enum, default_value_t = Towards::Both)]
        direction: Towards,
    },
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "7890")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
    /// Clear the dependency cache
    Clear,
    /// Show version
    Version,
}

#[derive(Args)]
pub struct BuildArgs {
    /// Area to display
    #[arg(long, value_enum, default_value_t = AreaArg::Whole)]
    pub scope: AreaArg,

    /// Crate name for `--scope module`
    #[arg(long, required_if_eq("scope", "module"))]
    pub module: Option<String>,

    /// Directory (relative to the root) for `--scope directory`
    #[arg(long, required_if_eq("scope", "directory"))]
    pub dir: Option<PathBuf>,

    /// Include files matching the test patterns
    #[arg(long)]
    pub include_tests: bool,

    /// Only keep calls whose both ends are inside the area
    #[arg(long)]
    pub limited: bool,

    /// Callers of the `--method` seeds
    #[arg(long, group = "closure", requires = "method")]
    pub upstream: bool,

    /// Callees of the `--method` seeds
    #[arg(long, group = "closure", requires = "method")]
    pub downstream: bool,

    /// Callers and callees of the `--method` seeds
    #[arg(long, group = "closure", requires = "method")]
    pub both: bool,

    /// Seed method by qualified name; repeatable
    #[arg(short, long)]
    pub method: Vec<String>,

    /// Scale positions into the unit viewport
    #[arg(long)]
    pub fit: bool,

    /// Write JSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum AreaArg {
    Whole,
    Module,
    Directory,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Towards {
    Upstream,
    Downstream,
    Both,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "callgraph={level},callgraph_core={level},callgraph_indexer={level},callgraph_server={level}",
            level = log_level
        )))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("callgraph v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Project root: {}", cli.root.display());

    match cli.command {
        Commands::Build(args) => commands::build(cli.root, args).await,
        Commands::Closure { method, direction } => commands::closure(cli.root, method, direction).await,
        Commands::Serve { port, host } => commands::serve(cli.root, host, port).await,
        Commands::Clear => commands::clear(cli.root),
        Commands::Version => {
            println!("callgraph v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
