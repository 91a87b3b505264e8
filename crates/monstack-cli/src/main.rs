//! monstack CLI - deploys the Prometheus monitoring stack onto a cluster

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;
mod util;

use commands::GlobalArgs;

#[derive(Parser)]
#[command(name = "monstack")]
#[command(author = "monstack Contributors")]
#[command(version)]
#[command(
    about = "Deploy the Prometheus monitoring stack onto a Kubernetes cluster",
    long_about = None
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the resources a run would create, without touching the cluster
    Preview {
        /// Show chart values of every release
        #[arg(long)]
        show_values: bool,
    },

    /// Deploy the stack and record its outputs
    Up {
        /// Show secret outputs in clear text
        #[arg(long)]
        show_secrets: bool,
    },

    /// Show the recorded outputs of this stack
    Outputs {
        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Show secret outputs in clear text
        #[arg(long)]
        show_secrets: bool,
    },

    /// Show the resolved chart settings
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("monstack=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("monstack=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // --help and --version
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(exit_codes::USAGE_ERROR);
        }
    };

    init_tracing(cli.global.debug);

    let result = match cli.command {
        Commands::Preview { show_values } => commands::preview::run(&cli.global, show_values),
        Commands::Up { show_secrets } => commands::up::run(&cli.global, show_secrets).await,
        Commands::Outputs { json, show_secrets } => {
            commands::outputs::run(&cli.global, json, show_secrets).await
        }
        Commands::Config { json } => commands::config::run(&cli.global, json),
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
