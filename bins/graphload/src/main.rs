use clap::{Parser, Subcommand};

mod load;
mod table;
mod throttle;

#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

#[derive(Parser)]
#[clap(author, version, about = "Adaptive bulk loader for throttled graph stores")]
#[clap(long_version = graphload_core::build_info::long_version())]
#[clap(propagate_version = true)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load graph elements from a JSON-lines file
    Load(load::Command),
    /// Print the execution plan shape for a range of concurrency levels
    Throttle(throttle::Command),
}

fn main() {
    let cli = Cli::parse();

    let verbose = matches!(&cli.command, Commands::Load(args) if args.verbose);
    let directive = if verbose {
        "graphload=debug,graphload_bulk=debug,info"
    } else {
        "info"
    };
    if let Err(e) = graphload_core::telemetry::init_dev_subscriber_with_env_filter(directive) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        git = graphload_core::build_info::GIT_HASH,
        "starting"
    );

    let code = match cli.command {
        Commands::Load(args) => load::run(&args),
        Commands::Throttle(args) => throttle::run(&args),
    };
    std::process::exit(code);
}
