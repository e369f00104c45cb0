use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use chassis_runtime::config::Args;

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    // Logs go to stderr; stdout carries the JSON line protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = chassis_runtime::runtime::run(args).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
