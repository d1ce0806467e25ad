use clap::Parser;

/// Watches container engine volume events and keeps opted-in volumes
/// synchronized with a host directory while they are mounted.
#[derive(Parser)]
#[command(name = "vsync", version, about)]
struct Cli {}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let _cli = Cli::parse();
    vsync::run().await
}
