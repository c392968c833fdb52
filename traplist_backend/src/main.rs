use anyhow::Result;
use clap::{Parser, Subcommand};
use traplist_backend::config::TraplistConfig;
use traplist_backend::node::TraplistNode;
use traplist_backend::telemetry;

#[derive(Parser)]
#[command(author, version, about = "Traplist comment and rating backend")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (Axum) for REST/API access
    Serve,
    /// Create the data directories and apply the schema, then exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let args = Args::parse();
    let config = TraplistConfig::from_env()?;
    let node = TraplistNode::start(config)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => node.run_http_server().await,
        Command::Migrate => {
            tracing::info!(
                db_path = %node.config().paths.db_path.display(),
                "schema is up to date"
            );
            Ok(())
        }
    }
}
