use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shelf::app::AppContext;
use shelf::cli::{commands, Cli, Commands};
use shelf::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(workers) = cli.workers {
        config.queue.concurrency = workers;
    }
    if let Some(db) = cli.db {
        config.storage.db_path = Some(db);
    }

    let ctx = AppContext::new(&config)?;

    match cli.command {
        Commands::Add { collection, items } => {
            commands::add(&ctx, &collection, items.as_deref()).await?;
        }
        Commands::Resume => {
            commands::resume(&ctx).await?;
        }
        Commands::Queue => {
            commands::show_queue(&ctx)?;
        }
        Commands::List => {
            commands::list(&ctx)?;
        }
        Commands::Show { collection } => {
            commands::show(&ctx, &collection)?;
        }
        Commands::Read { collection, number } => {
            commands::read(&ctx, &collection, number)?;
        }
        Commands::Remove {
            collection,
            numbers,
        } => {
            commands::remove(&ctx, &collection, &numbers)?;
        }
        Commands::Info { collection } => {
            commands::info(&ctx, &collection).await?;
        }
    }

    Ok(())
}
