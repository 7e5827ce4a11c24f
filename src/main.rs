use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

use qa_review::repository::Repositories;
use qa_review::{init_database, init_telemetry, shutdown_database, Collaborators, ReviewService};

mod cli;

use cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = qa_review::config()?;
    init_telemetry(&config.observability)?;

    tokio::runtime::Runtime::new()?.block_on(async {
        let store = Arc::new(init_database(config).await?);
        let service = ReviewService::new(
            Repositories::from_store(store.clone()),
            Collaborators::production(config),
            config,
        );

        let code = cli.command.execute(&service).await;
        shutdown_database(&store).await;
        code
    })
}
