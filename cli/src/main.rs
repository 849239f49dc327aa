use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use common::utils::config::get_config;
use ticket_ingestion::IngestionPipeline;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ticket-ingestion", version, about = "Ingest support tickets into the vector knowledge base")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one ingestion pass over tickets created within a date range.
    Ingest {
        /// Start of the date range, inclusive (YYYY-MM-DD).
        #[arg(long)]
        start: NaiveDate,
        /// End of the date range, inclusive (YYYY-MM-DD).
        #[arg(long)]
        end: NaiveDate,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = get_config()?;

    match cli.command {
        Command::Ingest { start, end } => {
            let pipeline = IngestionPipeline::new(&config).await?;
            pipeline.ensure_ready().await?;

            match pipeline.run(start, end).await {
                Ok(result) => {
                    info!(
                        tickets_processed = result.tickets_processed,
                        total_chunks = result.total_chunks,
                        processing_time_secs = result.processing_time_secs,
                        audit_record_id = ?result.audit_record_id,
                        "ingestion run complete"
                    );
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
                Err(err) => {
                    error!(error = %err, "ingestion run failed");
                    return Err(err.into());
                }
            }
        }
    }

    Ok(())
}
