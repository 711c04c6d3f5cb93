use anyhow::Context;
use clap::{Parser, Subcommand};
use oxidized_research::clarify::ConsoleClarifier;
use oxidized_research::config::Config;
use oxidized_research::pipeline::ResearchPipeline;
use oxidized_research::routes::{create_router, AppState};
use oxidized_research::utils::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "oxidized-research", version, about = "Turn a research query into a cited report")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one research query and print the report
    Run {
        query: String,
        /// Answer to a clarifying question; repeat for several
        #[arg(long = "answer")]
        answers: Vec<String>,
        /// Print the report without saving it
        #[arg(long)]
        no_save: bool,
        /// Ask clarifying questions on the terminal
        #[arg(long)]
        interactive: bool,
    },
    /// Start the HTTP API
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let _guard = init_tracing(config.log_dir.as_deref());
    info!(provider = %config.llm.provider, "Configuration loaded");

    let pipeline = ResearchPipeline::from_config(&config).context("Failed to build research pipeline")?;

    match cli.command {
        Command::Run {
            query,
            answers,
            no_save,
            interactive,
        } => {
            let mut pipeline = pipeline;
            if no_save {
                pipeline = pipeline.without_store();
            }
            if interactive {
                pipeline = pipeline.with_clarifier(Arc::new(ConsoleClarifier));
            }

            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling run");
                    on_ctrl_c.cancel();
                }
            });

            let answers = (!answers.is_empty()).then_some(answers);
            let output = pipeline.run_with_cancel(&query, answers, cancel).await?;

            println!("{}", output.report.to_markdown());
            if let Some(location) = output.location {
                info!(%location, "Report saved");
            }
        }
        Command::Serve => {
            let state = AppState {
                pipeline: Arc::new(pipeline),
            };
            let app = create_router(state, &config.server.cors_allowed_origins);

            let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
                .parse()
                .context("Invalid HOST/PORT")?;
            info!("Server listening on {}", addr);

            let listener = TcpListener::bind(addr).await?;
            axum::serve(listener, app)
                .await
                .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;
        }
    }

    Ok(())
}
