use anyhow::Context;
use scholar::{
    api::routes,
    cli::{output::Output, Cli, Commands},
    sources::{arxiv, crossref},
    types::AppError,
    utils::toml_config::{ScholarConfig, DEFAULT_CONFIG_FILE},
    AppState, ResearchCoordinator, ResearchOptions,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    let (config, from_file) = load_config(&cli)?;
    init_tracing(&cli, &config.server.log_level);
    if !from_file {
        tracing::warn!(file = DEFAULT_CONFIG_FILE, "Configuration file not found, using defaults");
    }

    match cli.command {
        Commands::Research {
            query,
            top_k,
            fanout,
            provider,
            deadline,
            out,
            json,
        } => {
            let options = ResearchOptions {
                top_k,
                fanout,
                deadline: deadline.map(Duration::from_secs),
            };
            run_research(&config, &output, &query, provider.as_deref(), options, out, json).await
        }
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::Config { validate } => show_config(&config, &output, validate),
        Commands::Sources => {
            list_sources(&config, &output);
            Ok(())
        }
    }
}

/// An explicit `--config` must exist; the default file is optional.
fn load_config(cli: &Cli) -> anyhow::Result<(ScholarConfig, bool)> {
    match &cli.config {
        Some(path) => {
            let config = ScholarConfig::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            Ok((config, true))
        }
        None => Ok(ScholarConfig::load_or_default(DEFAULT_CONFIG_FILE)?),
    }
}

/// `--verbose` wins, then `RUST_LOG`, then the configured level. Logs go to
/// stderr so reports on stdout stay clean.
fn init_tracing(cli: &Cli, configured_level: &str) {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured_level))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if cli.log_json {
        builder.json().init();
    } else {
        builder.with_ansi(!cli.no_color).init();
    }
}

async fn run_research(
    config: &ScholarConfig,
    output: &Output,
    query: &str,
    provider: Option<&str>,
    options: ResearchOptions,
    out: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let coordinator = ResearchCoordinator::from_config(config, provider).await?;

    // Ctrl-C stops retrieval; synthesis continues with what already arrived.
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing with records retrieved so far");
            on_interrupt.cancel();
        }
    });

    let report = match coordinator.research_with(query, options, cancel).await {
        Ok(report) => report,
        Err(e) => {
            report_failure(output, &e);
            return Err(e.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output.report(&report);
    }

    if let Some(path) = out {
        std::fs::write(&path, report.to_markdown())
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        output.success(&format!("Report written to {}", path.display()));
    }
    Ok(())
}

fn report_failure(output: &Output, error: &AppError) {
    output.error(&error.to_string());
    for err in error.source_errors() {
        output.list_item(&err.to_string());
    }
    if let AppError::SynthesisBackend { bibliography, .. } = error {
        if !bibliography.is_empty() {
            output.subheader("Retrieved entries");
            for ranked in bibliography {
                output.reference(ranked, false);
            }
        }
    }
}

async fn serve(config: ScholarConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let coordinator = ResearchCoordinator::from_config(&config, None).await?;
    tracing::info!(
        sources = ?coordinator.sources().ids(),
        model = coordinator.model_name(),
        "Research pipeline ready"
    );

    let state = AppState {
        config: Arc::new(config),
        coordinator: Arc::new(coordinator),
    };
    let app = routes::app(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Shutdown signal received");
    }
}

fn show_config(config: &ScholarConfig, output: &Output, validate: bool) -> anyhow::Result<()> {
    if validate {
        match config.validate_with_warnings() {
            Ok(warnings) => {
                output.success("Configuration is valid");
                for warning in warnings {
                    output.warning(&warning.message);
                }
            }
            Err(e) => {
                output.error(&e.to_string());
                return Err(e.into());
            }
        }
    }

    output.header("Effective configuration");
    println!("{}", config.to_toml()?);

    if config.preferred_provider().is_none() {
        output.hint("No provider is pinned; the first available of OpenAI, Together and Ollama is used.");
        output.command("scholar research \"...\" --provider ollama");
    }
    Ok(())
}

fn list_sources(config: &ScholarConfig, output: &Output) {
    let sources = config.effective_sources();
    output.header("Enabled sources");
    output.table_header(&["Source", "Min interval", "Endpoint"]);
    for id in &sources.enabled {
        let (endpoint, interval) = match id.as_str() {
            arxiv::SOURCE_ID => (sources.arxiv.base_url.as_str(), sources.arxiv.min_interval_ms),
            crossref::SOURCE_ID => (
                sources.crossref.base_url.as_str(),
                sources.crossref.min_interval_ms,
            ),
            _ => ("unknown", 0),
        };
        let interval = format!("{} ms", interval);
        output.table_row(&[id.as_str(), interval.as_str(), endpoint]);
    }
    if sources.enabled.iter().any(|s| s == crossref::SOURCE_ID) && sources.crossref.mailto.is_none() {
        output.hint("Set CROSSREF_MAILTO to use Crossref's polite pool.");
    }
}
