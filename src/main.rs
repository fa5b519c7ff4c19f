use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reelscribe::analysis::ContentWriter;
use reelscribe::cli::display::{
    print_batch_report, print_entries, print_history, print_stored_result, print_video_report, print_written,
};
use reelscribe::cli::{report_outcome, Cli, Commands, ProgressSink, StoredArgs};
use reelscribe::config::Config;
use reelscribe::fetcher::ListingEntry;
use reelscribe::output::export::write_export;
use reelscribe::output::{ArtifactStore, StoredResult};
use reelscribe::pipeline::{PipelineCoordinator, RunOutcome};
use reelscribe::utils;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let (config_path, mut config) = match &cli.config {
        Some(path) => {
            let config = Config::load_from(path)
                .await
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            (path.clone(), config)
        }
        None => (Config::config_path()?, Config::load().await?),
    };
    if let Some(dir) = &cli.download_dir {
        config.storage.download_dir = dir.clone();
    }

    match cli.command {
        Commands::Config { show, path } => {
            if path {
                println!("{}", config_path.display());
            }
            if show || !path {
                config.display();
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::History => {
            let entries = ArtifactStore::new(config.storage.download_dir.clone()).list_analyses()?;
            print_history(&entries);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Show { stored, transcript } => {
            let store = ArtifactStore::new(config.storage.download_dir.clone());
            let result = load_stored(&store, &stored)?;
            print_stored_result(&result, transcript);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Export { stored, out } => {
            let store = ArtifactStore::new(config.storage.download_dir.clone());
            let result = load_stored(&store, &stored)?;
            let exported = write_export(&out, &result)?;
            println!("{}", exported.prompt);
            eprintln!("Exported to {}", exported.path.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Draft { stored } => {
            let store = ArtifactStore::new(config.storage.download_dir.clone());
            let result = load_stored(&store, &stored)?;
            let writer = ContentWriter::from_config(&config.generation);
            let token = CancellationToken::new();
            spawn_ctrl_c_handler(token.clone());

            let outcome = match writer.blog_draft(result.writing_source(), &token).await {
                Ok(draft) => store
                    .save_blog_draft(&result.entry, &draft.text)
                    .map(|path| (draft, path)),
                Err(e) => Err(e),
            };
            Ok(report_outcome(RunOutcome::from(outcome), |(draft, path)| {
                print_written(draft, path)
            }))
        }
        Commands::Shorts { stored, brief } => {
            let store = ArtifactStore::new(config.storage.download_dir.clone());
            let result = load_stored(&store, &stored)?;
            let writer = ContentWriter::from_config(&config.generation);
            let token = CancellationToken::new();
            spawn_ctrl_c_handler(token.clone());

            let outcome = match writer
                .shorts(brief.kind, &brief.brief(), result.writing_source(), &token)
                .await
            {
                Ok(text) => store
                    .save_shorts(&result.entry, brief.kind, &text.text)
                    .map(|path| (text, path)),
                Err(e) => Err(e),
            };
            Ok(report_outcome(RunOutcome::from(outcome), |(text, path)| {
                print_written(text, path)
            }))
        }
        command => {
            warn_missing_dependencies(&config).await;

            let token = CancellationToken::new();
            spawn_ctrl_c_handler(token.clone());

            let sink = Arc::new(ProgressSink::new(cli.quiet));
            let coordinator = PipelineCoordinator::build(&config)
                .await?
                .with_token(token)
                .with_sink(sink.clone());

            let result = run_command(Arc::new(coordinator), command).await;
            sink.finish();
            result
        }
    }
}

async fn run_command(coordinator: Arc<PipelineCoordinator>, command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Video { url } => {
            tracing::info!("Starting pipeline for URL: {}", url);
            let outcome = coordinator.spawn_video(url).await?;
            Ok(report_outcome(outcome, print_video_report))
        }
        Commands::Local { file } => {
            let outcome = coordinator
                .spawn(|pipeline| async move { pipeline.run_local(&file).await })
                .await?;
            Ok(report_outcome(outcome, print_video_report))
        }
        Commands::Profile { url } => {
            let outcome = coordinator.spawn_profile(url).await?;
            Ok(report_outcome(outcome, print_batch_report))
        }
        Commands::Channel { url, filter } => {
            let outcome = coordinator.spawn_channel(url, filter.criteria()).await?;
            Ok(report_outcome(outcome, print_batch_report))
        }
        Commands::Filter { url, filter } => {
            let criteria = filter.criteria();
            let result = coordinator
                .spawn(|pipeline| async move { pipeline.filter_channel(&url, &criteria).await })
                .await?;
            Ok(report_outcome(RunOutcome::from(result), |entries: &Vec<ListingEntry>| {
                print_entries(entries)
            }))
        }
        Commands::History
        | Commands::Config { .. }
        | Commands::Show { .. }
        | Commands::Draft { .. }
        | Commands::Shorts { .. }
        | Commands::Export { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn load_stored(store: &ArtifactStore, target: &StoredArgs) -> Result<StoredResult> {
    store
        .find_result(&target.id, target.uploader.as_deref())?
        .with_context(|| format!("No saved analysis for '{}'", target.id))
}

fn init_tracing(cli: &Cli) {
    let default_filter = if cli.verbose {
        "reelscribe=debug"
    } else if cli.quiet {
        "reelscribe=warn"
    } else {
        "reelscribe=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// First Ctrl-C cancels the run; the pipeline then stops its tools and exits
fn spawn_ctrl_c_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Stopping...");
            token.cancel();
        }
    });
}

async fn warn_missing_dependencies(config: &Config) {
    // Non-fatal: the tools may live behind wrappers that reject --version
    let missing = utils::check_dependencies(config).await;
    if !missing.is_empty() {
        eprintln!("Dependency check warnings:");
        for dep in missing {
            eprintln!("   - {}", dep);
        }
    }
}
