use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use comicgen_core::domain::{
    Artifact, Audience, BatchComicRequest, ComicRequest, GenerationTask, RemoteId, SlotId,
    TaskState, Tone, VideoRequest, VisualStyle,
};
use comicgen_core::impls::HttpGenerationApi;
use comicgen_core::ports::{GenerationApi, SystemClock, UlidGenerator};
use comicgen_core::typed::GenerationRequest;
use comicgen_core::{ClientConfig, TaskRegistry};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "comicgen")]
#[command(about = "Generate comics and videos with the comic service and follow them to completion")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Service base URL including `/api` (overrides COMICGEN_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Re-issue a failed task up to N times
    #[arg(long, global = true, default_value_t = 0)]
    retry: u32,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one comic
    Create {
        #[arg(short, long)]
        topic: String,

        #[arg(long, default_value_t = Tone::default())]
        tone: Tone,

        #[arg(long, default_value_t = Audience::default())]
        audience: Audience,

        #[arg(long, default_value_t = VisualStyle::default())]
        style: VisualStyle,
    },

    /// Generate several comics in one background batch
    Batch {
        /// Repeat for each comic
        #[arg(short, long = "topic", required_unless_present = "resume")]
        topics: Vec<String>,

        /// Follow a batch that was already started, by its task id
        #[arg(long, conflicts_with = "topics")]
        resume: Option<String>,

        #[arg(long, default_value_t = Tone::default())]
        tone: Tone,

        #[arg(long, default_value_t = VisualStyle::default())]
        style: VisualStyle,
    },

    /// Turn an existing comic into a video
    Video { comic_id: String },

    /// List generated comics
    List,

    /// Show one comic's metadata
    Show {
        comic_id: String,

        /// Print the script instead of the metadata
        #[arg(long)]
        script: bool,
    },

    /// Check that the service is up
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = ClientConfig::from_env()?;
    if let Some(url) = cli.api_url {
        config.api_url = url.trim_end_matches('/').to_string();
    }
    info!(api_url = %config.api_url, "Using comic service");

    let http = Arc::new(HttpGenerationApi::from_config(&config)?);
    let api: Arc<dyn GenerationApi> = http.clone();

    let registry = TaskRegistry::new(
        Arc::clone(&api),
        Arc::new(SystemClock),
        Arc::new(UlidGenerator::new(SystemClock)),
        config.poll_config(),
    );

    let result = match cli.command {
        Commands::Create {
            topic,
            tone,
            audience,
            style,
        } => {
            let request = ComicRequest {
                topic,
                tone,
                target_audience: audience,
                visual_style: style,
            };
            let task = track(&registry, SlotId::create(), request, cli.retry).await;
            task.and_then(|t| report(&http, &t))
        }
        Commands::Batch {
            resume: Some(task_id),
            ..
        } => {
            let slot = SlotId::batch();
            let task = match registry.resume(slot.clone(), RemoteId::new(task_id)).await {
                // nothing to re-send, so --retry does not apply
                Ok(rx) => follow_until_done(&registry, &slot, rx, 0).await,
                Err(e) => Err(e.into()),
            };
            task.and_then(|t| report(&http, &t))
        }
        Commands::Batch {
            topics,
            tone,
            style,
            resume: None,
        } => {
            let request = BatchComicRequest {
                topics,
                tone,
                visual_style: style,
            };
            let task = track(&registry, SlotId::batch(), request, cli.retry).await;
            task.and_then(|t| report(&http, &t))
        }
        Commands::Video { comic_id } => {
            let slot = SlotId::video(&comic_id);
            let task = track(&registry, slot, VideoRequest::new(comic_id), cli.retry).await;
            task.and_then(|t| report(&http, &t))
        }
        Commands::List => list(api.as_ref()).await,
        Commands::Show { comic_id, script } => show(api.as_ref(), &comic_id, script).await,
        Commands::Health => {
            let status = http.health().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
    };

    registry.shutdown().await;
    result
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "comicgen=debug,comicgen_core=debug"
    } else {
        "comicgen=info,comicgen_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Start a task in `slot` and follow it, retrying failures up to `retries`
/// times.
async fn track<R: GenerationRequest>(
    registry: &TaskRegistry,
    slot: SlotId,
    request: R,
    retries: u32,
) -> Result<GenerationTask> {
    let rx = registry.start(slot.clone(), request).await?;
    follow_until_done(registry, &slot, rx, retries).await
}

async fn follow_until_done(
    registry: &TaskRegistry,
    slot: &SlotId,
    mut rx: watch::Receiver<GenerationTask>,
    retries: u32,
) -> Result<GenerationTask> {
    let mut left = retries;

    loop {
        let task = follow(registry, slot, &mut rx).await?;
        if task.state() == TaskState::Failed && left > 0 {
            left -= 1;
            warn!(slot = %slot, retries_left = left, "Task failed, retrying");
            rx = registry.retry(slot).await?;
            continue;
        }
        return Ok(task);
    }
}

/// Print every state change until the task is terminal. Ctrl-C cancels it.
async fn follow(
    registry: &TaskRegistry,
    slot: &SlotId,
    rx: &mut watch::Receiver<GenerationTask>,
) -> Result<GenerationTask> {
    loop {
        let task = rx.borrow_and_update().clone();
        render(&task);
        if task.is_terminal() {
            return Ok(task);
        }

        tokio::select! {
            changed = rx.changed() => changed.context("task was dropped before it finished")?,
            _ = tokio::signal::ctrl_c() => {
                registry.cancel(slot).await?;
            }
        }
    }
}

fn render(task: &GenerationTask) {
    let mut line = format!("[{}] {}", task.local_id(), task.state());
    if let Some(id) = task.id() {
        line.push_str(&format!(" ({id})"));
    }
    if let Some(p) = task.progress() {
        line.push_str(&format!(" {}/{} ({}%)", p.completed, p.total, p.percent()));
    }
    if let Some(e) = task.last_poll_error() {
        line.push_str(&format!(" - retrying: {e}"));
    }
    eprintln!("{line}");
}

fn report(http: &HttpGenerationApi, task: &GenerationTask) -> Result<()> {
    match task.state() {
        TaskState::Completed => {
            for artifact in task.result().map(|r| r.artifacts.as_slice()).unwrap_or_default() {
                match artifact {
                    Artifact::Comic(c) => println!(
                        "{}\t{}\t{} panels\t{}",
                        c.comic_id,
                        c.title,
                        c.panel_count,
                        http.image_url(&c.comic_id)
                    ),
                    Artifact::Video {
                        comic_id,
                        video_url,
                    } => println!("{comic_id}\t{video_url}"),
                }
            }
            Ok(())
        }
        TaskState::Failed => {
            let message = task
                .error()
                .map(|e| e.message.as_str())
                .unwrap_or("generation failed");
            bail!("{message}")
        }
        TaskState::Cancelled => {
            println!("cancelled");
            Ok(())
        }
        other => bail!("task stopped in state {other}"),
    }
}

async fn list(api: &dyn GenerationApi) -> Result<()> {
    let comics = api.list_comics().await?;
    if comics.is_empty() {
        println!("no comics yet");
    }
    for c in comics {
        println!("{}\t{}\t{}\t{}", c.comic_id, c.generated_at, c.panel_count, c.title);
    }
    Ok(())
}

async fn show(api: &dyn GenerationApi, comic_id: &str, script: bool) -> Result<()> {
    let value = if script {
        api.get_script(comic_id).await?
    } else {
        serde_json::to_value(api.get_comic(comic_id).await?)?
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
