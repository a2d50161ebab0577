use std::io::Write as _;
use std::sync::Arc;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::Level;
use tracing_subscriber::{filter, fmt, layer::Layer, layer::SubscriberExt, util::SubscriberInitExt};

use backend_client::{BackendClient, BackendConfig, telemetry};
use ops_engine::{
    ChatMessage, CompletionRequest, DiscoveryRequest, HttpTransport, IndexRequest,
    OperationHandle, OperationRequest, Orchestrator, Outcome,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional .env for local development.
    dotenvy::dotenv().ok();

    // Client events go through the library-scoped layer; everything else
    // through a plain console layer, so nothing is printed twice.
    let console = fmt::layer().with_target(false).with_filter(filter::filter_fn(
        |meta| !meta.target().starts_with(telemetry::TARGET_PREFIX),
    ));
    tracing_subscriber::registry()
        .with(telemetry::env_filter_with_level("info", Level::INFO))
        .with(telemetry::layer())
        .with(console)
        .init();

    let cfg = BackendConfig::from_env().context("backend configuration")?;
    let client = BackendClient::new(&cfg)?;
    if let Err(err) = client.health().await {
        tracing::warn!(%err, "backend health probe failed; continuing anyway");
    }

    let transport = Arc::new(HttpTransport::new(client));
    let orchestrator = Orchestrator::with_poll_interval(transport, cfg.poll_interval());

    let project = std::env::var("PROJECT").unwrap_or_else(|_| "demo".to_string());
    let question = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "What does this project do?".to_string());

    // 1) Index the project, rendering polled progress.
    let index = orchestrator
        .start(OperationRequest::Index(IndexRequest::new(&project)))
        .await?;
    let outcome = track_polled(&orchestrator, &index, "indexing").await;
    ensure_success("indexing", outcome)?;

    // 2) Discover sources for the question, then select them all for the
    //    completion to ground on.
    let discovery = orchestrator
        .start(OperationRequest::Discovery(DiscoveryRequest::new(&question)))
        .await?;
    let outcome = track_polled(&orchestrator, &discovery, "discovering sources").await;
    ensure_success("discovery", outcome)?;

    if let Some(view) = orchestrator.view(&discovery).await {
        println!("sources ({}):", view.items.len());
        for item in &view.items {
            match &item.label {
                Some(label) => println!("  {label} ({})", item.key),
                None => println!("  {}", item.key),
            }
        }
        orchestrator.select_all(&discovery).await;
    }

    // 3) Stream the grounded answer.
    let mut request = CompletionRequest::new(vec![
        ChatMessage::system("Answer using the discovered sources."),
        ChatMessage::user(&question),
    ]);
    request.use_discovery = Some(true);
    let chat = orchestrator
        .start(OperationRequest::Completion(request))
        .await?;
    let outcome = stream_to_stdout(&orchestrator, &chat).await;
    ensure_success("completion", outcome)?;

    orchestrator.dispose().await;
    Ok(())
}

/// Renders a polled operation's progress until it finishes.
async fn track_polled(
    orchestrator: &Orchestrator,
    handle: &OperationHandle,
    label: &str,
) -> Option<Outcome> {
    let mut views = orchestrator.subscribe(handle).await?;
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}/{len:3} {msg}").unwrap(),
    );

    loop {
        let (outcome, position, length, message) = {
            let view = views.borrow_and_update();
            (
                view.outcome.clone(),
                view.display_progress(),
                view.total,
                view.message.clone(),
            )
        };
        bar.set_length(length);
        bar.set_position(position);
        bar.set_message(match message {
            Some(msg) => format!("{label}: {msg}"),
            None => label.to_string(),
        });
        if outcome.is_some() {
            bar.finish_with_message(label.to_string());
            return outcome;
        }
        if views.changed().await.is_err() {
            return views.borrow().outcome.clone();
        }
    }
}

/// Prints completion content deltas as they arrive.
async fn stream_to_stdout(
    orchestrator: &Orchestrator,
    handle: &OperationHandle,
) -> Option<Outcome> {
    let mut views = orchestrator.subscribe(handle).await?;
    let mut printed = 0usize;
    loop {
        let (chunk, outcome) = {
            let view = views.borrow_and_update();
            (
                view.completion.content[printed..].to_string(),
                view.outcome.clone(),
            )
        };
        if !chunk.is_empty() {
            print!("{chunk}");
            let _ = std::io::stdout().flush();
            printed += chunk.len();
        }
        if outcome.is_some() {
            println!();
            return outcome;
        }
        if views.changed().await.is_err() {
            return views.borrow().outcome.clone();
        }
    }
}

/// Maps a terminal outcome to the process result.
fn ensure_success(step: &str, outcome: Option<Outcome>) -> anyhow::Result<()> {
    match outcome {
        Some(Outcome::Completed) => Ok(()),
        Some(Outcome::Failed { error }) => anyhow::bail!("{step} failed: {error}"),
        Some(Outcome::Unauthorized) => {
            anyhow::bail!("{step}: authorization denied; re-authenticate and retry")
        }
        Some(Outcome::AbnormalEnd { detail }) => anyhow::bail!("{step} ended abnormally: {detail}"),
        Some(Outcome::Abandoned) => anyhow::bail!("{step} was abandoned"),
        None => anyhow::bail!("{step}: operation is no longer tracked"),
    }
}
