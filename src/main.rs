//! `polydebate`: run multi-model debates over prediction-market questions
//! from the terminal.
//!
//! ```bash
//! polydebate participants
//! polydebate market will-it-rain-tomorrow
//! polydebate run --market will-it-rain-tomorrow -p gpt-4o -p claude-sonnet --rounds 3
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use debate_client::HttpDebateApi;
use debate_core::api::DebateApi;
use debate_core::ids::ParticipantId;
use debate_core::lifecycle::LifecycleStatus;
use debate_core::outcome::DebateOutcome;
use debate_engine::{DebateController, ResultsState, StreamConfig, Update};
use debate_settings::{load_settings, load_settings_from_path, DebateSettings};
use debate_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (defaults to ~/.polydebate/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL (overrides settings)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List participants eligible to debate
    Participants,
    /// Show a market's question and outcome prices
    Market { id: String },
    /// Run a debate and stream the transcript
    Run {
        /// Market to debate (defaults to the configured market)
        #[arg(long)]
        market: Option<String>,
        /// Participant id; repeat for up to four participants
        #[arg(short, long = "participant", required = true)]
        participants: Vec<String>,
        /// Number of rounds, 1 to 5 (defaults to the configured value)
        #[arg(short, long)]
        rounds: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .context("failed to load settings")?;
    if let Some(url) = &args.api_url {
        settings.api.base_url = url.clone();
        settings.validate().context("invalid --api-url")?;
    }

    let telemetry = TelemetryConfig::from_level_str(&settings.logging.level, settings.logging.json);
    init_telemetry(&telemetry).context("failed to initialise logging")?;
    tracing::debug!(base_url = %settings.api.base_url, "settings loaded");

    let api = Arc::new(HttpDebateApi::new(&settings.api).context("failed to build HTTP client")?);

    match args.command {
        Command::Participants => list_participants(api).await,
        Command::Market { id } => show_market(api.as_ref(), &id).await,
        Command::Run {
            market,
            participants,
            rounds,
        } => run_debate(api, &settings, market, participants, rounds).await,
    }
}

async fn list_participants(api: Arc<HttpDebateApi>) -> Result<()> {
    let mut controller = DebateController::new(api, StreamConfig::default());
    controller
        .load_participants()
        .await
        .context("failed to load participants")?;

    for p in controller.catalog() {
        let badge = if p.free_tier { " [free]" } else { "" };
        println!("{:<40} {} ({}){}", p.id, p.name, p.provider, badge);
    }
    Ok(())
}

async fn show_market(api: &dyn DebateApi, market_id: &str) -> Result<()> {
    let market = api
        .get_market(market_id)
        .await
        .with_context(|| format!("failed to load market {market_id}"))?;

    println!("{}", market.question);
    if let Some(category) = &market.category {
        println!("category: {category}");
    }
    if !market.volume.is_empty() {
        println!("volume:   ${}", market.volume);
    }
    for outcome in &market.outcomes {
        println!("  {:<24} {:>5.1}%", outcome.name, outcome.price * 100.0);
    }
    Ok(())
}

async fn run_debate(
    api: Arc<HttpDebateApi>,
    settings: &DebateSettings,
    market: Option<String>,
    participants: Vec<String>,
    rounds: Option<u32>,
) -> Result<()> {
    let Some(market_id) = market.or_else(|| settings.debate.default_market.clone()) else {
        bail!("no market given; pass --market or set debate.defaultMarket");
    };
    let rounds = rounds.unwrap_or(settings.debate.default_rounds);
    let participant_ids: Vec<ParticipantId> =
        participants.iter().map(|p| ParticipantId::from(p.as_str())).collect();

    let mut controller = DebateController::new(api, StreamConfig::from_settings(&settings.stream));
    let session_id = controller
        .start(&market_id, &participant_ids, rounds)
        .await
        .context("debate did not start")?;
    println!("session {session_id}: {rounds} round(s) on {market_id}");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let status = controller.drive(&cancel, |_, update| print_update(update)).await;

    match status {
        LifecycleStatus::Completed => {
            match controller.results() {
                ResultsState::Ready(outcome) => print_outcome(outcome),
                ResultsState::Failed(reason) => eprintln!("results unavailable: {reason}"),
                _ => {}
            }
            Ok(())
        }
        LifecycleStatus::Error => match controller.error() {
            Some(err) => bail!("debate failed: {err}"),
            None => bail!("debate failed"),
        },
        LifecycleStatus::Setup => {
            eprintln!("debate cancelled");
            Ok(())
        }
        other => bail!("debate stopped while {other}"),
    }
}

fn print_update(update: &Update) {
    match update {
        Update::Started { models } => println!("debate started: {}", models.join(", ")),
        Update::Thinking { participant } => println!("  … {participant} is thinking"),
        Update::Turn(turn) => {
            println!();
            println!("[round {}] {} ({})", turn.round, turn.model_name, turn.message_type);
            println!("{}", turn.text);
            if !turn.predictions.is_empty() {
                let line: Vec<String> = turn
                    .predictions
                    .iter()
                    .map(|(outcome, pct)| format!("{outcome} {pct:.1}%"))
                    .collect();
                println!("  predicts: {}", line.join(" | "));
            }
        }
        Update::RoundAdvanced { round } => println!("\n── round {round} ──"),
        Update::Completed { round } => println!("\ndebate complete after {round} round(s)"),
        Update::Notice(failure) => eprintln!("warning: {}", failure.message),
        Update::Failed(err) => eprintln!("error: {err}"),
        Update::ResultsReady | Update::ResultsFailed(_) | Update::Ignored => {}
    }
}

fn print_outcome(outcome: &DebateOutcome) {
    println!("\n═══ verdict ═══");
    for prediction in &outcome.final_predictions {
        let line: Vec<String> = prediction
            .predictions
            .iter()
            .map(|(outcome, pct)| format!("{outcome} {pct:.1}%"))
            .collect();
        let change = prediction.change.as_deref().unwrap_or("");
        println!("{:<24} {} {}", prediction.model_name, line.join(" | "), change);
    }
    if !outcome.summary.overall.is_empty() {
        println!("\n{}", outcome.summary.overall);
    }
    if !outcome.summary.consensus.is_empty() {
        println!("consensus: {}", outcome.summary.consensus);
    }
    for rationale in &outcome.summary.rationales {
        println!("\n{}: {}", rationale.model_name, rationale.rationale);
        for argument in &rationale.key_arguments {
            println!("  - {argument}");
        }
    }
}
