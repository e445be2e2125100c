//! `run` command handler.
//!
//! Plays one demonstration match on the tokio scheduler and prints its
//! summary.

use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::args::{OutputFormat, RunArgs};
use crate::config::loader::{ConfigLimits, ConfigLoader};
use crate::config::validation::Validator;
use crate::config::RuntimeConfig;
use crate::demo::{self, MatchSettings, MatchSummary};
use crate::error::{ConfigError, TickstageError};
use crate::game::Game;
use crate::observability::{self, EventEmitter};
use crate::participant::ParticipantId;
use crate::scheduler::TokioScheduler;

/// Run the demonstration match until it ends or `cancel` fires.
///
/// # Errors
///
/// Returns a configuration error for an invalid config or overrides, an
/// I/O error if the events file cannot be opened, or the first game
/// failure escalated while the match ran.
pub async fn run(args: &RunArgs, cancel: CancellationToken) -> Result<(), TickstageError> {
    let config = effective_config(args)?;

    if let Some(port) = config.observability.metrics_port {
        observability::init_metrics(Some(port))?;
        info!(port, "Prometheus metrics endpoint started");
    }

    let emitter = match &config.observability.events_file {
        Some(path) => EventEmitter::from_file(path)?,
        None => EventEmitter::noop(),
    };

    let settings = MatchSettings::from_config(&config.demo);
    let period = Duration::from_millis(config.tick.period_ms);
    let game = demo::build_match(
        &settings,
        Game::builder()
            .scheduler(Rc::new(TokioScheduler::new()))
            .tick_period(period)
            .emitter(Arc::new(emitter)),
    );
    for _ in 0..config.demo.participants {
        game.add_participant(ParticipantId::new());
    }

    info!(
        game = %game.id(),
        participants = config.demo.participants,
        period_ms = config.tick.period_ms,
        seed = settings.seed,
        "starting match"
    );
    game.start()?;

    let mut poll = tokio::time::interval(period);
    let mut interrupted = false;
    while game.is_running() {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!(game = %game.id(), "interrupted; stopping the match");
                interrupted = true;
                game.stop()?;
            }
            _ = poll.tick() => {}
        }
    }

    let mut escalated = game.take_escalated().into_iter();
    if let Some(first) = escalated.next() {
        for extra in escalated {
            warn!(error = %extra, "additional game failure");
        }
        return Err(first.into());
    }

    if let Some(summary) = demo::summarize(&game) {
        print_summary(&summary, interrupted, args.format)?;
    }
    Ok(())
}

/// Loads `--config` (or defaults) and applies flag overrides, then
/// validates the result.
fn effective_config(args: &RunArgs) -> Result<RuntimeConfig, TickstageError> {
    let mut config = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "loading configuration");
            let result = ConfigLoader::with_defaults().load(path)?;
            for warning in &result.warnings {
                warn!(
                    location = warning.location.as_deref().unwrap_or("<unknown>"),
                    "{}",
                    warning.message
                );
            }
            RuntimeConfig::clone(&result.config)
        }
        None => RuntimeConfig::default(),
    };

    if let Some(participants) = args.participants {
        config.demo.participants = participants;
    }
    if let Some(period) = args.tick_ms {
        config.tick.period_ms = period;
    }
    if let Some(seed) = args.seed {
        config.demo.seed = Some(seed);
    }
    if let Some(port) = args.metrics_port {
        config.observability.metrics_port = Some(port);
    }
    if let Some(path) = &args.events_file {
        config.observability.events_file = Some(path.clone());
    }

    let result = Validator::new().validate(&config, &ConfigLimits::default());
    if result.has_errors() {
        let origin = args
            .config
            .as_deref()
            .unwrap_or_else(|| Path::new("<command line>"));
        return Err(ConfigError::ValidationError {
            path: origin.display().to_string(),
            errors: result.errors,
        }
        .into());
    }
    Ok(config)
}

fn print_summary(
    summary: &MatchSummary,
    interrupted: bool,
    format: OutputFormat,
) -> Result<(), TickstageError> {
    match format {
        OutputFormat::Human => {
            let outcome = match (interrupted, summary.winner) {
                (true, _) => "interrupted".to_string(),
                (false, Some(winner)) => format!("winner {winner}"),
                (false, None) => "draw".to_string(),
            };
            println!(
                "game {}: {outcome} after {} elimination(s)",
                summary.game, summary.eliminations
            );
        }
        OutputFormat::Json => println!("{}", serde_json::to_string(summary)?),
    }
    Ok(())
}
