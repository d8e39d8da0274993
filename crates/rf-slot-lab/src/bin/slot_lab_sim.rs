//! slot-lab-sim — Drive a Slot Lab session against the synthetic engine
//!
//! Usage:
//!   slot-lab-sim --spins 20 --bet 2 --seed 7
//!   slot-lab-sim --forced mega_win --turbo
//!   slot-lab-sim --config session.yaml --remote

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::Receiver;

use rf_slot_lab::{
    ChannelSink, EngineContext, ForcedOutcome, GambleChoice, ManualClock, RemoteEngine, RenderEvent,
    SessionConfig, SessionController, SessionError, SessionState, SkipToken, SlotEngine, SpinStart,
    SyntheticEngine, serve_synthetic,
};

#[derive(Parser)]
#[command(name = "slot-lab-sim", about = "Simulate Slot Lab spins and print every stage trigger")]
struct Cli {
    /// Number of spins
    #[arg(short = 'n', long, default_value_t = 10)]
    spins: u32,

    /// Bet per spin
    #[arg(short, long, default_value_t = 1.0)]
    bet: f64,

    /// RNG seed for the engine and gamble
    #[arg(short, long)]
    seed: Option<u64>,

    /// Turbo reel timing
    #[arg(long)]
    turbo: bool,

    /// Session config (.json / .yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Force every spin to this outcome (e.g. mega_win, jackpot_mini)
    #[arg(short, long)]
    forced: Option<ForcedOutcome>,

    /// Run the engine as a separate task behind a channel
    #[arg(long)]
    remote: bool,

    /// Gamble once on every presentation (red)
    #[arg(long)]
    gamble: bool,
}

type Sim<E> = SessionController<E, ChannelSink, ManualClock>;

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("loading session config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    config.turbo |= cli.turbo;
    if cli.seed.is_some() {
        config.gamble.seed = cli.seed;
    }

    let engine = match cli.seed {
        Some(seed) => SyntheticEngine::seeded(seed, config.reel_count),
        None => SyntheticEngine::new(config.reel_count),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(async {
        let clock = ManualClock::new();
        let (sink, events) = ChannelSink::unbounded();

        if cli.remote {
            let (remote, requests) = RemoteEngine::channel(4);
            let server = tokio::spawn(serve_synthetic(requests, engine));
            let sim = build(config, remote, sink, clock.clone())?;
            run(&cli, sim, &events, &clock).await?;
            server.abort();
            Ok::<(), anyhow::Error>(())
        } else {
            let sim = build(config, engine, sink, clock.clone())?;
            run(&cli, sim, &events, &clock).await
        }
    })
}

fn build<E: SlotEngine>(config: SessionConfig, engine: E, sink: ChannelSink, clock: ManualClock) -> Result<Sim<E>> {
    let mut context = EngineContext::new(engine);
    context.init();
    Ok(SessionController::new(config, context, sink, clock)?)
}

async fn run<E: SlotEngine>(cli: &Cli, mut sim: Sim<E>, events: &Receiver<RenderEvent>, clock: &ManualClock) -> Result<()> {
    println!("balance {:.2}, bet {:.2}", sim.balance(), cli.bet);

    for n in 1..=cli.spins {
        println!("── spin {n} ──");

        let start = match cli.forced {
            Some(outcome) => sim.spin_forced(outcome, cli.bet),
            None => sim.spin(cli.bet),
        };
        let start = match start {
            Ok(start) => start,
            Err(e @ SessionError::InsufficientFunds { .. }) => {
                println!("{e}");
                break;
            }
            Err(e) => return Err(e.into()),
        };

        let pending = match start {
            SpinStart::Started(pending) => pending,
            SpinStart::SkipRequested => {
                let token = print_events(events, clock).context("skip requested but no token arrived")?;
                sim.complete_skip(token)?
                    .into_pending()
                    .context("skip completed without starting a spin")?
            }
        };

        if let Err(e) = sim.await_result(pending).await {
            println!("spin {n}: {e}");
            print_events(events, clock);
            continue;
        }

        // Jump the clock from trigger to trigger until the batch drains
        print_events(events, clock);
        while let Some(at) = sim.scheduler().next_fire_at() {
            clock.set(at);
            sim.tick();
            print_events(events, clock);
        }

        if let Some(tier) = sim.tier_result() {
            println!(
                "tier {} ({:.2}x), pending {:.2}",
                tier.display_label().unwrap_or("no win"),
                tier.multiplier,
                sim.pending_win()
            );
        }
        if let Some(jackpot) = sim.last_jackpot() {
            println!("JACKPOT {} {:.2}", jackpot.tier.display_name(), jackpot.amount);
        }

        if cli.gamble && sim.state() == SessionState::Presenting {
            match sim.gamble(GambleChoice::Red) {
                Ok(outcome) => println!(
                    "gamble drew {:?}: {} (pending {:.2})",
                    outcome.drawn,
                    if outcome.won { "won" } else { "lost" },
                    outcome.pending_win
                ),
                Err(e) => println!("gamble: {e}"),
            }
            print_events(events, clock);
        }
        // A presentation left open is skipped by the next spin
    }

    if sim.state() == SessionState::Presenting {
        sim.collect()?;
        print_events(events, clock);
    }

    println!("balance {:.2}", sim.balance());
    println!("jackpots {}", serde_json::to_string(&sim.jackpot_values())?);
    Ok(())
}

/// Print drained events; returns a skip token if one was requested
fn print_events(events: &Receiver<RenderEvent>, clock: &ManualClock) -> Option<SkipToken> {
    use rf_slot_lab::Clock;

    let mut token = None;
    for event in events.try_iter() {
        match event {
            RenderEvent::Stage { stage_type, payload } => {
                if payload.is_empty() {
                    println!("{:>8}ms  {}", clock.now_ms(), stage_type);
                } else {
                    let payload = serde_json::to_string(&payload).unwrap_or_default();
                    println!("{:>8}ms  {}  {}", clock.now_ms(), stage_type, payload);
                }
            }
            RenderEvent::StateChanged(state) => println!("            [{state:?}]"),
            RenderEvent::SkipRequested(skip) => {
                println!("            [skip {} requested]", skip.id());
                token = Some(skip);
            }
        }
    }
    token
}
