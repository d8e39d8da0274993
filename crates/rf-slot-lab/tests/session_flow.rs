//! Session Controller Integration Tests
//!
//! Drives full spins through the public API:
//! - Stage ordering as seen by the rendering layer
//! - Skip / collect / gamble presentation exits
//! - Stop, stale and missing engine results
//! - Jackpot awards and contribution growth
//! - Remote engine behind a tokio channel

use approx::assert_relative_eq;
use crossbeam_channel::Receiver;
use serde_json::json;

use rf_slot_lab::{
    ChannelSink, EngineContext, EngineReply, ForcedOutcome, GambleChoice, GambleConfig, ManualClock,
    RemoteEngine, RenderEvent, SessionConfig, SessionController, SessionError, SessionState, SkipToken,
    SlotEngine, SpinRequest, SpinStart, SyntheticEngine, serve_synthetic,
};
use rf_stage::{ALL_REELS_STOPPED, JackpotTier};

type Controller<E = SyntheticEngine> = SessionController<E, ChannelSink, ManualClock>;

fn config() -> SessionConfig {
    SessionConfig {
        gamble: GambleConfig {
            seed: Some(11),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn controller_with<E: SlotEngine>(engine: E) -> (Controller<E>, Receiver<RenderEvent>, ManualClock) {
    let mut context = EngineContext::new(engine);
    context.init();
    let (sink, rx) = ChannelSink::unbounded();
    let clock = ManualClock::new();
    let c = SessionController::new(config(), context, sink, clock.clone()).unwrap();
    (c, rx, clock)
}

fn controller() -> (Controller, Receiver<RenderEvent>, ManualClock) {
    controller_with(SyntheticEngine::seeded(42, 5))
}

/// Jump the clock trigger by trigger until nothing is queued
fn drain<E: SlotEngine>(c: &mut Controller<E>, clock: &ManualClock) {
    while let Some(at) = c.scheduler().next_fire_at() {
        clock.set(at);
        c.tick();
    }
}

fn stage_names(events: &[RenderEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| e.stage_type().map(str::to_string))
        .collect()
}

fn skip_tokens(rx: &Receiver<RenderEvent>) -> Vec<SkipToken> {
    rx.try_iter()
        .filter_map(|e| match e {
            RenderEvent::SkipRequested(token) => Some(token),
            _ => None,
        })
        .collect()
}

async fn present<E: SlotEngine>(c: &mut Controller<E>, clock: &ManualClock, outcome: ForcedOutcome, bet: f64) {
    let pending = c.spin_forced(outcome, bet).unwrap().into_pending().unwrap();
    c.await_result(pending).await.unwrap();
    drain(c, clock);
    assert_eq!(c.state(), SessionState::Presenting);
}

// ═══════════════════════════════════════════════════════════════════════════════
// STAGE ORDERING
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_big_win_stage_order() {
    let (mut c, rx, clock) = controller();
    present(&mut c, &clock, ForcedOutcome::MegaWin, 1.0).await;

    let events: Vec<RenderEvent> = rx.try_iter().collect();
    let names = stage_names(&events);
    let pos = |name: &str| names.iter().position(|n| n == name).unwrap();

    assert_eq!(names[0], "SPIN_START");
    let all_stopped = pos(ALL_REELS_STOPPED);
    for reel in 0..5 {
        assert!(pos(&format!("REEL_STOP_{reel}")) < all_stopped);
    }
    // 35x qualifies for anticipation before the last reel
    assert!(pos("REEL_STOP_3") < pos("ANTICIPATION_ON"));
    assert!(pos("ANTICIPATION_ON") < pos("REEL_STOP_4"));
    assert!(pos("REEL_STOP_4") < pos("ANTICIPATION_OFF"));
    assert!(pos("ANTICIPATION_OFF") < all_stopped);
    assert!(all_stopped < pos("WIN_PRESENT"));
    assert!(pos("WIN_PRESENT") < pos("SPIN_END"));

    assert_eq!(names.iter().filter(|n| *n == "ANTICIPATION_ON").count(), 1);
    assert_eq!(names.iter().filter(|n| *n == ALL_REELS_STOPPED).count(), 1);

    // Tier info rides on the all-stopped payload
    let payload = events
        .iter()
        .find_map(|e| match e {
            RenderEvent::Stage { stage_type, payload } if stage_type == ALL_REELS_STOPPED => Some(payload),
            _ => None,
        })
        .unwrap();
    assert_eq!(payload.get_f64("win_multiplier"), Some(35.0));
    assert_eq!(payload.get("is_big_win"), Some(&json!(true)));
    assert_eq!(payload.get("tier_label"), Some(&json!("BIG WIN")));
    assert_eq!(payload.get("presentation_stage"), Some(&json!("BIG_WIN_TIER_1")));
    assert!(payload.get("jackpot_tier").is_none());

    // State changes bracket the spin
    let states: Vec<SessionState> = events
        .iter()
        .filter_map(|e| match e {
            RenderEvent::StateChanged(s) => Some(*s),
            _ => None,
        })
        .collect();
    assert_eq!(states, vec![SessionState::Spinning, SessionState::Presenting]);

    assert_eq!(c.progress().fraction, 1.0);
}

#[tokio::test]
async fn test_losing_spin_has_no_anticipation() {
    let (mut c, rx, clock) = controller();
    let pending = c.spin_forced(ForcedOutcome::Lose, 1.0).unwrap().into_pending().unwrap();
    c.await_result(pending).await.unwrap();
    drain(&mut c, &clock);

    let names = stage_names(&rx.try_iter().collect::<Vec<_>>());
    assert!(!names.iter().any(|n| n.starts_with("ANTICIPATION")));
    assert!(!names.iter().any(|n| n == "WIN_PRESENT"));
    assert_eq!(c.state(), SessionState::Idle);
    assert_eq!(c.balance(), 999.0);
}

#[tokio::test]
async fn test_reel_triggers_follow_the_clock() {
    let (mut c, rx, clock) = controller();
    clock.set(10_000);
    let pending = c.spin_forced(ForcedOutcome::Lose, 1.0).unwrap().into_pending().unwrap();
    c.await_result(pending).await.unwrap();
    rx.try_iter().count();

    // First reel lands 800ms after the result arrived
    clock.set(10_799);
    c.tick();
    assert!(!stage_names(&rx.try_iter().collect::<Vec<_>>()).contains(&"REEL_STOP_0".to_string()));

    clock.set(10_800);
    c.tick();
    assert_eq!(stage_names(&rx.try_iter().collect::<Vec<_>>()), vec!["REEL_STOP_0"]);
    assert_eq!(c.state(), SessionState::Spinning);
}

#[tokio::test]
async fn test_turbo_lands_reels_sooner() {
    let (mut c, _rx, clock) = controller();
    c.set_turbo(true);
    let pending = c.spin_forced(ForcedOutcome::Lose, 1.0).unwrap().into_pending().unwrap();
    c.await_result(pending).await.unwrap();

    let offsets = c.scheduler().reel_stop_offsets().to_vec();
    assert_eq!(offsets.len(), 5);
    assert!(offsets.windows(2).all(|w| w[0] < w[1]));
    assert!(*offsets.last().unwrap() < 2240);

    drain(&mut c, &clock);
    assert_eq!(c.state(), SessionState::Idle);
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRESENTATION EXITS
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_spin_during_presentation_skips_first() {
    let (mut c, rx, clock) = controller();
    present(&mut c, &clock, ForcedOutcome::MegaWin, 1.0).await;
    rx.try_iter().count();
    assert_eq!(c.balance(), 999.0);
    assert_eq!(c.pending_win(), 35.0);

    let start = c.spin(2.0).unwrap();
    assert!(matches!(start, SpinStart::SkipRequested));
    // Nothing is charged until the fade-out completes
    assert_eq!(c.balance(), 999.0);
    assert_eq!(c.state(), SessionState::Presenting);
    assert!(c.is_skip_pending());

    let mut tokens = skip_tokens(&rx);
    assert_eq!(tokens.len(), 1);

    // One skip at a time; presentation exits wait for it
    assert!(matches!(c.spin(2.0), Err(SessionError::SkipInProgress)));
    assert!(matches!(c.collect(), Err(SessionError::SkipInProgress)));
    assert!(matches!(c.gamble(GambleChoice::Red), Err(SessionError::SkipInProgress)));
    assert!(skip_tokens(&rx).is_empty());

    let pending = c.complete_skip(tokens.remove(0)).unwrap().into_pending().unwrap();
    assert_eq!(c.balance(), 999.0 + 35.0 - 2.0);
    assert_eq!(c.pending_win(), 0.0);
    assert_eq!(c.state(), SessionState::Spinning);
    assert_eq!(pending.generation(), 2);
    assert!(!c.is_skip_pending());

    c.await_result(pending).await.unwrap();
    drain(&mut c, &clock);
    assert_ne!(c.state(), SessionState::Spinning);
}

#[tokio::test]
async fn test_skip_token_from_another_session_rejected() {
    let (mut a, _rx_a, clock_a) = controller();
    let (mut b, rx_b, clock_b) = controller();
    present(&mut a, &clock_a, ForcedOutcome::MegaWin, 1.0).await;
    present(&mut b, &clock_b, ForcedOutcome::MegaWin, 1.0).await;

    assert!(matches!(b.spin(1.0), Ok(SpinStart::SkipRequested)));
    let foreign = skip_tokens(&rx_b).pop().unwrap();

    // `a` has no skip pending
    let err = a.complete_skip(foreign).unwrap_err();
    assert!(matches!(err, SessionError::UnknownSkipToken(1)));
    assert_eq!(a.state(), SessionState::Presenting);
    assert_eq!(a.pending_win(), 35.0);
}

#[tokio::test]
async fn test_lost_skip_token_can_be_cancelled() {
    let (mut c, rx, clock) = controller();
    present(&mut c, &clock, ForcedOutcome::MegaWin, 1.0).await;

    assert!(matches!(c.spin(1.0), Ok(SpinStart::SkipRequested)));
    // The rendering layer drops the token without fading out
    drop(skip_tokens(&rx));
    assert!(matches!(c.collect(), Err(SessionError::SkipInProgress)));

    c.cancel_skip().unwrap();
    assert!(!c.is_skip_pending());
    assert_eq!(c.state(), SessionState::Presenting);
    assert_eq!(c.balance(), 999.0);
    assert!(matches!(c.cancel_skip(), Err(SessionError::NoSkipPending)));

    // Presentation exits work again, including a fresh skip
    assert!(matches!(c.spin(1.0), Ok(SpinStart::SkipRequested)));
    let token = skip_tokens(&rx).pop().unwrap();
    let pending = c.complete_skip(token).unwrap().into_pending().unwrap();
    assert_eq!(c.balance(), 999.0 + 35.0 - 1.0);
    c.await_result(pending).await.unwrap();
}

#[tokio::test]
async fn test_skip_without_render_layer_keeps_presentation() {
    let (mut c, rx, clock) = controller();
    present(&mut c, &clock, ForcedOutcome::MegaWin, 1.0).await;
    drop(rx);

    assert!(matches!(c.spin(1.0), Err(SessionError::RenderUnavailable)));
    assert!(!c.is_skip_pending());
    assert_eq!(c.state(), SessionState::Presenting);

    assert_eq!(c.collect().unwrap(), 35.0);
    assert_eq!(c.balance(), 1034.0);
    assert_eq!(c.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_collect_credits_and_cancels_remaining_stages() {
    let (mut c, rx, clock) = controller();
    let pending = c.spin_forced(ForcedOutcome::EpicWin, 1.0).unwrap().into_pending().unwrap();
    c.await_result(pending).await.unwrap();

    // Stop right at the all-stopped moment, before the presentation plays out
    let all_stopped = *c.scheduler().reel_stop_offsets().last().unwrap();
    clock.set(all_stopped);
    c.tick();
    assert_eq!(c.state(), SessionState::Presenting);
    assert!(c.scheduler().has_pending());
    rx.try_iter().count();

    assert_eq!(c.collect().unwrap(), 70.0);
    assert_eq!(c.balance(), 1069.0);
    assert_eq!(c.state(), SessionState::Idle);
    assert!(!c.scheduler().has_pending());

    clock.advance(60_000);
    assert_eq!(c.tick(), 0);
    assert!(stage_names(&rx.try_iter().collect::<Vec<_>>()).is_empty());

    assert!(matches!(c.collect(), Err(SessionError::NotPresenting)));
}

#[tokio::test]
async fn test_gamble_until_loss_or_exhausted() {
    let (mut c, _rx, clock) = controller();
    present(&mut c, &clock, ForcedOutcome::MegaWin, 1.0).await;

    let mut wins = 0;
    loop {
        match c.gamble(GambleChoice::Black) {
            Ok(outcome) if outcome.won => {
                wins += 1;
                assert_relative_eq!(outcome.pending_win, 35.0 * 2f64.powi(wins));
                assert_eq!(outcome.attempts_left, 5 - wins as u8);
                assert_eq!(c.pending_win(), outcome.pending_win);
                assert_eq!(c.state(), SessionState::Presenting);
            }
            Ok(outcome) => {
                assert_eq!(outcome.pending_win, 0.0);
                assert_eq!(c.state(), SessionState::Idle);
                assert_eq!(c.pending_win(), 0.0);
                assert_eq!(c.balance(), 999.0);
                break;
            }
            Err(e) => {
                assert!(matches!(e, SessionError::GambleUnavailable(_)));
                assert_eq!(wins, 5);
                let pending = c.pending_win();
                assert_eq!(c.collect().unwrap(), pending);
                break;
            }
        }
    }
    assert_eq!(c.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_small_win_credited_without_presentation() {
    let (mut c, rx, clock) = controller();
    let pending = c.spin_forced(ForcedOutcome::SubBet, 4.0).unwrap().into_pending().unwrap();
    c.await_result(pending).await.unwrap();
    drain(&mut c, &clock);

    assert_eq!(c.state(), SessionState::Idle);
    assert_eq!(c.balance(), 998.0);
    assert_eq!(c.pending_win(), 0.0);
    let tier = c.tier_result().unwrap();
    assert_eq!(tier.regular_tier.as_ref().unwrap().tier_id, -1);

    let names = stage_names(&rx.try_iter().collect::<Vec<_>>());
    // Remaining stages still drain after the credit
    assert!(names.contains(&"SPIN_END".to_string()));
}

// ═══════════════════════════════════════════════════════════════════════════════
// STOP / STALE / MISSING RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_stop_before_result_rejects_late_reply() {
    let (mut c, rx, clock) = controller();
    let pending = c.spin_forced(ForcedOutcome::MegaWin, 1.0).unwrap().into_pending().unwrap();
    c.stop().unwrap();
    assert_eq!(c.state(), SessionState::Idle);
    // Stopping is not a refund
    assert_eq!(c.balance(), 999.0);
    assert!(matches!(c.stop(), Err(SessionError::NotSpinning)));

    let err = c.await_result(pending).await.unwrap_err();
    assert!(matches!(err, SessionError::StaleResult { generation: 1 }));
    assert_eq!(c.pending_win(), 0.0);

    rx.try_iter().count();
    clock.advance(60_000);
    assert_eq!(c.tick(), 0);
    assert!(rx.try_iter().next().is_none());
}

#[tokio::test]
async fn test_stop_after_result_rejected() {
    let (mut c, _rx, clock) = controller();
    let pending = c.spin_forced(ForcedOutcome::Lose, 1.0).unwrap().into_pending().unwrap();
    c.await_result(pending).await.unwrap();
    assert_eq!(c.state(), SessionState::Spinning);
    assert!(matches!(c.stop(), Err(SessionError::StopAfterResult)));
    drain(&mut c, &clock);
    assert_eq!(c.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_duplicate_reply_is_stale() {
    let (mut c, _rx, _clock) = controller();
    let pending = c.spin_forced(ForcedOutcome::SmallWin, 1.0).unwrap().into_pending().unwrap();
    let reply = pending.wait().await;
    c.deliver_result(reply.clone()).unwrap();
    assert!(matches!(c.deliver_result(reply), Err(SessionError::StaleResult { .. })));
}

#[test]
fn test_missing_result_refunds_bet() {
    let (mut c, _rx, _clock) = controller();
    let pending = c.spin(5.0).unwrap().into_pending().unwrap();
    assert_eq!(c.balance(), 995.0);

    let err = c
        .deliver_result(EngineReply {
            generation: pending.generation(),
            result: None,
        })
        .unwrap_err();
    assert!(matches!(err, SessionError::NoResult { generation: 1 }));
    assert_eq!(c.balance(), 1000.0);
    assert_eq!(c.state(), SessionState::Idle);
    assert!(!c.scheduler().has_pending());
}

#[test]
fn test_insufficient_funds_after_losses() {
    let (mut c, _rx, _clock) = controller();
    let pending = c.spin_forced(ForcedOutcome::Lose, 600.0).unwrap().into_pending().unwrap();
    c.stop().unwrap();
    drop(pending);

    let err = c.spin(600.0).map(|_| ()).unwrap_err();
    assert!(matches!(err, SessionError::InsufficientFunds { bet, balance } if bet == 600.0 && balance == 400.0));
    assert_eq!(c.generation(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════════
// JACKPOTS
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_mini_jackpot_awarded_and_reset() {
    let (mut c, rx, clock) = controller();
    let pending = c.spin_forced(ForcedOutcome::JackpotMini, 1.0).unwrap().into_pending().unwrap();

    // Two contribution ticks while the engine is busy
    clock.advance(200);
    c.tick();
    let grown = c.jackpot_values();
    assert_relative_eq!(grown.mini, 50.0 + 0.011 * 0.45 * 2.0, epsilon = 1e-9);
    assert_relative_eq!(grown.minor, 200.0 + 0.011 * 0.27 * 2.0, epsilon = 1e-9);

    c.await_result(pending).await.unwrap();
    let award = c.last_jackpot().unwrap();
    assert_eq!(award.tier, JackpotTier::Mini);
    assert_relative_eq!(award.amount, grown.mini, epsilon = 1e-9);

    // Only the awarded tier resets; growth stopped with the result
    let after = c.jackpot_values();
    assert_eq!(after.mini, 50.0);
    assert_eq!(after.minor, grown.minor);
    assert_eq!(after.major, grown.major);
    assert_eq!(after.grand, grown.grand);

    drain(&mut c, &clock);
    assert_eq!(c.jackpot_values().minor, grown.minor);
    assert_eq!(c.state(), SessionState::Presenting);
    assert_relative_eq!(c.pending_win(), 1000.0 + award.amount, epsilon = 1e-9);

    let events: Vec<RenderEvent> = rx.try_iter().collect();
    let payload = events
        .iter()
        .find_map(|e| match e {
            RenderEvent::Stage { stage_type, payload } if stage_type == ALL_REELS_STOPPED => Some(payload),
            _ => None,
        })
        .unwrap();
    assert_eq!(payload.get("jackpot_tier"), Some(&json!("MINI")));
    assert!(stage_names(&events).contains(&"JACKPOT_PRESENT_MINI".to_string()));

    c.collect().unwrap();
    c.new_session().unwrap();
    let reset = c.jackpot_values();
    assert_eq!((reset.mini, reset.minor, reset.major, reset.grand), (50.0, 200.0, 1000.0, 10000.0));
    assert_eq!(c.balance(), 1000.0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// REMOTE ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_remote_engine_full_spin() {
    let (remote, requests) = RemoteEngine::channel(4);
    let server = tokio::spawn(serve_synthetic(requests, SyntheticEngine::seeded(3, 5)));
    let (mut c, _rx, clock) = controller_with(remote);
    assert!(c.context().is_ready());

    present(&mut c, &clock, ForcedOutcome::SmallWin, 1.0).await;
    assert_eq!(c.pending_win(), 2.0);
    c.collect().unwrap();
    assert_eq!(c.balance(), 1001.0);

    server.abort();
}

#[tokio::test]
async fn test_remote_engine_dropped_reply_refunds() {
    let (remote, mut requests) = RemoteEngine::channel(4);
    let server = tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            let request: SpinRequest = request;
            assert_eq!(request.bet, 3.0);
            drop(request);
        }
    });
    let (mut c, _rx, _clock) = controller_with(remote);

    let pending = c.spin(3.0).unwrap().into_pending().unwrap();
    let err = c.await_result(pending).await.unwrap_err();
    assert!(matches!(err, SessionError::NoResult { .. }));
    assert_eq!(c.balance(), 1000.0);
    assert_eq!(c.state(), SessionState::Idle);

    server.abort();
}
