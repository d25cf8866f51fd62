//! Integration tests for the fixed-timestep tick scheduler.
//!
//! Uses paused Tokio time so `sleep_until` resolves as soon as the runtime
//! auto-advances the clock.

use std::time::Duration;

use warroom_tick::{Countdown, TickConfig, TickPolicy, TickScheduler};

// =========================================================================
// Helpers
// =========================================================================

fn config_20hz() -> TickConfig {
    TickConfig::with_rate(20)
}

// =========================================================================
// TickConfig
// =========================================================================

#[test]
fn test_default_config_is_30hz_skip() {
    let cfg = TickConfig::default();
    assert_eq!(cfg.tick_rate_hz, 30);
    assert_eq!(cfg.policy, TickPolicy::Skip);
}

#[test]
fn test_with_rate_sets_duration() {
    let cfg = TickConfig::with_rate(20);
    assert_eq!(cfg.tick_duration(), Duration::from_millis(50));
}

#[test]
fn test_validated_clamps_rate() {
    assert_eq!(TickConfig::with_rate(0).validated().tick_rate_hz, 1);
    assert_eq!(
        TickConfig::with_rate(1000).validated().tick_rate_hz,
        TickConfig::MAX_TICK_RATE_HZ
    );
}

#[test]
fn test_config_from_json() {
    let cfg: TickConfig =
        serde_json::from_str(r#"{"tick_rate_hz": 10, "policy": {"CatchUp": {"max_catchup": 2}}}"#).unwrap();
    assert_eq!(cfg.tick_rate_hz, 10);
    assert_eq!(cfg.policy, TickPolicy::CatchUp { max_catchup: 2 });
    assert!((cfg.budget_warn_threshold - 0.8).abs() < f64::EPSILON);
}

// =========================================================================
// Scheduler creation and accessors
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_scheduler_initial_state() {
    let s = TickScheduler::new(config_20hz());
    assert_eq!(s.tick_count(), 0);
    assert_eq!(s.tick_rate_hz(), 20);
    assert!(!s.is_paused());
    assert_eq!(s.tick_duration(), Duration::from_millis(50));
}

// =========================================================================
// Tick firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_fires_and_increments() {
    let mut s = TickScheduler::new(config_20hz());

    let info = s.wait_for_tick().await;
    assert_eq!(info.tick, 1);
    assert!(!info.overrun);
    assert_eq!(info.ticks_skipped, 0);
    assert_eq!(s.tick_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_multiple_ticks_increment_monotonically() {
    let mut s = TickScheduler::new(config_20hz());
    for expected in 1..=5 {
        let info = s.wait_for_tick().await;
        assert_eq!(info.tick, expected);
    }
}

#[tokio::test(start_paused = true)]
async fn test_ticks_are_one_period_apart() {
    let mut s = TickScheduler::new(config_20hz());
    let start = tokio::time::Instant::now();
    for _ in 0..4 {
        s.wait_for_tick().await;
    }
    assert_eq!(start.elapsed(), Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn test_late_tick_skips_ahead() {
    let mut s = TickScheduler::new(config_20hz());
    s.wait_for_tick().await;
    // Stall the loop for three periods.
    tokio::time::advance(Duration::from_millis(200)).await;
    let info = s.wait_for_tick().await;
    assert!(info.overrun);
    assert_eq!(info.ticks_skipped, 3);
}

#[tokio::test(start_paused = true)]
async fn test_catch_up_within_cap_skips_nothing() {
    let mut s = TickScheduler::new(config_20hz().with_policy(TickPolicy::CatchUp { max_catchup: 5 }));
    s.wait_for_tick().await;
    tokio::time::advance(Duration::from_millis(200)).await;
    let info = s.wait_for_tick().await;
    assert!(info.overrun);
    assert_eq!(info.ticks_skipped, 0);
}

// =========================================================================
// Pause / Resume
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_pause_prevents_ticks() {
    let mut s = TickScheduler::new(config_20hz());
    s.wait_for_tick().await;

    s.pause();
    assert!(s.is_paused());
    let result = tokio::time::timeout(Duration::from_secs(1), s.wait_for_tick()).await;
    assert!(result.is_err(), "paused scheduler should pend");
}

#[tokio::test(start_paused = true)]
async fn test_resume_allows_ticks_again() {
    let mut s = TickScheduler::new(config_20hz());
    s.wait_for_tick().await;
    s.pause();
    s.resume();
    assert!(!s.is_paused());

    let info = s.wait_for_tick().await;
    assert_eq!(info.tick, 2);
    assert!(!info.overrun);
}

// =========================================================================
// Budget
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_without_wait_is_noop() {
    let mut s = TickScheduler::new(config_20hz());
    assert!(s.record_tick_end().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_measures_work() {
    let mut s = TickScheduler::new(config_20hz());
    s.wait_for_tick().await;
    std::thread::sleep(Duration::from_micros(50));
    let elapsed = s.record_tick_end().unwrap();
    assert!(elapsed > Duration::ZERO);
    // Consumed: a second call has nothing to measure.
    assert!(s.record_tick_end().is_none());
}

// =========================================================================
// Countdowns driven by the scheduler
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_countdown_fires_on_scheduled_tick() {
    let mut s = TickScheduler::new(config_20hz());
    let mut check = Countdown::repeating(3);
    let mut fired_at = Vec::new();
    for _ in 0..7 {
        let info = s.wait_for_tick().await;
        if check.tick() {
            fired_at.push(info.tick);
        }
    }
    assert_eq!(fired_at, vec![3, 6]);
}

// =========================================================================
// Integration: select! loop pattern
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_select_loop_pattern() {
    let mut s = TickScheduler::new(config_20hz());
    let (tx, mut rx) = tokio::sync::mpsc::channel::<&str>(10);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(160)).await;
        tx.send("stop").await.ok();
    });

    let mut ticks_fired = 0u64;
    loop {
        tokio::select! {
            Some(cmd) = rx.recv() => {
                assert_eq!(cmd, "stop");
                break;
            }
            info = s.wait_for_tick() => {
                ticks_fired += 1;
                s.record_tick_end();
                assert_eq!(info.tick, ticks_fired);
            }
        }
    }

    assert!(ticks_fired >= 3, "expected at least 3 ticks, got {ticks_fired}");
}
