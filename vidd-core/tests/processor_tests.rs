//! Integration tests for the swap-chain processor frame loop

mod mocks;

use mocks::{RecordingSink, ScriptedSwapChain, Step, wait_until};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};
use vidd_core::config::ProcessorConfig;
use vidd_core::sink::FrameSink;
use vidd_core::swapchain::RevokeReason;
use vidd_core::{ExitReason, SwapChainProcessor};

/// Random script of `len` outcomes: mostly frames, some transient
/// failures, and occasionally a revocation that ends the script
fn random_script(rng: &mut StdRng, len: usize) -> Vec<Step> {
    let mut steps = Vec::with_capacity(len);
    for _ in 0..len {
        let roll: u32 = rng.gen_range(0..100);
        match roll {
            0..=69 => steps.push(Step::Frame),
            70..=96 => steps.push(Step::Transient),
            _ => {
                steps.push(Step::Revoke(RevokeReason::DeviceRemoved));
                break;
            }
        }
    }
    steps
}

#[test]
fn test_release_count_matches_acquires_randomized() {
    for seed in 0..32u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let len = rng.gen_range(1..200);
        let script = random_script(&mut rng, len);
        let revoked = matches!(script.last(), Some(Step::Revoke(_)));
        let expected_frames = script.iter().filter(|s| **s == Step::Frame).count();
        let expected_transients = script.iter().filter(|s| **s == Step::Transient).count() as u64;

        let (swap_chain, log) = ScriptedSwapChain::new(script);
        let processor =
            SwapChainProcessor::start(Box::new(swap_chain), None, &ProcessorConfig::default())
                .unwrap();

        if revoked {
            wait_until("revocation", || processor.has_exited());
        } else {
            wait_until("script drained", || {
                log.released().len() == expected_frames && log.transients() == expected_transients
            });
        }

        let report = processor.stop();
        assert!(log.is_dropped(), "seed {}: worker still owns the swap-chain", seed);
        assert!(log.violations().is_empty(), "seed {}: {:?}", seed, log.violations());
        assert_eq!(log.acquired(), log.released(), "seed {}", seed);
        assert_eq!(log.acquired().len(), expected_frames, "seed {}", seed);
        assert_eq!(log.transients(), expected_transients, "seed {}", seed);

        assert_eq!(report.stats.frames_acquired, expected_frames as u64);
        assert_eq!(report.stats.frames_released, expected_frames as u64);
        assert_eq!(report.stats.transient_errors, expected_transients);
        assert_eq!(report.stats.outstanding(), 0);

        let expected_exit = if revoked {
            ExitReason::Revoked(RevokeReason::DeviceRemoved)
        } else {
            ExitReason::Stopped
        };
        assert_eq!(report.exit, expected_exit, "seed {}", seed);
    }
}

#[test]
fn test_stop_joins_worker_at_any_timing() {
    let delays = [0u64, 1, 2, 3, 5, 8, 13];
    for delay in delays {
        let steps = std::iter::repeat_n(Step::SlowFrame(Duration::from_millis(3)), 10);
        let (swap_chain, log) = ScriptedSwapChain::new(steps);
        let processor =
            SwapChainProcessor::start(Box::new(swap_chain), None, &ProcessorConfig::default())
                .unwrap();

        std::thread::sleep(Duration::from_millis(delay));
        let report = processor.stop();

        // The worker has returned and dropped the swap-chain before stop() returned
        assert!(log.is_dropped(), "delay {}ms", delay);
        assert_eq!(report.exit, ExitReason::Stopped);

        // An acquire in flight when stop arrived was still released
        assert_eq!(log.acquired(), log.released(), "delay {}ms", delay);
        assert!(log.violations().is_empty());
    }
}

#[test]
fn test_stop_unblocks_idle_acquire() {
    let (swap_chain, log) = ScriptedSwapChain::frames(0);
    let processor =
        SwapChainProcessor::start(Box::new(swap_chain), None, &ProcessorConfig::default()).unwrap();
    assert!(processor.is_running());

    std::thread::sleep(Duration::from_millis(10));
    let start = Instant::now();
    let report = processor.stop();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(log.is_dropped());
    assert_eq!(report.exit, ExitReason::Stopped);
}

#[test]
fn test_transient_failures_are_retried() {
    let (swap_chain, log) = ScriptedSwapChain::new([
        Step::Transient,
        Step::Transient,
        Step::Frame,
        Step::Transient,
        Step::Frame,
    ]);
    let processor =
        SwapChainProcessor::start(Box::new(swap_chain), None, &ProcessorConfig::default()).unwrap();

    wait_until("two releases", || log.released().len() == 2);
    assert!(processor.is_running());

    let report = processor.stop();
    assert_eq!(report.stats.transient_errors, 3);
    assert_eq!(report.stats.frames_acquired, 2);
    assert_eq!(report.exit, ExitReason::Stopped);
}

#[test]
fn test_forwarding_to_sink() {
    let sink = RecordingSink::new();
    let (swap_chain, log) = ScriptedSwapChain::frames(20);
    let config = ProcessorConfig::default().with_forward_queue_depth(64);
    let processor = SwapChainProcessor::start(
        Box::new(swap_chain),
        Some(sink.clone() as Arc<dyn FrameSink>),
        &config,
    )
    .unwrap();

    wait_until("twenty releases", || log.released().len() == 20);
    let report = processor.stop();

    assert_eq!(report.stats.frames_forwarded, 20);
    assert_eq!(report.stats.frames_dropped, 0);
    assert_eq!(sink.received(), (1..=20).collect::<Vec<u64>>());
    assert!(sink.was_flushed());
}

#[test]
fn test_slow_sink_does_not_stall_releases() {
    let sink = RecordingSink::with_delay(Duration::from_millis(50));
    let (swap_chain, log) = ScriptedSwapChain::frames(30);
    let config = ProcessorConfig::default().with_forward_queue_depth(2);
    let processor = SwapChainProcessor::start(
        Box::new(swap_chain),
        Some(sink.clone() as Arc<dyn FrameSink>),
        &config,
    )
    .unwrap();

    wait_until("thirty releases", || log.released().len() == 30);
    // Thirty frames through a 50ms sink would take 1.5s; releases did not wait for it
    assert!(sink.received().len() < 30);

    let report = processor.stop();
    let stats = report.stats;
    assert_eq!(stats.frames_released, 30);
    assert!(stats.frames_dropped > 0);
    assert_eq!(stats.frames_forwarded + stats.frames_dropped, 30);

    // Everything queued before stop was delivered, in order
    let received = sink.received();
    assert_eq!(received.len() as u64, stats.frames_forwarded);
    assert!(received.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_zero_depth_disables_forwarding() {
    let sink = RecordingSink::new();
    let (swap_chain, log) = ScriptedSwapChain::frames(5);
    let config = ProcessorConfig::default().with_forward_queue_depth(0);
    let processor = SwapChainProcessor::start(
        Box::new(swap_chain),
        Some(sink.clone() as Arc<dyn FrameSink>),
        &config,
    )
    .unwrap();

    wait_until("five releases", || log.released().len() == 5);
    let report = processor.stop();
    assert_eq!(report.stats.frames_forwarded, 0);
    assert!(sink.received().is_empty());
    assert!(!sink.was_flushed());
}

#[test]
fn test_drop_stops_processor() {
    let (swap_chain, log) = ScriptedSwapChain::frames(0);
    let processor =
        SwapChainProcessor::start(Box::new(swap_chain), None, &ProcessorConfig::default()).unwrap();
    drop(processor);
    assert!(log.is_dropped());
}

#[test]
fn test_rejected_release_fails_loop() {
    let (swap_chain, log) =
        ScriptedSwapChain::new([Step::Frame, Step::RejectRelease, Step::Frame]);
    let processor =
        SwapChainProcessor::start(Box::new(swap_chain), None, &ProcessorConfig::default()).unwrap();

    wait_until("worker exit", || processor.has_exited());
    assert!(!processor.is_running());

    let report = processor.stop();
    assert!(
        matches!(report.exit, ExitReason::Failed(ref reason) if reason.contains("reclaimed")),
        "unexpected exit: {}",
        report.exit
    );
    // The frame after the rejected release is never acquired
    assert_eq!(log.acquired(), vec![1, 2]);
    assert_eq!(log.released(), vec![1]);
    assert_eq!(report.stats.frames_released, 1);
    assert!(log.is_dropped());
}

#[test]
fn test_worker_panic_is_reported() {
    let (swap_chain, log) = ScriptedSwapChain::new([Step::Frame, Step::Panic]);
    let processor =
        SwapChainProcessor::start(Box::new(swap_chain), None, &ProcessorConfig::default()).unwrap();

    wait_until("worker exit", || processor.has_exited());
    assert!(!processor.is_running());

    let report = processor.stop();
    assert_eq!(report.exit, ExitReason::Panicked);
    assert_eq!(log.released(), vec![1]);
    assert!(log.is_dropped());
}

#[test]
fn test_worker_spawn_failure_is_resource_error() {
    let (swap_chain, log) = ScriptedSwapChain::frames(3);
    let sink = RecordingSink::new();
    let config = ProcessorConfig::default().with_worker_stack_size(usize::MAX / 4);

    let result = SwapChainProcessor::start(
        Box::new(swap_chain),
        Some(sink.clone() as Arc<dyn FrameSink>),
        &config,
    );
    let err = result.err().expect("worker spawn should fail");
    assert!(matches!(err, vidd_core::ViddError::Resource(_)), "{:?}", err);

    // Nothing ran, and the forwarder was shut down with a flush
    assert!(log.acquired().is_empty());
    assert!(log.is_dropped());
    assert!(sink.was_flushed());
}
