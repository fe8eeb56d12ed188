//! Simulate command - run the driver lifecycle against a simulated compositor

use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use vidd_core::compositor::{CompositorStats, DEFAULT_RING_SIZE, SimulatedCompositor};
use vidd_core::sink::{FrameSink, RawFileSink};
use vidd_core::{
    ConnectorIndex, DeviceHandle, DisplayMode, Driver, DriverStatus, IndirectDisplayCallbacks,
    ProcessorReport,
};

/// Arguments for the simulate command
#[derive(Args)]
pub struct SimulateArgs {
    /// Frames to present (0 = until Ctrl+C)
    #[arg(short = 'n', long, default_value = "300")]
    frames: u64,

    /// Mode to commit, e.g. 2560x1440@60 (defaults to the preferred mode)
    #[arg(short, long)]
    mode: Option<String>,

    /// Inject a transient acquire failure every K frames (0 = never)
    #[arg(long, default_value = "0")]
    transient_every: u64,

    /// Append raw frame payloads to this file
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Buffers in the simulated swap-chain
    #[arg(long, default_value_t = DEFAULT_RING_SIZE)]
    buffers: usize,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,
}

/// Everything observed during one simulation run
#[derive(Serialize)]
struct SimulationSummary {
    mode: DisplayMode,
    presented: u64,
    busy_skips: u64,
    injected_faults: u64,
    elapsed_seconds: f64,
    compositor: CompositorStats,
    processor: Option<ProcessorReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dump: Option<PathBuf>,
}

fn check(status: DriverStatus, what: &str) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(anyhow!("{} failed: {}", what, status))
    }
}

/// Run a simulation
pub async fn simulate(config_path: Option<PathBuf>, args: SimulateArgs) -> Result<()> {
    let config = super::load_config(config_path)?;
    let caps = config
        .adapter_caps()
        .context("Failed to build the adapter capabilities")?;
    let descriptor = config
        .monitor_descriptor()
        .context("Failed to build the monitor descriptor")?;

    let mode = match args.mode {
        Some(ref s) => s.parse::<DisplayMode>().map_err(|e| anyhow!(e))?,
        None => descriptor
            .preferred_mode()
            .context("Monitor advertises no modes")?,
    };
    if !descriptor.supports(&mode) {
        bail!(
            "Mode {} is not advertised; run 'vidd modes' to list the configured modes",
            mode
        );
    }

    let file_sink = match args.dump {
        Some(ref path) => Some(Arc::new(
            RawFileSink::create(path).context("Failed to open dump file")?,
        )),
        None => None,
    };

    let mut driver = Driver::new().with_processor_config(config.processor_config());
    if let Some(ref sink) = file_sink {
        driver = driver.with_sink(sink.clone() as Arc<dyn FrameSink>);
    }

    let connector = ConnectorIndex(0);
    check(driver.adapter_init(DeviceHandle(1), caps), "Adapter init")?;
    check(driver.monitor_create(connector, descriptor), "Monitor create")?;
    check(driver.monitor_arrival(connector), "Monitor arrival")?;
    check(driver.commit_modes(connector, mode), "Mode commit")?;

    let monitor = driver
        .adapter()
        .and_then(|adapter| adapter.monitor(connector))
        .context("Monitor disappeared after arrival")?;

    let (compositor, swap_chain) = SimulatedCompositor::create(&mode, args.buffers)
        .context("Failed to create the simulated swap-chain")?;
    let compositor = if file_sink.is_some() {
        compositor
    } else {
        compositor.without_pixels()
    };
    check(
        driver.assign_swap_chain(connector, Box::new(swap_chain)),
        "Swap-chain assignment",
    )?;

    if !args.json {
        println!("vidd - Simulation\n");
        println!("  Mode:     {}", mode);
        println!("  Buffers:  {}", args.buffers.max(1));
        if args.frames == 0 {
            println!("  Frames:   until Ctrl+C");
        } else {
            println!("  Frames:   {}", args.frames);
        }
        if let Some(ref path) = args.dump {
            println!("  Dump:     {}", path.display());
        }
        println!();
    }

    let started = Instant::now();
    let mut presented = 0u64;
    let mut busy_skips = 0u64;
    let mut injected_faults = 0u64;

    let mut ticker = tokio::time::interval(mode.frame_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if args.frames > 0 && presented >= args.frames {
            break;
        }

        tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("Interrupted after {} frames", presented);
                break;
            }
            _ = ticker.tick() => {
                if args.transient_every > 0 && presented > 0 && presented % args.transient_every == 0 {
                    compositor.inject_fault("simulated access lost")?;
                    injected_faults += 1;
                }
                match compositor.present() {
                    Ok(_) => presented += 1,
                    Err(e) => {
                        busy_skips += 1;
                        debug!("Present skipped: {}", e);
                    }
                }
            }
        }
    }

    // Let the processor drain what is still queued
    let deadline = Instant::now() + Duration::from_secs(1);
    while compositor.in_flight() > 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    if let Some(stats) = monitor.processor_stats() {
        debug!("Processor before unassign: {}", stats);
    }

    check(driver.unassign_swap_chain(connector), "Swap-chain unassignment")?;
    let report = monitor.last_report();
    check(driver.monitor_departure(connector), "Monitor departure")?;
    check(driver.adapter_release(), "Adapter release")?;

    let summary = SimulationSummary {
        mode,
        presented,
        busy_skips,
        injected_faults,
        elapsed_seconds: started.elapsed().as_secs_f64(),
        compositor: compositor.stats(),
        processor: report,
        dump: args.dump.clone(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if summary.compositor.violations > 0 {
        bail!(
            "{} swap-chain contract violation(s) detected",
            summary.compositor.violations
        );
    }

    Ok(())
}

fn print_summary(summary: &SimulationSummary) {
    println!("Compositor:");
    println!("  Presented:  {}", summary.presented);
    println!("  Busy skips: {}", summary.busy_skips);
    println!("  Faults:     {}", summary.injected_faults);
    println!("  Acquired:   {}", summary.compositor.acquired);
    println!("  Released:   {}", summary.compositor.released);
    println!("  Violations: {}", summary.compositor.violations);
    println!();

    if let Some(ref report) = summary.processor {
        println!("Processor {}:", report.processor);
        println!("  Exit:       {}", report.exit);
        println!("  Stats:      {}", report.stats);
        println!();
    }

    println!("Finished in {:.2}s", summary.elapsed_seconds);
}
