//! beammgrd - Multi-beam receiver control daemon entry point.
//!
//! Connects to a board, applies the board profile through the command
//! dispatcher, brings up the fabric links and runs the snapshot poller
//! until shutdown. With `--sim` the daemon runs against the built-in
//! software register file; a real board needs a katcp `RegisterPort`
//! implementation linked in.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::info;

use mbrx_beammgrd::{
    fabric, ArbiterConfig, BoardProfile, Command, ConfigStore, DeviceSession, Dispatcher,
    PollerConfig, SampleUpdate, ScopeArbiter, FPGA_CLOCK_HZ,
};
use mbrx_fpga::names::{self, fields};
use mbrx_fpga::{RegisterPort, SimRegisterPort};
use mbrx_types::Unit;

#[derive(Parser, Debug)]
#[command(
    name = "beammgrd",
    about = "Multi-beam digital receiver control daemon",
    version
)]
struct Args {
    /// Board to control (requires a katcp register-port transport)
    #[arg(long)]
    board: Option<String>,

    /// Run against the built-in software register file
    #[arg(long)]
    sim: bool,

    /// Board profile (JSON); defaults to the commissioning profile
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Unit selected at startup (0 or 1)
    #[arg(long, default_value_t = 0)]
    unit: u8,

    /// Snapshot polling interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Backoff while another client holds the capture scope, in
    /// milliseconds
    #[arg(long, default_value_t = 100)]
    arb_backoff_ms: u64,
}

/// Initializes tracing/logging subsystem.
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    info!("--- starting beammgrd ---");

    let profile = match &args.profile {
        Some(path) => BoardProfile::load(path)?,
        None => BoardProfile::default(),
    };
    let unit = Unit::from_index(args.unit).context("unit must be 0 or 1")?;

    let (board, port): (String, Arc<dyn RegisterPort>) = if args.sim {
        ("sim".to_string(), Arc::new(seeded_sim()))
    } else if let Some(board) = args.board.clone() {
        bail!("no katcp transport is linked into this build; board '{board}' is unreachable, run with --sim");
    } else {
        bail!("pass --board <host> or --sim");
    };

    let session = DeviceSession::connect(board, port).await?;
    let mut dispatcher = Dispatcher::new(ConfigStore::new(session.port()), unit);
    dispatcher.refresh().await?;

    // Apply the profile through the normal command path; unchanged
    // fields produce no device traffic.
    for command in profile.commands() {
        dispatcher.handle(command).await?;
    }

    let port = session.port();
    for plan in &profile.fabric {
        fabric::bring_up(port.as_ref(), unit, plan.link, plan.own, plan.dest).await?;
    }
    dispatcher.handle(Command::Reset).await?;

    let arbiter = ScopeArbiter::new(
        session.port(),
        session.token(),
        ArbiterConfig {
            backoff: Duration::from_millis(args.arb_backoff_ms),
        },
    )?;
    let (updates_tx, mut updates_rx) = mpsc::channel::<SampleUpdate>(8);
    dispatcher
        .start_polling(
            arbiter,
            updates_tx,
            PollerConfig {
                interval: Duration::from_millis(args.poll_interval_ms),
            },
        )
        .await;

    // Log-summary renderer standing in for the plotting front end.
    let renderer = tokio::spawn(async move {
        while let Some(update) = updates_rx.recv().await {
            info!(
                unit = %update.sample.unit,
                adc_samples = update.sample.adc.0.len(),
                bins = update.sample.spectra[0].len(),
                bit_select = ?update.bit_select.fields(),
                clock = ?update.clock,
                "snapshot update"
            );
        }
    });

    signal::ctrl_c().await?;
    info!("received shutdown signal");

    dispatcher.stop_polling().await;
    renderer.await?;
    session.disconnect().await;

    info!("graceful shutdown complete");
    Ok(())
}

/// Seeds the software register file with an unconfigured board: zeroed
/// DSP registers, an idle scratchpad, a nominal clock counter and
/// synthetic capture data.
fn seeded_sim() -> SimRegisterPort {
    let port = SimRegisterPort::new();

    port.set_register(names::RCS_ID, u32::from_be_bytes(*b"mbrx"));
    port.set_register(names::RCS_VER, 1 << 16);
    port.set_register(names::RCS_TIMESTAMP, 1_700_000_000);
    port.set_register(names::SYS_SCRATCHPAD, names::SCOPE_IDLE);
    port.install_counter(names::SYS_CLKCOUNTER, 0, FPGA_CLOCK_HZ);
    port.set_register(names::REG_USE_TVG, 0);

    for name in [
        fields::NOISECAL_DELAY,
        fields::NOISECAL_ON,
        fields::NOISECAL_OFF,
    ] {
        port.set_register(name, 0);
        port.set_register(&names::hipart(name), 0);
    }

    for unit in Unit::ALL {
        for field in [
            fields::BEAM_ID,
            fields::FFT_SHIFT,
            fields::GAIN,
            fields::ACC_LEN,
            fields::BIT_SELECT,
        ] {
            port.set_register(&names::unit_reg(unit, field), 0);
        }
        for link in 0..names::FABRIC_LINKS_PER_UNIT {
            port.set_register(&names::fabric_reg(unit, link, fields::DEST_IP), 0);
            port.set_register(&names::fabric_reg(unit, link, fields::DEST_PORT), 0);
        }

        // A ramp on channel 0, half scale on channel 1.
        let mut adc = Vec::with_capacity(1024);
        for frame in 0..128u32 {
            let level = (frame as i32 - 64) as i8;
            adc.extend([level as u8; 4]);
            adc.extend([(level / 2) as u8; 4]);
        }
        port.load_snapshot(&names::adc_scope(unit), adc);

        for (index, channel) in names::SPECTRUM_SCOPES.iter().enumerate() {
            let mut buf = Vec::with_capacity(1024 * 4);
            for bin in 0..1024u32 {
                let value = (bin * (index as u32 + 1)) % 4096;
                buf.extend(value.to_be_bytes());
            }
            port.load_snapshot(&names::spectrum_scope(unit, channel), buf);
        }
    }

    port
}
