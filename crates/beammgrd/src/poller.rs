//! Background snapshot poller.
//!
//! One poller task runs per open session. Each cycle it takes the
//! capture scope through the arbiter, captures and decodes a sample for
//! the currently selected unit, attaches a clock-health reading and
//! publishes the result. Transient transport failures are logged and
//! retried on the next cycle rather than killing the loop.
//!
//! Cancellation is cooperative with join semantics:
//! [`SnapshotPoller::stop`] returns only after the loop has observed
//! the signal and exited, so no capture is left half-published.

use crate::arbiter::ScopeArbiter;
use crate::health::{ClockHealth, ClockValidator, FPGA_CLOCK_HZ};
use crate::snapshot::{self, SnapshotSample};
use mbrx_fpga::names::SYS_CLKCOUNTER;
use mbrx_fpga::RegisterPort;
use mbrx_types::{BitSelect, Unit};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What the poller needs to know about the foreground's selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollContext {
    /// The unit snapshots are captured from.
    pub unit: Unit,
    /// The unit's bit-select mirror, forwarded to the renderer so it
    /// can label the displayed slices.
    pub bit_select: BitSelect,
}

/// One published snapshot update.
#[derive(Debug, Clone)]
pub struct SampleUpdate {
    /// The decoded sample.
    pub sample: SnapshotSample,
    /// Bit-select fields in effect at capture time.
    pub bit_select: BitSelect,
    /// Clock-health reading, `None` until a baseline exists.
    pub clock: Option<ClockHealth>,
}

/// Poller configuration.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Wait between poll cycles.
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        PollerConfig {
            interval: Duration::from_secs(1),
        }
    }
}

/// Handle to the background poller task.
pub struct SnapshotPoller {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SnapshotPoller {
    /// Spawns the poller task.
    pub fn start(
        port: Arc<dyn RegisterPort>,
        arbiter: ScopeArbiter,
        context: watch::Receiver<PollContext>,
        updates: mpsc::Sender<SampleUpdate>,
        config: PollerConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            run_loop(port, arbiter, context, updates, config, task_cancel).await;
        });
        info!("snapshot poller started");
        SnapshotPoller { cancel, handle }
    }

    /// Requests stop and waits for the loop to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "snapshot poller task failed");
        }
        info!("snapshot poller stopped");
    }
}

async fn run_loop(
    port: Arc<dyn RegisterPort>,
    arbiter: ScopeArbiter,
    context: watch::Receiver<PollContext>,
    updates: mpsc::Sender<SampleUpdate>,
    config: PollerConfig,
    cancel: CancellationToken,
) {
    let mut validator = ClockValidator::new(FPGA_CLOCK_HZ);
    loop {
        let ctx = *context.borrow();
        let result = arbiter
            .with_scope(|| {
                let port = port.clone();
                async move { snapshot::capture_sample(port.as_ref(), ctx.unit).await }
            })
            .await;

        match result {
            Ok(sample) => {
                let clock = read_clock(port.as_ref(), &mut validator).await;
                let update = SampleUpdate {
                    sample,
                    bit_select: ctx.bit_select,
                    clock,
                };
                if updates.send(update).await.is_err() {
                    debug!("update receiver dropped; stopping poller");
                    return;
                }
            }
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "snapshot poll failed; retrying next cycle");
            }
            Err(e) => {
                error!(error = %e, "snapshot poll failed");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sleep(config.interval) => {}
        }
    }
}

async fn read_clock(
    port: &dyn RegisterPort,
    validator: &mut ClockValidator,
) -> Option<ClockHealth> {
    match port.read_u32(SYS_CLKCOUNTER).await {
        Ok(count) => validator.observe(count),
        Err(e) => {
            warn!(error = %e, "clock counter read failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::{ArbiterConfig, ScopeArbiter, ScopeToken};
    use mbrx_fpga::names::{self, SCOPE_IDLE, SYS_SCRATCHPAD};
    use mbrx_fpga::SimRegisterPort;
    use pretty_assertions::assert_eq;

    fn seeded_port() -> Arc<SimRegisterPort> {
        let port = Arc::new(SimRegisterPort::new());
        port.set_register(SYS_SCRATCHPAD, SCOPE_IDLE);
        port.install_counter(names::SYS_CLKCOUNTER, 0, FPGA_CLOCK_HZ);
        for unit in Unit::ALL {
            port.load_snapshot(&names::adc_scope(unit), vec![unit.index() as u8; 16]);
            for channel in names::SPECTRUM_SCOPES {
                port.load_snapshot(&names::spectrum_scope(unit, channel), vec![0; 16]);
            }
        }
        port
    }

    fn arbiter_for(port: &Arc<SimRegisterPort>) -> ScopeArbiter {
        ScopeArbiter::new(
            port.clone(),
            ScopeToken::generate(),
            ArbiterConfig {
                backoff: Duration::from_millis(1),
            },
        )
        .unwrap()
    }

    fn fast() -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_publishes_updates_and_releases_scope() {
        let port = seeded_port();
        let (_ctx_tx, ctx_rx) = watch::channel(PollContext::default());
        let (tx, mut rx) = mpsc::channel(4);

        let poller =
            SnapshotPoller::start(port.clone(), arbiter_for(&port), ctx_rx, tx, fast());

        let update = rx.recv().await.unwrap();
        assert_eq!(update.sample.unit, Unit::Unit0);
        assert_eq!(update.sample.adc.0, vec![0; 8]);

        poller.stop().await;
        assert_eq!(port.register(SYS_SCRATCHPAD), Some(SCOPE_IDLE));
    }

    #[tokio::test]
    async fn test_stop_joins_and_closes_stream() {
        let port = seeded_port();
        let (_ctx_tx, ctx_rx) = watch::channel(PollContext::default());
        let (tx, mut rx) = mpsc::channel(64);

        let poller =
            SnapshotPoller::start(port.clone(), arbiter_for(&port), ctx_rx, tx, fast());
        rx.recv().await.unwrap();
        poller.stop().await;

        // The task has exited, so the sender is gone: after draining,
        // the stream ends rather than producing fresh captures.
        while rx.try_recv().is_ok() {}
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_transient_failure_retried_next_cycle() {
        let port = seeded_port();
        let adc = names::adc_scope(Unit::Unit0);
        port.fail_on(&adc);

        let (_ctx_tx, ctx_rx) = watch::channel(PollContext::default());
        let (tx, mut rx) = mpsc::channel(4);
        let poller =
            SnapshotPoller::start(port.clone(), arbiter_for(&port), ctx_rx, tx, fast());

        // Poller keeps cycling without publishing while the fault holds.
        sleep(Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_err());
        // Failed cycles still restored the idle sentinel.
        assert_eq!(port.register(SYS_SCRATCHPAD), Some(SCOPE_IDLE));

        port.clear_fault(&adc);
        assert!(rx.recv().await.is_some());
        poller.stop().await;
    }

    #[tokio::test]
    async fn test_follows_unit_selection() {
        let port = seeded_port();
        let (ctx_tx, ctx_rx) = watch::channel(PollContext::default());
        let (tx, mut rx) = mpsc::channel(4);
        let poller =
            SnapshotPoller::start(port.clone(), arbiter_for(&port), ctx_rx, tx, fast());

        assert_eq!(rx.recv().await.unwrap().sample.unit, Unit::Unit0);

        ctx_tx.send_replace(PollContext {
            unit: Unit::Unit1,
            bit_select: BitSelect::default(),
        });
        loop {
            let update = rx.recv().await.unwrap();
            if update.sample.unit == Unit::Unit1 {
                assert_eq!(update.sample.adc.0, vec![1; 8]);
                break;
            }
        }
        poller.stop().await;
    }
}
