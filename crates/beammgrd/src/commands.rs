//! Control command dispatch.
//!
//! Every configuration operation enters the control plane as a
//! [`Command`] routed through one [`Dispatcher`], which owns the
//! configuration store and the poller context. This keeps the core
//! independent of whatever front end produces the commands.

use crate::arbiter::ScopeArbiter;
use crate::error::BeamResult;
use crate::poller::{PollContext, PollerConfig, SampleUpdate, SnapshotPoller};
use crate::store::ConfigStore;
use mbrx_types::{Endpoint, Unit};
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// One control operation against the currently selected unit (or the
/// board, for the noise-calibration counters).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Select the unit subsequent commands and polling apply to.
    SelectUnit(Unit),
    /// Re-read board and unit configuration from the device.
    Refresh,
    /// Set the beam identifier.
    SetBeamId(u32),
    /// Set the FFT shift schedule.
    SetFftShift(u32),
    /// Set one channel of the digital gain pair.
    SetDigitalGain { channel: usize, value: u16 },
    /// Set the accumulation length (resets the unit as a side effect).
    SetAccLen(u32),
    /// Set one output bit-slice selector.
    SetBitSelect { index: usize, value: u8 },
    /// Set a fabric link's destination endpoint.
    SetDestEndpoint { link: usize, endpoint: Endpoint },
    /// Rebind a fabric link's own endpoint.
    SetFabricEndpoint { link: usize, endpoint: Endpoint },
    /// Enable or disable the test vector generator.
    SetTvg(bool),
    /// Set the noise-calibration start delay.
    SetNoiseCalDelay(u64),
    /// Set the noise-calibration on period.
    SetNoiseCalOn(u64),
    /// Set the noise-calibration off period.
    SetNoiseCalOff(u64),
    /// Pulse the unit's reset line.
    Reset,
    /// Pulse the unit's arm line.
    Arm,
}

/// Routes commands into the configuration store and keeps the poller's
/// context in step with the foreground selection.
pub struct Dispatcher {
    store: ConfigStore,
    unit: Unit,
    ctx_tx: watch::Sender<PollContext>,
    poller: Option<SnapshotPoller>,
}

impl Dispatcher {
    /// Creates a dispatcher over a store with an initial unit selection.
    pub fn new(store: ConfigStore, unit: Unit) -> Self {
        let (ctx_tx, _) = watch::channel(PollContext {
            unit,
            bit_select: Default::default(),
        });
        Dispatcher {
            store,
            unit,
            ctx_tx,
            poller: None,
        }
    }

    /// The currently selected unit.
    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// The configuration store.
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// A receiver of the poller context this dispatcher maintains.
    pub fn context(&self) -> watch::Receiver<PollContext> {
        self.ctx_tx.subscribe()
    }

    /// Re-reads board and selected-unit configuration from the device.
    pub async fn refresh(&mut self) -> BeamResult<()> {
        self.store.refresh_board().await?;
        self.store.refresh_unit(self.unit).await?;
        self.sync_context();
        Ok(())
    }

    /// Executes one command.
    pub async fn handle(&mut self, command: Command) -> BeamResult<()> {
        debug!(?command, "dispatching");
        match command {
            Command::SelectUnit(unit) => {
                self.unit = unit;
                self.store.refresh_unit(unit).await?;
                self.sync_context();
            }
            Command::Refresh => self.refresh().await?,
            Command::SetBeamId(id) => self.store.set_beam_id(self.unit, id).await?,
            Command::SetFftShift(value) => self.store.set_fft_shift(self.unit, value).await?,
            Command::SetDigitalGain { channel, value } => {
                self.store.set_digital_gain(self.unit, channel, value).await?
            }
            Command::SetAccLen(value) => self.store.set_acc_len(self.unit, value).await?,
            Command::SetBitSelect { index, value } => {
                self.store.set_bit_select(self.unit, index, value).await?;
                self.sync_context();
            }
            Command::SetDestEndpoint { link, endpoint } => {
                self.store.set_dest_endpoint(self.unit, link, endpoint).await?
            }
            Command::SetFabricEndpoint { link, endpoint } => {
                self.store.set_fabric_endpoint(self.unit, link, endpoint).await?
            }
            Command::SetTvg(enabled) => self.store.set_tvg(self.unit, enabled).await?,
            Command::SetNoiseCalDelay(value) => self.store.set_noisecal_delay(value).await?,
            Command::SetNoiseCalOn(value) => self.store.set_noisecal_on(value).await?,
            Command::SetNoiseCalOff(value) => self.store.set_noisecal_off(value).await?,
            Command::Reset => self.store.reset(self.unit).await?,
            Command::Arm => self.store.arm(self.unit).await?,
        }
        Ok(())
    }

    /// Starts the background poller, stopping and joining any previous
    /// one first so at most one runs per session.
    pub async fn start_polling(
        &mut self,
        arbiter: ScopeArbiter,
        updates: mpsc::Sender<SampleUpdate>,
        config: PollerConfig,
    ) {
        self.stop_polling().await;
        let poller =
            SnapshotPoller::start(self.store.port(), arbiter, self.context(), updates, config);
        self.poller = Some(poller);
    }

    /// Stops and joins the background poller, if one is running.
    pub async fn stop_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop().await;
        }
    }

    fn sync_context(&self) {
        let bit_select = self
            .store
            .unit(self.unit)
            .map(|cfg| cfg.bit_select)
            .unwrap_or_default();
        self.ctx_tx.send_replace(PollContext {
            unit: self.unit,
            bit_select,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbrx_fpga::names::{self, fields};
    use mbrx_fpga::SimRegisterPort;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn seeded() -> (Arc<SimRegisterPort>, Dispatcher) {
        let port = Arc::new(SimRegisterPort::new());
        for unit in Unit::ALL {
            port.set_register(&names::unit_reg(unit, fields::BEAM_ID), 1);
            port.set_register(&names::unit_reg(unit, fields::FFT_SHIFT), 0xFFFF);
            port.set_register(&names::unit_reg(unit, fields::GAIN), 0x0100_0100);
            port.set_register(&names::unit_reg(unit, fields::ACC_LEN), 100);
            port.set_register(
                &names::unit_reg(unit, fields::BIT_SELECT),
                if unit == Unit::Unit0 { 0b01010101 } else { 0 },
            );
            for link in 0..names::FABRIC_LINKS_PER_UNIT {
                port.set_register(&names::fabric_reg(unit, link, fields::DEST_IP), 0);
                port.set_register(&names::fabric_reg(unit, link, fields::DEST_PORT), 0);
            }
        }
        port.set_register(names::REG_USE_TVG, 0);
        for name in [
            fields::NOISECAL_DELAY,
            fields::NOISECAL_ON,
            fields::NOISECAL_OFF,
        ] {
            port.set_register(name, 0);
            port.set_register(&names::hipart(name), 0);
        }
        let store = ConfigStore::new(port.clone());
        (port, Dispatcher::new(store, Unit::Unit0))
    }

    #[tokio::test]
    async fn test_commands_route_to_selected_unit() {
        let (port, mut dispatcher) = seeded();
        dispatcher.refresh().await.unwrap();

        dispatcher.handle(Command::SetBeamId(7)).await.unwrap();
        assert_eq!(port.register("u0_beam_id"), Some(7));

        dispatcher
            .handle(Command::SelectUnit(Unit::Unit1))
            .await
            .unwrap();
        dispatcher.handle(Command::SetBeamId(8)).await.unwrap();
        assert_eq!(port.register("u1_beam_id"), Some(8));
        assert_eq!(port.register("u0_beam_id"), Some(7));
    }

    #[tokio::test]
    async fn test_selection_updates_poll_context() {
        let (_port, mut dispatcher) = seeded();
        let ctx = dispatcher.context();
        dispatcher.refresh().await.unwrap();

        assert_eq!(ctx.borrow().bit_select.fields(), [1, 1, 1, 1]);

        dispatcher
            .handle(Command::SelectUnit(Unit::Unit1))
            .await
            .unwrap();
        assert_eq!(ctx.borrow().unit, Unit::Unit1);
        assert_eq!(ctx.borrow().bit_select.fields(), [0, 0, 0, 0]);

        dispatcher
            .handle(Command::SetBitSelect { index: 0, value: 2 })
            .await
            .unwrap();
        assert_eq!(ctx.borrow().bit_select.fields(), [2, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_reset_and_arm_pulse_selected_unit() {
        let (port, mut dispatcher) = seeded();
        dispatcher.refresh().await.unwrap();
        dispatcher
            .handle(Command::SelectUnit(Unit::Unit1))
            .await
            .unwrap();
        port.clear_journal();

        dispatcher.handle(Command::Reset).await.unwrap();
        assert_eq!(port.register(names::REG_RESET), Some(0b10));
        assert_eq!(port.write_count(names::REG_RESET), 2);
    }

    #[tokio::test]
    async fn test_noisecal_commands_hit_board_scope() {
        let (port, mut dispatcher) = seeded();
        dispatcher.refresh().await.unwrap();

        dispatcher
            .handle(Command::SetNoiseCalDelay(0x2_0000_0003))
            .await
            .unwrap();
        assert_eq!(port.register("noisecal_delay"), Some(3));
        assert_eq!(port.register("noisecal_delay_hipart"), Some(2));
    }
}
