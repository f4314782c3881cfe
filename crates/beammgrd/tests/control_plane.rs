//! End-to-end control flow against the software register file.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use mbrx_beammgrd::{
    fabric, ArbiterConfig, Command, ConfigStore, DeviceSession, Dispatcher, PollerConfig,
    ScopeArbiter, Spectrum, FPGA_CLOCK_HZ,
};
use mbrx_fpga::names::{self, fields, SCOPE_IDLE, SYS_SCRATCHPAD};
use mbrx_fpga::{PortOp, SimRegisterPort};
use mbrx_types::{Endpoint, MacAddress, Unit};

/// A board with firmware identity, idle capture scope, nominal clock,
/// zeroed configuration and loaded capture scopes.
fn seeded_board() -> Arc<SimRegisterPort> {
    let port = Arc::new(SimRegisterPort::new());

    port.set_register(names::RCS_ID, u32::from_be_bytes(*b"mbrx"));
    port.set_register(names::RCS_VER, 1 << 16 | 172);
    port.set_register(names::RCS_TIMESTAMP, 1_700_000_000);
    port.set_register(SYS_SCRATCHPAD, SCOPE_IDLE);
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
        port.set_register(&names::unit_reg(unit, fields::BEAM_ID), 1);
        port.set_register(&names::unit_reg(unit, fields::FFT_SHIFT), 0xFFFF);
        port.set_register(&names::unit_reg(unit, fields::GAIN), 0x0100_0100);
        port.set_register(&names::unit_reg(unit, fields::ACC_LEN), 100);
        port.set_register(&names::unit_reg(unit, fields::BIT_SELECT), 0b01010101);
        for link in 0..names::FABRIC_LINKS_PER_UNIT {
            port.set_register(&names::fabric_reg(unit, link, fields::DEST_IP), 0);
            port.set_register(&names::fabric_reg(unit, link, fields::DEST_PORT), 0);
        }

        port.load_snapshot(&names::adc_scope(unit), vec![unit.index() as u8 + 1; 32]);
        for channel in names::SPECTRUM_SCOPES {
            port.load_snapshot(
                &names::spectrum_scope(unit, channel),
                vec![0x00, 0x00, 0x01, 0x00].repeat(8),
            );
        }
    }

    port
}

fn arbiter_for(session: &DeviceSession) -> ScopeArbiter {
    ScopeArbiter::new(
        session.port(),
        session.token(),
        ArbiterConfig {
            backoff: Duration::from_millis(1),
        },
    )
    .unwrap()
}

#[tokio::test]
async fn configure_bring_up_and_poll() {
    let port = seeded_board();

    let session = DeviceSession::connect("r1745", port.clone()).await.unwrap();
    assert_eq!(session.firmware().version, (1, 172));

    let mut dispatcher = Dispatcher::new(ConfigStore::new(session.port()), Unit::Unit0);
    dispatcher.refresh().await.unwrap();

    // Configuration flows through the command path; only deltas reach
    // the device.
    port.clear_journal();
    dispatcher.handle(Command::SetBeamId(3)).await.unwrap();
    dispatcher.handle(Command::SetFftShift(0xFFFF)).await.unwrap();
    dispatcher
        .handle(Command::SetDigitalGain {
            channel: 1,
            value: 0x0180,
        })
        .await
        .unwrap();
    assert_eq!(port.register("u0_beam_id"), Some(3));
    assert_eq!(port.write_count("u0_fft_shift"), 0);
    assert_eq!(port.register("u0_gain"), Some(0x0180_0100));

    // Fabric bring-up: tap with derived MAC, destination registers,
    // zeroed ARP entry at the destination-indexed offset.
    let own: Endpoint = "192.168.16.223:33333".parse().unwrap();
    let dest: Endpoint = "239.1.2.3:12345".parse().unwrap();
    fabric::bring_up(port.as_ref(), Unit::Unit0, 2, own, dest)
        .await
        .unwrap();

    let (core, mac, ip, udp) = port.tap("xgbe2").unwrap();
    assert_eq!(core, "xgbe2_core");
    assert_eq!(mac, MacAddress::for_ip(own.ip));
    assert_eq!((ip, udp), (own.ip, 33333));
    assert_eq!(port.register("xgbe2_dest_ip"), Some(0xEF01_0203));
    assert_eq!(port.register("xgbe2_dest_port"), Some(12345));
    assert!(port.journal().contains(&PortOp::WriteBytes {
        name: "xgbe2_core".into(),
        offset: 0x3000 + 8 * 3,
        data: vec![0u8; 8],
    }));

    // Poll one snapshot: arbitration, capture, publish, release.
    let (updates_tx, mut updates_rx) = mpsc::channel(4);
    dispatcher
        .start_polling(
            arbiter_for(&session),
            updates_tx,
            PollerConfig {
                interval: Duration::from_millis(5),
            },
        )
        .await;

    let update = updates_rx.recv().await.unwrap();
    assert_eq!(update.sample.unit, Unit::Unit0);
    assert_eq!(update.sample.adc.0, vec![1; 16]);
    assert_eq!(update.bit_select.fields(), [1, 1, 1, 1]);
    assert_eq!(update.sample.spectra[0], Spectrum::Auto(vec![256; 8]));

    dispatcher.stop_polling().await;
    assert_eq!(port.register(SYS_SCRATCHPAD), Some(SCOPE_IDLE));

    session.disconnect().await;
}

#[tokio::test]
async fn restarting_the_poller_replaces_the_old_one() {
    let port = seeded_board();
    let session = DeviceSession::connect("r1746", port.clone()).await.unwrap();
    let mut dispatcher = Dispatcher::new(ConfigStore::new(session.port()), Unit::Unit0);
    dispatcher.refresh().await.unwrap();

    let config = PollerConfig {
        interval: Duration::from_millis(5),
    };
    let (tx1, mut rx1) = mpsc::channel(4);
    dispatcher
        .start_polling(arbiter_for(&session), tx1, config.clone())
        .await;
    rx1.recv().await.unwrap();

    // Starting again stops and joins the first poller before the new
    // one runs: its sender is dropped, so rx1 terminates.
    let (tx2, mut rx2) = mpsc::channel(4);
    dispatcher
        .start_polling(arbiter_for(&session), tx2, config)
        .await;
    while rx1.try_recv().is_ok() {}
    assert!(rx1.recv().await.is_none());
    assert!(rx2.recv().await.is_some());

    dispatcher.stop_polling().await;
    assert_eq!(port.register(SYS_SCRATCHPAD), Some(SCOPE_IDLE));
}

#[tokio::test]
async fn unit_selection_redirects_polling() {
    let port = seeded_board();
    let session = DeviceSession::connect("r1747", port.clone()).await.unwrap();
    let mut dispatcher = Dispatcher::new(ConfigStore::new(session.port()), Unit::Unit0);
    dispatcher.refresh().await.unwrap();

    let (updates_tx, mut updates_rx) = mpsc::channel(4);
    dispatcher
        .start_polling(
            arbiter_for(&session),
            updates_tx,
            PollerConfig {
                interval: Duration::from_millis(5),
            },
        )
        .await;
    assert_eq!(updates_rx.recv().await.unwrap().sample.unit, Unit::Unit0);

    dispatcher
        .handle(Command::SelectUnit(Unit::Unit1))
        .await
        .unwrap();
    loop {
        let update = updates_rx.recv().await.unwrap();
        if update.sample.unit == Unit::Unit1 {
            assert_eq!(update.sample.adc.0, vec![2; 16]);
            break;
        }
    }

    dispatcher.stop_polling().await;
}
