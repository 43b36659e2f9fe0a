//! Protocol output configuration, legacy and key/value receivers

mod common;

use common::*;
use gnsslink_core::core::protocol_out::cfg_val_key;
use gnsslink_core::{
    DeviceSettings, GnssDevice, GnssError, ManualClock, ModuleType, Protocol, Transport,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[test]
fn test_legacy_switch_on() {
    let (device, state) = uart_device(ModuleType::M8);
    device.set_protocol_out(Protocol::Rtcm, true).unwrap();

    let state = state.lock();
    assert_eq!(state.out_mask(), 0x0023);
    // MON-MSGPP, CFG-PRT poll, CFG-PRT write, MON-MSGPP
    assert_eq!(state.received.len(), 4);
}

#[test]
fn test_legacy_switch_off_keeps_other_bits() {
    let (device, state) = uart_device(ModuleType::M8);
    device.set_protocol_out(Protocol::Nmea, false).unwrap();
    assert_eq!(state.lock().out_mask(), 0x0001);
    // Rest of the port setup is written back unchanged
    assert_eq!(state.lock().cfg_prt[12], 0x03);
}

#[test]
fn test_legacy_lost_write_detected() {
    let (device, state) = uart_device(ModuleType::M8);
    state.lock().uncounted.insert((CLASS_CFG, CFG_PRT));
    let err = device.set_protocol_out(Protocol::Rtcm, true).unwrap_err();
    assert!(matches!(err, GnssError::Platform(_)));
}

#[test]
fn test_legacy_get() {
    let (device, state) = uart_device(ModuleType::M8);
    state.lock().cfg_prt[14] = 0x21;
    let set = device.get_protocol_out().unwrap();
    assert!(set.contains(Protocol::Ubx));
    assert!(!set.contains(Protocol::Nmea));
    assert!(set.contains(Protocol::Rtcm));
}

#[test]
fn test_modern_set_writes_key() {
    let (device, state) = uart_device(ModuleType::M9);
    device.set_protocol_out(Protocol::Nmea, false).unwrap();
    device.set_protocol_out(Protocol::Rtcm, true).unwrap();

    let state = state.lock();
    assert_eq!(state.config.get(&0x1074_0002), Some(&0));
    assert_eq!(state.config.get(&0x1074_0004), Some(&1));
    // No CFG-PRT traffic on a key/value receiver
    assert!(state.received.iter().all(|f| f[3] == CFG_VALSET));
}

#[test]
fn test_modern_set_all_on() {
    let (device, state) = uart_device(ModuleType::M10);
    device.set_protocol_out(Protocol::All, true).unwrap();
    let state = state.lock();
    for item in [1, 2, 4] {
        assert_eq!(state.config.get(&cfg_val_key(0x74, item)), Some(&1));
    }
}

#[test]
fn test_modern_get() {
    let (device, state) = uart_device(ModuleType::M9);
    {
        let mut state = state.lock();
        state.config.insert(cfg_val_key(0x74, 1), 1);
        state.config.insert(cfg_val_key(0x74, 2), 0);
        state.config.insert(cfg_val_key(0x74, 4), 1);
        // Another port's setting
        state.config.insert(cfg_val_key(0x76, 2), 1);
    }
    let set = device.get_protocol_out().unwrap();
    assert_eq!(set.to_string(), "UBX|RTCM");
}

#[test]
fn test_modern_nack() {
    let (device, state) = uart_device(ModuleType::M9);
    state.lock().nak.insert((CLASS_CFG, CFG_VALSET));
    let err = device.set_protocol_out(Protocol::Nmea, true).unwrap_err();
    assert!(err.is_nack());
}

#[test]
fn test_ubx_cannot_be_switched_off() {
    let (device, state) = uart_device(ModuleType::M9);
    for protocol in [Protocol::Ubx, Protocol::All] {
        let err = device.set_protocol_out(protocol, false).unwrap_err();
        assert!(matches!(err, GnssError::InvalidParameter(_)));
    }
    assert!(state.lock().received.is_empty());
}

#[test]
fn test_modern_bad_port_number() {
    let state: Shared = Arc::new(Mutex::new(SimState::default()));
    let settings = DeviceSettings {
        port_number: 5,
        ..test_settings()
    };
    let device = GnssDevice::with_clock(
        ModuleType::M9,
        Transport::Uart(Box::new(SimUart(Arc::clone(&state)))),
        settings,
        Arc::new(ManualClock::new()),
    )
    .unwrap();
    assert!(matches!(
        device.set_protocol_out(Protocol::Nmea, true),
        Err(GnssError::InvalidParameter(_))
    ));
}

#[test]
fn test_not_over_at_tunnel() {
    let (at, _) = StubAt::new("");
    let device = GnssDevice::with_clock(
        ModuleType::M9,
        Transport::At(Box::new(at)),
        DeviceSettings::default(),
        Arc::new(ManualClock::new()),
    )
    .unwrap();
    assert!(matches!(
        device.set_protocol_out(Protocol::Nmea, true),
        Err(GnssError::InvalidParameter(_))
    ));
    assert!(matches!(device.get_protocol_out(), Err(GnssError::NotSupported(_))));
}
