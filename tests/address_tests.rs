use mcremote::address::{DeviceAddress, MAX_ADDRESS_LEN};
use mcremote::device::{DallasDevice, Device, DeviceKind, DeviceRegistry};
use mcremote::error::AddressError;
use mcremote::identity::{node_id_from_mac, BusFamily, DeviceIdentity};

#[test]
fn test_oversized_address_is_rejected_not_truncated() {
    let raw = [0x28u8; MAX_ADDRESS_LEN + 1];
    assert_eq!(
        DeviceAddress::from_bytes(&raw),
        Err(AddressError::TooLong(MAX_ADDRESS_LEN + 1))
    );

    let max = DeviceAddress::from_bytes(&raw[..MAX_ADDRESS_LEN]).unwrap();
    assert_eq!(max.len(), MAX_ADDRESS_LEN);
    assert_eq!(max.hex().len(), 2 * MAX_ADDRESS_LEN);
}

#[test]
fn test_empty_slice_is_rejected() {
    assert_eq!(DeviceAddress::from_bytes(&[]), Err(AddressError::Empty));
}

#[test]
fn test_validity_tracks_sentinel_for_every_length() {
    for len in 1..=MAX_ADDRESS_LEN {
        let mut raw = vec![0x3au8; len];
        assert!(DeviceAddress::from_bytes(&raw).unwrap().is_valid());

        raw[0] = 0x00;
        assert!(!DeviceAddress::from_bytes(&raw).unwrap().is_valid());
    }
}

#[test]
fn test_byte_indexing_is_positional_and_bounded() {
    let addr = DeviceAddress::from_bytes(&[0x28, 0xff, 0x64, 0x0e]).unwrap();

    assert_eq!(addr.byte_at(0), Some(0x28));
    assert_eq!(addr.byte_at(1), Some(0xff));
    assert_eq!(addr.byte_at(3), Some(0x0e));
    assert_eq!(addr.byte_at(4), None);
    assert_eq!(addr.byte_at(MAX_ADDRESS_LEN), None);
}

#[test]
fn test_window_comparison_is_asymmetric() {
    let short = DeviceAddress::from_byte(0x28);
    let long = DeviceAddress::from_bytes(&[0x28, 0xff, 0x64, 0x0e, 0x71, 0x16, 0x03, 0x62]).unwrap();

    // The left operand's length governs the comparison window.
    assert!(short.matches(&long));
    assert!(!long.matches(&short));

    // Structural equality stays symmetric.
    assert_ne!(short, long);
    assert_eq!(long, long);
}

#[test]
fn test_hex_rendering_is_lowercase_and_zero_padded() {
    let addr = DeviceAddress::from_bytes(&[0x02, 0xab, 0x00, 0xff]).unwrap();
    assert_eq!(addr.hex().as_str(), "02ab00ff");
}

#[test]
fn test_identity_equality_follows_hex_equality() {
    let a = DeviceAddress::from_bytes(&[0x28, 0x01, 0x02]).unwrap();
    let b = DeviceAddress::from_bytes(&[0x28, 0x01, 0x02]).unwrap();
    let c = DeviceAddress::from_bytes(&[0x28, 0x01, 0x03]).unwrap();

    let id_a = DeviceIdentity::derive(BusFamily::OneWire, &a);
    let id_b = DeviceIdentity::derive(BusFamily::OneWire, &b);
    let id_c = DeviceIdentity::derive(BusFamily::OneWire, &c);

    assert_eq!(a.hex(), b.hex());
    assert_eq!(id_a, id_b);
    assert_ne!(a.hex(), c.hex());
    assert_ne!(id_a, id_c);
}

#[test]
fn test_identity_carries_family_prefix() {
    let addr = DeviceAddress::from_byte(0x48);
    assert_eq!(
        DeviceIdentity::derive(BusFamily::I2c, &addr).as_str(),
        "i2c-48"
    );
    assert_eq!(
        DeviceIdentity::derive(BusFamily::Local, &addr).as_str(),
        "pwm-48"
    );
}

#[test]
fn test_registry_insert_is_idempotent_per_identity() {
    let mut registry = DeviceRegistry::new();
    let addr = DeviceAddress::from_bytes(&[0x28, 0xaa, 0xbb]).unwrap();

    let first = Device::new(addr, DeviceKind::Dallas(DallasDevice::from_address(&addr, false)));
    let second = Device::new(addr, DeviceKind::Dallas(DallasDevice::from_address(&addr, true)));

    registry.register(first).unwrap();
    registry.register(second).unwrap();
    assert_eq!(registry.len(), 1);

    // Re-registration refreshed the family payload.
    let known = registry.lookup("ow-28aabb").unwrap();
    match known.kind() {
        DeviceKind::Dallas(dallas) => assert!(dallas.parasite_powered),
        other => panic!("unexpected kind {:?}", other),
    }
}

#[test]
fn test_registry_address_lookup_uses_window_comparison() {
    let mut registry = DeviceRegistry::new();
    let full = DeviceAddress::from_bytes(&[0x29, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]).unwrap();
    let kind = DeviceKind::Dallas(DallasDevice::from_address(&full, false));
    registry.register(Device::new(full, kind)).unwrap();

    let probe = DeviceAddress::from_byte(0x29);
    let found = registry.find_by_address(BusFamily::OneWire, &probe).unwrap();
    assert_eq!(found.identity().as_str(), "ow-2911223344556677");

    // Same probe on the wrong family misses.
    assert!(registry.find_by_address(BusFamily::I2c, &probe).is_none());
}

#[test]
fn test_node_id_is_derived_from_mac_once() {
    let mac = [0xde, 0xad, 0xbe, 0xef, 0x00, 0x01];
    assert_eq!(node_id_from_mac(&mac).as_str(), "node-deadbeef0001");
    assert_eq!(node_id_from_mac(&mac), node_id_from_mac(&mac));
}
