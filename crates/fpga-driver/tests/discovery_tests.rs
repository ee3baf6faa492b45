//! Discovery, token and handle ownership tests
//!
//! Run against the simulated platform; no hardware required.

use fpga_driver::{
    AccessMode, ErrorKind, FpgaManager, HalConfig, ObjectType, PciAddress, Properties, SimCard,
    SimPlatform, Token,
};
use std::sync::Arc;

fn two_card_manager() -> FpgaManager {
    let second = SimCard {
        pci: PciAddress::parse("0000:af:00.0").unwrap(),
        socket_id: 1,
        ..SimCard::default()
    };
    FpgaManager::new(
        Arc::new(SimPlatform::new([SimCard::default(), second])),
        HalConfig::default(),
    )
}

#[test]
fn test_match_count_independent_of_max_results() {
    let mgr = two_card_manager();
    let filters = [Properties::new().with_object_type(ObjectType::Accelerator)];

    let counted = mgr.enumerate(&filters, 0).unwrap().match_count;
    for max in [1, 2, 5, 100] {
        let found = mgr.enumerate(&filters, max).unwrap();
        assert_eq!(found.match_count, counted, "max_results={max}");
        assert_eq!(found.tokens.len(), max.min(counted));
    }
}

#[test]
fn test_object_kind_filter() {
    let mgr = FpgaManager::simulated();
    let devices = mgr
        .enumerate(&[Properties::new().with_object_type(ObjectType::Device)], 10)
        .unwrap();
    assert_eq!(devices.match_count, 1);

    let props = mgr.properties(&devices.tokens[0]).unwrap();
    assert_eq!(props.object_type, ObjectType::Device);
}

#[test]
fn test_structural_filters() {
    let mgr = two_card_manager();

    let on_socket_1 = mgr
        .enumerate(&[Properties::new().with_socket_id(1)], 10)
        .unwrap();
    assert_eq!(on_socket_1.match_count, 2);
    for token in &on_socket_1.tokens {
        assert_eq!(mgr.properties(token).unwrap().pci.bus, 0xaf);
    }

    let nowhere = mgr
        .enumerate(&[Properties::new().with_bus(0x01)], 10)
        .unwrap();
    assert_eq!(nowhere.match_count, 0);
    assert!(nowhere.tokens.is_empty());
}

#[test]
fn test_device_precedes_its_accelerators() {
    let mgr = two_card_manager();
    let found = mgr.enumerate(&[], 10).unwrap();
    let kinds: Vec<ObjectType> = found
        .tokens
        .iter()
        .map(|t| mgr.properties(t).unwrap().object_type)
        .collect();
    assert_eq!(
        kinds,
        vec![
            ObjectType::Device,
            ObjectType::Accelerator,
            ObjectType::Device,
            ObjectType::Accelerator
        ]
    );
}

#[test]
fn test_malformed_filter_rejected() {
    let mgr = FpgaManager::simulated();
    let err = mgr
        .enumerate(&[Properties::new(), Properties::new().with_function(9)], 10)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(mgr.live_tokens(), 0);
}

#[test]
fn test_open_null_or_destroyed_token() {
    let mgr = FpgaManager::simulated();
    let err = mgr.open(&Token::INVALID, AccessMode::Exclusive).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let token = mgr.enumerate(&[], 1).unwrap().tokens[0];
    mgr.destroy_token(&token).unwrap();
    let err = mgr.open(&token, AccessMode::Exclusive).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_exclusive_and_shared_leases() {
    let mgr = FpgaManager::simulated();
    let token = mgr.enumerate(&[], 1).unwrap().tokens[0];

    let first = mgr.open(&token, AccessMode::Shared).unwrap();
    let second = mgr.open(&token, AccessMode::Shared).unwrap();
    assert_eq!(mgr.open_handles(&token).unwrap(), 2);

    let err = mgr.open(&token, AccessMode::Exclusive).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceBusy);

    first.close().unwrap();
    second.close().unwrap();

    let exclusive = mgr.open(&token, AccessMode::Exclusive).unwrap();
    let err = mgr.open(&token, AccessMode::Shared).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceBusy);

    drop(exclusive);
    assert_eq!(mgr.open_handles(&token).unwrap(), 0);
    assert!(mgr.open(&token, AccessMode::Shared).is_ok());
}

#[test]
fn test_close_twice_is_invalid_state() {
    let mgr = FpgaManager::simulated();
    let token = mgr.enumerate(&[], 1).unwrap().tokens[0];
    let handle = mgr.open(&token, AccessMode::Exclusive).unwrap();

    handle.close().unwrap();
    assert!(!handle.is_open());
    assert_eq!(handle.close().unwrap_err().kind(), ErrorKind::InvalidState);
}

#[test]
fn test_destroying_token_keeps_handle_usable() {
    let mgr = FpgaManager::simulated();
    let filter = Properties::new().with_object_type(ObjectType::Accelerator);
    let token = mgr.enumerate(&[filter], 1).unwrap().tokens[0];

    let handle = mgr.open(&token, AccessMode::Exclusive).unwrap();
    mgr.destroy_token(&token).unwrap();

    let zone = handle.zone(0).unwrap();
    zone.write(0x100, 0x1234).unwrap();
    assert_eq!(zone.read(0x100).unwrap(), 0x1234);
    handle.close().unwrap();
}

#[test]
fn test_unreleased_tokens_stay_registered() {
    let mgr = FpgaManager::simulated();
    mgr.enumerate(&[], 10).unwrap();
    mgr.enumerate(&[], 10).unwrap();
    assert_eq!(mgr.live_tokens(), 4);
}

#[test]
fn test_tokens_do_not_cross_managers() {
    let a = FpgaManager::simulated();
    let b = FpgaManager::new(
        Arc::new(SimPlatform::new([SimCard {
            socket_id: 7,
            ..SimCard::default()
        }])),
        HalConfig::default(),
    );

    let from_a = a.enumerate(&[], 10).unwrap().tokens;
    let from_b = b.enumerate(&[], 10).unwrap().tokens;
    assert!(from_a.iter().all(|t| !from_b.contains(t)));

    for token in &from_a {
        assert_eq!(b.properties(token).unwrap_err().kind(), ErrorKind::InvalidArgument);
        let err = b.open(token, AccessMode::Shared).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(b.destroy_token(token).unwrap_err().kind(), ErrorKind::InvalidArgument);
    }
    assert_eq!(b.live_tokens(), from_b.len());
    assert_eq!(a.properties(&from_a[0]).unwrap().socket_id, 0);
}

#[test]
#[ignore] // Requires hardware
fn test_enumerate_system() {
    let mgr = FpgaManager::system().expect("platform");
    let found = mgr.enumerate(&[], 16).expect("enumerate");
    println!("{} resource(s) on {}", found.match_count, mgr.platform().name());
    for token in &found.tokens {
        println!("  {:?}", mgr.properties(token).expect("properties"));
    }
}
