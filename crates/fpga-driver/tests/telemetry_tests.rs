//! Port error telemetry: register path through a handle and attribute
//! path through a token.

use fpga_chip::errors::{MMIO_READ_WHILE_RESET, MMIO_WRITE_WHILE_RESET};
use fpga_chip::port;
use fpga_driver::chip::decode_port_errors;
use fpga_driver::platform::sim::PORT_ERROR_OFFSET;
use fpga_driver::{
    AccessMode, ErrorKind, FpgaManager, HalConfig, ObjectType, Properties, SimPlatform, Token,
};
use std::sync::Arc;

const STATUS: usize = PORT_ERROR_OFFSET + port::error::STATUS;

fn setup() -> (Arc<SimPlatform>, FpgaManager) {
    let sim = Arc::new(SimPlatform::single_card());
    let mgr = FpgaManager::new(sim.clone(), HalConfig::default());
    (sim, mgr)
}

fn first(mgr: &FpgaManager, kind: ObjectType) -> Token {
    let filter = Properties::new().with_object_type(kind);
    mgr.enumerate(&[filter], 1).unwrap().tokens[0]
}

#[test]
fn test_clean_port_reports_zero() {
    let (_sim, mgr) = setup();
    let token = first(&mgr, ObjectType::Accelerator);

    assert_eq!(mgr.read_status(&token).unwrap(), 0);
    let handle = mgr.open(&token, AccessMode::Exclusive).unwrap();
    assert_eq!(handle.read_status().unwrap(), 0);
}

#[test]
fn test_register_path_clear_all() {
    let (_sim, mgr) = setup();
    let token = first(&mgr, ObjectType::Accelerator);
    let handle = mgr.open(&token, AccessMode::Exclusive).unwrap();

    handle.assert_reset().unwrap();
    handle.write64(0, 0x100, 1).unwrap();
    handle.read64(0, 0x100).unwrap();
    handle.release_reset().unwrap();

    let status = handle.read_status().unwrap();
    assert_eq!(status, MMIO_READ_WHILE_RESET | MMIO_WRITE_WHILE_RESET);
    let mut names: Vec<&str> = decode_port_errors(status).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["MMIORdWhileRst", "MMIOWrWhileRst"]);

    assert_eq!(handle.clear_status(!0).unwrap(), 0);
    assert_eq!(handle.read_status().unwrap(), 0);
}

#[test]
fn test_register_path_clears_only_masked_bits() {
    let (sim, mgr) = setup();
    let token = first(&mgr, ObjectType::Accelerator);
    let handle = mgr.open(&token, AccessMode::Exclusive).unwrap();
    let region = sim.region(handle.resource_id()).unwrap();

    region.poke(STATUS, 0b110).unwrap();
    assert_eq!(handle.clear_status(0b010).unwrap(), 0b100);
}

#[test]
fn test_attribute_path_needs_no_handle() {
    let (sim, mgr) = setup();
    let token = first(&mgr, ObjectType::Accelerator);
    let accel_id = mgr.platform().scan().unwrap()[1].id.clone();
    let region = sim.region(&accel_id).unwrap();

    region.poke(STATUS, MMIO_WRITE_WHILE_RESET).unwrap();
    region.reset_accesses();

    assert_eq!(mgr.read_status(&token).unwrap(), MMIO_WRITE_WHILE_RESET);
    assert_eq!(mgr.clear_status(&token, !0).unwrap(), 0);
    assert_eq!(mgr.read_status(&token).unwrap(), 0);
    assert_eq!(region.accesses(), 0, "attribute path bypasses the register window");
}

#[test]
fn test_device_has_no_port_status() {
    let (_sim, mgr) = setup();
    let token = first(&mgr, ObjectType::Device);

    assert_eq!(mgr.read_status(&token).unwrap_err().kind(), ErrorKind::Io);
    assert_eq!(mgr.clear_status(&token, 1).unwrap_err().kind(), ErrorKind::Io);

    let handle = mgr.open(&token, AccessMode::Shared).unwrap();
    assert_eq!(handle.read_status().unwrap_err().kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_status_rejects_bad_token_and_closed_handle() {
    let (_sim, mgr) = setup();
    assert_eq!(
        mgr.read_status(&Token::INVALID).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );

    let token = first(&mgr, ObjectType::Accelerator);
    let handle = mgr.open(&token, AccessMode::Exclusive).unwrap();
    handle.close().unwrap();
    assert_eq!(handle.read_status().unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(handle.clear_status(!0).unwrap_err().kind(), ErrorKind::InvalidState);
}
