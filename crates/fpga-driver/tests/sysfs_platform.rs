//! Sysfs platform tests over a fabricated class tree
//!
//! The PCI resource files are plain files, so mapping them exercises the
//! real mmap path without hardware.

use fpga_chip::{dfl, mailbox, pcie, perf as counters, port};
use fpga_driver::perf::PerfCounter;
use fpga_driver::{
    AccessMode, ErrorKind, FpgaManager, HalConfig, ObjectType, PlatformSelection, Properties,
    Token, ZonePath,
};
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

const INTERFACE_ID: &str = "9346116da52d5ca8b06aa9a389ef7c8d";
const AFU_ID: &str = "d8424dc4a4a3c413f89e433683f9040b";
const PERF_OFFSET: usize = 0x200;
const PORT_ERROR_OFFSET: usize = 0x1000;
const MAILBOX_OFFSET: usize = 0x300;

fn window(size: usize, headers: &[(usize, u64)]) -> Vec<u8> {
    let mut bytes = vec![0u8; size];
    for &(offset, word) in headers {
        bytes[offset..offset + 8].copy_from_slice(&word.to_le_bytes());
    }
    bytes
}

fn write(path: &Path, contents: impl AsRef<[u8]>) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// Lay out one card under `root` and link it as `intel-fpga-dev.{n}`
fn add_card(root: &Path, n: u32, bdf: &str, socket: u8) -> PathBuf {
    let dir = pci_dir(root, bdf);
    write(&dir.join("vendor"), "0x8086\n");
    write(&dir.join("device"), format!("{:#06x}\n", pcie::device_id::N3000));
    write(
        &dir.join("resource0"),
        window(
            0x1000,
            &[
                (0, dfl::encode(dfl::kind::FIU, dfl::id::FME_HEADER, PERF_OFFSET, false)),
                (
                    PERF_OFFSET,
                    dfl::encode(dfl::kind::PRIVATE, dfl::id::FME_GLOBAL_PERF, 0, true),
                ),
            ],
        ),
    );
    write(
        &dir.join("resource2"),
        window(
            0x2000,
            &[
                (0, dfl::encode(dfl::kind::FIU, dfl::id::PORT_HEADER, PORT_ERROR_OFFSET, false)),
                (
                    PORT_ERROR_OFFSET,
                    dfl::encode(dfl::kind::PRIVATE, dfl::id::PORT_ERROR, 0, true),
                ),
            ],
        ),
    );

    let dev_dir = root.join("class").join("fpga").join(format!("intel-fpga-dev.{n}"));
    fs::create_dir_all(&dev_dir).unwrap();
    symlink(&dir, dev_dir.join("device")).unwrap();

    let fme = dev_dir.join(format!("intel-fpga-fme.{n}"));
    write(&fme.join("socket_id"), format!("{socket}\n"));
    write(&fme.join("pr").join("interface_id"), format!("{INTERFACE_ID}\n"));

    let port = dev_dir.join(format!("intel-fpga-port.{n}"));
    write(&port.join("afu_id"), format!("{AFU_ID}\n"));
    write(&port.join("errors").join("errors"), "0x400\n");
    write(&port.join("errors").join("clear"), "");

    port
}

fn pci_dir(root: &Path, bdf: &str) -> PathBuf {
    root.join("devices").join("pci0000:00").join(bdf)
}

/// Append a port mailbox feature to the device feature list
fn add_mailbox(root: &Path, bdf: &str) {
    let path = pci_dir(root, bdf).join("resource0");
    let mut bytes = fs::read(&path).unwrap();
    let perf = dfl::encode(
        dfl::kind::PRIVATE,
        dfl::id::FME_GLOBAL_PERF,
        MAILBOX_OFFSET - PERF_OFFSET,
        false,
    );
    let mailbox = dfl::encode(dfl::kind::PRIVATE, dfl::id::PORT_MAILBOX, 0, true);
    bytes[PERF_OFFSET..PERF_OFFSET + 8].copy_from_slice(&perf.to_le_bytes());
    bytes[MAILBOX_OFFSET..MAILBOX_OFFSET + 8].copy_from_slice(&mailbox.to_le_bytes());
    fs::write(path, bytes).unwrap();
}

/// Leave the port in soft reset, as during partial reconfiguration
fn hold_port_in_reset(root: &Path, bdf: &str) {
    let path = pci_dir(root, bdf).join("resource2");
    let mut bytes = fs::read(&path).unwrap();
    let control = port::control::SOFT_RESET | port::control::SOFT_RESET_ACK;
    bytes[port::CONTROL..port::CONTROL + 8].copy_from_slice(&control.to_le_bytes());
    fs::write(path, bytes).unwrap();
}

fn manager(root: &Path) -> FpgaManager {
    FpgaManager::with_selection(
        PlatformSelection::Sysfs,
        HalConfig::default().with_sysfs_root(root),
    )
    .expect("sysfs platform")
}

fn first(mgr: &FpgaManager, kind: ObjectType) -> Token {
    let found = mgr
        .enumerate(&[Properties::new().with_object_type(kind)], 1)
        .expect("enumerate");
    assert_eq!(found.match_count, 1);
    found.tokens[0]
}

#[test]
fn test_scan_reports_device_and_accelerator() {
    let root = TempDir::new().unwrap();
    add_card(root.path(), 0, "0000:5e:00.0", 1);
    let mgr = manager(root.path());
    assert_eq!(mgr.platform().name(), "sysfs");

    let found = mgr.enumerate(&[], 10).unwrap();
    assert_eq!(found.match_count, 2);

    let device = mgr.properties(&found.tokens[0]).unwrap();
    assert_eq!(device.object_type, ObjectType::Device);
    assert_eq!(device.vendor_id, pcie::INTEL_VENDOR_ID);
    assert_eq!(device.device_id, pcie::device_id::N3000);
    assert_eq!(device.pci.bus, 0x5e);
    assert_eq!(device.socket_id, 1);
    assert_eq!(device.guid, Some(Uuid::parse_str(INTERFACE_ID).unwrap()));

    let accel = mgr.properties(&found.tokens[1]).unwrap();
    assert_eq!(accel.object_type, ObjectType::Accelerator);
    assert_eq!(accel.socket_id, 1, "inherits the device socket");
    assert_eq!(accel.guid, Some(Uuid::parse_str(AFU_ID).unwrap()));

    let by_guid = mgr
        .enumerate(&[Properties::new().with_guid(Uuid::parse_str(AFU_ID).unwrap())], 10)
        .unwrap();
    assert_eq!(by_guid.match_count, 1);
}

#[test]
fn test_broken_card_is_skipped() {
    let root = TempDir::new().unwrap();
    add_card(root.path(), 0, "0000:5e:00.0", 0);
    fs::create_dir_all(root.path().join("class/fpga/intel-fpga-dev.1/intel-fpga-fme.1")).unwrap();

    let mgr = manager(root.path());
    assert_eq!(mgr.enumerate(&[], 10).unwrap().match_count, 2);
}

#[test]
fn test_missing_class_dir_finds_nothing() {
    let root = TempDir::new().unwrap();
    let mgr = manager(root.path());
    assert_eq!(mgr.enumerate(&[], 10).unwrap().match_count, 0);
}

#[test]
fn test_zone_over_mapped_resource() {
    let root = TempDir::new().unwrap();
    add_card(root.path(), 0, "0000:5e:00.0", 0);
    let mgr = manager(root.path());

    let handle = mgr
        .open(&first(&mgr, ObjectType::Accelerator), AccessMode::Exclusive)
        .unwrap();
    let zone = handle.zone(0).unwrap();
    assert_eq!(zone.size(), 0x2000);
    assert_eq!(zone.path().unwrap(), ZonePath::Direct);

    zone.write(0x100, 0x0123_4567_89ab_cdef).unwrap();
    assert_eq!(zone.read(0x100).unwrap(), 0x0123_4567_89ab_cdef);
    assert_eq!(handle.read32(0, 0x104).unwrap(), 0x0123_4567);
    assert_eq!(handle.read_status().unwrap(), 0);
    handle.close().unwrap();

    let bytes = fs::read(pci_dir(root.path(), "0000:5e:00.0").join("resource2")).unwrap();
    assert_eq!(&bytes[0x100..0x108], &0x0123_4567_89ab_cdef_u64.to_le_bytes());
}

#[test]
fn test_perf_counters_over_mapped_resource() {
    let root = TempDir::new().unwrap();
    add_card(root.path(), 0, "0000:5e:00.0", 0);
    let mgr = manager(root.path());

    let handle = mgr
        .open(&first(&mgr, ObjectType::Device), AccessMode::Shared)
        .unwrap();
    let counter = PerfCounter::new(&handle);
    counter.init().unwrap();
    counter.start().unwrap();

    let clock = PERF_OFFSET + counters::COUNTERS[0].offset;
    handle.write64(0, clock, 5_000).unwrap();
    counter.stop().unwrap();

    let deltas = counter.deltas().unwrap();
    assert_eq!(deltas[0].name, "clock");
    assert_eq!(deltas[0].value, 5_000);
    assert!(deltas[1..].iter().all(|d| d.value == 0));

    // Restarting takes a new baseline and reads live until the next stop.
    counter.start().unwrap();
    assert_eq!(counter.deltas().unwrap()[0].value, 0);
    handle.write64(0, clock, 7_500).unwrap();
    assert_eq!(counter.deltas().unwrap()[0].value, 2_500);
    counter.destroy().unwrap();
}

#[test]
fn test_mediated_access_without_mailbox_is_refused() {
    let root = TempDir::new().unwrap();
    add_card(root.path(), 0, "0000:5e:00.0", 0);
    hold_port_in_reset(root.path(), "0000:5e:00.0");
    let fme_file = pci_dir(root.path(), "0000:5e:00.0").join("resource0");
    let before = fs::read(&fme_file).unwrap();

    let mgr = manager(root.path());
    let device = mgr.open(&first(&mgr, ObjectType::Device), AccessMode::Shared).unwrap();
    let accel = mgr
        .open(&first(&mgr, ObjectType::Accelerator), AccessMode::Exclusive)
        .unwrap();
    accel.bind_companion(&device).unwrap();

    let zone = accel.zone(0).unwrap();
    assert_eq!(zone.path().unwrap(), ZonePath::Mediated);
    assert_eq!(zone.read(0x100).unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(zone.write(0x100, 1).unwrap_err().kind(), ErrorKind::InvalidState);

    accel.close().unwrap();
    device.close().unwrap();
    assert_eq!(fs::read(&fme_file).unwrap(), before, "device window modified");
}

#[test]
fn test_mediated_access_stays_inside_mailbox_feature() {
    let root = TempDir::new().unwrap();
    add_card(root.path(), 0, "0000:5e:00.0", 0);
    add_mailbox(root.path(), "0000:5e:00.0");
    hold_port_in_reset(root.path(), "0000:5e:00.0");
    let fme_file = pci_dir(root.path(), "0000:5e:00.0").join("resource0");
    let before = fs::read(&fme_file).unwrap();

    let config = HalConfig::default()
        .with_sysfs_root(root.path())
        .with_mailbox_timeout(std::time::Duration::from_millis(10));
    let mgr = FpgaManager::with_selection(PlatformSelection::Sysfs, config).unwrap();
    let device = mgr.open(&first(&mgr, ObjectType::Device), AccessMode::Shared).unwrap();
    let accel = mgr
        .open(&first(&mgr, ObjectType::Accelerator), AccessMode::Exclusive)
        .unwrap();
    accel.bind_companion(&device).unwrap();

    // Nothing acknowledges the command on a plain file.
    let err = accel.zone(0).unwrap().write(0x100, 0xfeed).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    accel.close().unwrap();
    device.close().unwrap();

    let after = fs::read(&fme_file).unwrap();
    let word = |at: usize| u64::from_le_bytes(after[at..at + 8].try_into().unwrap());
    assert_eq!(&after[..MAILBOX_OFFSET], &before[..MAILBOX_OFFSET], "outside the mailbox");
    assert_eq!(word(MAILBOX_OFFSET + mailbox::WR_DATA), 0xfeed);
    assert_eq!(
        word(MAILBOX_OFFSET + mailbox::CTRL),
        mailbox::command(mailbox::CMD_WRITE, 0x100)
    );
}

#[test]
fn test_status_attributes() {
    let root = TempDir::new().unwrap();
    let port_dir = add_card(root.path(), 0, "0000:5e:00.0", 0);
    let mgr = manager(root.path());
    let token = first(&mgr, ObjectType::Accelerator);

    assert_eq!(mgr.read_status(&token).unwrap(), 0x400);

    // A plain file does not clear itself; the re-read sees the old value.
    assert_eq!(mgr.clear_status(&token, 0x400).unwrap(), 0x400);
    assert_eq!(fs::read_to_string(port_dir.join("errors/clear")).unwrap(), "0x400\n");
}

#[test]
fn test_reset_on_plain_file_times_out() {
    let root = TempDir::new().unwrap();
    add_card(root.path(), 0, "0000:5e:00.0", 0);
    let mut config = HalConfig::default().with_sysfs_root(root.path());
    config.reset_timeout = std::time::Duration::from_millis(10);
    let mgr = FpgaManager::with_selection(PlatformSelection::Sysfs, config).unwrap();

    // Nothing acknowledges the reset request on a plain file.
    let handle = mgr
        .open(&first(&mgr, ObjectType::Accelerator), AccessMode::Exclusive)
        .unwrap();
    let err = handle.assert_reset().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_ne!(handle.read64(0, port::CONTROL).unwrap() & port::control::SOFT_RESET, 0);
}

#[test]
#[ignore] // Requires hardware
fn test_system_sysfs_tree() {
    let mgr = FpgaManager::with_selection(PlatformSelection::Sysfs, HalConfig::from_env())
        .expect("sysfs platform");
    let found = mgr.enumerate(&[], 16).expect("enumerate");
    assert!(found.match_count > 0, "no FPGA devices under /sys/class/fpga");

    for token in &found.tokens {
        let props = mgr.properties(token).expect("properties");
        println!("{:?} {} {:?}", props.object_type, props.pci, props.guid);
    }
}
