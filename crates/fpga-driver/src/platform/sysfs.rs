//! Sysfs platform for the `intel-fpga` class driver
//!
//! ```text
//! {root}/class/fpga/intel-fpga-dev.N/
//!     device -> PCI function dir (vendor, device, resource0, resource2)
//!     intel-fpga-fme.N/   socket_id, pr/interface_id
//!     intel-fpga-port.N/  afu_id, errors/errors, errors/clear
//! ```
//!
//! The FME is reported as the device resource and each port as an
//! accelerator. Window 0 of the device is `resource0`; window 0 of an
//! accelerator is `resource2`.

use super::{AttributeStore, Platform, Resource, ResourceId};
use crate::error::{FpgaError, Result};
use crate::mmio::{MmapRegion, RegisterSpace};
use crate::properties::{ObjectType, PciAddress, ResourceProperties};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

const DEV_PREFIX: &str = "intel-fpga-dev.";
const FME_PREFIX: &str = "intel-fpga-fme.";
const PORT_PREFIX: &str = "intel-fpga-port.";

/// Platform backed by a sysfs tree
#[derive(Debug, Clone)]
pub struct SysfsPlatform {
    class_dir: PathBuf,
}

impl SysfsPlatform {
    /// Platform rooted at `sysfs_root` (normally `/sys`)
    pub fn new(sysfs_root: &Path) -> Self {
        Self {
            class_dir: sysfs_root.join("class").join("fpga"),
        }
    }

    /// The `class/fpga` directory scanned
    pub fn class_dir(&self) -> &Path {
        &self.class_dir
    }

    fn resource_dir(&self, resource: &ResourceId) -> Result<PathBuf> {
        let id = resource.as_str();
        if id.is_empty() || id.split('/').any(|part| part == ".." || part.is_empty()) {
            return Err(FpgaError::invalid_argument(format!(
                "Malformed resource id {id:?}"
            )));
        }
        Ok(self.class_dir.join(id))
    }

    fn scan_device(&self, dev_dir: &Path, dev_name: &str, out: &mut Vec<Resource>) -> Result<()> {
        let pci_dir = pci_function_dir(dev_dir)?;
        let pci = pci_dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                FpgaError::invalid_state(format!("{} has no PCI name", pci_dir.display()))
            })
            .and_then(PciAddress::parse)?;

        let vendor_id = read_hex_sysfs(&pci_dir.join("vendor"))?;
        let device_id = read_hex_sysfs(&pci_dir.join("device"))?;

        let base = |object_type| ResourceProperties {
            object_type,
            guid: None,
            pci,
            socket_id: 0,
            vendor_id,
            device_id,
            num_regions: 1,
        };

        let mut parent = None;
        let mut socket_id = 0;
        for fme in child_dirs(dev_dir, FME_PREFIX)? {
            let id = ResourceId::new(format!("{dev_name}/{fme}"));
            let dir = dev_dir.join(&fme);

            let mut properties = base(ObjectType::Device);
            properties.socket_id = read_socket_id(&dir.join("socket_id"));
            properties.guid = read_guid(&dir.join("pr").join("interface_id"));

            tracing::debug!("Found device {id} @ {pci}");
            socket_id = properties.socket_id;
            parent = Some(id.clone());
            out.push(Resource {
                id,
                properties,
                parent: None,
            });
        }

        for port in child_dirs(dev_dir, PORT_PREFIX)? {
            let id = ResourceId::new(format!("{dev_name}/{port}"));
            let dir = dev_dir.join(&port);

            let mut properties = base(ObjectType::Accelerator);
            properties.socket_id = socket_id;
            properties.guid = read_guid(&dir.join("afu_id"));

            tracing::debug!("Found accelerator {id} @ {pci}");
            out.push(Resource {
                id,
                properties,
                parent: parent.clone(),
            });
        }

        Ok(())
    }
}

impl AttributeStore for SysfsPlatform {
    fn read_attribute(&self, resource: &ResourceId, name: &str) -> Result<String> {
        let path = self.resource_dir(resource)?.join(name);
        std::fs::read_to_string(&path)
            .map_err(|e| FpgaError::io(format!("read {}", path.display()), e))
    }

    fn write_attribute(&self, resource: &ResourceId, name: &str, value: &str) -> Result<()> {
        let path = self.resource_dir(resource)?.join(name);
        tracing::debug!("Writing {value:?} to {}", path.display());
        std::fs::write(&path, value)
            .map_err(|e| FpgaError::io(format!("write {}", path.display()), e))
    }
}

impl Platform for SysfsPlatform {
    fn name(&self) -> &'static str {
        "sysfs"
    }

    fn scan(&self) -> Result<Vec<Resource>> {
        let devices = match child_dirs(&self.class_dir, DEV_PREFIX) {
            Ok(devices) => devices,
            Err(FpgaError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("{} not present, no FPGA devices", self.class_dir.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut resources = Vec::new();
        for dev_name in devices {
            let dev_dir = self.class_dir.join(&dev_name);
            if let Err(e) = self.scan_device(&dev_dir, &dev_name, &mut resources) {
                tracing::warn!("Skipping {}: {e}", dev_dir.display());
            }
        }

        tracing::debug!("Sysfs scan found {} resource(s)", resources.len());
        Ok(resources)
    }

    fn map_region(&self, resource: &ResourceId, index: u32) -> Result<Arc<dyn RegisterSpace>> {
        if index != 0 {
            return Err(FpgaError::invalid_argument(format!(
                "{resource} has no register window {index}"
            )));
        }

        let dir = self.resource_dir(resource)?;
        let dev_dir = dir.parent().ok_or_else(|| {
            FpgaError::invalid_argument(format!("{resource} is not a device child"))
        })?;

        let is_port = dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(PORT_PREFIX));
        let bar = if is_port { "resource2" } else { "resource0" };

        let path = pci_function_dir(dev_dir)?.join(bar);
        Ok(Arc::new(MmapRegion::open(&path)?))
    }
}

/// Names of subdirectories starting with `prefix`, ordered by numeric suffix
fn child_dirs(dir: &Path, prefix: &str) -> Result<Vec<String>> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| FpgaError::io(format!("read {}", dir.display()), e))?;

    let mut names: Vec<(u32, String)> = entries
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter_map(|name| {
            let index = name.strip_prefix(prefix)?.parse().ok()?;
            Some((index, name))
        })
        .collect();

    names.sort();
    Ok(names.into_iter().map(|(_, name)| name).collect())
}

fn pci_function_dir(dev_dir: &Path) -> Result<PathBuf> {
    let link = dev_dir.join("device");
    std::fs::canonicalize(&link).map_err(|e| FpgaError::io(format!("resolve {}", link.display()), e))
}

/// Read a hexadecimal value from sysfs
fn read_hex_sysfs(path: &Path) -> Result<u16> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| FpgaError::io(format!("read {}", path.display()), e))?;

    let trimmed = content.trim().trim_start_matches("0x");
    u16::from_str_radix(trimmed, 16).map_err(|e| {
        FpgaError::invalid_state(format!("Invalid hex in {}: {e}", path.display()))
    })
}

fn read_socket_id(path: &Path) -> u8 {
    match std::fs::read_to_string(path) {
        Ok(s) => s.trim().parse().unwrap_or_else(|e| {
            tracing::warn!("Unparsable {}: {e}", path.display());
            0
        }),
        Err(_) => 0,
    }
}

fn read_guid(path: &Path) -> Option<Uuid> {
    let content = std::fs::read_to_string(path).ok()?;
    match Uuid::parse_str(content.trim()) {
        Ok(guid) => Some(guid),
        Err(e) => {
            tracing::warn!("Unparsable GUID in {}: {e}", path.display());
            None
        }
    }
}
