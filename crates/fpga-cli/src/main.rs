//! `fpgainfo`: inventory and diagnostics for FPGA accelerator cards.
//!
//! ```text
//! USAGE:
//!   fpgainfo enumerate               List devices and accelerators
//!   fpgainfo port                    Accelerator port information
//!   fpgainfo errors [--clear]        Port error status (and clear it)
//!   fpgainfo perf [--interval-ms N]  Sample global performance counters
//! ```
//!
//! `--simulate` runs against a simulated card; `--sysfs-root` points the
//! sysfs scan somewhere other than `/sys`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fpga_chip::errors::known_mask;
use fpga_chip::pcie::CardVariant;
use fpga_driver::chip::decode_port_errors;
use fpga_driver::perf::PerfCounter;
use fpga_driver::{
    AccessMode, FpgaManager, HalConfig, Matches, ObjectType, PlatformSelection, Properties,
    ResourceProperties, Token,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fpgainfo", about = "FPGA accelerator card inventory", version)]
struct Cli {
    /// Root of the sysfs tree to scan (default: /sys or $FPGA_SYSFS_ROOT).
    #[arg(long, global = true)]
    sysfs_root: Option<PathBuf>,

    /// Use a simulated card instead of the sysfs tree.
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List all devices and accelerators.
    Enumerate,
    /// Print accelerator port information.
    Port,
    /// Print port error status.
    Errors {
        /// Clear every set bit after printing.
        #[arg(long)]
        clear: bool,
    },
    /// Sample the global performance counters of every device.
    Perf {
        /// Sampling interval in milliseconds.
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let mgr = manager(&cli)?;

    match cli.command {
        Cmd::Enumerate => cmd_enumerate(&mgr)?,
        Cmd::Port => cmd_port(&mgr)?,
        Cmd::Errors { clear } => cmd_errors(&mgr, clear)?,
        Cmd::Perf { interval_ms } => cmd_perf(&mgr, Duration::from_millis(interval_ms))?,
    }

    Ok(())
}

fn manager(cli: &Cli) -> Result<FpgaManager> {
    let mut config = HalConfig::from_env();
    if let Some(root) = &cli.sysfs_root {
        config = config.with_sysfs_root(root);
    }

    let selection = if cli.simulate {
        PlatformSelection::Simulated
    } else if cli.sysfs_root.is_some() {
        PlatformSelection::Sysfs
    } else {
        PlatformSelection::Auto
    };

    FpgaManager::with_selection(selection, config).context("selecting platform")
}

/// Enumerate, hand the matches to `f`, then destroy every issued token
fn with_matches<T>(
    mgr: &FpgaManager,
    filters: &[Properties],
    f: impl FnOnce(&Matches) -> Result<T>,
) -> Result<T> {
    let found = mgr.enumerate(filters, usize::MAX)?;
    let result = f(&found);
    for token in &found.tokens {
        mgr.destroy_token(token)?;
    }
    result
}

fn of_kind(kind: ObjectType) -> [Properties; 1] {
    [Properties::new().with_object_type(kind)]
}

fn row(label: &str, value: impl std::fmt::Display) {
    println!("{label:<24} : {value}");
}

fn print_common(props: &ResourceProperties) {
    let mut card = match CardVariant::from_device_id(props.device_id) {
        CardVariant::Unknown(_) => "Unknown".to_string(),
        variant => format!("{variant:?}"),
    };
    if CardVariant::is_virtual_function(props.device_id) {
        card.push_str(" (VF)");
    }

    row("Object Type", format!("{:?}", props.object_type));
    row("PCIe s:b:d.f", props.pci);
    row("Socket Id", props.socket_id);
    row("Vendor Id", format!("{:#06x}", props.vendor_id));
    row("Device Id", format!("{:#06x}", props.device_id));
    row("Card", card);
}

fn cmd_enumerate(mgr: &FpgaManager) -> Result<()> {
    with_matches(mgr, &[], |found| {
        println!("Platform: {}   resources: {}", mgr.platform().name(), found.match_count);
        println!();

        for token in &found.tokens {
            let props = mgr.properties(token)?;
            println!("[{token}]");
            print_common(&props);
            if let Some(guid) = props.guid {
                let label = match props.object_type {
                    ObjectType::Device => "Interface Id",
                    ObjectType::Accelerator => "Accelerator GUID",
                };
                row(label, guid);
            }
            println!();
        }
        Ok(())
    })
}

fn cmd_port(mgr: &FpgaManager) -> Result<()> {
    with_matches(mgr, &of_kind(ObjectType::Accelerator), |found| {
        for token in &found.tokens {
            let props = mgr.properties(token)?;
            print_common(&props);
            match props.guid {
                Some(guid) => row("Accelerator GUID", guid),
                None => row("Accelerator GUID", "(unavailable)"),
            }
            println!();
        }
        Ok(())
    })
}

fn cmd_errors(mgr: &FpgaManager, clear: bool) -> Result<()> {
    with_matches(mgr, &of_kind(ObjectType::Accelerator), |found| {
        found.tokens.iter().try_for_each(|token| port_errors(mgr, token, clear))
    })
}

fn port_errors(mgr: &FpgaManager, token: &Token, clear: bool) -> Result<()> {
    let props = mgr.properties(token)?;
    let status = mgr
        .read_status(token)
        .with_context(|| format!("reading port errors of {}", props.pci))?;

    print_common(&props);
    row("Port Errors", format!("{status:#018x}"));
    for name in decode_port_errors(status) {
        row("", name);
    }
    let reserved = status & !known_mask();
    if reserved != 0 {
        row("", format!("reserved bits {reserved:#x}"));
    }

    if clear && status != 0 {
        let after = mgr.clear_status(token, status)?;
        row("Port Errors (cleared)", format!("{after:#018x}"));
    }
    println!();
    Ok(())
}

fn cmd_perf(mgr: &FpgaManager, interval: Duration) -> Result<()> {
    with_matches(mgr, &of_kind(ObjectType::Device), |found| {
        found.tokens.iter().try_for_each(|token| sample_perf(mgr, token, interval))
    })
}

fn sample_perf(mgr: &FpgaManager, token: &Token, interval: Duration) -> Result<()> {
    let props = mgr.properties(token)?;
    let handle = mgr.open(token, AccessMode::Shared)?;
    let counters = PerfCounter::new(&handle);

    counters.init()?;
    counters.start()?;
    std::thread::sleep(interval);
    counters.stop()?;

    print_common(&props);
    row("Interval", format!("{interval:?}"));
    counters.print(&mut std::io::stdout())?;
    println!();

    counters.destroy()?;
    handle.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpga_driver::ErrorKind;

    #[test]
    fn commands_release_their_tokens() {
        let mgr = FpgaManager::simulated();

        cmd_enumerate(&mgr).unwrap();
        cmd_port(&mgr).unwrap();
        cmd_errors(&mgr, true).unwrap();
        cmd_perf(&mgr, Duration::ZERO).unwrap();

        assert_eq!(mgr.live_tokens(), 0);
    }

    #[test]
    fn tokens_are_released_when_the_command_fails() {
        let mgr = FpgaManager::simulated();

        let err = with_matches(&mgr, &[], |found| {
            assert_eq!(found.tokens.len(), 2);
            let _held = mgr.open(&found.tokens[0], AccessMode::Exclusive)?;
            mgr.open(&found.tokens[0], AccessMode::Exclusive)?;
            Ok(())
        })
        .unwrap_err();

        let cause = err.downcast_ref::<fpga_driver::FpgaError>().unwrap();
        assert_eq!(cause.kind(), ErrorKind::ResourceBusy);
        assert_eq!(mgr.live_tokens(), 0);
    }
}
