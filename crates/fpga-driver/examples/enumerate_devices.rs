//! Enumerate FPGA devices and accelerators
//!
//! Falls back to a simulated card when no `intel-fpga` class tree exists.

use fpga_driver::{FpgaManager, ObjectType, Properties, Result};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("fpga_driver=debug")
        .init();

    println!("FPGA Resource Enumeration\n");

    let manager = FpgaManager::system()?;
    println!("Platform: {}\n", manager.platform().name());

    for kind in [ObjectType::Device, ObjectType::Accelerator] {
        let found = manager.enumerate(&[Properties::new().with_object_type(kind)], 16)?;
        println!("{kind:?}: {} found", found.match_count);

        for token in &found.tokens {
            let props = manager.properties(token)?;
            println!("   {token}");
            println!("      PCIe:    {}", props.pci);
            println!("      Socket:  {}", props.socket_id);
            println!("      IDs:     {:04x}:{:04x}", props.vendor_id, props.device_id);
            match props.guid {
                Some(guid) => println!("      GUID:    {guid}"),
                None => println!("      GUID:    (none)"),
            }
            manager.destroy_token(token)?;
        }
        println!();
    }

    println!("Discovery complete");

    Ok(())
}
