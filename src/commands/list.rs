//! List commands implementation

use cartflash_core::chip::{DEVICES, VENDORS};

/// List all compiled-in programmers
pub fn list_programmers() {
    let programmers = cartflash_flash::available_programmers();

    println!("Supported programmers:");
    println!();
    if programmers.is_empty() {
        println!("  none (recompile with programmer features)");
        return;
    }

    for programmer in programmers {
        print!("  {:<9} - {}", programmer.name, programmer.description);
        if !programmer.aliases.is_empty() {
            print!(" [aliases: {}]", programmer.aliases.join(", "));
        }
        println!();
    }
}

/// List known flash parts, optionally for one vendor
pub fn list_parts(vendor_filter: Option<&str>) {
    println!("Known flash parts:");
    println!();
    println!("{:<12} {:<16} {:>10} {:>8}", "Vendor", "Name", "Size", "ID");
    println!("{}", "-".repeat(50));

    for &(manufacturer, vendor) in VENDORS {
        if let Some(filter) = vendor_filter {
            if !vendor.to_lowercase().contains(&filter.to_lowercase()) {
                continue;
            }
        }

        for &(device, name, size) in DEVICES {
            println!(
                "{:<12} {:<16} {:>10} {:>8}",
                vendor,
                name,
                format_size(size),
                format!("{:02X}:{:02X}", manufacturer, device)
            );
        }
    }
}

fn format_size(bytes: u32) -> String {
    if bytes >= 1024 * 1024 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}
