//! Static table of known cartridge flash parts

use super::ChipId;

/// Known manufacturer IDs
pub const VENDORS: &[(u8, &str)] = &[
    (0x04, "Fujitsu"),
    (0x98, "Toshiba"),
    (0xB0, "Sharp"),
    (0xC2, "Macronix"),
    (0xEC, "Samsung"),
];

/// Known device IDs and their capacity in bytes
pub const DEVICES: &[(u8, &str, u32)] = &[
    (0xAB, "4 Mbit", 0x08_0000),
    (0x2C, "8 Mbit", 0x10_0000),
    (0x2F, "16 Mbit", 0x20_0000),
];

/// A flash part resolved from its ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashPart {
    /// Raw ID
    pub id: ChipId,
    /// Vendor name, "Unknown" if the manufacturer is not in the table
    pub vendor: &'static str,
    /// Capacity description
    pub name: &'static str,
    /// Capacity in bytes
    pub size: u32,
}

/// Vendor name for a manufacturer ID
pub fn vendor_name(manufacturer: u8) -> &'static str {
    VENDORS
        .iter()
        .find(|(id, _)| *id == manufacturer)
        .map(|(_, name)| *name)
        .unwrap_or("Unknown")
}

/// Resolve an ID to a known part
///
/// Returns `None` when the device ID is unknown. An unknown vendor is
/// accepted since the device ID alone fixes the geometry.
pub fn lookup(id: ChipId) -> Option<FlashPart> {
    if id.is_absent() {
        return None;
    }
    DEVICES
        .iter()
        .find(|(device, _, _)| *device == id.device)
        .map(|&(_, name, size)| FlashPart {
            id,
            vendor: vendor_name(id.manufacturer),
            name,
            size,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known() {
        let part = lookup(ChipId::new(0x98, 0x2F)).unwrap();
        assert_eq!(part.vendor, "Toshiba");
        assert_eq!(part.size, 0x20_0000);
    }

    #[test]
    fn test_unknown_vendor_accepted() {
        let part = lookup(ChipId::new(0x42, 0xAB)).unwrap();
        assert_eq!(part.vendor, "Unknown");
        assert_eq!(part.size, 0x8_0000);
    }

    #[test]
    fn test_unknown_device_rejected() {
        assert!(lookup(ChipId::new(0x98, 0x11)).is_none());
        assert!(lookup(ChipId::new(0xFF, 0x2F)).is_none());
        assert!(lookup(ChipId::new(0x00, 0x2F)).is_none());
    }
}
