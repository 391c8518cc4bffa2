//! Programmer registry and initialization
//!
//! This module opens programmers by name, detects the cartridge behind
//! them and wraps the result in a [`CartridgeHandle`]. The transport type
//! never leaves this module.

use std::collections::HashMap;

use cartflash_core::cartridge::System;
use cartflash_core::flash;
use cartflash_core::transport::{BoxedTransport, Transport};

use crate::error::OpenError;
use crate::handle::CartridgeHandle;

/// Detect the cartridge behind a transport and build a handle
#[allow(dead_code)] // Unused when no programmer feature is enabled
fn detect_and_create_handle<T>(transport: T, system: System) -> Result<CartridgeHandle, OpenError>
where
    T: Transport + 'static,
{
    let transport: BoxedTransport = Box::new(transport);
    let session = flash::detect(system, transport)?;

    for (index, chip) in session.cartridge().chips().iter().enumerate() {
        let protected = chip.blocks().iter().filter(|block| block.protected).count();
        if protected > 0 {
            log::info!(
                "Chip {}: {} of {} blocks protected",
                index,
                protected,
                chip.block_count()
            );
        }
    }

    Ok(CartridgeHandle::new(session))
}

/// Parsed programmer parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgrammerParams {
    /// Programmer name (canonical)
    pub name: String,
    /// Key-value parameters
    pub params: HashMap<String, String>,
}

impl ProgrammerParams {
    /// Value of a parameter, if given
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Parse a numeric parameter, `default` if absent
    #[allow(dead_code)] // Unused when no programmer feature is enabled
    fn number<N: std::str::FromStr>(&self, key: &str, default: N) -> Result<N, OpenError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| invalid(key, value)),
        }
    }

    /// Parse a `yes`/`no` parameter, `default` if absent
    #[allow(dead_code)] // Unused when no programmer feature is enabled
    fn flag(&self, key: &str, default: bool) -> Result<bool, OpenError> {
        match self.get(key) {
            None => Ok(default),
            Some("yes" | "on" | "1" | "true") => Ok(true),
            Some("no" | "off" | "0" | "false") => Ok(false),
            Some(value) => Err(invalid(key, value)),
        }
    }
}

fn invalid(key: &str, value: &str) -> OpenError {
    OpenError::InvalidParameter {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Parse a programmer string into name and parameters
///
/// Format: "name" or "name:key1=value1,key2=value2"
///
/// # Example
/// ```ignore
/// let params = parse_programmer_params("dummy:chips=2")?;
/// assert_eq!(params.name, "dummy");
/// assert_eq!(params.get("chips"), Some("2"));
/// ```
pub fn parse_programmer_params(s: &str) -> Result<ProgrammerParams, OpenError> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));

    let mut params = HashMap::new();
    if !opts_str.is_empty() {
        for opt in opts_str.split(',') {
            if let Some((key, value)) = opt.split_once('=') {
                params.insert(key.to_string(), value.to_string());
            } else {
                return Err(OpenError::MalformedParameter(opt.to_string()));
            }
        }
    }

    Ok(ProgrammerParams {
        name: name.to_string(),
        params,
    })
}

/// Parse a byte count such as `512K`, `2M`, `0x80000` or `524288`
pub fn parse_size(s: &str) -> Option<u32> {
    let s = s.trim();
    let (digits, multiplier) = match s.as_bytes().last()? {
        b'K' | b'k' => (&s[..s.len() - 1], 1024),
        b'M' | b'm' => (&s[..s.len() - 1], 1024 * 1024),
        _ => (s, 1),
    };

    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u32>().ok()?,
    };
    value.checked_mul(multiplier)
}

/// Open a programmer and detect the cartridge in it
///
/// This is the main entry point for the CLI. It handles:
/// 1. Parsing the programmer string
/// 2. Opening the appropriate programmer
/// 3. Identifying every chip and building the cartridge geometry
///
/// # Arguments
/// * `programmer` - Programmer specification (e.g., "dummy" or "dummy:chips=2,size=2M")
/// * `system` - Console family of the inserted cartridge
///
/// # Example
/// ```ignore
/// let mut handle = open_cartridge("dummy", System::NeoGeoPocket)?;
/// println!("Cartridge size: {} bytes", handle.size());
/// ```
#[cfg_attr(not(feature = "dummy"), allow(unused_variables))]
pub fn open_cartridge(programmer: &str, system: System) -> Result<CartridgeHandle, OpenError> {
    let params = parse_programmer_params(programmer)?;

    match params.name.as_str() {
        #[cfg(feature = "dummy")]
        "dummy" | "emulator" => open_dummy(&params, system),

        _ => Err(OpenError::UnknownProgrammer(params.name)),
    }
}

#[cfg(feature = "dummy")]
fn dummy_config(
    params: &ProgrammerParams,
    system: System,
) -> Result<cartflash_dummy::DummyConfig, OpenError> {
    use cartflash_core::transport::TransportFeatures;
    use cartflash_dummy::DummyConfig;

    const KNOWN: [&str; 6] = ["chips", "size", "image", "batch", "protect", "erase_polls"];
    for key in params.params.keys() {
        if !KNOWN.contains(&key.as_str()) {
            log::warn!("dummy: ignoring unknown parameter '{}'", key);
        }
    }

    let chips: u8 = params.number("chips", 1)?;
    if chips == 0 || chips > system.max_chips() {
        return Err(invalid("chips", &chips.to_string()));
    }

    let chip_size = match params.get("size") {
        None => 0x20_0000,
        Some(value) => parse_size(value).ok_or_else(|| invalid("size", value))?,
    };

    let mut config = DummyConfig::new(system, chips, chip_size);
    if params.flag("batch", false)? {
        config.features |= TransportFeatures::BATCH;
    }
    config.protected_blocks = params.number("protect", 0)?;
    if config.protected_blocks > 0 {
        config.features |= TransportFeatures::READ_BLOCK_PROTECTION;
    }
    config.erase_polls = params.number("erase_polls", config.erase_polls)?;
    Ok(config)
}

#[cfg(feature = "dummy")]
fn open_dummy(params: &ProgrammerParams, system: System) -> Result<CartridgeHandle, OpenError> {
    use cartflash_dummy::DummyCartridge;

    let config = dummy_config(params, system)?;
    log::info!(
        "Opening dummy {} cartridge ({} x {} KiB)...",
        system,
        config.chips,
        config.chip_size / 1024
    );

    let cartridge = match params.get("image") {
        Some(path) => {
            let data = std::fs::read(path).map_err(|source| OpenError::Io {
                path: path.to_string(),
                source,
            })?;
            log::debug!("dummy: loaded {} bytes from {}", data.len(), path);
            DummyCartridge::with_data(config, &data)
        }
        None => DummyCartridge::new(config),
    };

    detect_and_create_handle(cartridge, system)
}

/// Information about a programmer
#[derive(Debug, Clone)]
pub struct ProgrammerInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available programmers (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_programmers() -> Vec<ProgrammerInfo> {
    let mut programmers = Vec::new();

    #[cfg(feature = "dummy")]
    programmers.push(ProgrammerInfo {
        name: "dummy",
        aliases: &["emulator"],
        description: "In-memory cartridge emulator (chips=<n>,size=<bytes>,image=<file>,batch=<yes|no>,protect=<n>,erase_polls=<n>)",
    });

    programmers
}

/// Generate a short list of programmer names for CLI help
pub fn programmer_names_short() -> String {
    let programmers = available_programmers();
    if programmers.is_empty() {
        return "none (recompile with features)".to_string();
    }
    let names: Vec<&str> = programmers.iter().map(|p| p.name).collect();
    names.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_only() {
        let params = parse_programmer_params("dummy").unwrap();
        assert_eq!(params.name, "dummy");
        assert!(params.params.is_empty());
    }

    #[test]
    fn test_parse_with_options() {
        let params = parse_programmer_params("dummy:chips=2,size=1M").unwrap();
        assert_eq!(params.name, "dummy");
        assert_eq!(params.get("chips"), Some("2"));
        assert_eq!(params.get("size"), Some("1M"));
        assert_eq!(params.get("image"), None);
    }

    #[test]
    fn test_parse_malformed_option() {
        let err = parse_programmer_params("dummy:chips").unwrap_err();
        assert!(matches!(err, OpenError::MalformedParameter(ref opt) if opt == "chips"));
        assert_eq!(
            err.to_string(),
            "Invalid parameter format: 'chips' (expected key=value)"
        );
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("512K"), Some(0x8_0000));
        assert_eq!(parse_size("2M"), Some(0x20_0000));
        assert_eq!(parse_size("0x100000"), Some(0x10_0000));
        assert_eq!(parse_size("4096"), Some(4096));
        assert_eq!(parse_size("8192M"), None);
        assert_eq!(parse_size("big"), None);
        assert_eq!(parse_size(""), None);
    }

    #[test]
    fn test_flag_values() {
        let params = parse_programmer_params("dummy:batch=yes,other=maybe").unwrap();
        assert!(params.flag("batch", false).unwrap());
        assert!(!params.flag("missing", false).unwrap());
        assert!(matches!(
            params.flag("other", false),
            Err(OpenError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_unknown_programmer() {
        let err = open_cartridge("ch341a", System::NeoGeoPocket).unwrap_err();
        assert!(matches!(err, OpenError::UnknownProgrammer(ref name) if name == "ch341a"));
    }

    #[cfg(feature = "dummy")]
    mod dummy {
        use super::*;

        #[test]
        fn test_open_default() {
            let handle = open_cartridge("dummy", System::NeoGeoPocket).unwrap();
            assert_eq!(handle.size(), 0x20_0000);
            assert_eq!(handle.chip_count(), 1);
            assert_eq!(handle.parts()[0].size, 0x20_0000);
        }

        #[test]
        fn test_open_two_chips() {
            let handle = open_cartridge("dummy:chips=2,size=1M", System::NeoGeoPocket).unwrap();
            assert_eq!(handle.size(), 0x20_0000);
            assert_eq!(handle.chip_count(), 2);
        }

        #[test]
        fn test_too_many_chips_for_system() {
            let err = open_cartridge("dummy:chips=2", System::WonderSwan).unwrap_err();
            assert!(matches!(err, OpenError::InvalidParameter { ref key, .. } if key == "chips"));
        }

        #[test]
        fn test_unknown_size_fails_detection() {
            let err = open_cartridge("dummy:size=64K", System::NeoGeoPocket).unwrap_err();
            assert!(matches!(
                err,
                OpenError::Cartridge(cartflash_core::Error::ChipNotFound { chip: 0 })
            ));
        }

        #[test]
        fn test_protect_parameter() {
            let handle = open_cartridge("dummy:size=512K,protect=7", System::NeoGeoPocket).unwrap();
            let unprotected: Vec<u32> = handle
                .cartridge()
                .unprotected_blocks()
                .map(|block| block.address)
                .collect();
            assert_eq!(unprotected, [0x7_0000, 0x7_8000, 0x7_A000, 0x7_C000]);
        }

        #[test]
        fn test_missing_image() {
            let err = open_cartridge(
                "dummy:image=/nonexistent/cartflash.bin",
                System::NeoGeoPocket,
            )
            .unwrap_err();
            assert!(matches!(err, OpenError::Io { .. }));
        }
    }
}
