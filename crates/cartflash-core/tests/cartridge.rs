//! Whole-cartridge operations against the emulated cartridge

use cartflash_core::cartridge::System;
use cartflash_core::error::Error;
use cartflash_core::flash::{self, ChipMode, PollTiming};
use cartflash_core::save::SaveImage;
use cartflash_core::task::{TaskProgress, TaskStatus};
use cartflash_core::transport::TransportFeatures;
use cartflash_dummy::{DummyCartridge, DummyConfig};

const CHIP_4MBIT: u32 = 0x8_0000;

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

fn ngp_two_chips() -> DummyConfig {
    DummyConfig::new(System::NeoGeoPocket, 2, CHIP_4MBIT)
}

#[test]
fn test_detect_two_chip_ngp() {
    let session =
        flash::detect(System::NeoGeoPocket, DummyCartridge::new(ngp_two_chips())).unwrap();

    let cartridge = session.cartridge();
    assert_eq!(cartridge.chip_count(), 2);
    assert_eq!(cartridge.size(), 2 * CHIP_4MBIT);
    assert_eq!(cartridge.chips()[1].base(), CHIP_4MBIT);
    assert_eq!(cartridge.base_address(), 0x20_0000);
    assert_eq!(session.parts()[0].vendor, "Toshiba");
    assert!(session.chips().iter().all(|chip| chip.mode() == ChipMode::Read));
}

#[test]
fn test_detect_stops_at_missing_chip() {
    let config = DummyConfig::new(System::NeoGeoPocket, 1, 0x20_0000);
    let session = flash::detect(System::NeoGeoPocket, DummyCartridge::new(config)).unwrap();
    assert_eq!(session.cartridge().chip_count(), 1);
    assert_eq!(session.cartridge().size(), 0x20_0000);
}

#[test]
fn test_detect_unknown_device() {
    let mut config = DummyConfig::new(System::WonderSwan, 1, CHIP_4MBIT);
    config.device_id = 0x42;
    let result = flash::detect(System::WonderSwan, DummyCartridge::new(config));
    assert!(matches!(result, Err(Error::ChipNotFound { chip: 0 })));
}

#[test]
fn test_detect_empty_slot() {
    let config = DummyConfig::new(System::WonderSwan, 0, CHIP_4MBIT);
    let result = flash::detect(System::WonderSwan, DummyCartridge::new(config));
    assert!(matches!(result, Err(Error::ChipNotFound { chip: 0 })));
}

#[test]
fn test_detect_reads_protection() {
    let mut config = DummyConfig::new(System::NeoGeoPocket, 1, CHIP_4MBIT);
    config.features = TransportFeatures::READ_BLOCK_PROTECTION;
    config.protected_blocks = 3;
    let session = flash::detect(System::NeoGeoPocket, DummyCartridge::new(config)).unwrap();

    let protected: Vec<bool> = session.cartridge().blocks().map(|b| b.protected).collect();
    assert_eq!(protected.len(), 11);
    assert!(protected[..3].iter().all(|&p| p));
    assert!(protected[3..].iter().all(|&p| !p));
}

#[test]
fn test_write_read_round_trip_manual() {
    let mut session =
        flash::detect(System::NeoGeoPocket, DummyCartridge::new(ngp_two_chips())).unwrap();

    for len in [0usize, 2, 64, 1000] {
        let data = pattern(len, len as u8);
        let address = 0x1_0000 + len as u32 * 2;
        flash::write_cartridge(&mut session, address, &data, None).unwrap();

        let mut back = vec![0u8; len];
        let done = flash::read_cartridge(&mut session, address, &mut back, None).unwrap();
        assert_eq!(done, len);
        assert_eq!(back, data, "round trip of {} bytes", len);
    }
}

#[test]
fn test_write_across_chip_boundary() {
    let mut session =
        flash::detect(System::NeoGeoPocket, DummyCartridge::new(ngp_two_chips())).unwrap();
    let data = pattern(0x200, 7);
    let address = CHIP_4MBIT - 0x100;

    let mut task = TaskProgress::new();
    flash::write_cartridge(&mut session, address, &data, Some(&mut task)).unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);
    // Last boot block of chip 0 plus first block of chip 1
    assert_eq!(task.expected(), 0x4000 + 0x1_0000);
    assert_eq!(task.accumulated(), task.expected());

    let memory = session.transport().data().to_vec();
    assert_eq!(&memory[address as usize..address as usize + 0x200], &data[..]);

    let mut task = TaskProgress::new();
    let verified = flash::verify_cartridge(&mut session, address, &data, Some(&mut task)).unwrap();
    assert_eq!(verified, data.len());
    assert_eq!(task.progress(), data.len() as u64);
}

#[test]
fn test_partial_block_write_preserves_neighbours() {
    let config = DummyConfig::new(System::WonderSwan, 1, CHIP_4MBIT);
    let original = pattern(CHIP_4MBIT as usize, 3);
    let mut session =
        flash::detect(System::WonderSwan, DummyCartridge::with_data(config, &original)).unwrap();

    flash::write_cartridge(&mut session, 0x2_0100, &[0xAB, 0xCD, 0xEF], None).unwrap();

    let memory = session.transport().data().to_vec();
    assert_eq!(&memory[0x2_0100..0x2_0103], &[0xAB, 0xCD, 0xEF]);
    assert_eq!(&memory[0x2_0000..0x2_0100], &original[0x2_0000..0x2_0100]);
    assert_eq!(&memory[0x2_0103..0x4_0000], &original[0x2_0103..0x4_0000]);
    // Only the touched 128 KiB block was erased
    assert_eq!(session.transport().erase_log(), &[(0, 0x2_0000)]);
}

#[test]
fn test_write_refuses_protected_block() {
    let mut config = DummyConfig::new(System::NeoGeoPocket, 1, CHIP_4MBIT);
    config.features = TransportFeatures::READ_BLOCK_PROTECTION;
    config.protected_blocks = 2;
    let mut session = flash::detect(System::NeoGeoPocket, DummyCartridge::new(config)).unwrap();

    let result = flash::write_cartridge(&mut session, 0x1_FFFE, &[0, 0, 0, 0], None);
    assert_eq!(result, Err(Error::Protected { address: 0x1_0000 }));
    assert!(session.transport().erase_log().is_empty());
}

#[test]
fn test_verify_mismatch() {
    let config = DummyConfig::new(System::WonderSwan, 1, CHIP_4MBIT);
    let mut session = flash::detect(System::WonderSwan, DummyCartridge::new(config)).unwrap();

    let mut expected = vec![0xFF; 32];
    expected[9] = 0x00;
    let result = flash::verify_cartridge(&mut session, 0x100, &expected, None);
    assert_eq!(
        result,
        Err(Error::VerifyMismatch {
            address: 0x109,
            expected: 0x00,
            found: 0xFF,
        })
    );
}

#[test]
fn test_verify_mismatch_ends_task_with_error() {
    let config = DummyConfig::new(System::WonderSwan, 1, CHIP_4MBIT);
    let mut session = flash::detect(System::WonderSwan, DummyCartridge::new(config)).unwrap();

    let mut task = TaskProgress::new();
    let result = flash::verify_cartridge(&mut session, 0, &[0u8; 4], Some(&mut task));
    assert_eq!(
        result,
        Err(Error::VerifyMismatch {
            address: 0,
            expected: 0x00,
            found: 0xFF,
        })
    );
    assert_eq!(task.status(), TaskStatus::Error);

    let mut task = TaskProgress::new();
    assert_eq!(
        flash::verify_cartridge(&mut session, 0, &[0xFF; 4], Some(&mut task)),
        Ok(4)
    );
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.progress(), 4);
}

#[test]
fn test_program_across_chip_boundary() {
    let mut session =
        flash::detect(System::NeoGeoPocket, DummyCartridge::new(ngp_two_chips())).unwrap();
    let data = pattern(0x20, 3);

    let mut task = TaskProgress::new();
    let done =
        flash::program_cartridge(&mut session, CHIP_4MBIT - 0x10, &data, Some(&mut task)).unwrap();
    assert_eq!(done, 0x20);
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.accumulated(), 0x20);

    let start = (CHIP_4MBIT - 0x10) as usize;
    assert_eq!(&session.transport().data()[start..start + 0x20], &data[..]);
    assert!(session.transport().erase_log().is_empty());

    assert_eq!(
        flash::program_cartridge(&mut session, 0x101, &data, None),
        Err(Error::InvalidLength { len: 0x20 })
    );
}

#[test]
fn test_read_out_of_range() {
    let mut session =
        flash::detect(System::NeoGeoPocket, DummyCartridge::new(ngp_two_chips())).unwrap();
    let mut buf = [0u8; 16];
    let result = flash::read_cartridge(&mut session, 2 * CHIP_4MBIT - 8, &mut buf, None);
    assert!(matches!(result, Err(Error::OutOfRange { .. })));
}

#[test]
fn test_read_cancelled_reports_partial() {
    let mut session =
        flash::detect(System::NeoGeoPocket, DummyCartridge::new(ngp_two_chips())).unwrap();
    let mut task = TaskProgress::new();
    task.cancel_task();

    let mut buf = [0u8; 64];
    let done = flash::read_cartridge(&mut session, 0, &mut buf, Some(&mut task)).unwrap();
    assert_eq!(done, 0);
    assert_eq!(task.status(), TaskStatus::Cancelled);
    assert_eq!(task.progress(), 0);
}

#[test]
fn test_read_failure_counts_across_chips() {
    let mut config = ngp_two_chips();
    // Chip-relative, so it trips on the second chip first
    config.fail_address = Some(0x10);
    let mut session = flash::detect(System::NeoGeoPocket, DummyCartridge::new(config)).unwrap();

    let mut task = TaskProgress::new();
    let mut buf = [0u8; 0x40];
    let result = flash::read_cartridge(&mut session, CHIP_4MBIT - 0x20, &mut buf, Some(&mut task));
    let err = result.unwrap_err();
    assert_eq!(err.completed(), Some(0x30));
    assert_eq!(task.status(), TaskStatus::Error);
    assert_eq!(task.progress(), 0x30);
}

#[test]
fn test_batch_transport_round_trip() {
    let mut config = ngp_two_chips();
    config.features = TransportFeatures::BATCH | TransportFeatures::NATIVE_ID;
    let mut session = flash::detect(System::NeoGeoPocket, DummyCartridge::new(config)).unwrap();

    let data = pattern(0x1000, 9);
    flash::write_cartridge(&mut session, 0x3_0000, &data, None).unwrap();

    let mut task = TaskProgress::new();
    let mut back = vec![0u8; data.len()];
    flash::read_cartridge(&mut session, 0x3_0000, &mut back, Some(&mut task)).unwrap();
    assert_eq!(back, data);
    assert_eq!(task.expected(), 0x1000);
    assert_eq!(task.accumulated(), 0x1000);
    assert_eq!(task.status(), TaskStatus::Completed);
}

#[test]
fn test_erase_cartridge() {
    let config = ngp_two_chips();
    let mut session = flash::detect(
        System::NeoGeoPocket,
        DummyCartridge::with_data(config, &[0u8; 2 * CHIP_4MBIT as usize]),
    )
    .unwrap();

    let mut task = TaskProgress::new();
    flash::erase_cartridge(&mut session, Some(&mut task)).unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.accumulated(), 2 * CHIP_4MBIT as u64);
    assert!(session.transport().data().iter().all(|&b| b == 0xFF));
    assert!(session.chips().iter().all(|chip| !chip.is_erasing()));
}

#[test]
fn test_native_chip_erase() {
    let mut config = DummyConfig::new(System::WonderSwan, 1, CHIP_4MBIT);
    config.features = TransportFeatures::NATIVE_CHIP_ERASE;
    let mut session = flash::detect(
        System::WonderSwan,
        DummyCartridge::with_data(config, &[0u8; CHIP_4MBIT as usize]),
    )
    .unwrap();

    let mut task = TaskProgress::new();
    flash::erase_cartridge(&mut session, Some(&mut task)).unwrap();
    assert!(session.transport().data().iter().all(|&b| b == 0xFF));

    // The native erase reports the whole chip itself
    assert_eq!(task.updates(), 1);
    assert_eq!(task.accumulated(), CHIP_4MBIT as u64);
    assert_eq!(task.status(), TaskStatus::Completed);
}

#[test]
fn test_erase_timeout_leaves_chip_erasing() {
    let mut config = DummyConfig::new(System::WonderSwan, 1, CHIP_4MBIT);
    config.erase_polls = 1000;
    let mut session = flash::detect(System::WonderSwan, DummyCartridge::new(config)).unwrap();

    let chip = session.chip_mut(0).unwrap();
    chip.erase_block(0x4_0000).unwrap();
    let timing = PollTiming {
        poll_delay_us: 100,
        timeout_us: 1000,
    };
    assert_eq!(flash::wait_erase_complete(chip, timing), Err(Error::Timeout));
    assert_eq!(chip.mode(), ChipMode::Erase);
    assert_eq!(session.transport().delayed_us(), 1000);
}

#[test]
fn test_erase_unprotected_blocks() {
    let mut config = DummyConfig::new(System::NeoGeoPocket, 1, CHIP_4MBIT);
    config.features = TransportFeatures::READ_BLOCK_PROTECTION;
    config.protected_blocks = 7;
    let mut session = flash::detect(
        System::NeoGeoPocket,
        DummyCartridge::with_data(config, &[0u8; CHIP_4MBIT as usize]),
    )
    .unwrap();

    let erased = flash::erase_unprotected_blocks(&mut session, None).unwrap();
    assert_eq!(erased, 4);
    let memory = session.transport().data().to_vec();
    assert!(memory[..0x7_0000].iter().all(|&b| b == 0x00));
    assert!(memory[0x7_0000..].iter().all(|&b| b == 0xFF));
}

#[test]
fn test_save_backup_and_restore() {
    let mut config = DummyConfig::new(System::NeoGeoPocket, 1, CHIP_4MBIT);
    config.features = TransportFeatures::READ_BLOCK_PROTECTION;
    config.protected_blocks = 7;
    let mut session = flash::detect(System::NeoGeoPocket, DummyCartridge::new(config)).unwrap();

    // Game data in a protected block, save data in two boot blocks
    session.transport_mut().data_mut()[0x100..0x110].fill(0x11);
    let save_a = pattern(0x100, 1);
    let save_b = pattern(0x80, 2);
    flash::write_cartridge(&mut session, 0x7_8000, &save_a, None).unwrap();
    flash::write_cartridge(&mut session, 0x7_C000, &save_b, None).unwrap();

    let image = flash::backup_save(&mut session, None).unwrap();
    assert_eq!(image.len(), 2);
    assert_eq!(image.blocks()[0].address, 0x20_0000 + 0x7_8000);
    assert_eq!(image.blocks()[0].data.len(), 0x2000);
    assert_eq!(&image.blocks()[0].data[..0x100], &save_a[..]);
    assert_eq!(image.blocks()[1].address, 0x20_0000 + 0x7_C000);

    let bytes = image.to_bytes().unwrap();
    let parsed = SaveImage::parse(&bytes).unwrap();

    flash::erase_unprotected_blocks(&mut session, None).unwrap();
    assert!(flash::backup_save(&mut session, None).unwrap().is_empty());

    let mut task = TaskProgress::new();
    flash::restore_save(&mut session, &parsed, Some(&mut task)).unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.progress(), 0x2000 + 0x4000);

    let memory = session.transport().data().to_vec();
    assert_eq!(&memory[0x7_8000..0x7_8100], &save_a[..]);
    assert_eq!(&memory[0x7_C000..0x7_C080], &save_b[..]);
    assert!(memory[0x100..0x110].iter().all(|&b| b == 0x11));
}

#[test]
fn test_restore_rejects_protected_entry() {
    let mut config = DummyConfig::new(System::NeoGeoPocket, 1, CHIP_4MBIT);
    config.features = TransportFeatures::READ_BLOCK_PROTECTION;
    config.protected_blocks = 7;
    let mut session = flash::detect(System::NeoGeoPocket, DummyCartridge::new(config)).unwrap();

    let mut image = SaveImage::new();
    image.push(0x20_0000 + 0x7_8000, vec![0u8; 16]);
    image.push(0x20_0000 + 0x1000, vec![0u8; 16]);

    let result = flash::restore_save(&mut session, &image, None);
    assert_eq!(result, Err(Error::Protected { address: 0 }));
    assert!(session.transport().erase_log().is_empty());
}

#[test]
fn test_restore_rejects_foreign_address() {
    let config = DummyConfig::new(System::NeoGeoPocket, 1, CHIP_4MBIT);
    let mut session = flash::detect(System::NeoGeoPocket, DummyCartridge::new(config)).unwrap();

    let mut image = SaveImage::new();
    image.push(0x1000, vec![0u8; 16]);
    assert!(matches!(
        flash::restore_save(&mut session, &image, None),
        Err(Error::OutOfRange { .. })
    ));
}
