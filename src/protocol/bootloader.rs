//! Programming the bootloader chain.
//!
//! The board boots in SCIF download mode (boot2 strapped) and its boot ROM
//! monitor asks for a program with `please send !`. We push the Flash Writer
//! application there, then use the Flash Writer shell to erase the storage and
//! write bl2 and the FIP at the load offsets the boot ROM expects.
//!
//! ```text
//!   please send ! --> Flash Writer --> '>' --+--> eMMC: EM_E, EM_SECSD x2, EM_W x2
//!                                            |
//!                                            '--> QSPI: XCS, XLS2 x2
//! ```
//!
//! The offsets are fixed by the board's boot ROM and must be sent as is.

use log::info;

use super::script::{self, Step, Wait};
use crate::{
    error::Result,
    link::SerialLink,
    settings::{ImageKind, Operation, StorageTarget},
    utils::check_images,
    Settings,
};

/// Flash Writer prompt.
const PROMPT: &str = ">";
/// Ends the partition area selection prompt of `EM_E` and `EM_W`.
const AREA_PROMPT: &str = ")>";
/// Ends the address and value prompts of `EM_W` and `EM_SECSD`.
const INPUT_PROMPT: &str = ":";
const PLEASE_SEND: &str = "please send !";

/// Write the Flash Writer, bl2 and FIP images to the storage selected in
/// `settings`.
///
/// All three images are checked before the first byte goes out; a missing one
/// fails the whole operation without touching the board.
pub fn flash_bootloader(link: &mut dyn SerialLink, settings: &Settings) -> Result<()> {
    check_images(&settings.images, &Operation::Bootloader.required_images())?;

    info!("Flashing bootloader to {}", settings.target);
    script::run(&steps(settings.target), link, settings)?;
    println!("[RZ] Done flashing bootloader!");
    Ok(())
}

/// The complete exchange for `target`.
pub(crate) fn steps(target: StorageTarget) -> Vec<Step> {
    let mut steps = flash_writer_steps();
    match target {
        StorageTarget::Emmc => steps.extend(emmc_steps()),
        StorageTarget::Qspi => steps.extend(qspi_steps()),
    }
    steps
}

// Common to eMMC and QSPI.
fn flash_writer_steps() -> Vec<Step> {
    vec![
        Step::announce("Please power on board. Make sure boot2 is strapped."),
        Step::Await(PLEASE_SEND, Wait::PowerOn),
        Step::announce("Writing Flash Writer application."),
        Step::Transfer(ImageKind::FlashWriter),
        Step::await_response(PROMPT),
        Step::announce("Done writing Flash Writer application."),
    ]
}

fn emmc_steps() -> Vec<Step> {
    let mut steps = vec![
        Step::announce("Erasing eMMC boot partition."),
        Step::prefixed("EM_E"),
        Step::await_response(AREA_PROMPT),
        Step::command("1"),
        Step::await_response(PROMPT),
    ];

    // EXT_CSD: boot from partition 1 (B1 = 2), 8 bit bus in boot mode (B3 = 8).
    steps.extend(ext_csd_steps("b1", "2"));
    steps.extend(ext_csd_steps("b3", "8"));

    steps.push(Step::announce("Writing bl2 image."));
    steps.extend(emmc_write_steps("1", "11E00", ImageKind::Bl2));
    steps.push(Step::announce("Writing FIP image."));
    steps.extend(emmc_write_steps("100", "00000", ImageKind::Fip));
    steps
}

fn ext_csd_steps(index: &'static str, value: &'static str) -> Vec<Step> {
    vec![
        Step::prefixed("EM_SECSD"),
        Step::await_response(INPUT_PROMPT),
        Step::command(index),
        Step::await_response(INPUT_PROMPT),
        Step::command(value),
        Step::await_response(PROMPT),
    ]
}

/// `EM_W` into boot partition 1, at `sector`, with the program loaded at
/// `load_address`.
fn emmc_write_steps(sector: &'static str, load_address: &'static str, image: ImageKind) -> Vec<Step> {
    vec![
        Step::prefixed("EM_W"),
        Step::await_response(AREA_PROMPT),
        Step::command("1"),
        Step::await_response(INPUT_PROMPT),
        Step::command(sector),
        Step::await_response(INPUT_PROMPT),
        Step::command(load_address),
        Step::await_response(PLEASE_SEND),
        Step::Transfer(image),
        Step::await_response("EM_W Complete!"),
    ]
}

fn qspi_steps() -> Vec<Step> {
    let mut steps = vec![
        Step::announce("Clearing QSPI flash"),
        Step::prefixed("XCS"),
        Step::await_response("Clear OK?"),
        Step::command("y"),
        Step::await_response(PROMPT),
        Step::announce("Done clearing QSPI flash"),
    ];
    steps.push(Step::announce("Flashing bl2 image to QSPI"));
    steps.extend(qspi_write_steps("11E00", "00000", PLEASE_SEND, ImageKind::Bl2));
    steps.push(Step::announce("Flashing FIP image to QSPI"));
    steps.extend(qspi_write_steps("00000", "1D200", "please send", ImageKind::Fip));
    steps
}

/// `XLS2` with the program loaded at `load_address` and saved at
/// `flash_address`.
fn qspi_write_steps(
    load_address: &'static str,
    flash_address: &'static str,
    ready: &'static str,
    image: ImageKind,
) -> Vec<Step> {
    vec![
        Step::command("XLS2"),
        Step::await_response("Please Input : H'"),
        Step::command(load_address),
        Step::await_response("Please Input : H'"),
        Step::command(flash_address),
        Step::await_response(ready),
        Step::Transfer(image),
        // Saving to SPI flash ends on the prompt.
        Step::await_response(PROMPT),
    ]
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::{fs, path::Path, time::Duration};

    use super::*;
    use crate::{
        link::scripted::ScriptedLink, settings::ImagePaths, FlashError, SettingsBuilder,
    };

    const FLASH_WRITER: &[u8] = b"S00E0000466C6173685772697465720D";
    const BL2: &[u8] = b"S0110000626C325F62702D727A626F617264FE";
    const FIP: &[u8] = b"S00F0000666970";

    /// What the monitor and the Flash Writer print during an eMMC session.
    const EMMC_SESSION: &[u8] = b"SCIF Download mode\r\n(C) Renesas Electronics Corp.\r\n\
        -- Load Program to SystemRAM ---------------\r\n\
        please send !\r\n\
        Flash writer for RZ/V2 Series V1.04 Sep.13,2022\r\n Product Code : RZ/V2L\r\n>\
        EM_E\r\n  EM_E Start --------------\r\n  Select area(0-2)>1\r\n  EM_E Complete!\r\n>\
        EM_SECSD\r\n  Please Input EXT_CSD Index(H'00 - H'1FF) :b1\r\n\
          EXT_CSD[B1] = 0x00\r\n  Please Input Value(H'00 - H'FF) :2\r\n>\
        EM_SECSD\r\n  Please Input EXT_CSD Index(H'00 - H'1FF) :b3\r\n\
          EXT_CSD[B3] = 0x00\r\n  Please Input Value(H'00 - H'FF) :8\r\n>\
        EM_W\r\n  Select area(0-2)>1\r\n  Please Input Start Address in sector :1\r\n\
          Please Input Program Start Address : 11E00\r\n please send ! ('.' & CR stop load)\r\n\
        SAVE -FLASH.......\r\n EM_W Complete!\r\n>\
        EM_W\r\n  Select area(0-2)>1\r\n  Please Input Start Address in sector :100\r\n\
          Please Input Program Start Address : 00000\r\n please send ! ('.' & CR stop load)\r\n\
        SAVE -FLASH.......\r\n EM_W Complete!\r\n>";

    /// What the monitor and the Flash Writer print during a QSPI session.
    const QSPI_SESSION: &[u8] = b"please send !\r\nFlash writer for RZ/V2 Series\r\n>\
        XCS\r\nALL ERASE SpiFlash memory\r\nClear OK?(y/n)y\r\n Erase Completed \r\n>\
        XLS2\r\n===== Qspi writing of RZ/G2 Board Command =============\r\n\
        Load Program to Spiflash\r\nWrites to any of SPI address.\r\n\
        Program Top Address & Qspi Save Address\r\n\
        ===== Please Input Program Top Address ============\r\n  Please Input : H'11E00\r\n\
        ===== Please Input Qspi Save Address ===\r\n  Please Input : H'00000\r\n\
        please send ! ('.' & CR stop load)\r\nSAVE SPI-FLASH....... complete!\r\n>\
        XLS2\r\n===== Please Input Program Top Address ============\r\n  Please Input : H'00000\r\n\
        ===== Please Input Qspi Save Address ===\r\n  Please Input : H'1D200\r\n\
        please send ! ('.' & CR stop load)\r\nSAVE SPI-FLASH....... complete!\r\n>";

    fn write_images(dir: &Path) -> ImagePaths {
        let images = ImagePaths::in_dir(dir);
        fs::write(&images.flash_writer, FLASH_WRITER).unwrap();
        fs::write(&images.bl2, BL2).unwrap();
        fs::write(&images.fip, FIP).unwrap();
        images
    }

    fn settings_for(dir: &Path, target: StorageTarget) -> Settings {
        SettingsBuilder::new()
            .image_dir(dir)
            .target(target)
            .settle_time(Duration::from_millis(0))
            .response_timeout(Some(Duration::from_secs(1)))
            .finalize()
    }

    #[test]
    fn each_missing_image_stops_before_the_board_is_touched() {
        for missing in &[ImageKind::FlashWriter, ImageKind::Bl2, ImageKind::Fip] {
            let dir = tempfile::tempdir().unwrap();
            let images = write_images(dir.path());
            fs::remove_file(images.path(*missing)).unwrap();
            let settings = settings_for(dir.path(), StorageTarget::Emmc);

            let (mut link, wire) = ScriptedLink::new(EMMC_SESSION);
            match flash_bootloader(&mut link, &settings) {
                Err(FlashError::PreflightMissingFile { image, .. }) => {
                    assert_eq!(image, *missing)
                }
                other => panic!("unexpected result {:?}", other),
            }
            assert!(wire.is_empty());
        }
    }

    #[test]
    fn emmc_sequence() {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path());
        let settings = settings_for(dir.path(), StorageTarget::Emmc);

        let (mut link, wire) = ScriptedLink::new(EMMC_SESSION);
        flash_bootloader(&mut link, &settings).unwrap();

        let erase = wire.position(b"\rEM_E\r").unwrap();
        let ext_csd = wire.position(b"\rEM_SECSD\r").unwrap();
        let write = wire.position(b"\rEM_W\r").unwrap();
        assert!(erase < ext_csd && ext_csd < write);

        let bl2 = wire.position(BL2).unwrap();
        let fip = wire.position(FIP).unwrap();
        assert!(wire.position(FLASH_WRITER).unwrap() < erase);
        assert!(write < bl2 && bl2 < fip);

        assert_eq!(wire.count(b"\rEM_SECSD\r"), 2);
        assert_eq!(wire.count(b"\rEM_W\r"), 2);
        assert!(wire.position(b"1\r1\r11E00\r").is_some());
        assert!(wire.position(b"1\r100\r00000\r").is_some());
        assert!(wire.position(b"b1\r2\r").is_some());
        assert!(wire.position(b"b3\r8\r").is_some());
        assert!(wire.position(b"XCS").is_none());
        assert!(wire.position(b"XLS2").is_none());
    }

    #[test]
    fn emmc_exact_wire_content() {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path());
        let settings = settings_for(dir.path(), StorageTarget::Emmc);

        let (mut link, wire) = ScriptedLink::new(EMMC_SESSION);
        flash_bootloader(&mut link, &settings).unwrap();

        let mut expected = FLASH_WRITER.to_vec();
        expected.extend_from_slice(b"\rEM_E\r1\r");
        expected.extend_from_slice(b"\rEM_SECSD\rb1\r2\r\rEM_SECSD\rb3\r8\r");
        expected.extend_from_slice(b"\rEM_W\r1\r1\r11E00\r");
        expected.extend_from_slice(BL2);
        expected.extend_from_slice(b"\rEM_W\r1\r100\r00000\r");
        expected.extend_from_slice(FIP);
        assert_eq!(wire.bytes(), expected);
    }

    #[test]
    fn qspi_sequence() {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path());
        let settings = settings_for(dir.path(), StorageTarget::Qspi);

        let (mut link, wire) = ScriptedLink::new(QSPI_SESSION);
        flash_bootloader(&mut link, &settings).unwrap();

        let mut expected = FLASH_WRITER.to_vec();
        expected.extend_from_slice(b"\rXCS\ry\r");
        expected.extend_from_slice(b"XLS2\r11E00\r00000\r");
        expected.extend_from_slice(BL2);
        expected.extend_from_slice(b"XLS2\r00000\r1D200\r");
        expected.extend_from_slice(FIP);
        assert_eq!(wire.bytes(), expected);

        assert_eq!(wire.count(b"XLS2\r"), 2);
        assert!(wire.position(b"EM_E").is_none());
        assert!(wire.position(b"EM_W").is_none());
    }

    #[test]
    fn stalled_flash_writer_times_out() {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path());
        let settings = settings_for(dir.path(), StorageTarget::Emmc);

        // The Flash Writer never shows its prompt.
        let (mut link, wire) = ScriptedLink::new(b"please send !\r\n");
        match flash_bootloader(&mut link, &settings) {
            Err(FlashError::ProtocolTimeout { expected, .. }) => assert_eq!(expected, ">"),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(wire.bytes(), FLASH_WRITER.to_vec());
    }

    #[test]
    fn scripts_share_the_flash_writer_upload() {
        let emmc = steps(StorageTarget::Emmc);
        let qspi = steps(StorageTarget::Qspi);
        let common = flash_writer_steps().len();
        assert_eq!(emmc[..common], qspi[..common]);
        assert_eq!(emmc[1], Step::Await(PLEASE_SEND, Wait::PowerOn));
    }
}
