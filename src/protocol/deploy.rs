//! Deploying the system image.
//!
//! The board boots normally into U-Boot, where we stop autoboot, give it a
//! network address and start its UDP fastboot listener. The address it
//! listens on is read back from the console and handed to a
//! [`FlashingBackend`] which does the actual transfer.

use log::info;

use super::script::{self, Step, Wait};
use crate::{
    backend::FlashingBackend,
    error::{FlashError, Result},
    link::SerialLink,
    settings::ImageKind,
    utils::check_images,
    Settings,
};

const LISTENING: &str = "Listening for fastboot command on ";

/// Put the board in fastboot mode and flash the rootfs image with `backend`.
pub fn deploy_system_image(
    link: &mut dyn SerialLink,
    backend: &mut dyn FlashingBackend,
    settings: &Settings,
) -> Result<()> {
    check_images(&settings.images, &[ImageKind::Rootfs])?;
    backend.prepare()?;

    script::run(&steps(settings), link, settings)?;

    let line = link.read_line(settings.response_timeout)?;
    let address = parse_address(&line)?;
    println!("[RZ] Device in fastboot mode at {}", address);

    info!("Flashing `{}`", settings.images.rootfs.display());
    backend.flash_rootfs(&address, &settings.images.rootfs)?;
    println!("[RZ] Done flashing rootfs!");
    Ok(())
}

/// Exchange leading to the fastboot listener.
pub(crate) fn steps(settings: &Settings) -> Vec<Step> {
    let mut steps = vec![
        Step::announce("Power on board. Make sure boot2 strap is NOT on."),
        Step::announce("Waiting for device..."),
        Step::Await("Hit any key to stop autoboot:", Wait::PowerOn),
        Step::command("y"),
        Step::Settle,
    ];

    match settings.static_ip {
        Some(ip) => {
            steps.push(Step::announce(format!("Setting static IP: {}", ip)));
            steps.push(Step::prefixed(format!("setenv ipaddr {}", ip)));
        }
        None => {
            steps.push(Step::announce(
                "Waiting for device to be assigned IP address...",
            ));
            steps.push(Step::prefixed("setenv autoload no; dhcp"));
            steps.push(Step::await_response("DHCP client bound"));
        }
    }

    steps.extend(vec![
        Step::Settle,
        Step::announce("Putting device into fastboot mode"),
        Step::prefixed("fastboot udp"),
        Step::await_response(LISTENING),
    ]);
    steps
}

/// The address is whatever remains of the line once the line ending is gone.
fn parse_address(line: &[u8]) -> Result<String> {
    let address = String::from_utf8_lossy(line).trim().to_string();
    if address.is_empty() || address.contains(char::is_whitespace) {
        return Err(FlashError::InvalidDeviceAddress(address));
    }
    Ok(address)
}

// =============================================================================
// Unit Tests
// =============================================================================
