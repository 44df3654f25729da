//! `rzflash` serial console protocols.
//!
//! Two conversations happen over the console:
//!
//! * [`flash_bootloader`] talks to the boot ROM monitor and the Flash Writer
//!   to program the bootloader chain into eMMC or QSPI,
//! * [`deploy_system_image`] talks to U-Boot to start a UDP fastboot listener
//!   and hands the rootfs image over to a
//!   [`FlashingBackend`](crate::FlashingBackend).
//!
//! Both are expressed as scripts of steps, each step naming the text it
//! waits for or the command it sends, run in strict order with no retries.

mod bootloader;
mod deploy;
mod script;

pub use bootloader::flash_bootloader;
pub use deploy::deploy_system_image;
