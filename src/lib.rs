//! `rzflash` programs the bootloader chain and the root filesystem image of a
//! Renesas RZ/V2L based board from a host computer, over the board's serial
//! console and, for the rootfs, over the network with `fastboot`.
//!
//! Flashing happens in up to two parts:
//!
//! * **bootloader**: with the board strapped for serial download, the Flash
//!   Writer program is pushed into the board's RAM and then driven to erase
//!   the target storage (eMMC or QSPI flash) and write the `bl2` and `FIP`
//!   images to it,
//! * **rootfs**: with the board strapped to boot from its storage, U-Boot's
//!   autoboot is interrupted, networking is brought up and a UDP fastboot
//!   listener is started, to which the host `fastboot` client sends the system
//!   image.
//!
//! Every step of the serial conversation waits for a known piece of text from
//! the board before sending the next command. The operator only has to power
//! the board on when asked to.
//!
//! The flashing run itself is implemented as a state machine, in the
//! [`session`] module, with the following characteristics:
//!
//! * Can only be in one state at any time.
//! * Each state can have its own associated data if needed.
//! * There is some shared data between **all** states.
//! * Transitions between states are triggered via typed **events** and only
//!   explicitly defined transitions are permitted.
//! * Transitioning from one state to another consumes the original state.
//! * Data, such as the open serial link, is transferred from one state to the
//!   next by attaching it to the transition event.
//!
//! The implementation of state transitions leverages `rust`'s `From` and `Into`
//! pattern. Only transitions for which the `From` trait is implemented are
//! authorized and any other transition would be detected at compile-time as an
//! error.

mod backend;
mod error;
mod link;
mod protocol;
pub mod session;
mod settings;
mod utils;

pub use backend::{FastbootBackend, FlashingBackend};
pub use error::{FlashError, Result};
pub use link::SerialLink;
pub use protocol::{deploy_system_image, flash_bootloader};
pub use session::{factory, factory_with, Session};
pub use settings::{
    ImageKind, ImagePaths, Operation, Settings, SettingsBuilder, StorageTarget,
    BL2_FILE_DEFAULT, CORE_IMAGE_FILE_DEFAULT, FIP_FILE_DEFAULT, FLASH_WRITER_FILE_DEFAULT,
};
pub use utils::PortLink;
