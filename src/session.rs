//! `rzflash` flashing session.
//!
//! A session runs one [`Operation`](crate::Operation) against the board from
//! start to finish: it checks the images, opens the serial console once and
//! drives the bootloader and rootfs protocols in order, stopping at the first
//! error.
//!
//! **Example** - Flashing the bootloader chain to QSPI:
//! ```no_run
//! use rzflash::{self as rz, Operation, StorageTarget};
//!
//! let settings = rz::SettingsBuilder::default()
//!     .target(StorageTarget::Qspi)
//!     .finalize();
//! let session = rz::factory(settings, Operation::Bootloader);
//! if let Err(e) = session.run() {
//!     eprintln!("flashing failed: {}", e);
//!     std::process::exit(1);
//! }
//! ```

#[macro_use]
mod macros;

mod events;
mod state_machine;
mod states;

pub use state_machine::{factory, factory_with, Session};
