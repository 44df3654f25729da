//! Helper functions to deal with serial ports, image files and the fastboot
//! tool.

mod images;
mod ports;
mod tools;

pub(crate) use images::{check_images, send_image};
pub use ports::PortLink;
pub(crate) use ports::open_and_setup_port;
pub(crate) use tools::ensure_fastboot;
