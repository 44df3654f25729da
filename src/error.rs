//! Errors reported by `rzflash`.
//!
//! None of these are recovered from locally. The operator is expected to fix
//! the physical setup (power, boot strapping, cabling) and run the tool again,
//! so every variant carries enough context to say what went wrong.

use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::settings::ImageKind;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, FlashError>;

#[derive(Debug, Error)]
pub enum FlashError {
    /// One of the images needed by the requested operation is not on disk.
    /// Raised before anything is sent to the board.
    #[error("missing {image} image: {}", .path.display())]
    PreflightMissingFile { image: ImageKind, path: PathBuf },

    #[error(
        "unable to open serial port {port}: {source}. \
         Do you have sufficient permissions? Is your device connected?"
    )]
    PortOpenFailure {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// The board never emitted the text we were waiting for.
    #[error("timed out after {waited:?} waiting for `{expected}` from the board")]
    ProtocolTimeout { expected: String, waited: Duration },

    #[error("the board reported an unusable fastboot address `{0}`")]
    InvalidDeviceAddress(String),

    #[error("failed to flash rootfs: fastboot exited with {}", describe_exit(.code))]
    SubprocessFailure { code: Option<i32> },

    #[error("unknown platform `{0}`: no fastboot archive is available for it")]
    UnknownPlatform(String),

    #[error("can't find fastboot for your system at {}", .0.display())]
    MissingTool(PathBuf),

    #[error("unable to extract fastboot archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by a signal)".into(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn missing_file_names_the_image() {
    let err = FlashError::PreflightMissingFile {
        image: ImageKind::Fip,
        path: PathBuf::from("/tmp/fip-rzboard.srec"),
    };
    let message = err.to_string().to_lowercase();
    assert!(message.contains("missing"));
    assert!(message.contains("fip image"));
    assert!(message.contains("/tmp/fip-rzboard.srec"));
}

#[test]
fn port_failure_suggests_checks() {
    let err = FlashError::PortOpenFailure {
        port: "/dev/ttyUSB7".into(),
        source: serialport::Error::new(serialport::ErrorKind::NoDevice, "no such device"),
    };
    let message = err.to_string();
    assert!(message.contains("/dev/ttyUSB7"));
    assert!(message.contains("permissions"));
}

#[test]
fn subprocess_failure_without_status() {
    let err = FlashError::SubprocessFailure { code: None };
    assert!(err.to_string().contains("signal"));
}
