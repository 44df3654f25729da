//! Command/response scripts.
//!
//! The conversation with the boot ROM monitor, the Flash Writer and U-Boot is
//! a strict sequence: wait for some text, answer with a command, push a file,
//! wait again. A [`Step`] names one of these transitions and [`run`] walks a
//! list of them, one at a time, never going back.

use std::thread;

use console::style;
use hexplay::HexViewBuilder;
use log::{debug, log_enabled, Level::Trace};

use crate::{
    error::Result, link::SerialLink, settings::ImageKind, utils::send_image, Settings,
};

/// How long an [`Await`](Step::Await) may take.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Wait {
    /// The board answers a command we just sent.
    Response,
    /// An operator has to power on or strap the board first.
    PowerOn,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) enum Step {
    /// Block until the board emits the given text.
    Await(&'static str, Wait),
    /// Send a command terminated by a carriage return.
    Command(String),
    /// Send a command with a carriage return before and after it.
    PrefixedCommand(String),
    /// Push the raw content of an image.
    Transfer(ImageKind),
    /// Pause where the board gives no echo to wait for.
    Settle,
    /// Tell the operator what is going on.
    Announce(String),
}
impl Step {
    pub(crate) fn await_response(delimiter: &'static str) -> Step {
        Step::Await(delimiter, Wait::Response)
    }

    pub(crate) fn command(command: impl Into<String>) -> Step {
        Step::Command(command.into())
    }

    pub(crate) fn prefixed(command: impl Into<String>) -> Step {
        Step::PrefixedCommand(command.into())
    }

    pub(crate) fn announce(message: impl Into<String>) -> Step {
        Step::Announce(message.into())
    }
}

/// Execute `steps` in order against `link`.
pub(crate) fn run(steps: &[Step], link: &mut dyn SerialLink, settings: &Settings) -> Result<()> {
    for step in steps {
        debug!("step: {:?}", step);
        match step {
            Step::Await(delimiter, wait) => {
                let timeout = match wait {
                    Wait::Response => settings.response_timeout,
                    Wait::PowerOn => settings.power_on_timeout,
                };
                let received = link.read_until(delimiter.as_bytes(), timeout)?;
                echo(&received, settings.debug);
            }
            Step::Command(command) => {
                link.write(format!("{}\r", command).as_bytes())?;
            }
            Step::PrefixedCommand(command) => {
                link.write(format!("\r{}\r", command).as_bytes())?;
            }
            Step::Transfer(kind) => {
                send_image(link, &settings.images, *kind)?;
            }
            Step::Settle => thread::sleep(settings.settle_time),
            Step::Announce(message) => println!("[RZ] {}", message),
        }
    }
    Ok(())
}

fn echo(received: &[u8], debug: bool) {
    if debug {
        println!("{}", style(String::from_utf8_lossy(received)).dim());
    }
    // Dump the received data in a hex table for debugging
    if log_enabled!(Trace) {
        let view = HexViewBuilder::new(received)
            .address_offset(0)
            .row_width(16)
            .finish();
        println!("{}", view);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
