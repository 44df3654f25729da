//! The serial link to the board.
//!
//! Everything `rzflash` does with the board goes through [`SerialLink`]: raw
//! writes, and reads that block until a given byte sequence shows up in the
//! stream. The real implementation sits on top of a
//! [`SerialPort`](serialport::SerialPort) (see `utils::ports`); tests drive
//! the protocol with an in-memory link instead.

use std::time::Duration;

use crate::error::Result;

/// An open, ordered and reliable byte stream to the board.
pub trait SerialLink {
    /// Write all of `bytes` to the board.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read until `delimiter` has been received and return everything read
    /// up to and including it. Bytes received after the delimiter are kept
    /// for the next read.
    ///
    /// With a `timeout`, gives up with
    /// [`ProtocolTimeout`](crate::FlashError::ProtocolTimeout) once it
    /// expires. Without one, blocks for as long as it takes.
    fn read_until(&mut self, delimiter: &[u8], timeout: Option<Duration>) -> Result<Vec<u8>>;

    /// Read a single line, line ending included.
    fn read_line(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>> {
        self.read_until(b"\n", timeout)
    }
}

impl<L: SerialLink + ?Sized> SerialLink for Box<L> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }

    fn read_until(&mut self, delimiter: &[u8], timeout: Option<Duration>) -> Result<Vec<u8>> {
        (**self).read_until(delimiter, timeout)
    }

    fn read_line(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>> {
        (**self).read_line(timeout)
    }
}

/// Position just past the first occurrence of `needle` in `haystack`,
/// searching from `from`.
pub(crate) fn find_end(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|at| from + at + needle.len())
}

// =============================================================================
// Test support
// =============================================================================

#[cfg(test)]
pub(crate) mod scripted {
    //! A [`SerialLink`] replaying canned board output and recording whatever
    //! is written to it.

    use std::{cell::RefCell, rc::Rc, time::Duration};

    use super::{find_end, SerialLink};
    use crate::error::{FlashError, Result};

    /// Bytes written to a [`ScriptedLink`], shared with the test after the
    /// link itself has been moved into the code under test.
    #[derive(Clone, Default)]
    pub(crate) struct Wire(Rc<RefCell<Vec<u8>>>);
    impl Wire {
        pub(crate) fn bytes(&self) -> Vec<u8> {
            self.0.borrow().clone()
        }

        pub(crate) fn is_empty(&self) -> bool {
            self.0.borrow().is_empty()
        }

        /// Offset of the first occurrence of `needle` in what was sent.
        pub(crate) fn position(&self, needle: &[u8]) -> Option<usize> {
            find_end(&self.0.borrow(), needle, 0).map(|end| end - needle.len())
        }

        pub(crate) fn count(&self, needle: &[u8]) -> usize {
            let sent = self.0.borrow();
            let mut from = 0;
            let mut count = 0;
            while let Some(end) = find_end(&sent, needle, from) {
                count += 1;
                from = end;
            }
            count
        }
    }

    pub(crate) struct ScriptedLink {
        incoming: Vec<u8>,
        cursor: usize,
        wire: Wire,
    }
    impl ScriptedLink {
        /// A link on which the board will emit `incoming`, in that order.
        pub(crate) fn new(incoming: &[u8]) -> (Self, Wire) {
            let wire = Wire::default();
            (
                ScriptedLink {
                    incoming: incoming.to_vec(),
                    cursor: 0,
                    wire: wire.clone(),
                },
                wire,
            )
        }
    }
    impl SerialLink for ScriptedLink {
        fn write(&mut self, bytes: &[u8]) -> Result<()> {
            self.wire.0.borrow_mut().extend_from_slice(bytes);
            Ok(())
        }

        // A board that has nothing more to say behaves like a stalled line.
        fn read_until(&mut self, delimiter: &[u8], timeout: Option<Duration>) -> Result<Vec<u8>> {
            match find_end(&self.incoming, delimiter, self.cursor) {
                Some(end) => {
                    let data = self.incoming[self.cursor..end].to_vec();
                    self.cursor = end;
                    Ok(data)
                }
                None => Err(FlashError::ProtocolTimeout {
                    expected: String::from_utf8_lossy(delimiter).into_owned(),
                    waited: timeout.unwrap_or_default(),
                }),
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
