//! Serial port device manipulation.

use std::{
    io::{self, Read, Write},
    time::{Duration, Instant},
};

use log::{debug, info, trace};
use serialport::SerialPort;

use crate::{
    error::{FlashError, Result},
    link::{find_end, SerialLink},
    Settings,
};

/// How long a single read on the port may block. Reads waiting on a
/// delimiter poll the port at this pace until their own deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Most bytes kept while waiting on a delimiter. A board stuck in a boot loop
/// can print forever while we wait for it to be powered on; only the most
/// recent output is kept.
const MAX_RETAINED: usize = 64 * 1024;

//==============================================================================
// Public Interface
//==============================================================================

/// A [`SerialLink`] over a real serial port.
pub struct PortLink {
    port: Box<dyn SerialPort>,
    /// Bytes received past the delimiter of the previous read.
    pending: Vec<u8>,
}
impl PortLink {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        PortLink {
            port,
            pending: vec![],
        }
    }
}
impl SerialLink for PortLink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        trace!("{} bytes written to serial port", bytes.len());
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_until(&mut self, delimiter: &[u8], timeout: Option<Duration>) -> Result<Vec<u8>> {
        let started = Instant::now();
        let mut searched = 0;
        let mut chunk = [0u8; 1024];

        loop {
            if let Some(end) = find_end(&self.pending, delimiter, searched) {
                let rest = self.pending.split_off(end);
                return Ok(std::mem::replace(&mut self.pending, rest));
            }
            let keep = MAX_RETAINED.max(delimiter.len());
            if self.pending.len() > keep {
                let excess = self.pending.len() - keep;
                trace!("dropping {} bytes of board output", excess);
                self.pending.drain(..excess);
            }
            // Only the tail may still hold the start of a split delimiter.
            searched = (self.pending.len() + 1).saturating_sub(delimiter.len());

            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    return Err(FlashError::ProtocolTimeout {
                        expected: String::from_utf8_lossy(delimiter).into_owned(),
                        waited: limit,
                    });
                }
            }

            match self.port.read(&mut chunk) {
                Ok(count) => {
                    trace!("{} bytes read from serial port", count);
                    self.pending.extend_from_slice(&chunk[..count]);
                }
                Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Open the port described by `settings`, retrying a few times in case the
/// USB serial controller was only just plugged in.
pub(crate) fn open_and_setup_port(settings: &Settings) -> Result<PortLink> {
    use retry::{delay, retry_with_index};

    let result = retry_with_index(
        delay::Fixed::from_millis(1000).take(4),
        |index| -> std::result::Result<Box<dyn SerialPort>, serialport::Error> {
            debug!("Trying to connect {}", index);
            serialport::new(&settings.path, settings.baud_rate)
                .data_bits(settings.data_bits)
                .stop_bits(settings.stop_bits)
                .parity(settings.parity)
                .flow_control(settings.flow_control)
                .timeout(POLL_INTERVAL)
                .open()
        },
    );

    let port = match result {
        Ok(port) => port,
        Err(retry::Error::Operation {
            error,
            total_delay,
            tries,
        }) => {
            info!(
                "Failed to open the port after {:?} and {} tries: {}",
                total_delay, tries, error,
            );
            return Err(open_failure(settings, error));
        }
        Err(retry::Error::Internal(message)) => {
            info!("Internal retry error while opening port: {}", message);
            return Err(open_failure(
                settings,
                serialport::Error::new(
                    serialport::ErrorKind::Unknown,
                    "internal error while retrying to open the port",
                ),
            ));
        }
    };

    let actual = port
        .baud_rate()
        .map_err(|error| open_failure(settings, error))?;
    if actual != settings.baud_rate {
        return Err(open_failure(
            settings,
            serialport::Error::new(
                serialport::ErrorKind::InvalidInput,
                format!(
                    "baud rate {} was not accepted (port runs at {})",
                    settings.baud_rate, actual
                ),
            ),
        ));
    }

    info!("Connected to {} at {} baud", settings.path, actual);
    debug!("data_bits    : {:?}", port.data_bits());
    debug!("stop_bits    : {:?}", port.stop_bits());
    debug!("parity       : {:?}", port.parity());
    debug!("flow control : {:?}", port.flow_control());

    Ok(PortLink::new(port))
}

//==============================================================================
// Private stuff
//==============================================================================

fn open_failure(settings: &Settings, source: serialport::Error) -> FlashError {
    FlashError::PortOpenFailure {
        port: settings.path.clone(),
        source,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
