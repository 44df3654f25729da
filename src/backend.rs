//! Device flashing backends.
//!
//! Once the board listens for fastboot commands on the network, pushing the
//! system image is delegated to a [`FlashingBackend`]. The default one,
//! [`FastbootBackend`], runs the `fastboot` client from the Android platform
//! tools.

use std::{
    io::{self, BufRead, BufReader, Read},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use log::{debug, info, warn};

use crate::{
    error::{FlashError, Result},
    utils::ensure_fastboot,
};

/// Something able to write a raw system image to a board reachable over UDP
/// fastboot.
pub trait FlashingBackend {
    /// Get ready to flash: locate or unpack the client, etc. Called before
    /// the board is touched.
    fn prepare(&mut self) -> Result<()>;

    /// Write `image` to the raw image partition of the board at `address`.
    fn flash_rootfs(&mut self, address: &str, image: &Path) -> Result<()>;
}

/// Flashes with the `fastboot` binary extracted from the `platform-tools`
/// archive matching the host.
#[derive(Debug)]
pub struct FastbootBackend {
    tool_dir: PathBuf,
    os: String,
    fastboot: Option<PathBuf>,
}
impl FastbootBackend {
    /// A backend looking for its archives in `tool_dir`.
    pub fn new(tool_dir: impl Into<PathBuf>) -> Self {
        Self::for_os(tool_dir, std::env::consts::OS)
    }

    /// Same as [`FastbootBackend::new`], for a specific host OS.
    pub fn for_os(tool_dir: impl Into<PathBuf>, os: &str) -> Self {
        FastbootBackend {
            tool_dir: tool_dir.into(),
            os: os.into(),
            fastboot: None,
        }
    }
}
impl FlashingBackend for FastbootBackend {
    fn prepare(&mut self) -> Result<()> {
        if self.fastboot.is_none() {
            self.fastboot = Some(ensure_fastboot(&self.tool_dir, &self.os)?);
        }
        Ok(())
    }

    fn flash_rootfs(&mut self, address: &str, image: &Path) -> Result<()> {
        self.prepare()?;
        let fastboot = match &self.fastboot {
            Some(path) => path,
            None => return Err(FlashError::MissingTool(self.tool_dir.clone())),
        };

        let mut command = Command::new(fastboot);
        command
            .arg("-s")
            .arg(format!("udp:{}", address))
            .arg("-v")
            .arg("flash")
            .arg("rawimg")
            .arg(image)
            .stdout(Stdio::piped());
        debug!("Running {:?}", command);

        let mut child = command.spawn()?;
        let forwarded = match child.stdout.take() {
            Some(stdout) => forward_output(stdout),
            None => Ok(()),
        };

        // The child is always reaped, even when its output could not be read.
        let status = child.wait()?;
        info!("fastboot finished with {}", status);
        if !status.success() {
            return Err(FlashError::SubprocessFailure {
                code: status.code(),
            });
        }
        if let Err(e) = forwarded {
            warn!("fastboot output was cut short: {}", e);
        }
        Ok(())
    }
}

/// Print the client's output line by line as it comes. Progress lines are
/// not guaranteed to be UTF-8.
fn forward_output(stdout: impl Read) -> io::Result<()> {
    let mut reader = BufReader::new(stdout);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&line);
        println!("{}", text.trim_end_matches(&['\r', '\n'][..]));
    }
}

// =============================================================================
// Test support
// =============================================================================

#[cfg(test)]
pub(crate) mod fake {
    use std::path::{Path, PathBuf};

    use super::FlashingBackend;
    use crate::error::{FlashError, Result};

    /// Records what it is asked to flash instead of running fastboot.
    #[derive(Debug, Default)]
    pub(crate) struct FakeBackend {
        pub(crate) prepared: bool,
        pub(crate) flashed: Vec<(String, PathBuf)>,
        /// Exit status fastboot pretends to fail with.
        pub(crate) exit_code: Option<i32>,
    }
    impl FlashingBackend for FakeBackend {
        fn prepare(&mut self) -> Result<()> {
            self.prepared = true;
            Ok(())
        }

        fn flash_rootfs(&mut self, address: &str, image: &Path) -> Result<()> {
            self.flashed.push((address.into(), image.into()));
            match self.exit_code {
                Some(code) => Err(FlashError::SubprocessFailure { code: Some(code) }),
                None => Ok(()),
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(all(test, unix))]
mod tests {
    use std::{
        fs,
        os::unix::fs::PermissionsExt,
        sync::{Mutex, MutexGuard},
    };

    use super::*;

    // Writing a script while another test thread forks can leave the file
    // open in the child and make exec fail with ETXTBSY.
    static SPAWN: Mutex<()> = Mutex::new(());

    fn serialize() -> MutexGuard<'static, ()> {
        SPAWN.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Put a shell script standing in for fastboot where the backend expects
    /// the extracted binary.
    fn fake_fastboot(tool_dir: &Path, script: &str) {
        let tools = tool_dir.join("platform-tools");
        fs::create_dir_all(&tools).unwrap();
        let path = tools.join("fastboot");
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn passes_address_and_image() {
        let _guard = serialize();
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("args.txt");
        fake_fastboot(
            dir.path(),
            &format!("#!/bin/sh\necho \"$@\" > {}\necho finished\n", record.display()),
        );

        let mut backend = FastbootBackend::for_os(dir.path(), "linux");
        backend
            .flash_rootfs("10.0.0.5", Path::new("/images/core.wic"))
            .unwrap();

        let args = fs::read_to_string(&record).unwrap();
        assert_eq!(args.trim(), "-s udp:10.0.0.5 -v flash rawimg /images/core.wic");
    }

    #[test]
    fn non_zero_exit_is_a_failure() {
        let _guard = serialize();
        let dir = tempfile::tempdir().unwrap();
        fake_fastboot(dir.path(), "#!/bin/sh\necho 'FAILED (remote: timeout)'\nexit 3\n");

        let mut backend = FastbootBackend::for_os(dir.path(), "linux");
        match backend.flash_rootfs("10.0.0.5", Path::new("/images/core.wic")) {
            Err(FlashError::SubprocessFailure { code }) => assert_eq!(code, Some(3)),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn binary_output_does_not_fail_a_good_run() {
        let _guard = serialize();
        let dir = tempfile::tempdir().unwrap();
        let finished = dir.path().join("finished");
        fake_fastboot(
            dir.path(),
            &format!(
                "#!/bin/sh\nprintf 'Sending sparse \\377 1/3\\n'\nsleep 1\ntouch {}\nexit 0\n",
                finished.display()
            ),
        );

        let mut backend = FastbootBackend::for_os(dir.path(), "linux");
        backend
            .flash_rootfs("10.0.0.5", Path::new("/images/core.wic"))
            .unwrap();
        // Only returns once fastboot is gone.
        assert!(finished.exists());
    }

    #[test]
    fn prepare_fails_without_tools() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FastbootBackend::for_os(dir.path(), "linux");
        assert!(matches!(
            backend.prepare(),
            Err(FlashError::MissingTool(_))
        ));
    }

    #[test]
    fn prepare_on_unknown_platform() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FastbootBackend::for_os(dir.path(), "plan9");
        assert!(matches!(
            backend.prepare(),
            Err(FlashError::UnknownPlatform(_))
        ));
    }
}
