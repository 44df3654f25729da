//! Settings for a flashing run: serial port, storage target, image locations
//! and protocol pacing.
//!
//! Use the [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
//! pattern to set the configurable values. Once built, the settings are not
//! modified for the rest of the run.

use std::{
    fmt,
    net::Ipv4Addr,
    path::{Path, PathBuf},
    time::Duration,
};

pub use serialport::{DataBits, FlowControl, Parity, StopBits};

/// Default name of the Flash Writer application image.
pub const FLASH_WRITER_FILE_DEFAULT: &str = "Flash_Writer_SCIF_rzboard.mot";
/// Default name of the second stage loader (bl2) image.
pub const BL2_FILE_DEFAULT: &str = "bl2_bp-rzboard.srec";
/// Default name of the firmware image package.
pub const FIP_FILE_DEFAULT: &str = "fip-rzboard.srec";
/// Default name of the root filesystem image.
pub const CORE_IMAGE_FILE_DEFAULT: &str = "avnet-core-image-rzboard.wic";

// =============================================================================
// Public Interface
// =============================================================================

/// Non-volatile storage the bootloader chain is written to. Selects the Flash
/// Writer command set and the load offsets.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StorageTarget {
    Emmc,
    Qspi,
}
impl fmt::Display for StorageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageTarget::Emmc => write!(f, "eMMC"),
            StorageTarget::Qspi => write!(f, "QSPI"),
        }
    }
}

/// The four images `rzflash` knows how to push.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ImageKind {
    FlashWriter,
    Bl2,
    Fip,
    Rootfs,
}
impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageKind::FlashWriter => write!(f, "flash writer"),
            ImageKind::Bl2 => write!(f, "bl2"),
            ImageKind::Fip => write!(f, "FIP"),
            ImageKind::Rootfs => write!(f, "system"),
        }
    }
}

/// Locations of the images on the host.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ImagePaths {
    pub flash_writer: PathBuf,
    pub bl2: PathBuf,
    pub fip: PathBuf,
    pub rootfs: PathBuf,
}
impl ImagePaths {
    /// Use the default image file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        ImagePaths {
            flash_writer: dir.join(FLASH_WRITER_FILE_DEFAULT),
            bl2: dir.join(BL2_FILE_DEFAULT),
            fip: dir.join(FIP_FILE_DEFAULT),
            rootfs: dir.join(CORE_IMAGE_FILE_DEFAULT),
        }
    }

    pub fn path(&self, kind: ImageKind) -> &Path {
        match kind {
            ImageKind::FlashWriter => &self.flash_writer,
            ImageKind::Bl2 => &self.bl2,
            ImageKind::Fip => &self.fip,
            ImageKind::Rootfs => &self.rootfs,
        }
    }
}

/// What a run flashes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Operation {
    /// Flash Writer, bl2 and FIP only.
    Bootloader,
    /// The system image over fastboot only.
    Rootfs,
    /// The bootloader chain, then the system image.
    Full,
}
impl Operation {
    /// Decide the operation from the command line flags.
    ///
    /// An explicit mode flag always wins. Without one, providing every
    /// bootloader image override asks for the bootloader, providing the rootfs
    /// override asks for the rootfs and providing both asks for a full flash.
    /// `None` means nothing was requested.
    pub fn select(
        bootloader: bool,
        rootfs: bool,
        full: bool,
        bootloader_overrides: bool,
        rootfs_override: bool,
    ) -> Option<Operation> {
        match (bootloader, rootfs, full) {
            (true, _, _) => Some(Operation::Bootloader),
            (_, true, _) => Some(Operation::Rootfs),
            (_, _, true) => Some(Operation::Full),
            _ => match (bootloader_overrides, rootfs_override) {
                (true, true) => Some(Operation::Full),
                (true, false) => Some(Operation::Bootloader),
                (false, true) => Some(Operation::Rootfs),
                (false, false) => None,
            },
        }
    }

    pub fn flashes_bootloader(self) -> bool {
        matches!(self, Operation::Bootloader | Operation::Full)
    }

    pub fn deploys_rootfs(self) -> bool {
        matches!(self, Operation::Rootfs | Operation::Full)
    }

    /// Images that must be on disk before the run touches the board.
    pub fn required_images(self) -> Vec<ImageKind> {
        let mut images = vec![];
        if self.flashes_bootloader() {
            images.extend(&[ImageKind::FlashWriter, ImageKind::Bl2, ImageKind::Fip]);
        }
        if self.deploys_rootfs() {
            images.push(ImageKind::Rootfs);
        }
        images
    }
}

/// Groups all settings of a flashing run.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Settings {
    /// The port name, usually the device path.
    pub path: String,
    /// The baud rate in symbols-per-second.
    pub baud_rate: u32,
    /// Number of bits used to represent a character sent on the line.
    pub data_bits: DataBits,
    /// The type of signalling to use for controlling data transfer.
    pub flow_control: FlowControl,
    /// The type of parity to use for error checking.
    pub parity: Parity,
    /// Number of bits to use to signal the end of a character.
    pub stop_bits: StopBits,

    /// Where the bootloader chain gets written.
    pub target: StorageTarget,
    pub images: ImagePaths,

    /// Address given to the board for fastboot. When not set, the board asks
    /// for one over DHCP.
    pub static_ip: Option<Ipv4Addr>,
    /// Echo what the board sends back while waiting on it.
    pub debug: bool,

    /// Pause used where the board gives nothing to wait for.
    pub settle_time: Duration,
    /// Limit on waiting for a reply to a command. `None` waits forever.
    pub response_timeout: Option<Duration>,
    /// Limit on waiting for the board to be powered on. `None` waits forever.
    pub power_on_timeout: Option<Duration>,

    /// Directory holding the fastboot `platform-tools` archives.
    pub tool_dir: PathBuf,

    /// Restrict creation of `Settings` instances unless through the
    /// `SettingsBuilder`.
    #[doc(hidden)]
    _private_use_builder: (),
}

/// The builder for the `Settings` values.
///
/// All values are optional and have default values that will be used if not
/// explicitly set. Image and tool locations default to the current working
/// directory.
///
/// **Example**
///
/// ```
/// use rzflash::{SettingsBuilder, StorageTarget};
///
/// let settings = SettingsBuilder::new()
///     .path("/dev/ttyUSB1")
///     .target(StorageTarget::Qspi)
///     .finalize();
/// assert_eq!(settings.baud_rate, 115_200);
/// ```
pub struct SettingsBuilder {
    settings: Settings,
}
impl SettingsBuilder {
    /// Start building the settings using default values.
    pub fn new() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        SettingsBuilder {
            settings: Settings {
                path: "/dev/ttyUSB0".into(),
                baud_rate: 115_200,
                data_bits: DataBits::Eight,
                flow_control: FlowControl::None,
                parity: Parity::None,
                stop_bits: StopBits::One,
                target: StorageTarget::Emmc,
                images: ImagePaths::in_dir(&cwd),
                static_ip: None,
                debug: false,
                settle_time: Duration::from_secs(1),
                response_timeout: Some(Duration::from_secs(300)),
                power_on_timeout: None,
                tool_dir: cwd.join("adb"),
                _private_use_builder: (),
            },
        }
    }

    /// Set the path to the serial port
    pub fn path<'a>(mut self, path: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.path = path.into().into_owned();
        self
    }

    /// Set the baud rate in symbols-per-second
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.settings.baud_rate = baud_rate;
        self
    }

    /// Set the number of bits used to represent a character sent on the line
    pub fn data_bits(mut self, data_bits: DataBits) -> Self {
        self.settings.data_bits = data_bits;
        self
    }

    /// Set the type of signalling to use for controlling data transfer
    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.settings.flow_control = flow_control;
        self
    }

    /// Set the type of parity to use for error checking
    pub fn parity(mut self, parity: Parity) -> Self {
        self.settings.parity = parity;
        self
    }

    /// Set the number of bits to use to signal the end of a character
    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.settings.stop_bits = stop_bits;
        self
    }

    pub fn target(mut self, target: StorageTarget) -> Self {
        self.settings.target = target;
        self
    }

    /// Look for all images under `dir` using their default file names
    pub fn image_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.settings.images = ImagePaths::in_dir(dir);
        self
    }

    /// Override the location of a single image
    pub fn image(mut self, kind: ImageKind, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match kind {
            ImageKind::FlashWriter => self.settings.images.flash_writer = path,
            ImageKind::Bl2 => self.settings.images.bl2 = path,
            ImageKind::Fip => self.settings.images.fip = path,
            ImageKind::Rootfs => self.settings.images.rootfs = path,
        }
        self
    }

    pub fn static_ip(mut self, ip: Ipv4Addr) -> Self {
        self.settings.static_ip = Some(ip);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.settings.debug = debug;
        self
    }

    pub fn settle_time(mut self, settle_time: Duration) -> Self {
        self.settings.settle_time = settle_time;
        self
    }

    pub fn response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.settings.response_timeout = timeout;
        self
    }

    pub fn power_on_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.settings.power_on_timeout = timeout;
        self
    }

    /// Set the directory holding the fastboot archives
    pub fn tool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.tool_dir = dir.into();
        self
    }

    pub fn finalize(self) -> Settings {
        self.settings
    }
}
impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn all_default() {
    let settings = SettingsBuilder::new().finalize();
    let cwd = std::env::current_dir().unwrap();
    assert_eq!(
        settings,
        Settings {
            path: "/dev/ttyUSB0".into(),
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            target: StorageTarget::Emmc,
            images: ImagePaths::in_dir(&cwd),
            static_ip: None,
            debug: false,
            settle_time: Duration::from_secs(1),
            response_timeout: Some(Duration::from_secs(300)),
            power_on_timeout: None,
            tool_dir: cwd.join("adb"),
            _private_use_builder: (),
        }
    )
}

#[test]
fn path() {
    let settings = SettingsBuilder::new().path("/dev/ttyACM0").finalize();
    assert_eq!(settings.path, "/dev/ttyACM0");
}

#[test]
fn baud_rate() {
    let baud_rate = 921_600;
    let settings = SettingsBuilder::new().baud_rate(baud_rate).finalize();
    assert_eq!(settings.baud_rate, baud_rate);
}

#[test]
fn parity() {
    let parity = Parity::Even;
    let settings = SettingsBuilder::new().parity(parity).finalize();
    assert_eq!(settings.parity, parity);
}

#[test]
fn default_image_names() {
    let images = ImagePaths::in_dir("/srv/images");
    assert_eq!(
        images.flash_writer,
        PathBuf::from("/srv/images/Flash_Writer_SCIF_rzboard.mot")
    );
    assert_eq!(images.bl2, PathBuf::from("/srv/images/bl2_bp-rzboard.srec"));
    assert_eq!(images.fip, PathBuf::from("/srv/images/fip-rzboard.srec"));
    assert_eq!(
        images.path(ImageKind::Rootfs),
        Path::new("/srv/images/avnet-core-image-rzboard.wic")
    );
}

#[test]
fn single_image_override_keeps_the_others() {
    let settings = SettingsBuilder::new()
        .image_dir("/srv/images")
        .image(ImageKind::Rootfs, "/data/custom.wic")
        .finalize();
    assert_eq!(settings.images.rootfs, PathBuf::from("/data/custom.wic"));
    assert_eq!(settings.images.fip, PathBuf::from("/srv/images/fip-rzboard.srec"));
}

#[test]
fn static_ip_and_target() {
    let settings = SettingsBuilder::new()
        .static_ip(Ipv4Addr::new(192, 168, 1, 50))
        .target(StorageTarget::Qspi)
        .finalize();
    assert_eq!(settings.static_ip, Some(Ipv4Addr::new(192, 168, 1, 50)));
    assert_eq!(settings.target, StorageTarget::Qspi);
}

#[test]
fn operation_from_mode_flags() {
    assert_eq!(
        Operation::select(true, false, false, false, false),
        Some(Operation::Bootloader)
    );
    assert_eq!(
        Operation::select(false, true, false, false, false),
        Some(Operation::Rootfs)
    );
    assert_eq!(
        Operation::select(false, false, true, false, false),
        Some(Operation::Full)
    );
    assert_eq!(Operation::select(false, false, false, false, false), None);
}

#[test]
fn operation_from_image_overrides() {
    assert_eq!(
        Operation::select(false, false, false, true, false),
        Some(Operation::Bootloader)
    );
    assert_eq!(
        Operation::select(false, false, false, false, true),
        Some(Operation::Rootfs)
    );
    assert_eq!(
        Operation::select(false, false, false, true, true),
        Some(Operation::Full)
    );
    // An explicit flag is never widened by an override.
    assert_eq!(
        Operation::select(false, false, true, false, true),
        Some(Operation::Full)
    );
}

#[test]
fn required_images() {
    assert_eq!(
        Operation::Bootloader.required_images(),
        vec![ImageKind::FlashWriter, ImageKind::Bl2, ImageKind::Fip]
    );
    assert_eq!(Operation::Rootfs.required_images(), vec![ImageKind::Rootfs]);
    assert_eq!(Operation::Full.required_images().len(), 4);
}
