//! Locating and unpacking the fastboot client shipped as Android
//! `platform-tools` archives next to `rzflash`.

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use log::{debug, info};

use crate::error::{FlashError, Result};

/// Name of the archive holding the platform tools for host `os` (as found in
/// [`std::env::consts::OS`]).
pub(crate) fn archive_name(os: &str) -> Result<&'static str> {
    match os {
        "linux" => Ok("platform-tools-latest-linux.zip"),
        "macos" => Ok("platform-tools-latest-darwin.zip"),
        "windows" => Ok("platform-tools-latest-windows.zip"),
        other => Err(FlashError::UnknownPlatform(other.into())),
    }
}

/// Where the fastboot binary lands once the archive is extracted in
/// `tool_dir`.
pub(crate) fn fastboot_path(tool_dir: &Path, os: &str) -> PathBuf {
    let name = if os == "windows" {
        "fastboot.exe"
    } else {
        "fastboot"
    };
    tool_dir.join("platform-tools").join(name)
}

/// Make sure the fastboot binary for `os` is available under `tool_dir`,
/// extracting the matching archive when it is not, and return its path.
pub(crate) fn ensure_fastboot(tool_dir: &Path, os: &str) -> Result<PathBuf> {
    let fastboot = fastboot_path(tool_dir, os);
    if fastboot.is_file() {
        debug!("Using already extracted `{}`", fastboot.display());
        return Ok(fastboot);
    }

    let archive = tool_dir.join(archive_name(os)?);
    if !archive.is_file() {
        return Err(FlashError::MissingTool(archive));
    }

    info!("Extracting `{}`", archive.display());
    extract_zip(File::open(&archive)?, tool_dir)?;

    if !fastboot.is_file() {
        return Err(FlashError::MissingTool(fastboot));
    }
    make_executable(&fastboot)?;
    Ok(fastboot)
}

/// Extract the zipfile to the target directory, creating every file and
/// directory it contains.
fn extract_zip<R: io::Read + io::Seek>(archive_data: R, extract_to: &Path) -> Result<()> {
    let mut archive = zip::ZipArchive::new(archive_data)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let output_path = extract_to.join(entry.mangled_name());
        if entry.is_dir() {
            fs::create_dir_all(&output_path)?;
        } else {
            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&output_path)?;
            io::copy(&mut entry, &mut outfile)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
