//! Helper functions to check and push image files over the serial link.

use std::{
    fs::File,
    io::{self, Read},
};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, trace};

use crate::{
    error::{FlashError, Result},
    link::SerialLink,
    settings::{ImageKind, ImagePaths},
};

/// Size of the chunks pushed to the link during a transfer.
const CHUNK_SIZE: usize = 1024;

/// Make sure every image in `kinds` is an existing file. Stops at the first
/// missing one.
pub(crate) fn check_images(images: &ImagePaths, kinds: &[ImageKind]) -> Result<()> {
    for &kind in kinds {
        let path = images.path(kind);
        if !path.is_file() {
            debug!("`{}` is not a file", path.display());
            return Err(FlashError::PreflightMissingFile {
                image: kind,
                path: path.to_path_buf(),
            });
        }
    }
    Ok(())
}

/// Push the raw content of an image to the board.
pub(crate) fn send_image(
    link: &mut dyn SerialLink,
    images: &ImagePaths,
    kind: ImageKind,
) -> Result<u64> {
    let path = images.path(kind);
    let mut file = File::open(path).map_err(|e| {
        debug!("`{}` error: {}", path.display(), e);
        match e.kind() {
            io::ErrorKind::NotFound => FlashError::PreflightMissingFile {
                image: kind,
                path: path.to_path_buf(),
            },
            _ => FlashError::Io(e),
        }
    })?;
    let size = file.metadata()?.len();

    let pb = ProgressBar::new(size);
    pb.set_style(ProgressStyle::default_bar()
        .template("[RZ] ⏩ {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .progress_chars("=>-"));
    pb.set_message(format!("Writing {}", kind));

    let mut written: u64 = 0;
    let mut chunk = vec![0; CHUNK_SIZE];
    loop {
        let bytes_in = file.read(&mut chunk)?;
        if bytes_in == 0 {
            break;
        }
        trace!("{} bytes read from {}", bytes_in, path.display());
        link.write(&chunk[..bytes_in])?;
        written += bytes_in as u64;
        pb.set_position(written);
    }
    pb.finish_with_message(format!("{} image sent", kind));

    debug!(
        "{} bytes of `{}` sent ({} expected)",
        written,
        path.display(),
        size
    );
    Ok(written)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::link::scripted::ScriptedLink;

    #[test]
    fn all_images_present() {
        let dir = tempfile::tempdir().unwrap();
        let images = ImagePaths::in_dir(dir.path());
        fs::write(&images.bl2, b"S0").unwrap();
        fs::write(&images.fip, b"S0").unwrap();
        assert!(check_images(&images, &[ImageKind::Bl2, ImageKind::Fip]).is_ok());
    }

    #[test]
    fn first_missing_image_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let images = ImagePaths::in_dir(dir.path());
        fs::write(&images.flash_writer, b"S0").unwrap();

        match check_images(
            &images,
            &[ImageKind::FlashWriter, ImageKind::Bl2, ImageKind::Fip],
        ) {
            Err(FlashError::PreflightMissingFile { image, path }) => {
                assert_eq!(image, ImageKind::Bl2);
                assert_eq!(path, images.bl2);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn a_directory_is_not_an_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut images = ImagePaths::in_dir(dir.path());
        images.rootfs = dir.path().to_path_buf();
        assert!(check_images(&images, &[ImageKind::Rootfs]).is_err());
    }

    #[test]
    fn image_vanished_before_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let images = ImagePaths::in_dir(dir.path());

        let (mut link, wire) = ScriptedLink::new(b"");
        match send_image(&mut link, &images, ImageKind::Bl2) {
            Err(FlashError::PreflightMissingFile { image, .. }) => {
                assert_eq!(image, ImageKind::Bl2)
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(wire.is_empty());
    }

    #[test]
    fn unreadable_image_is_not_reported_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut images = ImagePaths::in_dir(dir.path());
        // A path going through a regular file fails with ENOTDIR, which is
        // not a missing file.
        let plain = dir.path().join("plain");
        fs::write(&plain, b"S0").unwrap();
        images.fip = plain.join("fip-rzboard.srec");

        let (mut link, _) = ScriptedLink::new(b"");
        assert!(matches!(
            send_image(&mut link, &images, ImageKind::Fip),
            Err(FlashError::Io(_))
        ));
    }

    #[test]
    fn image_is_sent_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let images = ImagePaths::in_dir(dir.path());
        let content: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&images.fip, &content).unwrap();

        let (mut link, wire) = ScriptedLink::new(b"");
        let sent = send_image(&mut link, &images, ImageKind::Fip).unwrap();
        assert_eq!(sent, 5000);
        assert_eq!(wire.bytes(), content);
    }
}
