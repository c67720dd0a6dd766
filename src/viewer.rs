use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Something that can show an image file to the user.
pub trait Viewer {
    fn open(&self, path: &Path) -> io::Result<()>;
}

/// Opens files with the platform's default application.
pub struct SystemViewer;

impl Viewer for SystemViewer {
    fn open(&self, path: &Path) -> io::Result<()> {
        open::that(path)
    }
}

/// Opens each path in turn. Returns how many were opened; failures are logged and skipped.
pub fn open_images(viewer: &dyn Viewer, paths: &[PathBuf]) -> usize {
    let mut opened = 0;
    for path in paths {
        match viewer.open(path) {
            Ok(()) => {
                debug!("Opened {}", path.display());
                opened += 1;
            }
            Err(e) => warn!("Unable to open {}: {}", path.display(), e),
        }
    }
    opened
}
