//! Encoded images ready to be handed to the user as downloads.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{CarouselError, Result};

/// A finished PNG and the filename it should be saved under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub png: Vec<u8>,
}

impl Artifact {
    pub fn new(file_name: impl Into<String>, png: Vec<u8>) -> Self {
        Artifact {
            file_name: file_name.into(),
            png,
        }
    }
}

/// Write `artifact` into `dir`, returning the final path.
///
/// The bytes go to a hidden temporary file first and are renamed into place,
/// so an interrupted write never leaves a truncated PNG behind.
pub fn write_artifact(dir: impl AsRef<Path>, artifact: &Artifact) -> Result<PathBuf> {
    let dir = dir.as_ref();
    let file_name = Path::new(&artifact.file_name);
    if file_name.components().count() != 1 || file_name.file_name().is_none() {
        return Err(CarouselError::Config(format!(
            "artifact name {:?} is not a plain file name",
            artifact.file_name
        )));
    }

    fs::create_dir_all(dir)?;
    let target = dir.join(file_name);
    let staging = dir.join(format!(".{}.part", artifact.file_name));

    let written = fs::File::create(&staging).and_then(|mut file| {
        file.write_all(&artifact.png)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|_| fs::rename(&staging, &target)) {
        let _ = fs::remove_file(&staging);
        return Err(e.into());
    }

    info!(path = %target.display(), bytes = artifact.png.len(), "artifact written");
    Ok(target)
}
