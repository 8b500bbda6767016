// ABOUTME: Tar helpers for moving build contexts and files into the engine
// ABOUTME: Docker only accepts tar streams for uploads and image builds

use std::fs;
use std::io;
use std::path::Path;
use tar::Builder;

/// Tar a single file (stored under its file name) or a directory's contents.
pub fn tar_path(path: &Path) -> io::Result<Vec<u8>> {
    let mut archive = Builder::new(Vec::new());

    if path.is_file() {
        let mut file = fs::File::open(path)?;
        let file_name = path
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Invalid file name"))?;
        archive.append_file(file_name, &mut file)?;
    } else {
        archive.append_dir_all(".", path)?;
    }

    archive.into_inner()
}
