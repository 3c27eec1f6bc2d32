//! Zip extraction into a working directory.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

/// Extract every entry of `archive` into `dest`.
///
/// Entries whose names would land outside `dest` are skipped. Returns the
/// number of files written.
pub fn extract_archive<R: Read + Seek>(archive: R, dest: &Path) -> zip::result::ZipResult<usize> {
    let mut archive = zip::ZipArchive::new(archive)?;
    let mut written = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;

        let outpath = match entry.enclosed_name() {
            Some(path) => dest.join(path),
            None => {
                tracing::warn!(entry = entry.name(), "skipping archive entry with unsafe path");
                continue;
            }
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&outpath)?;
        std::io::copy(&mut entry, &mut outfile)?;
        written += 1;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode)).ok();
            }
        }
    }

    Ok(written)
}

/// Open `path` and extract it; the file itself is only read.
pub(crate) fn extract_file(path: &Path, dest: &Path) -> zip::result::ZipResult<usize> {
    let file = File::open(path)?;
    extract_archive(BufReader::new(file), dest)
}
