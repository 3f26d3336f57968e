//! Deterministic zip writing.
//!
//! Entries are written in sorted order with a fixed timestamp, so the same
//! tree always produces the same archive bytes.

use std::fs::File;
use std::io::{Seek, Write};
use std::path::Path;
use thirdparty_core::manifest::to_slash_path;
use thirdparty_core::{Error, Result};
use walkdir::{DirEntry, WalkDir};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Result of writing an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Archive size in bytes.
    pub size: u64,
    /// SHA256 of the archive.
    pub sha256: String,
    /// Number of file and symlink entries.
    pub files: usize,
}

fn base_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
}

/// Zip `src_dir` into `output`, atomically replacing it.
///
/// The archive is written to a temporary file next to `output` and renamed
/// over it once complete.
pub fn write_archive(src_dir: &Path, output: &Path) -> Result<ArchiveSummary> {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut temp = tempfile::Builder::new()
        .prefix(".thirdparty-")
        .suffix(".zip.tmp")
        .tempfile_in(parent)
        .map_err(|e| Error::io(e, parent, "create"))?;

    let files = write_tree(src_dir, temp.as_file_mut(), |_| true)?;
    temp.as_file_mut()
        .sync_all()
        .map_err(|e| Error::io(e, temp.path(), "sync"))?;
    temp.persist(output)
        .map_err(|e| Error::io(e.error, output, "persist"))?;

    let size = std::fs::metadata(output)
        .map_err(|e| Error::io(e, output, "stat"))?
        .len();
    let sha256 = thirdparty_fetch::sha256_file(output)?;
    Ok(ArchiveSummary {
        size,
        sha256,
        files,
    })
}

/// Zip the contents of `src_dir` into `writer`, keeping entries `filter`
/// accepts. Rejected directories are not descended into.
///
/// Returns the number of file and symlink entries written.
pub fn write_tree<W, F>(src_dir: &Path, writer: W, filter: F) -> Result<usize>
where
    W: Write + Seek,
    F: Fn(&DirEntry) -> bool,
{
    let mut zip = ZipWriter::new(writer);
    let mut files = 0;

    let walker = WalkDir::new(src_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(filter);
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src_dir).to_path_buf();
            Error::io(e.into(), path, "walk")
        })?;
        let path = entry.path();
        let name = to_slash_path(path.strip_prefix(src_dir).unwrap_or(path));
        let file_type = entry.file_type();

        if file_type.is_dir() {
            zip.add_directory(
                format!("{name}/"),
                base_options().unix_permissions(0o755),
            )
            .map_err(|e| zip_error(path, &e))?;
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(path).map_err(|e| Error::io(e, path, "readlink"))?;
            zip.add_symlink(name, to_slash_path(&target), base_options())
                .map_err(|e| zip_error(path, &e))?;
            files += 1;
        } else {
            let mode = file_mode(&entry)?;
            zip.start_file(name, base_options().unix_permissions(mode))
                .map_err(|e| zip_error(path, &e))?;
            let mut file = File::open(path).map_err(|e| Error::io(e, path, "open"))?;
            std::io::copy(&mut file, &mut zip).map_err(|e| Error::io(e, path, "read"))?;
            files += 1;
        }
    }

    zip.finish().map_err(|e| zip_error(src_dir, &e))?;
    Ok(files)
}

fn zip_error(path: &Path, err: &zip::result::ZipError) -> Error {
    Error::io(std::io::Error::other(err.to_string()), path, "zip")
}

#[cfg(unix)]
fn file_mode(entry: &DirEntry) -> Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = entry
        .metadata()
        .map_err(|e| Error::io(e.into(), entry.path(), "stat"))?;
    Ok(metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_entry: &DirEntry) -> Result<u32> {
    Ok(0o644)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn sample_tree(root: &Path) {
        std::fs::create_dir_all(root.join("linux/ffmpeg")).unwrap();
        std::fs::write(root.join("linux/ffmpeg/ffmpeg"), b"elf").unwrap();
        std::fs::write(root.join("manifest.json"), b"{}").unwrap();
    }

    #[test]
    fn test_archive_is_deterministic() {
        let temp = TempDir::new().unwrap();
        let tree = temp.path().join("tree");
        sample_tree(&tree);

        let a = write_archive(&tree, &temp.path().join("a.zip")).unwrap();
        let b = write_archive(&tree, &temp.path().join("b.zip")).unwrap();
        assert_eq!(a.sha256, b.sha256);
        assert_eq!(a.files, 2);
    }

    #[test]
    fn test_archive_contents() {
        let temp = TempDir::new().unwrap();
        let tree = temp.path().join("tree");
        sample_tree(&tree);
        let output = temp.path().join("out.zip");
        write_archive(&tree, &output).unwrap();

        let mut zip = zip::ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let names: Vec<_> = zip.file_names().map(String::from).collect();
        assert!(names.contains(&"linux/".to_string()));
        assert!(names.contains(&"linux/ffmpeg/ffmpeg".to_string()));
        assert!(names.contains(&"manifest.json".to_string()));

        let mut content = String::new();
        zip.by_name("manifest.json")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "{}");
    }

    #[test]
    fn test_archive_replaces_existing_output() {
        let temp = TempDir::new().unwrap();
        let tree = temp.path().join("tree");
        sample_tree(&tree);
        let output = temp.path().join("out.zip");
        std::fs::write(&output, b"stale").unwrap();

        write_archive(&tree, &output).unwrap();
        assert!(zip::ZipArchive::new(File::open(&output).unwrap()).is_ok());

        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".zip.tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_archive_keeps_modes_and_symlinks() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let tree = temp.path().join("tree");
        sample_tree(&tree);
        let exe = tree.join("linux/ffmpeg/ffmpeg");
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::os::unix::fs::symlink("ffmpeg", tree.join("linux/ffmpeg/ffmpeg-4")).unwrap();

        let output = temp.path().join("out.zip");
        write_archive(&tree, &output).unwrap();

        let mut zip = zip::ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let mode = zip.by_name("linux/ffmpeg/ffmpeg").unwrap().unix_mode().unwrap();
        assert_eq!(mode & 0o777, 0o755);

        let mut link = zip.by_name("linux/ffmpeg/ffmpeg-4").unwrap();
        assert_eq!(link.unix_mode().unwrap() & 0o170_000, 0o120_000);
        let mut target = String::new();
        link.read_to_string(&mut target).unwrap();
        assert_eq!(target, "ffmpeg");
    }
}
