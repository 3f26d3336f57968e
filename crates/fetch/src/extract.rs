//! Archive extraction and executable discovery.
//!
//! Extraction goes to a temporary sibling directory that is renamed into
//! place once complete, so a failed extraction never leaves a half-filled
//! destination behind.

use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use thirdparty_core::tools::ArchiveFormat;
use thirdparty_core::{Error, PlatformTarget, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

const S_IFMT: u32 = 0o170_000;
const S_IFLNK: u32 = 0o120_000;

/// Extract `archive` into `dest`, replacing anything already there.
///
/// Entries that would land outside `dest`, and symlinks pointing outside it,
/// are skipped. Unix permission bits are preserved.
pub fn extract_archive(archive: &Path, format: ArchiveFormat, dest: &Path) -> Result<()> {
    let name = archive
        .file_name()
        .map_or_else(|| archive.display().to_string(), |n| n.to_string_lossy().into_owned());

    let temp_dir = dest.with_file_name(format!(
        ".{}.tmp",
        dest.file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("extract")
    ));
    if temp_dir.exists() {
        std::fs::remove_dir_all(&temp_dir).map_err(|e| Error::io(e, &temp_dir, "remove"))?;
    }
    std::fs::create_dir_all(&temp_dir).map_err(|e| Error::io(e, &temp_dir, "create"))?;

    let result = match format {
        ArchiveFormat::Zip => extract_zip(archive, &name, &temp_dir),
        ArchiveFormat::TarGz => extract_tar_gz(archive, &name, &temp_dir),
    };
    if let Err(e) = result {
        let _ = std::fs::remove_dir_all(&temp_dir);
        return Err(e);
    }

    if dest.exists() {
        std::fs::remove_dir_all(dest).map_err(|e| Error::io(e, dest, "remove"))?;
    }
    std::fs::rename(&temp_dir, dest).map_err(|e| {
        let _ = std::fs::remove_dir_all(&temp_dir);
        Error::io(e, dest, "rename")
    })?;

    debug!(archive = %name, dest = %dest.display(), "Extracted archive");
    Ok(())
}

fn extract_zip(archive: &Path, name: &str, dest: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|e| Error::io(e, archive, "open"))?;
    let mut zip =
        zip::ZipArchive::new(file).map_err(|e| Error::extraction(name, e.to_string()))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| Error::extraction(name, format!("failed to read entry: {e}")))?;

        let Some(relative) = entry.enclosed_name() else {
            warn!(archive = name, entry = entry.name(), "Skipping entry outside extraction root");
            continue;
        };

        if entry.is_dir() {
            let Some(resolved) = resolve_inside(dest, Path::new(""), &relative) else {
                warn!(archive = name, entry = %relative.display(), "Skipping entry outside extraction root");
                continue;
            };
            let outpath = dest.join(resolved);
            std::fs::create_dir_all(&outpath).map_err(|e| Error::io(e, &outpath, "create"))?;
            continue;
        }

        let (Some(parent), Some(file_name)) = (
            resolve_parent(dest, &relative),
            relative.file_name(),
        ) else {
            warn!(archive = name, entry = %relative.display(), "Skipping entry outside extraction root");
            continue;
        };
        let parent_dir = dest.join(&parent);
        std::fs::create_dir_all(&parent_dir).map_err(|e| Error::io(e, &parent_dir, "create"))?;
        let outpath = parent_dir.join(file_name);

        let mode = entry.unix_mode();
        if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            let mut target = String::new();
            entry
                .read_to_string(&mut target)
                .map_err(|e| Error::extraction(name, format!("unreadable link {}: {e}", relative.display())))?;
            let target = Path::new(&target);
            if resolve_inside(dest, &parent, target).is_none() {
                warn!(archive = name, entry = %relative.display(), "Skipping link pointing outside extraction root");
                continue;
            }
            create_link(name, &relative, target, &outpath)?;
            continue;
        }

        let mut out = File::create(&outpath).map_err(|e| Error::io(e, &outpath, "create"))?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|e| Error::extraction(name, format!("{}: {e}", relative.display())))?;
        drop(out);

        if let Some(mode) = mode {
            set_unix_permissions(&outpath, mode)?;
        }
    }

    Ok(())
}

fn extract_tar_gz(archive: &Path, name: &str, dest: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|e| Error::io(e, archive, "open"))?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.set_preserve_permissions(true);

    let entries = tar
        .entries()
        .map_err(|e| Error::extraction(name, e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::extraction(name, e.to_string()))?;
        let path = entry
            .path()
            .map_err(|e| Error::extraction(name, format!("invalid path: {e}")))?
            .into_owned();

        let Some(parent) = resolve_parent(dest, &path) else {
            warn!(archive = name, entry = %path.display(), "Skipping entry outside extraction root");
            continue;
        };

        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            let target = entry
                .link_name()
                .map_err(|e| Error::extraction(name, format!("invalid link: {e}")))?;
            // Hard link targets are relative to the archive root
            let base = if entry_type.is_symlink() {
                parent.as_path()
            } else {
                Path::new("")
            };
            let inside = target.is_some_and(|target| resolve_inside(dest, base, &target).is_some());
            if !inside {
                warn!(archive = name, entry = %path.display(), "Skipping link pointing outside extraction root");
                continue;
            }
        }

        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| Error::extraction(name, format!("{}: {e}", path.display())))?;
        if !unpacked {
            warn!(archive = name, entry = %path.display(), "Skipping entry outside extraction root");
        }
    }

    Ok(())
}

/// Upper bound on symlinks followed while resolving one path.
const MAX_LINK_HOPS: usize = 40;

/// Resolve `path`, taken relative to `base` below `root`, following the
/// symlinks already extracted under `root`.
///
/// Returns the physical location relative to `root`, or `None` when the
/// path leaves `root` at any step. `base` must itself be a resolved path.
fn resolve_inside(root: &Path, base: &Path, path: &Path) -> Option<PathBuf> {
    let mut hops = 0;
    resolve_components(root, base.to_path_buf(), path, &mut hops)
}

fn resolve_components(
    root: &Path,
    mut current: PathBuf,
    path: &Path,
    hops: &mut usize,
) -> Option<PathBuf> {
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !current.pop() {
                    return None;
                }
            }
            Component::Normal(part) => {
                current.push(part);
                let location = root.join(&current);
                let is_link = std::fs::symlink_metadata(&location)
                    .is_ok_and(|meta| meta.file_type().is_symlink());
                if is_link {
                    *hops += 1;
                    if *hops > MAX_LINK_HOPS {
                        return None;
                    }
                    let target = std::fs::read_link(&location).ok()?;
                    current.pop();
                    current = resolve_components(root, current, &target, hops)?;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(current)
}

/// Physical parent directory of an archive entry, relative to `root`.
fn resolve_parent(root: &Path, entry: &Path) -> Option<PathBuf> {
    let parent = entry.parent().unwrap_or_else(|| Path::new(""));
    resolve_inside(root, Path::new(""), parent)
}

#[cfg(unix)]
fn create_link(_archive: &str, _relative: &Path, target: &Path, outpath: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, outpath).map_err(|e| Error::io(e, outpath, "symlink"))
}

#[cfg(not(unix))]
fn create_link(archive: &str, relative: &Path, _target: &Path, _outpath: &Path) -> Result<()> {
    warn!(archive, entry = %relative.display(), "Skipping symlink on this platform");
    Ok(())
}

#[cfg(unix)]
fn set_unix_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let permissions = std::fs::Permissions::from_mode(mode & 0o7777);
    std::fs::set_permissions(path, permissions).map_err(|e| Error::io(e, path, "chmod"))
}

#[cfg(not(unix))]
fn set_unix_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Locate executables below `dir` by file name.
///
/// Names get a `.exe` suffix on windows. When a name occurs more than once
/// the shallowest match wins. Returned paths are relative to `dir`; names
/// that are not found are absent from the map.
pub fn find_executables(
    dir: &Path,
    platform: PlatformTarget,
    names: &[String],
) -> Result<BTreeMap<String, PathBuf>> {
    let wanted: BTreeMap<String, &str> = names
        .iter()
        .map(|name| (platform.executable_file_name(name), name.as_str()))
        .collect();

    let mut found: BTreeMap<String, (usize, PathBuf)> = BTreeMap::new();
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            Error::io(e.into(), path, "walk")
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        let Some(name) = wanted.get(entry.file_name().to_string_lossy().as_ref()) else {
            continue;
        };
        let depth = entry.depth();
        let better = found.get(*name).is_none_or(|(d, _)| depth < *d);
        if better {
            let relative = entry
                .path()
                .strip_prefix(dir)
                .unwrap_or(entry.path())
                .to_path_buf();
            found.insert((*name).to_string(), (depth, relative));
        }
    }

    Ok(found
        .into_iter()
        .map(|(name, (_, path))| (name, path))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8], u32)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, data, mode) in entries {
            let options = SimpleFileOptions::default().unix_permissions(*mode);
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn write_tar_gz(path: &Path, build: impl FnOnce(&mut tar::Builder<GzEncoder<File>>)) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        build(&mut builder);
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn append_file(builder: &mut tar::Builder<GzEncoder<File>>, path: &str, data: &[u8], mode: u32) {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        builder.append_data(&mut header, path, data).unwrap();
    }

    #[test]
    fn test_extract_zip() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("tool.zip");
        write_zip(
            &archive,
            &[
                ("bin/ffmpeg.exe", b"MZ", 0o755),
                ("doc/readme.txt", b"hello", 0o644),
            ],
        );

        let dest = temp.path().join("out");
        extract_archive(&archive, ArchiveFormat::Zip, &dest).unwrap();

        assert_eq!(std::fs::read(dest.join("bin/ffmpeg.exe")).unwrap(), b"MZ");
        assert_eq!(std::fs::read(dest.join("doc/readme.txt")).unwrap(), b"hello");
        assert!(!temp.path().join(".out.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_zip_preserves_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("tool.zip");
        write_zip(&archive, &[("ffmpeg", b"\x7fELF", 0o755)]);

        let dest = temp.path().join("out");
        extract_archive(&archive, ArchiveFormat::Zip, &dest).unwrap();

        let mode = std::fs::metadata(dest.join("ffmpeg")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_extract_zip_skips_traversal() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.zip");
        write_zip(
            &archive,
            &[("../escaped.txt", b"nope", 0o644), ("ok.txt", b"ok", 0o644)],
        );

        let dest = temp.path().join("nested").join("out");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        extract_archive(&archive, ArchiveFormat::Zip, &dest).unwrap();

        assert!(dest.join("ok.txt").exists());
        assert!(!temp.path().join("nested").join("escaped.txt").exists());
        assert!(!temp.path().join("escaped.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_zip_chained_links_stay_inside() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.zip");
        {
            let file = File::create(&archive).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            let options = SimpleFileOptions::default();
            zip.add_symlink("a", ".", options).unwrap();
            zip.add_symlink("a/b", "..", options).unwrap();
            zip.start_file("a/b/escaped.txt", options).unwrap();
            zip.write_all(b"nope").unwrap();
            zip.finish().unwrap();
        }

        let dest = temp.path().join("nested").join("out");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        extract_archive(&archive, ArchiveFormat::Zip, &dest).unwrap();

        assert!(!temp.path().join("nested").join("escaped.txt").exists());
        assert!(!temp.path().join("escaped.txt").exists());
        assert!(std::fs::symlink_metadata(dest.join("b")).is_ok_and(|m| !m.file_type().is_symlink()));
        assert!(dest.join("b").join("escaped.txt").is_file());
        for entry in WalkDir::new(&dest).min_depth(1) {
            let entry = entry.unwrap();
            if entry.path_is_symlink() {
                let resolved = std::fs::canonicalize(entry.path()).unwrap();
                assert!(resolved.starts_with(std::fs::canonicalize(&dest).unwrap()));
            }
        }
    }

    #[test]
    fn test_extract_replaces_existing_destination() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("tool.zip");
        write_zip(&archive, &[("new.txt", b"new", 0o644)]);

        let dest = temp.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("old.txt"), b"old").unwrap();

        extract_archive(&archive, ArchiveFormat::Zip, &dest).unwrap();
        assert!(dest.join("new.txt").exists());
        assert!(!dest.join("old.txt").exists());
    }

    #[test]
    fn test_extract_corrupt_zip_leaves_nothing() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("broken.zip");
        std::fs::write(&archive, b"PK\x03\x04 truncated").unwrap();

        let dest = temp.path().join("out");
        let err = extract_archive(&archive, ArchiveFormat::Zip, &dest).unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
        assert!(!dest.exists());
        assert!(!temp.path().join(".out.tmp").exists());
    }

    #[test]
    fn test_extract_tar_gz() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("tool.tgz");
        write_tar_gz(&archive, |builder| {
            append_file(builder, "bin/oiiotool", b"\x7fELF", 0o755);
            append_file(builder, "lib/libOpenImageIO.so.2.2", b"lib", 0o644);
        });

        let dest = temp.path().join("out");
        extract_archive(&archive, ArchiveFormat::TarGz, &dest).unwrap();

        assert!(dest.join("bin/oiiotool").is_file());
        assert!(dest.join("lib/libOpenImageIO.so.2.2").is_file());
    }

    #[test]
    fn test_extract_tar_gz_skips_parent_dir_entries() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.tgz");
        write_tar_gz(&archive, |builder| {
            let data = b"nope";
            let mut header = tar::Header::new_old();
            let name = b"../escaped.txt";
            header.as_old_mut().name[..name.len()].copy_from_slice(name);
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder.append(&header, &data[..]).unwrap();
            append_file(builder, "ok.txt", b"ok", 0o644);
        });

        let dest = temp.path().join("nested").join("out");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        extract_archive(&archive, ArchiveFormat::TarGz, &dest).unwrap();

        assert!(dest.join("ok.txt").exists());
        assert!(!temp.path().join("nested").join("escaped.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_tar_gz_symlinks() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("tool.tgz");
        write_tar_gz(&archive, |builder| {
            append_file(builder, "lib/libavcodec.so.58", b"lib", 0o644);

            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_size(0);
            header.set_mode(0o777);
            builder
                .append_link(&mut header, "lib/libavcodec.so", "libavcodec.so.58")
                .unwrap();

            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_size(0);
            header.set_mode(0o777);
            builder
                .append_link(&mut header, "escape", "../../outside")
                .unwrap();
        });

        let dest = temp.path().join("out");
        extract_archive(&archive, ArchiveFormat::TarGz, &dest).unwrap();

        let link = dest.join("lib/libavcodec.so");
        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read(&link).unwrap(), b"lib");
        assert!(std::fs::symlink_metadata(dest.join("escape")).is_err());
    }

    fn append_symlink(builder: &mut tar::Builder<GzEncoder<File>>, path: &str, target: &str) {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        builder.append_link(&mut header, path, target).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_tar_gz_chained_links_stay_inside() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.tgz");
        write_tar_gz(&archive, |builder| {
            append_symlink(builder, "a", ".");
            append_symlink(builder, "a/b", "..");
            append_symlink(builder, "c", "a/..");
            append_file(builder, "a/b/escaped.txt", b"nope", 0o644);
        });

        let dest = temp.path().join("nested").join("out");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        extract_archive(&archive, ArchiveFormat::TarGz, &dest).unwrap();

        assert!(std::fs::symlink_metadata(dest.join("a")).unwrap().file_type().is_symlink());
        assert!(!std::fs::symlink_metadata(dest.join("b")).unwrap().file_type().is_symlink());
        assert!(dest.join("b").join("escaped.txt").is_file());
        assert!(std::fs::symlink_metadata(dest.join("c")).is_err());
        assert!(!temp.path().join("nested").join("escaped.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_inside_follows_existing_links() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("lib64")).unwrap();
        std::os::unix::fs::symlink("lib64", root.join("lib")).unwrap();
        std::os::unix::fs::symlink(".", root.join("here")).unwrap();

        assert_eq!(
            resolve_inside(root, Path::new("bin"), Path::new("../lib/libfoo.so")),
            Some(PathBuf::from("lib64/libfoo.so"))
        );
        assert_eq!(
            resolve_inside(root, Path::new(""), Path::new("here/here/bin")),
            Some(PathBuf::from("bin"))
        );
        assert_eq!(resolve_inside(root, Path::new(""), Path::new("here/..")), None);
        assert_eq!(resolve_inside(root, Path::new("bin"), Path::new("/usr/bin/tool")), None);
        assert_eq!(resolve_inside(root, Path::new(""), Path::new("../tool")), None);
    }

    #[test]
    fn test_find_executables_prefers_shallowest() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("bin")).unwrap();
        std::fs::create_dir_all(root.join("a/b")).unwrap();
        std::fs::write(root.join("a/b/ffmpeg.exe"), b"").unwrap();
        std::fs::write(root.join("bin/ffmpeg.exe"), b"").unwrap();
        std::fs::write(root.join("bin/ffprobe"), b"").unwrap();

        let names = vec!["ffmpeg".to_string(), "ffprobe".to_string()];
        let found = find_executables(root, PlatformTarget::Windows, &names).unwrap();
        assert_eq!(found.get("ffmpeg"), Some(&PathBuf::from("bin").join("ffmpeg.exe")));
        assert!(!found.contains_key("ffprobe"));

        let found = find_executables(root, PlatformTarget::Linux, &names).unwrap();
        assert_eq!(found.get("ffprobe"), Some(&PathBuf::from("bin").join("ffprobe")));
        assert!(!found.contains_key("ffmpeg"));
    }
}
