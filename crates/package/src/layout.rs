//! Addon content placed next to the tool binaries.
//!
//! - `server/` is a filtered copy of the server directory
//! - `private/client.zip` holds the filtered client directory
//! - `private/files_info.json` lists raw tool archives stored in `private/`

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs::File;
use std::path::{Path, PathBuf};
use thirdparty_core::manifest::{FILES_INFO_FILE, PRIVATE_DIR};
use thirdparty_core::{Error, FileInfo, Result};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::archive::write_tree;

/// Directory name of the server content inside the package.
pub const SERVER_DIR: &str = "server";

/// File name of the zipped client content inside [`PRIVATE_DIR`].
pub const CLIENT_ZIP: &str = "client.zip";

/// File name patterns never packaged from addon sources.
const IGNORE_PATTERNS: &[&str] = &[".*", "__pycache__", "*.pyc"];

/// Matches names excluded from copied addon content.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    set: GlobSet,
}

impl IgnoreRules {
    /// The default rules: dotfiles, `__pycache__` and `*.pyc`.
    pub fn new() -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in IGNORE_PATTERNS {
            let glob = Glob::new(pattern).map_err(|e| {
                Error::configuration(format!("Invalid ignore pattern '{pattern}': {e}"))
            })?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| Error::configuration(format!("Invalid ignore patterns: {e}")))?;
        Ok(Self { set })
    }

    /// Whether a file or directory name is ignored.
    #[must_use]
    pub fn is_ignored(&self, name: &str) -> bool {
        self.set.is_match(name)
    }

    fn accepts(&self, entry: &DirEntry) -> bool {
        !self.is_ignored(&entry.file_name().to_string_lossy())
    }
}

fn require_dir(path: &Path, what: &str) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(Error::configuration_with_help(
            format!("{what} directory not found: {}", path.display()),
            format!("Pass an existing directory or drop the --{what}-dir option"),
        ))
    }
}

/// Copy the server directory to `<package>/server`, skipping ignored names.
///
/// Returns the number of files copied.
pub fn copy_server_content(
    server_dir: &Path,
    package_dir: &Path,
    rules: &IgnoreRules,
) -> Result<usize> {
    require_dir(server_dir, "server")?;
    info!(src = %server_dir.display(), "Copying server content");

    let dest_root = package_dir.join(SERVER_DIR);
    let mut copied = 0;
    let walker = WalkDir::new(server_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| rules.accepts(e));
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(server_dir).to_path_buf();
            Error::io(e.into(), path, "walk")
        })?;
        let relative = entry.path().strip_prefix(server_dir).unwrap_or(entry.path());
        let dest = dest_root.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest).map_err(|e| Error::io(e, &dest, "create"))?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(e, parent, "create"))?;
        }
        std::fs::copy(entry.path(), &dest).map_err(|e| Error::io(e, &dest, "copy"))?;
        copied += 1;
    }

    debug!(files = copied, "Server content copied");
    Ok(copied)
}

/// Zip the client directory into `<package>/private/client.zip`, skipping
/// ignored names.
///
/// Returns the path of the zip file.
pub fn zip_client_content(
    client_dir: &Path,
    package_dir: &Path,
    rules: &IgnoreRules,
) -> Result<PathBuf> {
    require_dir(client_dir, "client")?;
    info!(src = %client_dir.display(), "Preparing client code zip");

    let private_dir = package_dir.join(PRIVATE_DIR);
    std::fs::create_dir_all(&private_dir).map_err(|e| Error::io(e, &private_dir, "create"))?;
    let zip_path = private_dir.join(CLIENT_ZIP);
    let mut file = File::create(&zip_path).map_err(|e| Error::io(e, &zip_path, "create"))?;

    let files = write_tree(client_dir, &mut file, |e| rules.accepts(e))?;
    debug!(files, path = %zip_path.display(), "Client zip written");
    Ok(zip_path)
}

/// Copy raw tool archives into `<package>/private/` and write
/// `private/files_info.json` describing them.
pub fn write_files_info(package_dir: &Path, archives: &[(PathBuf, FileInfo)]) -> Result<PathBuf> {
    let private_dir = package_dir.join(PRIVATE_DIR);
    std::fs::create_dir_all(&private_dir).map_err(|e| Error::io(e, &private_dir, "create"))?;

    for (source, info) in archives {
        let dest = private_dir.join(&info.filename);
        if dest.exists() {
            return Err(Error::configuration(format!(
                "Two sources share the archive file name '{}'",
                info.filename
            )));
        }
        std::fs::copy(source, &dest).map_err(|e| Error::io(e, &dest, "copy"))?;
    }

    let infos: Vec<&FileInfo> = archives.iter().map(|(_, info)| info).collect();
    let path = private_dir.join(FILES_INFO_FILE);
    let mut content = serde_json::to_string_pretty(&infos)?;
    content.push('\n');
    std::fs::write(&path, content).map_err(|e| Error::io(e, &path, "write"))?;

    info!(archives = archives.len(), "Raw archives added to package");
    Ok(path)
}
