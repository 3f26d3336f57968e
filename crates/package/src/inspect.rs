//! Reading back a built package.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use thirdparty_core::manifest::MANIFEST_FILE;
use thirdparty_core::{Error, PackageManifest, Result};

/// Contents of a package archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageContents {
    /// The package manifest.
    pub manifest: PackageManifest,
    /// File and symlink entry names, `/`-separated.
    pub files: Vec<String>,
}

/// Open a package archive and read its manifest and entry list.
pub fn read_package(path: &Path) -> Result<PackageContents> {
    let name = path.display().to_string();
    let file = File::open(path).map_err(|e| Error::io(e, path, "open"))?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| Error::verification(&name, format!("not a zip archive: {e}")))?;

    let files: Vec<String> = zip
        .file_names()
        .filter(|n| !n.ends_with('/'))
        .map(String::from)
        .collect();

    let mut content = String::new();
    {
        let mut entry = zip.by_name(MANIFEST_FILE).map_err(|_| {
            Error::manifest(format!("{name} does not contain {MANIFEST_FILE}"))
        })?;
        entry
            .read_to_string(&mut content)
            .map_err(|e| Error::io(e, path, "read"))?;
    }
    let manifest = PackageManifest::from_json(&content)?;

    Ok(PackageContents { manifest, files })
}

/// Read a package archive and check its manifest against its contents.
pub fn verify_package(path: &Path) -> Result<PackageContents> {
    let contents = read_package(path)?;
    contents.manifest.verify_paths(&contents.files)?;
    tracing::info!(
        archive = %path.display(),
        tools = contents.manifest.len(),
        gaps = contents.manifest.gaps.len(),
        "Package verified"
    );
    Ok(contents)
}
