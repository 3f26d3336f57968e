//! Archive verification.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thirdparty_core::tools::{ArchiveFormat, ToolSource};
use thirdparty_core::{Error, Result};
use tracing::debug;

/// Facts established about an archive by [`verify_artifact`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedArtifact {
    /// SHA256 of the file (lowercase hex).
    pub sha256: String,
    /// Size in bytes.
    pub size: u64,
    /// Archive format.
    pub format: ArchiveFormat,
}

/// Check a downloaded archive before it is extracted.
///
/// The file must be non-empty, start with the magic bytes of the source's
/// archive format and, when the source declares one, match its sha256.
pub fn verify_artifact(path: &Path, source: &ToolSource) -> Result<VerifiedArtifact> {
    let artifact = source.file_name();
    let format = source.archive_format().ok_or_else(|| {
        Error::verification(artifact, "cannot determine the archive format")
    })?;

    let size = std::fs::metadata(path)
        .map_err(|e| Error::io(e, path, "stat"))?
        .len();
    if size == 0 {
        return Err(Error::verification(artifact, "file is empty"));
    }

    let mut header = [0u8; 4];
    let read = File::open(path)
        .and_then(|mut f| read_prefix(&mut f, &mut header))
        .map_err(|e| Error::io(e, path, "read"))?;
    if !format.matches_magic(&header[..read]) {
        return Err(Error::verification(
            artifact,
            format!("file is not a {format} archive"),
        ));
    }

    let sha256 = sha256_file(path)?;
    if let Some(expected) = &source.sha256 {
        if !expected.eq_ignore_ascii_case(&sha256) {
            return Err(Error::checksum_mismatch(
                artifact,
                expected.to_lowercase(),
                sha256,
            ));
        }
        debug!(artifact, %sha256, "Checksum verified");
    }

    Ok(VerifiedArtifact {
        sha256,
        size,
        format,
    })
}

fn read_prefix(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Compute the SHA256 of a file as lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| Error::io(e, path, "open"))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let n = file
            .read(&mut buffer)
            .map_err(|e| Error::io(e, path, "read"))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn zip_like(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("tool.zip");
        std::fs::write(&path, b"PK\x03\x04zip").unwrap();
        path
    }

    #[test]
    fn test_sha256_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("abc");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_verify_without_checksum() {
        let temp = TempDir::new().unwrap();
        let path = zip_like(temp.path());
        let source = ToolSource::new("https://example.com/tool.zip", "1");

        let verified = verify_artifact(&path, &source).unwrap();
        assert_eq!(verified.size, 7);
        assert_eq!(verified.format, ArchiveFormat::Zip);
        assert_eq!(verified.sha256, sha256_file(&path).unwrap());
    }

    #[test]
    fn test_verify_matching_checksum_any_case() {
        let temp = TempDir::new().unwrap();
        let path = zip_like(temp.path());
        let sha = sha256_file(&path).unwrap().to_uppercase();
        let source = ToolSource::new("https://example.com/tool.zip", "1").with_sha256(sha);

        verify_artifact(&path, &source).unwrap();
    }

    #[test]
    fn test_verify_checksum_mismatch() {
        let temp = TempDir::new().unwrap();
        let path = zip_like(temp.path());
        let source =
            ToolSource::new("https://example.com/tool.zip", "1").with_sha256("0".repeat(64));

        let err = verify_artifact(&path, &source).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_verify_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tool.zip");
        std::fs::write(&path, b"").unwrap();
        let source = ToolSource::new("https://example.com/tool.zip", "1");

        let err = verify_artifact(&path, &source).unwrap_err();
        assert!(err.to_string().contains("file is empty"));
    }

    #[test]
    fn test_verify_wrong_format() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tool.tgz");
        std::fs::write(&path, b"<html>not found</html>").unwrap();
        let source = ToolSource::new("https://example.com/tool.tgz", "1");

        let err = verify_artifact(&path, &source).unwrap_err();
        assert!(matches!(err, Error::Verification { .. }));
        assert!(err.to_string().contains("not a tar.gz archive"));
    }

    #[test]
    fn test_verify_missing_file() {
        let source = ToolSource::new("https://example.com/tool.zip", "1");
        let err = verify_artifact(Path::new("/nonexistent/tool.zip"), &source).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
