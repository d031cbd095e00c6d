use crate::layout::WorkingDir;
use crate::{fsync_dir, StoreError};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use vdbkit_schema::{normalize_entry_name, ManifestError, MANIFEST_PATH};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Compression applied to every member written by [`write_container`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Deflated,
    Stored,
}

impl Compression {
    fn method(self) -> CompressionMethod {
        match self {
            Compression::Deflated => CompressionMethod::Deflated,
            Compression::Stored => CompressionMethod::Stored,
        }
    }
}

/// A member to write into a container, streamed from `source`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub name: String,
    pub source: PathBuf,
}

/// What [`read_container`] found in an archive.
#[derive(Debug, Clone, Default)]
pub struct ContainerContents {
    pub manifest: Vec<u8>,
    /// Archive-level zip comment.
    pub comment: String,
    /// Normalized names of every extracted payload, in container order.
    pub payloads: Vec<String>,
}

/// Extract an archive into `work` and return its raw manifest.
///
/// Existing payloads in `work` are discarded first. `should_stop` is polled
/// between members.
pub fn read_container(
    path: &Path,
    work: &WorkingDir,
    should_stop: impl Fn() -> bool,
) -> Result<ContainerContents, StoreError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    work.reset_payloads()?;

    let mut contents = ContainerContents {
        comment: String::from_utf8_lossy(archive.comment()).into_owned(),
        ..ContainerContents::default()
    };
    let mut manifest = None;

    for i in 0..archive.len() {
        if should_stop() {
            return Err(StoreError::Cancelled);
        }
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let raw = file.name().to_owned();
        if raw == MANIFEST_PATH {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            manifest = Some(buf);
            continue;
        }

        let name = normalize_entry_name(&raw).map_err(|_| StoreError::UnsafeEntryName(raw))?;
        work.write_payload_from(&name, &mut file)?;
        debug!("extracted {name}");
        contents.payloads.push(name);
    }

    contents.manifest = manifest.ok_or(ManifestError::MissingManifest)?;
    Ok(contents)
}

/// Read only the manifest of an archive, without extracting anything.
pub fn peek_manifest(path: &Path) -> Result<Vec<u8>, StoreError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut file = match archive.by_name(MANIFEST_PATH) {
        Ok(f) => f,
        Err(ZipError::FileNotFound) => return Err(ManifestError::MissingManifest.into()),
        Err(e) => return Err(e.into()),
    };
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Write a complete archive to `dest`.
///
/// Everything goes to a temporary file next to `dest`, which replaces `dest`
/// only after the container has been finished and synced. On any error,
/// including cancellation through `should_stop`, the temporary file is
/// dropped and `dest` is left untouched.
pub fn write_container(
    dest: &Path,
    manifest_xml: &str,
    comment: &str,
    payloads: &[Payload],
    compression: Compression,
    should_stop: impl Fn() -> bool,
) -> Result<(), StoreError> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let tmp = NamedTempFile::new_in(&parent)?;
    {
        let mut zip = ZipWriter::new(tmp.as_file());
        let options = SimpleFileOptions::default().compression_method(compression.method());
        zip.set_comment(comment);

        zip.start_file(MANIFEST_PATH, options)?;
        zip.write_all(manifest_xml.as_bytes())?;

        for payload in payloads {
            if should_stop() {
                return Err(StoreError::Cancelled);
            }
            zip.start_file(payload.name.as_str(), options)?;
            let mut source = File::open(&payload.source)?;
            io::copy(&mut source, &mut zip)?;
        }
        zip.finish()?;
    }

    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| StoreError::Io(e.error))?;
    fsync_dir(&parent)?;
    debug!("wrote {} with {} payloads", dest.display(), payloads.len());
    Ok(())
}
