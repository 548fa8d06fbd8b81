//! Bundling finished badges into a single download.

use crate::error::BadgeError;
use chrono::Utc;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Packs a job's badges once every record was attempted.
pub trait Archiver: Send + Sync {
    /// Archive `files` into `output_dir`; returns the archive path.
    fn archive(&self, files: &[PathBuf], output_dir: &Path) -> Result<PathBuf, BadgeError>;
}

/// Writes `badges_<UTC timestamp>.zip` into the output directory.
#[derive(Debug, Clone, Default)]
pub struct ZipArchiver;

impl Archiver for ZipArchiver {
    fn archive(&self, files: &[PathBuf], output_dir: &Path) -> Result<PathBuf, BadgeError> {
        let zip_path = output_dir.join(format!("badges_{}.zip", Utc::now().format("%Y%m%d_%H%M%S")));
        let archive_err = |detail: String| BadgeError::Archive {
            path: zip_path.clone(),
            detail,
        };

        let file = File::create(&zip_path).map_err(|e| archive_err(format!("create: {e}")))?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o644);

        let mut names = HashSet::new();
        for path in files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| archive_err(format!("'{}' has no file name", path.display())))?;
            if !names.insert(name.clone()) {
                warn!("Archive already has an entry named {name}, skipping {}", path.display());
                continue;
            }
            let content = std::fs::read(path).map_err(|e| archive_err(format!("read '{}': {e}", path.display())))?;
            add_file(&mut zip, &name, &content, options).map_err(archive_err)?;
        }

        let mut writer = zip.finish().map_err(|e| archive_err(format!("finalize: {e}")))?;
        writer.flush().map_err(|e| archive_err(format!("flush: {e}")))?;

        info!("Archived {} badges into {}", names.len(), zip_path.display());
        Ok(zip_path)
    }
}

/// Adds one entry, refusing names that could escape the extraction dir.
fn add_file<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    content: &[u8],
    options: SimpleFileOptions,
) -> Result<(), String> {
    if name.contains("..") || name.starts_with('/') || name.starts_with('\\') {
        return Err(format!("invalid entry name: {name}"));
    }
    zip.start_file(name, options)
        .map_err(|e| format!("start entry {name}: {e}"))?;
    zip.write_all(content)
        .map_err(|e| format!("write entry {name}: {e}"))?;
    Ok(())
}
