//! Archive extractor
//!
//! Decrypts a downloaded `.tar.gz.gpg` package with an external symmetric
//! decrypt command, then streams the gzip-compressed tar and dispatches each
//! entry purely by file-name suffix:
//!
//! | suffix | destination |
//! |--------|-------------|
//! | `jp2`  | image master dir |
//! | `html` | OCR structured dir |
//! | `txt`  | OCR plaintext dir |
//! | `xml`  | metadata document (kept beside the download) |
//!
//! Anything else is dropped. Entries are written under their file name only,
//! and entries whose path is absolute or climbs with `..` are rejected.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use crate::services::process_runner::{ProcessCommand, ProcessError, ProcessRunner};

/// Archive extractor errors
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Decrypt command exited non-zero
    #[error("decrypt failed for {archive} (exit code {exit_code}): {stderr}")]
    DecryptFailed {
        archive: PathBuf,
        exit_code: i32,
        stderr: String,
    },

    /// Decrypt command reported success but produced nothing
    #[error("decrypt failed for {archive}: output {output} missing")]
    DecryptOutputMissing { archive: PathBuf, output: PathBuf },

    /// Archive file name does not carry the encryption suffix
    #[error("Archive name {0} does not end with the encryption suffix")]
    UnexpectedName(PathBuf),

    /// Decrypt command could not be run
    #[error("decrypt failed: {0}")]
    Process(#[from] ProcessError),

    /// Reading the tar stream or writing an entry failed
    #[error("Archive I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Blocking extraction task panicked or was cancelled
    #[error("Extraction task failed: {0}")]
    Task(String),
}

/// Where an entry goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntryRole {
    ImageMaster,
    OcrStructured,
    OcrPlaintext,
    Metadata,
}

const SUFFIX_TABLE: &[(&str, EntryRole)] = &[
    ("jp2", EntryRole::ImageMaster),
    ("html", EntryRole::OcrStructured),
    ("txt", EntryRole::OcrPlaintext),
    ("xml", EntryRole::Metadata),
];

impl EntryRole {
    /// Role for an entry name, or `None` when the entry is not wanted
    pub fn for_name(name: &str) -> Option<Self> {
        SUFFIX_TABLE
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix))
            .map(|(_, role)| *role)
    }
}

/// Destination directories for one book
#[derive(Debug, Clone)]
pub struct ExtractionTargets {
    pub image_master_dir: PathBuf,
    pub ocr_structured_dir: PathBuf,
    pub ocr_plaintext_dir: PathBuf,
    /// Directory the metadata document is written to
    pub metadata_dir: PathBuf,
}

impl ExtractionTargets {
    fn dir_for(&self, role: EntryRole) -> &Path {
        match role {
            EntryRole::ImageMaster => &self.image_master_dir,
            EntryRole::OcrStructured => &self.ocr_structured_dir,
            EntryRole::OcrPlaintext => &self.ocr_plaintext_dir,
            EntryRole::Metadata => &self.metadata_dir,
        }
    }

    fn create_all(&self) -> Result<(), ExtractError> {
        for dir in [
            &self.image_master_dir,
            &self.ocr_structured_dir,
            &self.ocr_plaintext_dir,
            &self.metadata_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(|source| ExtractError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// What an extraction produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    /// First `xml` entry, if the archive had one
    pub metadata_document: Option<PathBuf>,
    /// Entries written per role
    pub written: BTreeMap<EntryRole, usize>,
    /// Entries dropped for an unknown suffix (or non-file entries)
    pub ignored: usize,
    /// Entries refused for an unsafe path
    pub rejected: usize,
    /// Entries skipped because an earlier entry had the same file name
    pub duplicates: usize,
}

impl ExtractionSummary {
    pub fn count(&self, role: EntryRole) -> usize {
        self.written.get(&role).copied().unwrap_or(0)
    }
}

/// Decrypts and unpacks downloaded packages
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    runner: ProcessRunner,
    decrypt_command: Vec<String>,
    passphrase: Option<String>,
    encryption_suffix: String,
}

impl ArchiveExtractor {
    pub fn new(
        runner: ProcessRunner,
        decrypt_command: Vec<String>,
        passphrase: Option<String>,
        encryption_suffix: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            decrypt_command,
            passphrase,
            encryption_suffix: encryption_suffix.into(),
        }
    }

    /// Decrypt then unpack
    pub async fn extract(
        &self,
        encrypted: &Path,
        targets: &ExtractionTargets,
    ) -> Result<ExtractionSummary, ExtractError> {
        let decrypted = self.decrypt(encrypted).await?;
        unpack_blocking(decrypted, targets.clone()).await
    }

    /// Decrypt `encrypted` to its sibling with the encryption suffix removed
    ///
    /// The encrypted file is deleted only after the output is verified.
    pub async fn decrypt(&self, encrypted: &Path) -> Result<PathBuf, ExtractError> {
        let output = self.decrypted_path(encrypted)?;

        let mut cmd = ProcessCommand::from_argv(&self.decrypt_command)?.args(["--batch", "--yes"]);
        if let Some(passphrase) = &self.passphrase {
            cmd = cmd
                .args(["--pinentry-mode", "loopback", "--passphrase-fd", "0"])
                .stdin(format!("{passphrase}\n"));
        }
        let cmd = cmd
            .arg("--output")
            .arg(output.to_string_lossy())
            .arg("--decrypt")
            .arg(encrypted.to_string_lossy());

        let result = self.runner.run(&cmd).await?;
        if !result.success() {
            tracing::error!(
                archive = %encrypted.display(),
                exit_code = result.exit_code,
                stderr = %result.stderr.trim(),
                "decrypt failed"
            );
            return Err(ExtractError::DecryptFailed {
                archive: encrypted.to_path_buf(),
                exit_code: result.exit_code,
                stderr: result.stderr.trim().to_string(),
            });
        }

        if !output.is_file() {
            return Err(ExtractError::DecryptOutputMissing {
                archive: encrypted.to_path_buf(),
                output,
            });
        }

        if let Err(e) = std::fs::remove_file(encrypted) {
            tracing::warn!(
                archive = %encrypted.display(),
                error = %e,
                "Could not delete encrypted archive after decrypt"
            );
        }

        tracing::debug!(output = %output.display(), "Archive decrypted");
        Ok(output)
    }

    fn decrypted_path(&self, encrypted: &Path) -> Result<PathBuf, ExtractError> {
        let name = encrypted
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ExtractError::UnexpectedName(encrypted.to_path_buf()))?;
        let stripped = name
            .strip_suffix(self.encryption_suffix.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ExtractError::UnexpectedName(encrypted.to_path_buf()))?;
        Ok(encrypted.with_file_name(stripped))
    }
}

async fn unpack_blocking(
    archive: PathBuf,
    targets: ExtractionTargets,
) -> Result<ExtractionSummary, ExtractError> {
    tokio::task::spawn_blocking(move || unpack(&archive, &targets))
        .await
        .map_err(|e| ExtractError::Task(e.to_string()))?
}

/// Unpack a `.tar.gz` into the target directories
pub fn unpack(archive: &Path, targets: &ExtractionTargets) -> Result<ExtractionSummary, ExtractError> {
    let io_err = |source: std::io::Error| ExtractError::Io {
        path: archive.to_path_buf(),
        source,
    };

    targets.create_all()?;

    let file = File::open(archive).map_err(io_err)?;
    let gz = flate2::read::GzDecoder::new(BufReader::new(file));
    let mut tar = tar::Archive::new(gz);

    let mut summary = ExtractionSummary::default();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for entry in tar.entries().map_err(io_err)? {
        let mut entry = entry.map_err(io_err)?;

        if !entry.header().entry_type().is_file() {
            summary.ignored += 1;
            continue;
        }

        let entry_path = entry.path().map_err(io_err)?.into_owned();
        let entry_name = entry_path.to_string_lossy().into_owned();

        let Some(role) = EntryRole::for_name(&entry_name) else {
            summary.ignored += 1;
            continue;
        };

        let Some(file_name) = safe_file_name(&entry_path) else {
            tracing::warn!(
                archive = %archive.display(),
                entry = %entry_name,
                "Refusing archive entry with unsafe path"
            );
            summary.rejected += 1;
            continue;
        };

        // Entries are flattened to their file name; the first one wins
        let dest = targets.dir_for(role).join(file_name);
        if !seen.insert(dest.clone()) {
            tracing::warn!(
                archive = %archive.display(),
                entry = %entry_name,
                dest = %dest.display(),
                "Skipping archive entry with duplicate file name"
            );
            summary.duplicates += 1;
            continue;
        }
        let mut out = File::create(&dest).map_err(|source| ExtractError::Io {
            path: dest.clone(),
            source,
        })?;
        std::io::copy(&mut entry, &mut out).map_err(|source| ExtractError::Io {
            path: dest.clone(),
            source,
        })?;

        *summary.written.entry(role).or_insert(0) += 1;
        if role == EntryRole::Metadata && summary.metadata_document.is_none() {
            summary.metadata_document = Some(dest);
        }
    }

    tracing::debug!(
        archive = %archive.display(),
        images = summary.count(EntryRole::ImageMaster),
        hocr = summary.count(EntryRole::OcrStructured),
        txt = summary.count(EntryRole::OcrPlaintext),
        ignored = summary.ignored,
        rejected = summary.rejected,
        duplicates = summary.duplicates,
        "Archive unpacked"
    );

    Ok(summary)
}

/// Final path component, provided no component escapes the destination
fn safe_file_name(path: &Path) -> Option<&std::ffi::OsStr> {
    let escapes = path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return None;
    }
    path.file_name()
}
