//! Conversion-service client
//!
//! Thin wrapper over the conversion-service CLI. Every call is
//! `<command…> --directory <site> --resource <resource> [extra…]` run in the
//! script directory; exit code 0 means success and stdout carries
//! newline-delimited tokens.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::ArchiveReference;
use crate::services::process_runner::{ProcessCommand, ProcessError, ProcessOutput, ProcessRunner};

pub const RESOURCE_CONVERTED: &str = "_converted?format=text";
pub const RESOURCE_AVAILABLE: &str = "_available?format=text";
const RESOURCE_PROCESS_PREFIX: &str = "_process?barcodes=";

/// Conversion-service errors
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Script exited non-zero
    #[error("Conversion script failed for {resource} (exit code {exit_code}): {stderr}")]
    ScriptFailed {
        resource: String,
        exit_code: i32,
        stderr: String,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Client for the conversion-service CLI
#[derive(Debug, Clone)]
pub struct ConversionClient {
    runner: ProcessRunner,
    command: Vec<String>,
    script_dir: PathBuf,
    site_directory: String,
}

impl ConversionClient {
    pub fn new(
        runner: ProcessRunner,
        command: Vec<String>,
        script_dir: impl Into<PathBuf>,
        site_directory: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            command,
            script_dir: script_dir.into(),
            site_directory: site_directory.into(),
        }
    }

    /// Archives the service has finished converting
    pub async fn list_converted(&self) -> Result<Vec<ArchiveReference>, ConversionError> {
        let output = self.invoke(RESOURCE_CONVERTED, &[]).await?;
        Ok(output.lines().into_iter().map(ArchiveReference::new).collect())
    }

    /// Barcodes available for conversion
    pub async fn list_available(&self) -> Result<Vec<String>, ConversionError> {
        let output = self.invoke(RESOURCE_AVAILABLE, &[]).await?;
        if !output.stderr.trim().is_empty() {
            tracing::debug!(stderr = %output.stderr.trim(), "Available list stderr");
        }
        let barcodes = output.lines();
        tracing::info!(
            count = barcodes.len(),
            first = barcodes.first().map(String::as_str).unwrap_or(""),
            "Books available for conversion"
        );
        Ok(barcodes)
    }

    /// Ask the service to start converting these barcodes
    pub async fn request_conversion(&self, barcodes: &[String]) -> Result<(), ConversionError> {
        let resource = format!("{}{}", RESOURCE_PROCESS_PREFIX, barcodes.join(","));
        let output = self.invoke(&resource, &[]).await?;
        tracing::debug!(
            stdout = %output.stdout.trim(),
            stderr = %output.stderr.trim(),
            "Conversion request output"
        );
        Ok(())
    }

    /// Download one archive to `output`
    pub async fn download(
        &self,
        reference: &ArchiveReference,
        output: &Path,
    ) -> Result<(), ConversionError> {
        let absolute = std::path::absolute(output).unwrap_or_else(|_| output.to_path_buf());
        let target = absolute.to_string_lossy().into_owned();
        self.invoke(reference.as_str(), &["-o".to_string(), target])
            .await?;
        Ok(())
    }

    async fn invoke(
        &self,
        resource: &str,
        extra: &[String],
    ) -> Result<ProcessOutput, ConversionError> {
        let cmd = ProcessCommand::from_argv(&self.command)?
            .args(["--directory", self.site_directory.as_str()])
            .args(["--resource", resource])
            .args(extra.iter().cloned())
            .working_dir(&self.script_dir);

        let output = self.runner.run(&cmd).await?;
        if !output.success() {
            tracing::error!(
                resource,
                exit_code = output.exit_code,
                stderr = %output.stderr.trim(),
                "Conversion script failed"
            );
            return Err(ConversionError::ScriptFailed {
                resource: resource.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}
