//! # External Tool Backend
//!
//! Delegates transfers to a helper binary. The helper receives the full
//! ordered mirror list and performs the fallback itself:
//!
//! ```text
//! <tool> fetch-blob --digest <digest> --output <path> --source <repo>=<reg>[,<reg>...]
//! <tool> fetch-manifest (--tag <tag> | --digest <digest>) --output <path>
//!        --source <repo>=<reg>[,<reg>...] [--print-digest]
//! ```
//!
//! Exit status 0 means the output file was written. With `--print-digest`
//! stdout carries exactly one `sha256:<hex>` line.
//!
//! Any non-zero exit is a hard [`Error::SubprocessFailure`] carrying the
//! captured stderr. Every invocation is bounded by a timeout and the child is
//! killed if the fetch is abandoned.

use super::{DownloadBackend, store_file, store_manifest};
use crate::constants::{DEFAULT_TOOL_NAME, MAX_MANIFEST_SIZE, SUBPROCESS_TIMEOUT};
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::reference::{Reference, Source};
use crate::storage::{BlobRecord, BlobStore};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Backend that shells out to a fetch helper.
#[derive(Debug, Clone)]
pub struct ExternalToolBackend {
    tool: PathBuf,
    timeout: Duration,
}

impl ExternalToolBackend {
    pub fn new(tool: PathBuf) -> Self {
        Self {
            tool,
            timeout: SUBPROCESS_TIMEOUT,
        }
    }

    /// Uses the helper found on `PATH`.
    pub fn from_path() -> Self {
        Self::new(PathBuf::from(DEFAULT_TOOL_NAME))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn tool(&self) -> &Path {
        &self.tool
    }

    /// Runs the helper and returns its stdout on success.
    async fn run(&self, args: Vec<OsString>) -> Result<String> {
        debug!("Running {} {:?}", self.tool.display(), args);

        let child = Command::new(&self.tool)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::Timeout {
                operation: format!(
                    "{} {}",
                    self.tool.display(),
                    args.first()
                        .map(|a| a.to_string_lossy())
                        .unwrap_or_default()
                ),
                duration: self.timeout,
            })??;

        if !output.status.success() {
            return Err(Error::SubprocessFailure {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Fetches a manifest into `output`, returning the printed digest.
    async fn run_fetch_manifest(
        &self,
        source: &Source,
        reference: &Reference,
        output: &Path,
        print_digest: bool,
    ) -> Result<Option<Digest>> {
        let mut args: Vec<OsString> = vec!["fetch-manifest".into()];
        match reference {
            Reference::Tag(tag) => {
                args.push("--tag".into());
                args.push(tag.into());
            }
            Reference::Digest(d) => {
                args.push("--digest".into());
                args.push(d.to_string().into());
            }
        }
        args.push("--output".into());
        args.push(output.as_os_str().to_owned());
        args.push("--source".into());
        args.push(source.to_arg().into());
        if print_digest {
            args.push("--print-digest".into());
        }

        let stdout = self.run(args).await?;
        if !print_digest {
            return Ok(None);
        }
        parse_printed_digest(&stdout).map(Some)
    }
}

#[async_trait]
impl DownloadBackend for ExternalToolBackend {
    fn name(&self) -> &str {
        "external"
    }

    async fn fetch_blob(
        &self,
        source: &Source,
        digest: &Digest,
        store: &BlobStore,
    ) -> Result<BlobRecord> {
        let scratch = tempfile::tempdir()?;
        let output = scratch.path().join("blob");

        self.run(vec![
            "fetch-blob".into(),
            "--digest".into(),
            digest.to_string().into(),
            "--output".into(),
            output.as_os_str().to_owned(),
            "--source".into(),
            source.to_arg().into(),
        ])
        .await?;

        let file = std::fs::File::open(&output)?;
        store_file(store, digest, file).await
    }

    async fn fetch_manifest(
        &self,
        source: &Source,
        reference: &Reference,
        store: &BlobStore,
    ) -> Result<BlobRecord> {
        let scratch = tempfile::tempdir()?;
        let output = scratch.path().join("manifest");
        let by_tag = !reference.is_trusted();

        let printed = self
            .run_fetch_manifest(source, reference, &output, by_tag)
            .await?;

        let data = tokio::fs::read(&output).await?;
        if data.len() > MAX_MANIFEST_SIZE {
            return Err(Error::Serialization(format!(
                "manifest {reference} is {} bytes, limit is {MAX_MANIFEST_SIZE}",
                data.len()
            )));
        }

        // The printed digest must name the bytes actually written.
        if let Some(printed) = printed {
            let actual = Digest::of(&data);
            if actual != printed {
                return Err(Error::DigestMismatch {
                    expected: printed.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        store_manifest(store, reference, data)
    }

    async fn resolve_tag(&self, source: &Source, tag: &str) -> Result<Digest> {
        let scratch = tempfile::tempdir()?;
        let output = scratch.path().join("manifest");
        self.run_fetch_manifest(source, &Reference::Tag(tag.to_string()), &output, true)
            .await?
            .ok_or_else(|| Error::Internal("fetch tool printed no digest".to_string()))
    }
}

/// Parses the single `sha256:<hex>` line printed by `--print-digest`.
fn parse_printed_digest(stdout: &str) -> Result<Digest> {
    let line = stdout.trim();
    if line.lines().count() != 1 {
        return Err(Error::InvalidDigest {
            digest: line.to_string(),
            reason: "expected exactly one digest line from fetch tool".to_string(),
        });
    }
    line.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_printed_digest() {
        let d = Digest::of(b"manifest");
        assert_eq!(parse_printed_digest(&format!("{d}\n")).unwrap(), d);
        assert!(parse_printed_digest("").is_err());
        assert!(parse_printed_digest(&format!("{d}\n{d}\n")).is_err());
        assert!(parse_printed_digest("fetched ok").is_err());
    }
}
