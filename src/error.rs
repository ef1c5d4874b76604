use std::{io, path::PathBuf};

use thiserror::Error;

/// Failures while fetching or unpacking the trace archive. Everything
/// downstream needs the trace on disk, so these halt the pipeline.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("`{0}` is not available, install it or put it on PATH")]
    ToolUnavailable(&'static str),
    #[error("unable to fetch {url}: {reason}")]
    Unreachable { url: String, reason: String },
    #[error("failed to extract {path}: {reason}")]
    Extract { path: PathBuf, reason: String },
    #[error("{0} already exists, pass --force to overwrite it")]
    AlreadyPresent(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failures of the capture-analysis adapters. Capture tools are
/// deterministic over a static file, so none of these are retried.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("`{0}` is not available, install it or put it on PATH")]
    ToolUnavailable(&'static str),
    #[error("`{tool}` failed: {message}")]
    ToolFailed { tool: &'static str, message: String },
    #[error("trace file not found: {0}")]
    MissingTrace(PathBuf),
    #[error("unusable `{tool}` output: {message}")]
    BadOutput { tool: &'static str, message: String },
    #[error("malformed pcap: {0}")]
    Pcap(#[from] pcap_file::PcapError),
    #[error(transparent)]
    Io(#[from] io::Error),
}
