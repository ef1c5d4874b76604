//! Fetch and unpack the trace archive. Download and extraction are
//! delegated to `curl` and `7z`/`tar`; nothing downstream runs without
//! the trace on disk, so every failure here is fatal to the pipeline.

use std::{
    fs, io,
    path::Path,
    process::Command,
};

use log::info;

use crate::error::AcquireError;

/// Download `url` to `dest`. Refuses to clobber an existing file
/// unless `force` is set.
pub fn download(url: &str, dest: &Path, force: bool) -> Result<(), AcquireError> {
    if dest.exists() && !force {
        return Err(AcquireError::AlreadyPresent(dest.to_path_buf()));
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    info!("fetching {} -> {}", url, dest.display());
    let output = Command::new("curl")
        .args(["-fSL", "-o"])
        .arg(dest)
        .arg(url)
        .output()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => AcquireError::ToolUnavailable("curl"),
            _ => AcquireError::Io(e),
        })?;
    if !output.status.success() {
        return Err(AcquireError::Unreachable {
            url: url.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Unpack `archive` into `dest_dir`, picking the extractor from the
/// file extension.
pub fn extract(archive: &Path, dest_dir: &Path) -> Result<(), AcquireError> {
    fs::create_dir_all(dest_dir)?;

    let extension = archive
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let (tool, mut command) = match extension.as_str() {
        "7z" => {
            let mut command = Command::new("7z");
            command
                .arg("x")
                .arg("-y")
                .arg(format!("-o{}", dest_dir.display()))
                .arg(archive);
            ("7z", command)
        }
        "gz" | "tgz" => {
            let mut command = Command::new("tar");
            command.arg("-xzf").arg(archive).arg("-C").arg(dest_dir);
            ("tar", command)
        }
        other => {
            return Err(AcquireError::Extract {
                path: archive.to_path_buf(),
                reason: format!("unsupported archive extension `{other}`"),
            })
        }
    };

    info!("extracting {} into {}", archive.display(), dest_dir.display());
    let output = command.output().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => AcquireError::ToolUnavailable(tool),
        _ => AcquireError::Io(e),
    })?;
    if !output.status.success() {
        return Err(AcquireError::Extract {
            path: archive.to_path_buf(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}
