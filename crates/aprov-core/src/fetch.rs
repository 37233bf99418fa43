//! Single-stream HTTP GET of a remote binary into a local file.
//!
//! The fetcher only moves bytes; integrity and architecture checks are the
//! orchestrator's job. No retries: a failed fetch fails the run.

use crate::control::AbortToken;
use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

/// Transfer limits applied to every fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub connect_timeout: Duration,
    /// Upper bound for the whole transfer so a hung server cannot stall the build.
    pub total_timeout: Duration,
    /// Abort when throughput stays under `low_speed_limit` bytes/s for `low_speed_time`.
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            total_timeout: Duration::from_secs(600),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
        }
    }
}

/// Why a fetch failed.
#[derive(Debug)]
pub enum FetchError {
    /// Curl reported an error (timeout, DNS, connection refused, TLS...).
    Curl(curl::Error),
    /// Server answered with a non-2xx status.
    Http(u32),
    /// Body ended before the advertised `Content-Length`.
    PartialTransfer { expected: u64, received: u64 },
    /// Writing the destination file failed.
    Storage(io::Error),
    /// Abort was requested while the transfer was running.
    Aborted,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Curl(e) => write!(f, "{}", e),
            FetchError::Http(code) => write!(f, "HTTP {}", code),
            FetchError::PartialTransfer { expected, received } => {
                write!(f, "partial transfer: expected {} bytes, got {}", expected, received)
            }
            FetchError::Storage(e) => write!(f, "storage: {}", e),
            FetchError::Aborted => write!(f, "aborted"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Curl(e) => Some(e),
            FetchError::Storage(e) => Some(e),
            FetchError::Http(_) | FetchError::PartialTransfer { .. } | FetchError::Aborted => None,
        }
    }
}

impl From<curl::Error> for FetchError {
    fn from(e: curl::Error) -> Self {
        FetchError::Curl(e)
    }
}

/// Downloads `url` into `dest`, truncating any existing file. Returns bytes written.
pub fn fetch_to_path(
    url: &str,
    dest: &Path,
    opts: &FetchOptions,
    abort: &AbortToken,
) -> Result<u64, FetchError> {
    if abort.is_aborted() {
        return Err(FetchError::Aborted);
    }
    let mut file = File::create(dest).map_err(FetchError::Storage)?;
    let mut written: u64 = 0;
    let mut write_err: Option<io::Error> = None;

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.fail_on_error(false)?;
    easy.connect_timeout(opts.connect_timeout)?;
    easy.timeout(opts.total_timeout)?;
    easy.low_speed_limit(opts.low_speed_limit)?;
    easy.low_speed_time(opts.low_speed_time)?;
    easy.progress(true)?;

    let perform_result = {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| match file.write_all(data) {
            Ok(()) => {
                written += data.len() as u64;
                Ok(data.len())
            }
            Err(e) => {
                tracing::warn!("fetch write failed: {}", e);
                write_err = Some(e);
                Ok(0) // abort transfer
            }
        })?;
        // Returning false from the progress callback makes curl abort the transfer.
        transfer.progress_function(|_, _, _, _| !abort.is_aborted())?;
        transfer.perform()
    };

    if abort.is_aborted() {
        return Err(FetchError::Aborted);
    }
    if let Some(e) = write_err {
        return Err(FetchError::Storage(e));
    }
    perform_result?;

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(FetchError::Http(code));
    }

    let advertised = easy.content_length_download()?;
    if advertised > 0.0 && (written as f64) < advertised {
        return Err(FetchError::PartialTransfer {
            expected: advertised as u64,
            received: written,
        });
    }

    file.flush().map_err(FetchError::Storage)?;
    file.sync_all().map_err(FetchError::Storage)?;
    tracing::debug!(url, bytes = written, "fetch complete");
    Ok(written)
}
