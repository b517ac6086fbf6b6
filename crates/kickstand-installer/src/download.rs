use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use kickstand_core::{BootstrapError, ProgressEvent, ProgressSink, Transfer};
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::fs_utils::{part_path, remove_file_if_exists};

const CHUNK_SIZE: usize = 64 * 1024;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Streams a URL to a file, reporting bytes as they arrive.
///
/// The body is written to `<dest>.part` and only renamed over `dest` once the
/// transfer (and checksum, when one is given) has succeeded, so `dest` is never
/// observed half-written.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    attempts: u32,
    retry_delay: Duration,
}

impl Downloader {
    pub fn new(attempts: u32) -> Result<Self, BootstrapError> {
        let client = Client::builder()
            .user_agent(concat!("kickstand/", env!("CARGO_PKG_VERSION")))
            .timeout(None::<Duration>)
            .build()
            .map_err(|err| {
                BootstrapError::configuration(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self {
            client,
            attempts: attempts.max(1),
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Returns the number of bytes written to `dest`.
    pub fn download(
        &self,
        url: &str,
        dest: &Path,
        expected_sha256: Option<&str>,
        sink: &mut dyn ProgressSink,
    ) -> Result<u64, BootstrapError> {
        let mut delay = self.retry_delay;
        let mut attempt = 1;
        loop {
            match self.download_once(url, dest, expected_sha256, sink) {
                Ok(bytes) => {
                    info!(url, dest = %dest.display(), bytes, "download complete");
                    return Ok(bytes);
                }
                Err(err) if err.is_aborted() || attempt >= self.attempts => return Err(err),
                Err(err) => {
                    warn!(url, attempt, error = %err, "download attempt failed; retrying");
                    thread::sleep(delay);
                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                    attempt += 1;
                }
            }
        }
    }

    fn download_once(
        &self,
        url: &str,
        dest: &Path,
        expected_sha256: Option<&str>,
        sink: &mut dyn ProgressSink,
    ) -> Result<u64, BootstrapError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                BootstrapError::io("failed to create download directory", parent, err)
            })?;
        }

        let part = part_path(dest);
        let result = self.stream_to(url, dest, &part, expected_sha256, sink);
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(err) => {
                if let Err(cleanup) = remove_file_if_exists(&part) {
                    warn!(path = %part.display(), error = %cleanup, "failed to remove partial download");
                }
                return Err(err);
            }
        };

        remove_file_if_exists(dest)
            .map_err(|err| BootstrapError::io("failed to replace download", dest, err))?;
        fs::rename(&part, dest)
            .map_err(|err| BootstrapError::io("failed to move download into place", dest, err))?;
        Ok(bytes)
    }

    fn stream_to(
        &self,
        url: &str,
        dest: &Path,
        part: &Path,
        expected_sha256: Option<&str>,
        sink: &mut dyn ProgressSink,
    ) -> Result<u64, BootstrapError> {
        debug!(url, "requesting");
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| BootstrapError::network(url, err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BootstrapError::network(url, format!("HTTP status {status}")));
        }
        let total = response.content_length();

        if sink.on_progress(ProgressEvent::new(0, total)) == Transfer::Abort {
            return Err(BootstrapError::Aborted);
        }

        let mut file = File::create(part)
            .map_err(|err| BootstrapError::io("failed to create download file", part, err))?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0_u8; CHUNK_SIZE];
        let mut transferred = 0_u64;

        loop {
            let read = response
                .read(&mut buffer)
                .map_err(|err| BootstrapError::network(url, err.to_string()))?;
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read])
                .map_err(|err| BootstrapError::io("failed to write download file", part, err))?;
            hasher.update(&buffer[..read]);
            transferred += read as u64;

            if sink.on_progress(ProgressEvent::new(transferred, total)) == Transfer::Abort {
                return Err(BootstrapError::Aborted);
            }
        }

        file.flush()
            .map_err(|err| BootstrapError::io("failed to flush download file", part, err))?;
        drop(file);

        if let Some(total) = total {
            if transferred < total {
                return Err(BootstrapError::network(
                    url,
                    format!("connection closed after {transferred} of {total} bytes"),
                ));
            }
        }

        if let Some(expected) = expected_sha256 {
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                return Err(BootstrapError::checksum_mismatch(
                    dest,
                    expected.trim().to_ascii_lowercase(),
                    actual,
                ));
            }
        }

        Ok(transferred)
    }
}
