//! Audio retrieval
//!
//! Turns a [`SynthesisResponse`] into an in-memory [`AudioAsset`]. URLs are streamed to
//! a temporary file first; the file is owned by a guard, so it is removed on every exit
//! path, including when the surrounding future is dropped.

use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncWriteExt, BufWriter};
use uuid::Uuid;

use crate::client::SynthesisResponse;
use crate::config::ProviderConfig;
use crate::error::{Result, TtsBridgeError};

const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Container format of the synthesized audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFormat {
    #[default]
    Wav,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/wav",
        }
    }
}

/// Synthesized audio owned by the call that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct AudioAsset {
    pub bytes: Bytes,
    pub format: AudioFormat,
    /// URL the audio was downloaded from, if any
    pub source_url: Option<String>,
    /// Downloaded file left on disk because `KEEP_TMP_FILE` is on
    pub kept_path: Option<PathBuf>,
}

impl AudioAsset {
    pub fn inline(bytes: Bytes) -> Self {
        Self {
            bytes,
            format: AudioFormat::Wav,
            source_url: None,
            kept_path: None,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

/// Download settings taken from the config snapshot
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub timeout: Duration,
    pub temp_dir: Option<PathBuf>,
    pub keep_tmp_file: bool,
}

impl From<&ProviderConfig> for DownloadOptions {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            timeout: config.download_timeout(),
            temp_dir: config.temp_dir.clone(),
            keep_tmp_file: config.keep_tmp_file,
        }
    }
}

pub struct AudioResolver {
    client: Client,
    options: DownloadOptions,
    /// Log prefix naming the call this resolver serves
    tag: String,
}

impl AudioResolver {
    pub fn new(client: Client, options: DownloadOptions) -> Self {
        Self {
            client,
            options,
            tag: String::new(),
        }
    }

    /// Prefix log lines with `call_id`
    pub fn for_call(mut self, call_id: Uuid) -> Self {
        self.tag = format!("[{}] ", call_id);
        self
    }

    /// Produce the audio for `response`, downloading it if needed
    pub async fn resolve(&self, response: &SynthesisResponse) -> Result<AudioAsset> {
        if let Some(bytes) = &response.audio_bytes {
            if bytes.is_empty() {
                return Err(TtsBridgeError::MissingAudio {
                    message: response.message.clone(),
                });
            }
            log::debug!("{}Using inline audio ({} bytes)", self.tag, bytes.len());
            return Ok(AudioAsset::inline(bytes.clone()));
        }

        match &response.audio_url {
            Some(url) => self.download(url).await,
            None => Err(TtsBridgeError::MissingAudio {
                message: response.message.clone(),
            }),
        }
    }

    /// Create the scoped download file off the async runtime
    async fn create_temp_file(&self) -> Result<NamedTempFile> {
        let temp_dir = self.options.temp_dir.clone();
        let created = tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
            let mut builder = tempfile::Builder::new();
            builder.prefix("tts_").suffix(".wav");
            match temp_dir {
                Some(dir) => {
                    std::fs::create_dir_all(&dir)?;
                    builder.tempfile_in(dir)
                }
                None => builder.tempfile(),
            }
        })
        .await
        .map_err(|e| TtsBridgeError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        Ok(created?)
    }

    /// Stream `url` into a temporary file and read it back
    ///
    /// A 2xx answer with an empty body fails with `MissingAudio`, like an empty
    /// inline payload.
    pub async fn download(&self, url: &str) -> Result<AudioAsset> {
        log::info!("{}Downloading synthesized audio from {}", self.tag, url);

        let response = self
            .client
            .get(url)
            .timeout(self.options.timeout)
            .send()
            .await
            .map_err(|e| {
                log::error!("{}Audio download request failed: {}", self.tag, e);
                TtsBridgeError::Download { cause: e.to_string() }
            })?;

        let status = response.status();
        if !status.is_success() {
            log::error!("{}Audio download returned status {} for {}", self.tag, status, url);
            return Err(TtsBridgeError::Download {
                cause: format!("status {} for {}", status, url),
            });
        }

        let temp = self.create_temp_file().await?;
        log::debug!("{}Writing audio to {}", self.tag, temp.path().display());

        let written = write_stream(response, temp.path(), &self.tag).await?;
        let bytes = Bytes::from(tokio::fs::read(temp.path()).await?);
        if bytes.is_empty() {
            log::error!("{}Audio download from {} returned an empty body", self.tag, url);
            return Err(TtsBridgeError::MissingAudio {
                message: Some(format!("empty audio body at {}", url)),
            });
        }
        log::info!("{}Downloaded {} bytes of audio ({} streamed)", self.tag, bytes.len(), written);

        let kept_path = if self.options.keep_tmp_file {
            let (_, path) = temp.keep().map_err(|e| TtsBridgeError::Io(e.error))?;
            log::info!("{}Keeping temporary audio file at {}", self.tag, path.display());
            Some(path)
        } else {
            None
        };

        Ok(AudioAsset {
            bytes,
            format: AudioFormat::Wav,
            source_url: Some(url.to_string()),
            kept_path,
        })
    }
}

/// Copy the response body to `path` chunk by chunk
async fn write_stream(response: reqwest::Response, path: &Path, tag: &str) -> Result<u64> {
    let file = tokio::fs::OpenOptions::new().write(true).truncate(true).open(path).await?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            log::error!("{}Audio download interrupted after {} bytes: {}", tag, written, e);
            TtsBridgeError::Download { cause: e.to_string() }
        })?;
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    writer.flush().await?;
    writer.into_inner().sync_all().await?;
    Ok(written)
}
