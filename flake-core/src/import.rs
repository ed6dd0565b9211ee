//! Playlist Import Stream
//!
//! `POST /playlist/import` answers with a long-lived body of
//! `data: {...}` lines reporting progress. Chunks can split a line
//! anywhere, so bytes are buffered until a newline completes it.

use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, trace, warn};

use crate::api::{ApiError, BotApiClient};

/// Import stream errors
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Import stream failed: {0}")]
    Stream(#[from] reqwest::Error),

    #[error("Import failed: {0}")]
    Failed(String),

    #[error("Import stream ended before completion")]
    Incomplete,
}

/// One progress frame
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ImportFrame {
    Start {
        #[serde(default)]
        playlist_name: Option<String>,
        #[serde(default)]
        total: usize,
    },
    Track {
        #[serde(default)]
        current: usize,
        #[serde(default)]
        total: usize,
        #[serde(default)]
        track_title: Option<String>,
    },
    Done {
        #[serde(default)]
        playlist_name: Option<String>,
        #[serde(default)]
        total: usize,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

/// Splits raw body bytes into frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every frame completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ImportFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(frame) = parse_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// End of body: parse whatever is left as a final line
    pub fn finish(mut self) -> Option<ImportFrame> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }
}

fn parse_line(line: &[u8]) -> Option<ImportFrame> {
    let line = std::str::from_utf8(line).ok()?.trim();
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() {
        return None;
    }

    match serde_json::from_str(payload) {
        Ok(frame) => Some(frame),
        Err(e) => {
            trace!("Skipping malformed import frame: {}", e);
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImportStatus {
    #[default]
    Idle,
    Running,
    Done,
    Failed,
}

/// Accumulated import state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportProgress {
    pub status: ImportStatus,
    pub playlist_name: Option<String>,
    pub current: usize,
    pub total: usize,
    pub track_title: Option<String>,
    pub error: Option<String>,
}

impl ImportProgress {
    /// Fold one frame into the progress
    pub fn apply(&mut self, frame: ImportFrame) {
        match frame {
            ImportFrame::Start { playlist_name, total } => {
                *self = Self {
                    status: ImportStatus::Running,
                    playlist_name,
                    total,
                    ..Self::default()
                };
            }
            ImportFrame::Track {
                current,
                total,
                track_title,
            } => {
                self.status = ImportStatus::Running;
                self.current = current;
                if total > 0 {
                    self.total = total;
                }
                self.track_title = track_title;
            }
            ImportFrame::Done { playlist_name, total } => {
                self.status = ImportStatus::Done;
                if playlist_name.is_some() {
                    self.playlist_name = playlist_name;
                }
                self.total = total;
                self.current = total;
            }
            ImportFrame::Error { message } => {
                self.status = ImportStatus::Failed;
                self.error = Some(message.unwrap_or_else(|| "Import failed".to_string()));
            }
        }
    }

    /// Completion in percent, 0-100
    pub fn percent(&self) -> u8 {
        if self.status == ImportStatus::Done {
            return 100;
        }
        if self.total == 0 {
            return 0;
        }
        ((self.current.min(self.total) * 100) / self.total) as u8
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, ImportStatus::Done | ImportStatus::Failed)
    }
}

/// Consume a progress body, reporting every change to `on_progress`
pub async fn follow_frames<S, B, E, F>(body: S, mut on_progress: F) -> Result<ImportProgress, ImportError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<ImportError>,
    F: FnMut(&ImportProgress),
{
    let mut body = std::pin::pin!(body);
    let mut decoder = FrameDecoder::new();
    let mut progress = ImportProgress::default();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(Into::into)?;
        for frame in decoder.push(chunk.as_ref()) {
            progress.apply(frame);
            on_progress(&progress);
        }
    }

    if let Some(frame) = decoder.finish() {
        progress.apply(frame);
        on_progress(&progress);
    }

    match progress.status {
        ImportStatus::Done => Ok(progress),
        ImportStatus::Failed => Err(ImportError::Failed(progress.error.unwrap_or_default())),
        ImportStatus::Idle | ImportStatus::Running => Err(ImportError::Incomplete),
    }
}

/// Import a playlist by URL and follow its progress to the end
pub async fn import_playlist<F>(
    client: &BotApiClient,
    url: &str,
    user_id: &str,
    on_progress: F,
) -> Result<ImportProgress, ImportError>
where
    F: FnMut(&ImportProgress),
{
    info!("Importing playlist {}", url);
    let response = client.start_import(url, user_id).await?;

    let result = follow_frames(response.bytes_stream(), on_progress).await;
    match &result {
        Ok(progress) => debug!(
            "Imported {} tracks into {:?}",
            progress.total, progress.playlist_name
        ),
        Err(e) => warn!("Playlist import failed: {}", e),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<&'static [u8], ImportError>> + Unpin {
        futures::stream::iter(parts.iter().map(|p| Ok(p.as_bytes())).collect::<Vec<_>>())
    }

    #[test]
    fn test_decoder_buffers_split_lines() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"sta").is_empty());
        let frames = decoder.push(b"rt\",\"playlist_name\":\"Mix\",\"total\":3}\n\n");
        assert_eq!(
            frames,
            vec![ImportFrame::Start {
                playlist_name: Some("Mix".into()),
                total: 3
            }]
        );
    }

    #[test]
    fn test_decoder_skips_noise() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(
            b": keepalive\nevent: progress\ndata: not json\ndata: {\"type\":\"unknown\"}\ndata: {\"type\":\"error\",\"message\":\"bad url\"}\r\n",
        );
        assert_eq!(
            frames,
            vec![ImportFrame::Error {
                message: Some("bad url".into())
            }]
        );
    }

    #[test]
    fn test_decoder_finish_parses_trailing_line() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"done\",\"total\":2}").is_empty());
        assert_eq!(
            decoder.finish(),
            Some(ImportFrame::Done {
                playlist_name: None,
                total: 2
            })
        );
    }

    #[test]
    fn test_progress_percent() {
        let mut progress = ImportProgress::default();
        progress.apply(ImportFrame::Start {
            playlist_name: Some("Mix".into()),
            total: 4,
        });
        progress.apply(ImportFrame::Track {
            current: 1,
            total: 4,
            track_title: Some("One".into()),
        });
        assert_eq!(progress.percent(), 25);
        assert_eq!(progress.track_title.as_deref(), Some("One"));
        assert!(!progress.is_finished());
    }

    #[tokio::test]
    async fn test_follow_frames_to_completion() {
        let body = chunks(&[
            "data: {\"type\":\"start\",\"playlist_name\":\"Mix\",\"total\":2}\n",
            "data: {\"type\":\"track\",\"current\":1,\"total\":2,\"track_title\":\"A\"}\ndata: {\"type\":\"tr",
            "ack\",\"current\":2,\"total\":2,\"track_title\":\"B\"}\n",
            "data: {\"type\":\"done\",\"playlist_name\":\"Mix\",\"total\":2}\n",
        ]);

        let mut seen = Vec::new();
        let progress = follow_frames(body, |p| seen.push(p.percent())).await.unwrap();

        assert_eq!(seen, vec![0, 50, 100, 100]);
        assert_eq!(progress.status, ImportStatus::Done);
        assert_eq!(progress.playlist_name.as_deref(), Some("Mix"));
    }

    #[tokio::test]
    async fn test_follow_frames_error_frame() {
        let body = chunks(&["data: {\"type\":\"error\",\"message\":\"Playlist is private\"}\n"]);
        let result = follow_frames(body, |_| {}).await;
        assert!(matches!(result, Err(ImportError::Failed(msg)) if msg == "Playlist is private"));
    }

    #[tokio::test]
    async fn test_follow_frames_truncated() {
        let body = chunks(&["data: {\"type\":\"start\",\"total\":5}\n"]);
        let result = follow_frames(body, |_| {}).await;
        assert!(matches!(result, Err(ImportError::Incomplete)));
    }
}
