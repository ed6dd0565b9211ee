//! Push Channel
//!
//! WebSocket feed of track events for one guild.

mod listener;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;

pub use listener::{PushListener, PushSignal};

/// Text frames of one connection; ends when the connection closes
pub type FrameStream = BoxStream<'static, Result<String, PushError>>;

/// Push channel errors
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid push URL: {0}")]
    InvalidUrl(String),

    #[error("Push connection failed: {0}")]
    Connect(String),
}

/// Opens push connections
#[async_trait]
pub trait PushConnector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<FrameStream, PushError>;
}

/// [`PushConnector`] over a real WebSocket
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self, url: &str) -> Result<FrameStream, PushError> {
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(PushError::InvalidUrl(url.to_string()));
        }

        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;

        // Binary and control frames carry nothing for us; pings are answered
        // by tungstenite while the stream is read.
        let frames = ws_stream.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(_) => None,
                Err(e) => Some(Err(PushError::from(e))),
            }
        });

        Ok(frames.boxed())
    }
}
