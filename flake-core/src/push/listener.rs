//! Reconnecting push listener

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::sync::PushEvent;

use super::PushConnector;

/// What the listener reports to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum PushSignal {
    Connected,
    Event(PushEvent),
    Disconnected,
}

/// Keeps one guild's push channel open, reconnecting after a fixed delay
pub struct PushListener {
    connector: Arc<dyn PushConnector>,
    url: String,
    reconnect_delay: Duration,
}

impl PushListener {
    pub fn new(connector: Arc<dyn PushConnector>, url: String, reconnect_delay: Duration) -> Self {
        Self {
            connector,
            url,
            reconnect_delay,
        }
    }

    /// Run until the receiving side goes away.
    ///
    /// Connection loss is never fatal: the listener waits `reconnect_delay`
    /// and tries again, forever.
    pub async fn run(self, tx: mpsc::UnboundedSender<PushSignal>) {
        loop {
            match self.connector.connect(&self.url).await {
                Ok(mut frames) => {
                    info!("Push channel connected: {}", self.url);
                    if tx.send(PushSignal::Connected).is_err() {
                        return;
                    }

                    while let Some(frame) = frames.next().await {
                        match frame {
                            Ok(text) => {
                                let Some(event) = PushEvent::parse(&text) else {
                                    continue;
                                };
                                debug!("Push event: {:?}", event);
                                if tx.send(PushSignal::Event(event)).is_err() {
                                    return;
                                }
                            }
                            Err(e) => {
                                warn!("Push channel error: {}", e);
                                break;
                            }
                        }
                    }

                    info!("Push channel closed: {}", self.url);
                    if tx.send(PushSignal::Disconnected).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!("Push channel connect failed: {}", e);
                }
            }

            if tx.is_closed() {
                return;
            }
            debug!("Reconnecting push channel in {:?}", self.reconnect_delay);
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::{FrameStream, PushError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    /// Scripted connections: `Some(frames)` connects and yields the frames,
    /// `None` fails to connect. Once the script runs out every attempt fails.
    struct FakeConnector {
        script: Mutex<VecDeque<Option<Vec<String>>>>,
        attempts: Mutex<Vec<Instant>>,
    }

    impl FakeConnector {
        fn new(script: Vec<Option<Vec<&str>>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(
                    script
                        .into_iter()
                        .map(|s| s.map(|frames| frames.into_iter().map(String::from).collect()))
                        .collect(),
                ),
                attempts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl PushConnector for FakeConnector {
        async fn connect(&self, _url: &str) -> Result<FrameStream, PushError> {
            self.attempts.lock().push(Instant::now());
            match self.script.lock().pop_front().flatten() {
                Some(frames) => Ok(futures::stream::iter(frames.into_iter().map(Ok)).boxed()),
                None => Err(PushError::Connect("refused".into())),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_then_reconnect_after_delay() {
        let connector = FakeConnector::new(vec![
            Some(vec![
                r#"{"event":"TRACK_START","track":"Song","duration":1000,"uri":"u://1"}"#,
                "garbage",
                r#"{"event":"TRACK_END","reason":"finished"}"#,
            ]),
            None,
            Some(vec![]),
        ]);

        let listener = PushListener::new(
            connector.clone(),
            "ws://localhost/ws/1".into(),
            Duration::from_millis(3_000),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(listener.run(tx));

        assert_eq!(rx.recv().await, Some(PushSignal::Connected));
        assert!(matches!(
            rx.recv().await,
            Some(PushSignal::Event(PushEvent::TrackStart { .. }))
        ));
        assert!(matches!(
            rx.recv().await,
            Some(PushSignal::Event(PushEvent::TrackEnd { .. }))
        ));
        assert_eq!(rx.recv().await, Some(PushSignal::Disconnected));

        // failed attempt, then a successful one
        assert_eq!(rx.recv().await, Some(PushSignal::Connected));
        task.abort();

        let attempts = connector.attempts.lock().clone();
        assert_eq!(attempts.len(), 3);
        for pair in attempts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(3_000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_receiver_dropped() {
        let connector = FakeConnector::new(vec![Some(vec![])]);
        let listener = PushListener::new(connector, "ws://x/ws/1".into(), Duration::from_millis(10));
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        // returns instead of looping forever
        listener.run(tx).await;
    }
}
