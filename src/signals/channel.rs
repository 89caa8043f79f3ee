use async_trait::async_trait;
use tokio::sync::mpsc;

use super::TradeSignalSource;
use crate::domain::TradeIntent;

/// Intents pushed in-process through a bounded channel
pub struct ChannelSignalSource {
    rx: mpsc::Receiver<TradeIntent>,
}

impl ChannelSignalSource {
    pub fn new(rx: mpsc::Receiver<TradeIntent>) -> Self {
        Self { rx }
    }

    /// Create a source together with the sender that feeds it
    pub fn channel(buffer: usize) -> (mpsc::Sender<TradeIntent>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl TradeSignalSource for ChannelSignalSource {
    async fn next_intent(&mut self) -> Option<TradeIntent> {
        self.rx.recv().await
    }
}
