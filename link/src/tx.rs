//! Transaction lifecycle events.

use crate::error::{LinkError, Result};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEvent {
    /// The extrinsic was built and signed.
    Signed { extrinsic: Vec<u8> },
    /// The node accepted the extrinsic for gossiping.
    Broadcasted { operation_id: String },
    /// A new best block was seen while the transaction is in flight.
    BestBlockChanged { hash: String },
}

/// Stream of [`TxEvent`]s for one submitted transaction.
///
/// Dropping the watch stops the background task following the chain.
#[derive(Debug)]
pub struct TxWatch {
    events: mpsc::Receiver<Result<TxEvent>>,
}

impl TxWatch {
    pub(crate) fn new(events: mpsc::Receiver<Result<TxEvent>>) -> Self {
        Self { events }
    }

    pub async fn next(&mut self) -> Option<Result<TxEvent>> {
        self.events.recv().await
    }

    /// Wait for [`TxEvent::Broadcasted`] and stop watching. Returns the
    /// broadcast operation id.
    pub async fn until_broadcasted(mut self, timeout: Duration) -> Result<String> {
        let wait = async {
            loop {
                match self.next().await {
                    Some(Ok(TxEvent::Broadcasted { operation_id })) => return Ok(operation_id),
                    Some(Ok(event)) => log::debug!("[metacheck-link] Transaction event: {:?}", event),
                    Some(Err(e)) => return Err(e),
                    None => return Err(LinkError::Closed),
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            LinkError::Timeout(format!("transaction not broadcast within {:?}", timeout))
        })?
    }
}
