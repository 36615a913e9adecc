use std::sync::Arc;

use domain::broker::{MessagePublisher, PublishOutcome};
use domain::message::TransportMessage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Moves simulator output to the publisher. Ends once every sender is gone
/// and the channel is empty, returning how many messages it forwarded.
pub fn spawn_publish_pump(
    mut rx: mpsc::Receiver<TransportMessage>,
    publisher: Arc<dyn MessagePublisher>,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut forwarded = 0;
        while let Some(message) = rx.recv().await {
            let equipment_id = message.equipment_id.clone();
            match publisher.publish(message).await {
                Ok(PublishOutcome::Delivered) => {}
                Ok(outcome) if outcome.dropped() > 0 => {
                    warn!(equipment_id = %equipment_id, dropped = outcome.dropped(), "Publisher dropped messages");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(equipment_id = %equipment_id, "Publish failed: {}", e);
                    continue;
                }
            }
            forwarded += 1;
        }
        debug!(forwarded, "Publish pump stopped");
        forwarded
    })
}
