use log::{debug, trace};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::connection::RequestWriter;
use crate::protocol::Request;

/// Send a heartbeat every `interval` until `stop_rx` flips to true.
///
/// Only writes; the acknowledgements are read (and ignored) by whoever owns
/// the reader half at the time.
pub fn spawn_heartbeat(
    writer: RequestWriter,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *stop_rx.borrow() {
                break;
            }

            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = writer.send(&Request::Heartbeat).await {
                        debug!("heartbeat failed, stopping: {}", e);
                        break;
                    }
                    trace!("heartbeat sent");
                }
            }
        }

        debug!("heartbeat stopped");
    })
}
