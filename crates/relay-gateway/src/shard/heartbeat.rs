//! Heartbeat task
//!
//! One task per connection ticks at the interval from Hello and asks the
//! shard task to beat. The shard task owns the socket, so the heartbeat task
//! only signals. Two beats in a row without an ack mark the connection as a
//! zombie.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::ShardShared;

/// Consecutive unacknowledged beats before the connection is dropped
pub(crate) const MAX_MISSED_ACKS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Beat {
    /// Time to send a heartbeat
    Send,
    /// Acks stopped coming; reconnect and resume
    Zombie,
}

/// Running heartbeat task; aborted when dropped
pub(crate) struct Heartbeat {
    handle: JoinHandle<()>,
}

impl Heartbeat {
    pub(crate) fn spawn(
        interval: Duration,
        shared: Arc<ShardShared>,
    ) -> (Self, mpsc::UnboundedReceiver<Beat>) {
        let (tx, rx) = mpsc::unbounded_channel();
        shared.reset_heartbeat();
        let handle = tokio::spawn(run(interval, shared, tx));
        (Self { handle }, rx)
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(interval: Duration, shared: Arc<ShardShared>, tx: mpsc::UnboundedSender<Beat>) {
    // First beat lands at a random point inside the first interval
    let jitter = interval.mul_f64(rand::random::<f64>());
    tokio::time::sleep(jitter).await;

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut missed = 0u32;

    loop {
        ticker.tick().await;

        if shared.take_ack() {
            missed = 0;
        } else {
            missed += 1;
            tracing::debug!(shard_id = shared.id, missed, "Heartbeat not acknowledged");
            if missed >= MAX_MISSED_ACKS {
                let _ = tx.send(Beat::Zombie);
                return;
            }
        }

        if tx.send(Beat::Send).is_err() {
            return;
        }
    }
}
