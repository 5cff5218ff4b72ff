/**
 * Event Fan-out
 *
 * Delivers one `ServerEvent` to a set of live connections. Each connection
 * has its own bounded queue, so a slow socket never holds up the others.
 * A closed queue only means that connection is on its way out and its
 * reader will finalize it; a full queue means the client stopped reading,
 * and the connection is reported back so the gateway can drop it.
 */

use super::connection::{ConnectionHandle, ConnectionId, Delivery};
use crate::shared::ServerEvent;

/// Outcome of one fan-out
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    /// Connections whose queue was full; the event was not queued for them
    pub lagging: Vec<ConnectionId>,
}

/// Queue `event` on every target connection.
pub fn fan_out<'a>(
    targets: impl IntoIterator<Item = &'a ConnectionHandle>,
    event: &ServerEvent,
) -> FanOut {
    let mut outcome = FanOut::default();
    for target in targets {
        match target.send(event.clone()) {
            Delivery::Queued => outcome.delivered += 1,
            Delivery::Full => {
                tracing::warn!(
                    "[Gateway] Queue of {} is full, dropping {}",
                    target.id,
                    event.name()
                );
                outcome.lagging.push(target.id);
            }
            Delivery::Closed => {
                tracing::debug!(
                    "[Gateway] Dropped {} for closed connection {}",
                    event.name(),
                    target.id
                );
            }
        }
    }
    tracing::debug!(
        "[Gateway] {} delivered to {} connections",
        event.name(),
        outcome.delivered
    );
    outcome
}
