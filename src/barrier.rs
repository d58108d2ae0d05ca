//! The local barrier that turns per-link FIFO delivery into per-round
//! synchronization.
//!
//! A neighbor running ahead may emit its round r+1 frame before this node
//! has finished collecting round r. TCP keeps each link ordered, so it is
//! enough to stash frames for future rounds and hand them out when the
//! consumer's clock catches up. Consumers must ask for strictly increasing
//! rounds per direction; a round that was already consumed is gone.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::warn;

use crate::{
    message::{Direction, Message},
    node::Node,
};

pub struct RoundBuffer<T> {
    direction: Direction,
    inbox: mpsc::Receiver<Message<T>>,
    future_msgs: HashMap<u32, Message<T>>,
}

impl<T> RoundBuffer<T> {
    pub fn new(direction: Direction, inbox: mpsc::Receiver<Message<T>>) -> Self {
        Self {
            direction,
            inbox,
            future_msgs: HashMap::new(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Blocks until the message tagged `target_round` is available on this
    /// direction. Messages for other rounds are kept aside untouched; at
    /// most one message per round is ever in flight on a link, so the stash
    /// never holds duplicates.
    pub async fn get_step_message(&mut self, target_round: u32) -> Message<T> {
        if let Some(message) = self.future_msgs.remove(&target_round) {
            return message;
        }
        loop {
            let Some(message) = self.inbox.recv().await else {
                // the dispatcher is gone; a dead link leaves the caller
                // waiting, same as a peer that never answers
                warn!(direction = ?self.direction, target_round, "inbox closed");
                std::future::pending::<()>().await;
                unreachable!()
            };
            if message.round == target_round {
                return message;
            }
            self.future_msgs.insert(message.round, message);
        }
    }
}

/// Fetches the round-`round` message from every side the node actually has,
/// concurrently, and returns only once all of them arrived.
pub async fn wait_for_neighbors<T>(
    node: &Node<T>,
    round: u32,
    left: &mut RoundBuffer<T>,
    right: &mut RoundBuffer<T>,
) -> (Option<Message<T>>, Option<Message<T>>) {
    let left_fut = async {
        if node.has_left() {
            Some(left.get_step_message(round).await)
        } else {
            None
        }
    };
    let right_fut = async {
        if node.has_right() {
            Some(right.get_step_message(round).await)
        } else {
            None
        }
    };
    tokio::join!(left_fut, right_fut)
}
