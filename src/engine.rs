//! Per-node runtime wiring: the inbox dispatcher, the link-setup
//! coordinator, and the bidirectional topology discovery that runs before
//! the first algorithm round.

use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    time::sleep,
};
use tracing::{debug, warn};

use crate::{
    barrier::RoundBuffer,
    message::{Direction, Message, MessageType},
    node::Node,
    transport::{self, Link, NetError},
};

/// Direction inboxes hold at most one round of lock-step traffic plus slack;
/// an overflow indicates a round-discipline bug, not normal operation.
pub const INBOX_CAPACITY: usize = 500;

/// Listeners on every node need a moment to come up before discovery
/// traffic starts flowing.
const SETTLE_DELAY: Duration = Duration::from_millis(200);

/// The round clock and simulation-wide constants shared with algorithms.
#[derive(Debug, Clone)]
pub struct Engine {
    pub total_nodes: usize,
}

impl Engine {
    pub fn new(total_nodes: usize) -> Self {
        Self { total_nodes }
    }

    /// Called exactly once per algorithm round, after the round's work.
    pub fn increment_clock<T>(&self, node: &mut Node<T>) {
        node.round += 1
    }
}

/// Splits the merged inbound stream into the two direction inboxes by
/// comparing sender id against self. Handshake frames stop here.
async fn dispatch<T>(
    id: usize,
    mut main_inbox: mpsc::Receiver<Message<T>>,
    left: mpsc::Sender<Message<T>>,
    right: mpsc::Sender<Message<T>>,
) {
    while let Some(message) = main_inbox.recv().await {
        if message.kind == MessageType::Sync {
            continue;
        }
        let inbox = if message.sender_id < id {
            &left
        } else if message.sender_id > id {
            &right
        } else {
            warn!(id, "discarding message from self");
            continue;
        };
        match inbox.try_send(message) {
            Ok(()) => {}
            // lock-step peers cannot outrun a 500-slot queue; an overflow
            // means the round discipline broke upstream
            Err(TrySendError::Full(_)) => warn!(id, "direction inbox full, dropping"),
            // the node is done with this direction, e.g. a late term frame
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

/// Brings up one node's side of the line exactly once: listener, dialed
/// right link with its `Sync` handshake, reader tasks feeding the main
/// inbox, and the dispatcher behind the two direction inboxes. Returns only
/// after every link the node's position calls for is in place, so callers
/// may start discovery immediately.
pub async fn setup_node<T>(
    id: usize,
    node_count: usize,
    base_port: u16,
) -> Result<(Node<T>, RoundBuffer<T>, RoundBuffer<T>), NetError>
where
    T: Serialize + DeserializeOwned + Default + Send + 'static,
{
    let (main_tx, main_rx) = mpsc::channel(INBOX_CAPACITY);
    let (left_tx, left_rx) = mpsc::channel(INBOX_CAPACITY);
    let (right_tx, right_rx) = mpsc::channel(INBOX_CAPACITY);
    tokio::spawn(dispatch(id, main_rx, left_tx, right_tx));

    let listener = transport::bind(transport::node_addr(base_port, id)).await?;
    let (links_tx, mut links_rx) = mpsc::channel(2);
    tokio::spawn(transport::accept_loop(listener, main_tx.clone(), links_tx));

    let mut node = Node::new(id, node_count);
    if id + 1 < node_count {
        let stream = transport::dial(transport::node_addr(base_port, id + 1)).await?;
        let (read, write) = stream.into_split();
        let mut link = Link::new(id + 1, write);
        // the acceptor reads this frame to learn which slot the link fills
        link.send(&Message::<T>::sync(id, id + 1)).await?;
        tokio::spawn(transport::read_frames(read, main_tx.clone()));
        node.right_conn = Some(link);
    }

    while !node.links_ready() {
        let Some(link) = links_rx.recv().await else {
            unreachable!("accept loop outlives the node")
        };
        let peer = link.peer();
        if node.attach(link).is_err() {
            warn!(id, peer, "dropping connection from non-neighbor");
        }
    }
    debug!(id, ?node.position, "links established");

    Ok((
        node,
        RoundBuffer::new(Direction::Left, left_rx),
        RoundBuffer::new(Direction::Right, right_rx),
    ))
}

/// Bidirectional distance accumulation at round 0. Boundary nodes seed a
/// zero-distance `Init` token inward; every node resolves its distance to
/// each end from the first token it sees per side and forwards the token
/// with the incremented count. Converges in at most N hops per direction.
pub async fn discover_total_nodes<T>(
    node: &mut Node<T>,
    left: &mut RoundBuffer<T>,
    right: &mut RoundBuffer<T>,
) -> Result<usize, NetError>
where
    T: Serialize + Default,
{
    sleep(SETTLE_DELAY).await;

    // a missing link is an end of the line, which covers head, tail, and
    // the degenerate single-node case at once
    let mut left_dist = (!node.has_left()).then_some(0u64);
    let mut right_dist = (!node.has_right()).then_some(0u64);

    if left_dist.is_some() && node.has_right() {
        node.send_right(&Message::<T>::init(node.id, node.id + 1, 0))
            .await?;
    }
    if right_dist.is_some() && node.has_left() {
        node.send_left(&Message::<T>::init(node.id, node.id - 1, 0))
            .await?;
    }

    while left_dist.is_none() || right_dist.is_none() {
        if left_dist.is_none() {
            let mut message = left.get_step_message(0).await;
            let dist = message.sequence + 1;
            left_dist = Some(dist);
            if node.has_right() {
                message.sequence = dist;
                let _ = node.send_right(&message).await;
            }
        }
        if right_dist.is_none() {
            let mut message = right.get_step_message(0).await;
            let dist = message.sequence + 1;
            right_dist = Some(dist);
            if node.has_left() {
                message.sequence = dist;
                let _ = node.send_left(&message).await;
            }
        }
    }

    let total = match (left_dist, right_dist) {
        (Some(left_dist), Some(right_dist)) => (left_dist + right_dist) as usize + 1,
        _ => unreachable!(),
    };
    node.total_node = total;
    debug!(id = node.id, total, "discovery complete");
    Ok(total)
}

/// Emits a best-effort `Term` frame on every present link after the
/// algorithm loop. Peers that already exited simply never read it.
pub async fn broadcast_termination<T: Serialize + Default>(node: &mut Node<T>) {
    let round = node.round;
    if node.has_right() {
        let message = Message::<T>::control(MessageType::Term, round, node.id, node.id + 1);
        let _ = node.send_right(&message).await;
    }
    if node.has_left() {
        let message = Message::<T>::control(MessageType::Term, round, node.id, node.id - 1);
        let _ = node.send_left(&message).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{task::JoinSet, time::timeout};

    use super::*;

    #[tokio::test]
    async fn dispatcher_routes_by_sender_id() {
        let (main_tx, main_rx) = mpsc::channel(16);
        let (left_tx, mut left_rx) = mpsc::channel(16);
        let (right_tx, mut right_rx) = mpsc::channel(16);
        tokio::spawn(dispatch::<u32>(5, main_rx, left_tx, right_tx));

        main_tx.send(Message::data(0, 4, 5, 1u32)).await.unwrap();
        main_tx.send(Message::data(0, 6, 5, 2u32)).await.unwrap();
        main_tx.send(Message::<u32>::sync(4, 5)).await.unwrap();
        main_tx.send(Message::data(1, 4, 5, 3u32)).await.unwrap();

        assert_eq!(left_rx.recv().await.unwrap().body, 1);
        assert_eq!(right_rx.recv().await.unwrap().body, 2);
        // the sync frame never reaches a direction inbox
        assert_eq!(left_rx.recv().await.unwrap().body, 3);
        assert!(right_rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn discovery_learns_the_line_length() {
        const N: usize = 10;
        let mut tasks = JoinSet::new();
        for id in 0..N {
            tasks.spawn(async move {
                let (mut node, mut left, mut right) =
                    setup_node::<u32>(id, N, 18200).await.unwrap();
                discover_total_nodes(&mut node, &mut left, &mut right)
                    .await
                    .unwrap()
            });
        }
        timeout(Duration::from_secs(60), async {
            while let Some(total) = tasks.join_next().await {
                assert_eq!(total.unwrap(), N);
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn single_node_discovers_itself() {
        let (mut node, mut left, mut right) = setup_node::<u32>(0, 1, 18220).await.unwrap();
        let total = discover_total_nodes(&mut node, &mut left, &mut right)
            .await
            .unwrap();
        assert_eq!(total, 1);
    }
}
