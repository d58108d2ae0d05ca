use serde::Serialize;

use crate::{
    message::{Message, Position},
    transport::{Link, NetError},
};

/// Per-process node state, owned and mutated by the node's top-level task
/// only. Link slots are written exactly once during setup: the dialed link
/// lands in `right_conn` directly, accepted links are assigned by the peer
/// id carried in their handshake frame.
#[derive(Debug)]
pub struct Node<T> {
    pub id: usize,
    /// A hint at creation, authoritative after discovery.
    pub total_node: usize,
    pub position: Position,
    /// Logical round clock, advanced only through `Engine::increment_clock`.
    pub round: u32,
    pub value: T,
    pub left_conn: Option<Link>,
    pub right_conn: Option<Link>,
}

impl<T: Default> Node<T> {
    pub fn new(id: usize, total_node: usize) -> Self {
        Self {
            id,
            total_node,
            position: Position::new(id, total_node),
            round: 0,
            value: T::default(),
            left_conn: None,
            right_conn: None,
        }
    }
}

impl<T> Node<T> {
    pub fn has_left(&self) -> bool {
        self.left_conn.is_some()
    }

    pub fn has_right(&self) -> bool {
        self.right_conn.is_some()
    }

    /// Stores an accepted link in the slot its handshake names. Rejects
    /// peers that are not adjacent in the line.
    pub fn attach(&mut self, link: Link) -> Result<(), Link> {
        if link.peer() + 1 == self.id {
            self.left_conn = Some(link);
            Ok(())
        } else if link.peer() == self.id + 1 {
            self.right_conn = Some(link);
            Ok(())
        } else {
            Err(link)
        }
    }

    /// True once every link this node's position calls for is in place.
    /// Setup must not hand the node to discovery before this holds.
    pub fn links_ready(&self) -> bool {
        let left_ready = self.id == 0 || self.left_conn.is_some();
        let right_ready = self.id + 1 == self.total_node || self.right_conn.is_some();
        left_ready && right_ready
    }

    /// Best-effort send toward the left neighbor, a no-op at the head.
    pub async fn send_left<U: Serialize>(&mut self, message: &Message<U>) -> Result<(), NetError> {
        match self.left_conn.as_mut() {
            Some(link) => link.send(message).await,
            None => Ok(()),
        }
    }

    /// Best-effort send toward the right neighbor, a no-op at the tail.
    pub async fn send_right<U: Serialize>(&mut self, message: &Message<U>) -> Result<(), NetError> {
        match self.right_conn.as_mut() {
            Some(link) => link.send(message).await,
            None => Ok(()),
        }
    }
}
