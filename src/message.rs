use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Where a node sits in the line. Boundaries lack one link: a `Head` has no
/// left neighbor and a `Tail` has no right neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Position {
    Head,
    Middle,
    Tail,
}

impl Position {
    pub fn new(id: usize, node_count: usize) -> Self {
        if id == 0 {
            Self::Head
        } else if id == node_count - 1 {
            Self::Tail
        } else {
            Self::Middle
        }
    }
}

/// A property of a link, not of a message: the side of the node the link
/// attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    /// Discovery token carrying a running distance in `sequence`.
    Init,
    /// Algorithm payload for the round in `round`.
    Data,
    /// Handshake, the first frame on every dialed link.
    Sync,
    /// Optional drain signal after the algorithm loop.
    Term,
    /// Reserved. The simplified dispatcher never emits or expects one.
    Ack,
}

/// One wire frame. Every frame is a complete self-describing JSON object;
/// the payload type is uniform across a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message<T> {
    pub round: u32,
    pub sender_id: usize,
    /// Advisory only. The dispatcher routes by `sender_id` versus self.
    pub receiver_id: usize,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub body: T,
    /// Running distance count during discovery, 0 otherwise.
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<SystemTime>,
}

impl<T> Message<T> {
    pub fn data(round: u32, sender_id: usize, receiver_id: usize, body: T) -> Self {
        Self {
            round,
            sender_id,
            receiver_id,
            kind: MessageType::Data,
            body,
            sequence: 0,
            timestamp: Some(SystemTime::now()),
        }
    }
}

impl<T: Default> Message<T> {
    pub fn control(kind: MessageType, round: u32, sender_id: usize, receiver_id: usize) -> Self {
        Self {
            round,
            sender_id,
            receiver_id,
            kind,
            body: T::default(),
            sequence: 0,
            timestamp: None,
        }
    }

    pub fn init(sender_id: usize, receiver_id: usize, sequence: u64) -> Self {
        Self {
            sequence,
            ..Self::control(MessageType::Init, 0, sender_id, receiver_id)
        }
    }

    pub fn sync(sender_id: usize, receiver_id: usize) -> Self {
        Self::control(MessageType::Sync, 0, sender_id, receiver_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_assignment() {
        assert_eq!(Position::new(0, 4), Position::Head);
        assert_eq!(Position::new(1, 4), Position::Middle);
        assert_eq!(Position::new(3, 4), Position::Tail);
        // a lone node counts as the head of a one-node line
        assert_eq!(Position::new(0, 1), Position::Head);
    }

    #[test]
    fn wire_tags_match_the_original_protocol() {
        let msg = Message::<u32>::init(0, 1, 7);
        let frame = serde_json::to_value(&msg).unwrap();
        assert_eq!(frame["type"], "INIT");
        assert_eq!(frame["sequence"], 7);
        assert!(frame.get("timestamp").is_none());
    }
}
