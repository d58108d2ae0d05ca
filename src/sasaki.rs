//! Sasaki's time-optimal sort for line networks.
//!
//! Every inner node keeps two token registers `l` and `r`, boundary nodes
//! keep one; the values at both ends start marked. Each round the node
//! pushes `r` right and `l` left, merges the incoming tokens by value-order
//! dominance (the left edge keeps the larger token, the right edge the
//! smaller), then swaps its own registers when they are inverted. `area`
//! records which marked tokens crossed the node's center, and after N
//! rounds it tells the node which register holds its sorted value.

use serde::{Deserialize, Serialize};

use crate::{
    barrier::{wait_for_neighbors, RoundBuffer},
    engine::Engine,
    message::Message,
    node::Node,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SasakiPayload {
    pub value: i64,
    pub marked: bool,
}

impl SasakiPayload {
    fn new(value: i64, marked: bool) -> Self {
        Self { value, marked }
    }
}

pub async fn run(
    node: &mut Node<SasakiPayload>,
    engine: &Engine,
    left_buf: &mut RoundBuffer<SasakiPayload>,
    right_buf: &mut RoundBuffer<SasakiPayload>,
) {
    let value = node.value.value;
    // boundary tokens are marked; inner nodes hold their value in both
    // registers, which the final area decode collapses back to one
    let mut left = node
        .has_left()
        .then(|| SasakiPayload::new(value, !node.has_right()));
    let mut right = node
        .has_right()
        .then(|| SasakiPayload::new(value, !node.has_left()));
    let mut area = 0i64;

    for round in 0..node.total_node as u32 {
        if let Some(token) = left {
            let _ = node
                .send_left(&Message::data(round, node.id, node.id - 1, token))
                .await;
        }
        if let Some(token) = right {
            let _ = node
                .send_right(&Message::data(round, node.id, node.id + 1, token))
                .await;
        }

        let (from_left, from_right) = wait_for_neighbors(node, round, left_buf, right_buf).await;
        if let (Some(message), Some(token)) = (from_left, left.as_mut()) {
            // the edge compare-exchange leaves the larger token on the right
            if message.body.value > token.value {
                *token = message.body;
            }
        }
        if let (Some(message), Some(token)) = (from_right, right.as_mut()) {
            if message.body.value < token.value {
                *token = message.body;
            }
        }
        if let (Some(l), Some(r)) = (left.as_mut(), right.as_mut()) {
            if l.value > r.value {
                if l.marked {
                    area += 1;
                }
                if r.marked {
                    area -= 1;
                }
                std::mem::swap(l, r);
            }
        }

        engine.increment_clock(node);
    }

    let sorted = match (left, right) {
        (None, Some(token)) => token.value,
        (Some(token), None) => token.value,
        (Some(l), Some(r)) => {
            if area > 0 {
                r.value
            } else {
                l.value
            }
        }
        (None, None) => value,
    };
    node.value = SasakiPayload::new(sorted, false);
}
