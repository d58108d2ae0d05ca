//! The alternating three-node phase sort. Rounds cycle through three phase
//! offsets; in each round the nodes whose id matches the phase act as
//! centers, collect the values of their wings, sort the triple locally, and
//! hand the extremes back. Wings send their value first and adopt whatever
//! the center returns.

use serde::{Deserialize, Serialize};

use crate::{
    barrier::{wait_for_neighbors, RoundBuffer},
    engine::Engine,
    message::Message,
    node::Node,
};

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct AlternativePayload {
    pub value: i64,
}

#[derive(Debug, PartialEq, Eq)]
enum Role {
    Center,
    /// Wing on the left of its center, sends right.
    LeftWing,
    /// Wing on the right of its center, sends left.
    RightWing,
}

fn role(id: usize, round: u32) -> Role {
    let phase = (round % 3) as usize;
    match (id + 3 - phase) % 3 {
        0 => Role::Center,
        1 => Role::RightWing,
        _ => Role::LeftWing,
    }
}

pub async fn run(
    node: &mut Node<AlternativePayload>,
    engine: &Engine,
    left_buf: &mut RoundBuffer<AlternativePayload>,
    right_buf: &mut RoundBuffer<AlternativePayload>,
) {
    for round in 0..node.total_node as u32 {
        match role(node.id, round) {
            Role::Center => {
                let (from_left, from_right) =
                    wait_for_neighbors(node, round, left_buf, right_buf).await;
                match (from_left, from_right) {
                    (Some(l), Some(r)) => {
                        let mut triple = [l.body.value, node.value.value, r.body.value];
                        triple.sort();
                        let reply = Message::data(
                            round,
                            node.id,
                            node.id - 1,
                            AlternativePayload { value: triple[0] },
                        );
                        let _ = node.send_left(&reply).await;
                        let reply = Message::data(
                            round,
                            node.id,
                            node.id + 1,
                            AlternativePayload { value: triple[2] },
                        );
                        let _ = node.send_right(&reply).await;
                        node.value.value = triple[1];
                    }
                    (Some(l), None) => {
                        // tail-side center sorts a pair and keeps the max
                        let low = node.value.value.min(l.body.value);
                        let high = node.value.value.max(l.body.value);
                        let reply =
                            Message::data(round, node.id, node.id - 1, AlternativePayload { value: low });
                        let _ = node.send_left(&reply).await;
                        node.value.value = high;
                    }
                    (None, Some(r)) => {
                        let low = node.value.value.min(r.body.value);
                        let high = node.value.value.max(r.body.value);
                        let reply =
                            Message::data(round, node.id, node.id + 1, AlternativePayload { value: high });
                        let _ = node.send_right(&reply).await;
                        node.value.value = low;
                    }
                    (None, None) => {}
                }
            }
            Role::LeftWing if node.has_right() => {
                let message = Message::data(round, node.id, node.id + 1, node.value);
                let _ = node.send_right(&message).await;
                node.value = right_buf.get_step_message(round).await.body;
            }
            Role::RightWing if node.has_left() => {
                let message = Message::data(round, node.id, node.id - 1, node.value);
                let _ = node.send_left(&message).await;
                node.value = left_buf.get_step_message(round).await.body;
            }
            // a wing whose center lies outside the line sits the round out
            _ => {}
        }
        engine.increment_clock(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_cycle_with_the_phase() {
        assert_eq!(role(0, 0), Role::Center);
        assert_eq!(role(1, 0), Role::RightWing);
        assert_eq!(role(2, 0), Role::LeftWing);
        assert_eq!(role(3, 0), Role::Center);
        assert_eq!(role(0, 1), Role::LeftWing);
        assert_eq!(role(1, 1), Role::Center);
        assert_eq!(role(2, 1), Role::RightWing);
        assert_eq!(role(2, 2), Role::Center);
        // the cycle repeats every three rounds
        assert_eq!(role(0, 3), Role::Center);
    }
}
