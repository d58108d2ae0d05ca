//! Odd-even transposition sort. N rounds; on even rounds even nodes pair
//! with their right neighbor, on odd rounds with their left, and each pair
//! compare-exchanges so the lower id keeps the minimum.

use serde::{Deserialize, Serialize};

use crate::{barrier::RoundBuffer, engine::Engine, message::Message, node::Node};

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct OddEvenPayload {
    pub value: i64,
}

/// The partner for `id` at `round`, if it lies inside the line.
fn partner(id: usize, round: u32, total: usize) -> Option<(usize, bool)> {
    let even_round = round % 2 == 0;
    let even_node = id % 2 == 0;
    let left_exchange = even_round != even_node;
    if left_exchange {
        (id > 0).then(|| (id - 1, true))
    } else {
        (id + 1 < total).then_some((id + 1, false))
    }
}

pub async fn run(
    node: &mut Node<OddEvenPayload>,
    engine: &Engine,
    left: &mut RoundBuffer<OddEvenPayload>,
    right: &mut RoundBuffer<OddEvenPayload>,
) {
    for round in 0..node.total_node as u32 {
        if let Some((partner_id, left_exchange)) = partner(node.id, round, node.total_node) {
            let message = Message::data(round, node.id, partner_id, node.value);
            let received = if left_exchange {
                let _ = node.send_left(&message).await;
                left.get_step_message(round).await
            } else {
                let _ = node.send_right(&message).await;
                right.get_step_message(round).await
            };
            // the right side of a pair keeps the max, the left side the min
            if left_exchange {
                node.value.value = node.value.value.max(received.body.value);
            } else {
                node.value.value = node.value.value.min(received.body.value);
            }
        }
        engine.increment_clock(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_alternates_parity() {
        // even round: (0,1) (2,3); odd round: (1,2) (3,4)
        assert_eq!(partner(0, 0, 6), Some((1, false)));
        assert_eq!(partner(1, 0, 6), Some((0, true)));
        assert_eq!(partner(2, 0, 6), Some((3, false)));
        assert_eq!(partner(0, 1, 6), None);
        assert_eq!(partner(1, 1, 6), Some((2, false)));
        assert_eq!(partner(2, 1, 6), Some((1, true)));
        // boundaries never reach outside the line
        assert_eq!(partner(5, 0, 6), Some((4, true)));
        assert_eq!(partner(5, 1, 6), None);
    }
}
