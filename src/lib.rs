pub mod alternative;
pub mod barrier;
pub mod engine;
pub mod message;
pub mod node;
pub mod oddeven;
pub mod sasaki;
pub mod sim;
pub mod transport;

pub use barrier::RoundBuffer;
pub use engine::Engine;
pub use message::{Direction, Message, MessageType, Position};
pub use node::Node;
