//! Coordination wire protocol.
//!
//! Each connection carries a strictly alternating sequence of request and
//! response frames. Requests are text commands (`<verb>` or
//! `<verb>:<argument>`); responses are typed [`Value`]s. The `exit` command
//! ends the conversation.

pub mod command;
pub mod frame;

pub use command::{catalogue, is_known_message, Command, EntityVerb, Verb, DELIMITER};
pub use frame::{FrameCodec, Value, MAX_FRAME_LENGTH};
