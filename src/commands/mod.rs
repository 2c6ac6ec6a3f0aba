//! Command intake between the chat front-end and the tracking engine.
//!
//! The front-end acknowledges the interaction immediately, pushes a
//! `Command` onto an unbounded queue, and the engine drains one item per
//! drain tick. The eventual outcome text travels back over the command's
//! oneshot and is edited into the deferred interaction response.

use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
pub enum Command {
    /// Register or re-register a tracked player in a channel.
    Register {
        riot_id: String,
        region: String,
        channel_id: u64,
        /// Receives the user-facing outcome text exactly once.
        reply: oneshot::Sender<String>,
    },
}

pub type CommandSender = mpsc::UnboundedSender<Command>;
pub type CommandReceiver = mpsc::UnboundedReceiver<Command>;

pub fn channel() -> (CommandSender, CommandReceiver) {
    mpsc::unbounded_channel()
}
