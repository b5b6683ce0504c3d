use std::sync::mpsc::{Receiver, Sender, channel};

use crate::controller::Direction;

/// Hand-off point between an I/O thread and the tick timeline. Packets may
/// arrive at any time, but goal state must only mutate on the tick thread,
/// so receipt goes through this queue and is drained at the top of a tick.
pub struct PacketQueue {
    receiver: Receiver<(Direction, Vec<u8>)>,
}

/// Cloneable producer handle for the I/O side.
#[derive(Clone)]
pub struct PacketSender {
    sender: Sender<(Direction, Vec<u8>)>,
}

pub fn packet_queue() -> (PacketSender, PacketQueue) {
    let (sender, receiver) = channel();
    (PacketSender { sender }, PacketQueue { receiver })
}

impl PacketSender {
    /// Queues a received payload. Drops silently if the consumer is gone;
    /// a torn-down object simply stops caring about its packets.
    pub fn push(&self, direction: Direction, bytes: Vec<u8>) {
        let _ = self.sender.send((direction, bytes));
    }
}

impl PacketQueue {
    /// Drains every pending payload into the callback, in arrival order.
    pub fn drain(&mut self, mut apply: impl FnMut(Direction, &[u8])) {
        for (direction, bytes) in self.receiver.try_iter() {
            apply(direction, &bytes);
        }
    }
}
