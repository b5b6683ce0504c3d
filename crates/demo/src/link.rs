use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;

use tether::{Delivery, Direction, PacketSender, Transmit};

/// Loss and latency applied to unreliable traffic. Reliable traffic is
/// modeled as lossless with the worst-case latency, since a real transport
/// keeps retransmitting until delivery.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkConditions {
    pub loss_percent: f32,
    pub min_latency_ms: u32,
    pub max_latency_ms: u32,
    pub jitter_ms: u32,
}

impl LinkConditions {
    fn should_drop(&self) -> bool {
        self.loss_percent > 0.0 && rand_percent() * 100.0 < self.loss_percent
    }

    fn delay_ms(&self) -> u64 {
        let range = self.max_latency_ms.saturating_sub(self.min_latency_ms);
        let jitter = (rand_percent() * self.jitter_ms as f32) as u32;
        (self.min_latency_ms + (rand_percent() * range as f32) as u32 + jitter) as u64
    }
}

#[derive(Debug)]
struct DelayedPacket {
    release_ms: u64,
    // Tie-break so simultaneous releases keep submission order.
    sequence: u64,
    direction: Direction,
    bytes: Vec<u8>,
}

impl PartialEq for DelayedPacket {
    fn eq(&self, other: &Self) -> bool {
        self.release_ms == other.release_ms && self.sequence == other.sequence
    }
}

impl Eq for DelayedPacket {}

impl PartialOrd for DelayedPacket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedPacket {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        (other.release_ms, other.sequence).cmp(&(self.release_ms, self.sequence))
    }
}

/// In-memory two-way link running on a virtual millisecond clock. Unreliable
/// packets can be dropped, delayed, and reordered; delivery hands due
/// packets to a queue for whichever endpoint listens on that direction.
pub struct LoopbackLink {
    conditions: LinkConditions,
    in_flight: BinaryHeap<DelayedPacket>,
    now_ms: u64,
    next_sequence: u64,
    pub sent: u64,
    pub dropped: u64,
}

impl LoopbackLink {
    pub fn new(conditions: LinkConditions) -> Self {
        Self {
            conditions,
            in_flight: BinaryHeap::new(),
            now_ms: 0,
            next_sequence: 0,
            sent: 0,
            dropped: 0,
        }
    }

    pub fn advance_to(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
    }

    /// Moves every due packet into the matching direction's queue.
    pub fn deliver(&mut self, from_source: &PacketSender, from_owner: &PacketSender) {
        while let Some(packet) = self.in_flight.peek() {
            if packet.release_ms > self.now_ms {
                break;
            }
            let packet = self.in_flight.pop().unwrap();
            match packet.direction {
                Direction::FromSource => from_source.push(packet.direction, packet.bytes),
                Direction::FromOwner => from_owner.push(packet.direction, packet.bytes),
            }
        }
    }
}

impl Transmit for LoopbackLink {
    fn send(&mut self, direction: Direction, delivery: Delivery, bytes: &[u8]) -> io::Result<()> {
        self.sent += 1;
        let delay = match delivery {
            Delivery::Reliable => self.conditions.max_latency_ms as u64,
            Delivery::Unreliable => {
                if self.conditions.should_drop() {
                    self.dropped += 1;
                    return Ok(());
                }
                self.conditions.delay_ms()
            }
        };
        self.in_flight.push(DelayedPacket {
            release_ms: self.now_ms + delay,
            sequence: self.next_sequence,
            direction,
            bytes: bytes.to_vec(),
        });
        self.next_sequence += 1;
        Ok(())
    }
}

fn rand_percent() -> f32 {
    rand_u64() as f32 / u64::MAX as f32
}

fn rand_u64() -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::time::Instant;

    let mut hasher = DefaultHasher::new();
    Instant::now().hash(&mut hasher);
    hasher.finish()
}
