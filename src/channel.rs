//! Shared medium: per-receiver inboxes and carrier sense (C3, §4.3).
//!
//! Grounded on the teacher's `network_task.rs::distribute_packet_to_targets` (append
//! a reception record to every target's inbox) and `find_target_nodes` (range check
//! against the sender), but the teacher computes line-of-sight against obstacles;
//! this world has none, so the range test is a plain distance comparison against
//! `max_range`.

use crate::packet::Packet;
use crate::world::World;
use std::collections::VecDeque;

/// One in-flight or recently-arrived frame at a receiver (§3: "inbox: an ordered
/// sequence of reception records").
#[derive(Debug, Clone)]
pub struct InboxEntry {
    pub packet: Packet,
    pub injected_at: u64,
    pub transmitter_id: u32,
    pub frame_duration: u64,
    pub processed: bool,
}

pub type Inbox = VecDeque<InboxEntry>;

/// Appends a reception record to `dst_id`'s inbox iff `dst_id` is within
/// `max_range` of `src_id` (§4.3: propagation delay is zero; the PHY layer only
/// withholds unreachable frames; SINR arbitration, not this function, decides
/// whether a reachable frame is actually received).
pub fn unicast(world: &World, pkt: Packet, src_id: u32, dst_id: u32, frame_duration: u64) {
    inject_if_in_range(world, pkt, src_id, dst_id, frame_duration);
}

pub fn broadcast(world: &World, pkt: Packet, src_id: u32, frame_duration: u64) {
    for target in 0..world.nodes.len() as u32 {
        if target == src_id {
            continue;
        }
        inject_if_in_range(world, pkt.clone(), src_id, target, frame_duration);
    }
}

pub fn multicast(world: &World, pkt: Packet, src_id: u32, dst_ids: &[u32], frame_duration: u64) {
    for &target in dst_ids {
        if target == src_id {
            continue;
        }
        inject_if_in_range(world, pkt.clone(), src_id, target, frame_duration);
    }
}

fn inject_if_in_range(world: &World, pkt: Packet, src_id: u32, dst_id: u32, frame_duration: u64) {
    let src_pos = world.nodes[src_id as usize].borrow().position;
    let dst_node = &world.nodes[dst_id as usize];
    if dst_node.borrow().sleep {
        return;
    }
    let dst_pos = dst_node.borrow().position;
    if src_pos.distance(&dst_pos) > world.max_range {
        return;
    }
    let now = crate::time_driver::now_micros();
    dst_node.borrow_mut().inbox.push_back(InboxEntry { packet: pkt, injected_at: now, transmitter_id: src_id, frame_duration, processed: false });
}

/// Carrier-sense predicate (§4.3): true iff some other node within
/// `SENSING_RANGE` currently holds its `channel_use` token. Never acquires
/// anything; purely an observation over other nodes' exclusive resources.
pub fn busy(world: &World, me: u32) -> bool {
    let my_pos = world.nodes[me as usize].borrow().position;
    for (other_id, other) in world.nodes.iter().enumerate() {
        if other_id as u32 == me {
            continue;
        }
        let other = other.borrow();
        if my_pos.distance(&other.position) <= world.config.sensing_range && other.channel_use.is_held() {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::geometry::Vec3;
    use crate::packet::{AckPacket, Header, Packet, TransmissionMode};
    use crate::world::World;

    fn test_world(positions: &[Vec3]) -> World {
        let cfg = Config::default_for_tests();
        World::new_for_tests(cfg, positions.to_vec())
    }

    fn dummy_ack(id: u64) -> Packet {
        Packet::Ack(AckPacket {
            header: Header::new(id, 100, 0, 1000, 32, TransmissionMode::Unicast),
            src: 0,
            dst: 1,
            acked_packet_id: 0,
            min_q: None,
            max_q: None,
            queuing_delay_micros: None,
            void_area: false,
            transmitting_start_time: None,
        })
    }

    #[test]
    fn unicast_out_of_range_is_dropped_silently() {
        let world = test_world(&[Vec3::new(0.0, 0.0, 10.0), Vec3::new(100_000.0, 0.0, 10.0)]);
        unicast(&world, dummy_ack(1), 0, 1, 100);
        assert!(world.nodes[1].borrow().inbox.is_empty());
    }

    #[test]
    fn unicast_in_range_is_delivered_to_inbox() {
        let world = test_world(&[Vec3::new(0.0, 0.0, 10.0), Vec3::new(10.0, 0.0, 10.0)]);
        unicast(&world, dummy_ack(1), 0, 1, 100);
        assert_eq!(world.nodes[1].borrow().inbox.len(), 1);
    }

    #[test]
    fn busy_is_false_with_no_holders() {
        let world = test_world(&[Vec3::new(0.0, 0.0, 10.0), Vec3::new(10.0, 0.0, 10.0)]);
        assert!(!busy(&world, 0));
    }
}
