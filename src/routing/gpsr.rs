//! GPSR: greedy position-based forwarding with perimeter fallback (§4.7).

use super::{NextHopDecision, RoutingContext};
use crate::geometry::Vec3;
use crate::packet::{DataPacket, HelloPacket, Packet, TransmissionMode};
use std::collections::HashMap;

struct NeighborEntry {
    position: Vec3,
    velocity: Vec3,
    updated_at: u64,
}

pub struct Gpsr {
    neighbors: HashMap<u32, NeighborEntry>,
    entry_lifetime: u64,
}

impl Gpsr {
    pub fn new() -> Self {
        Gpsr { neighbors: HashMap::new(), entry_lifetime: 3_000_000 }
    }

    fn purge_expired(&mut self, now: u64) {
        let lifetime = self.entry_lifetime;
        self.neighbors.retain(|_, e| now.saturating_sub(e.updated_at) <= lifetime);
    }

    pub(crate) fn next_hop_selection(&mut self, ctx: &RoutingContext, pkt: DataPacket) -> NextHopDecision {
        self.purge_expired(ctx.now());
        let my_pos = ctx.position(ctx.me);
        let dst_pos = ctx.position(pkt.dst);
        let my_dist = my_pos.distance(&dst_pos);

        let mut greedy_best: Option<(u32, f64)> = None;
        for (&id, entry) in self.neighbors.iter() {
            let d = entry.position.distance(&dst_pos);
            if d < my_dist && greedy_best.map(|(_, best)| d < best).unwrap_or(true) {
                greedy_best = Some((id, d));
            }
        }

        if let Some((next_hop, _)) = greedy_best {
            let mut pkt = pkt;
            pkt.header.next_hop_id = Some(next_hop);
            return NextHopDecision { has_route: true, packet_to_send: Packet::Data(pkt), ask_now: false };
        }

        // Void area: no neighbor strictly closer. Perimeter fallback picks the
        // neighbor whose bearing to the destination deviates least from ours,
        // a simplified smallest-angle rule.
        let to_dst = dst_pos.sub(&my_pos);
        let mut perimeter_best: Option<(u32, f64)> = None;
        for (&id, entry) in self.neighbors.iter() {
            let bearing = entry.position.sub(&my_pos);
            let denom = bearing.norm() * to_dst.norm();
            if denom < 1e-9 {
                continue;
            }
            let cos_angle = (bearing.x * to_dst.x + bearing.y * to_dst.y + bearing.z * to_dst.z) / denom;
            if perimeter_best.map(|(_, best)| cos_angle > best).unwrap_or(true) {
                perimeter_best = Some((id, cos_angle));
            }
        }

        if let Some((next_hop, _)) = perimeter_best {
            let mut pkt = pkt;
            pkt.header.next_hop_id = Some(next_hop);
            return NextHopDecision { has_route: true, packet_to_send: Packet::Data(pkt), ask_now: false };
        }

        // No neighbors at all: fire an on-demand hello to try to populate the
        // table before the next tick (§4.7's "discovery control packet").
        let hello_id = ctx.world.id_alloc.borrow_mut().next_hello();
        let header = ctx.header(hello_id, ctx.world.config.hello_header_bits, TransmissionMode::Broadcast);
        let hello = Packet::Hello(HelloPacket { header, src: ctx.me, position: my_pos, velocity: ctx.velocity(ctx.me), advertisements: Vec::new() });
        NextHopDecision { has_route: false, packet_to_send: hello, ask_now: true }
    }

    pub(crate) fn packet_reception(&mut self, ctx: &RoutingContext, pkt: Packet, src_id: u32) {
        match pkt {
            Packet::Hello(hello) => {
                self.neighbors.insert(src_id, NeighborEntry { position: hello.position, velocity: hello.velocity, updated_at: ctx.now() });
            }
            Packet::Data(data) => {
                let start = ctx.now();
                ctx.send_ack(&data, src_id, start);
                ctx.deliver_or_relay(data);
            }
            Packet::Ack(ack) => ctx.complete_ack_wait(ack.acked_packet_id),
            _ => {}
        }
    }

    pub(crate) fn on_beacon_tick(&mut self, ctx: &RoutingContext) {
        let hello_id = ctx.world.id_alloc.borrow_mut().next_hello();
        let header = ctx.header(hello_id, ctx.world.config.hello_header_bits, TransmissionMode::Broadcast);
        let hello = Packet::Hello(HelloPacket { header, src: ctx.me, position: ctx.position(ctx.me), velocity: ctx.velocity(ctx.me), advertisements: Vec::new() });
        ctx.enqueue(hello);
    }
}
