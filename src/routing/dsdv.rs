//! DSDV: proactive distance-vector with sequence-numbered withdrawals (§4.7).

use super::{NextHopDecision, RoutingContext};
use crate::packet::{DataPacket, HelloPacket, Packet, TransmissionMode};
use std::collections::HashMap;

struct Route {
    next_hop: u32,
    metric: f64,
    seq: u32,
    updated_at: u64,
}

pub struct Dsdv {
    table: HashMap<u32, Route>,
    own_seq: u32,
    direct_seq: HashMap<u32, u32>,
    entry_lifetime: u64,
}

impl Dsdv {
    pub fn new() -> Self {
        Dsdv { table: HashMap::new(), own_seq: 0, direct_seq: HashMap::new(), entry_lifetime: 3_000_000 }
    }

    /// Strictly increasing, even sequence number for the direct-neighbor route
    /// to `neighbor`, bumped once per hello received from it. Kept separate
    /// from `own_seq` (this node's own advertised counter, unrelated to any
    /// neighbor's link) so two nodes never collide on an unrelated value.
    fn next_direct_seq(&mut self, neighbor: u32) -> u32 {
        let entry = self.direct_seq.entry(neighbor).or_insert(0);
        *entry = entry.wrapping_add(2);
        *entry
    }

    /// For every route whose next hop stopped advertising within
    /// `entry_lifetime`: metric=inf, seq += 1 (odd = withdrawal, §4.7).
    fn invalidate_stale_routes(&mut self, now: u64, live_neighbors: &[u32]) -> bool {
        let mut changed = false;
        for route in self.table.values_mut() {
            let via_dead_neighbor = !live_neighbors.contains(&route.next_hop) && now.saturating_sub(route.updated_at) > self.entry_lifetime;
            if via_dead_neighbor && route.metric.is_finite() {
                route.metric = f64::INFINITY;
                route.seq += if route.seq % 2 == 0 { 1 } else { 0 };
                route.updated_at = now;
                changed = true;
            }
        }
        changed
    }

    pub(crate) fn next_hop_selection(&mut self, ctx: &RoutingContext, pkt: DataPacket) -> NextHopDecision {
        match self.table.get(&pkt.dst) {
            Some(route) if route.metric.is_finite() && ctx.now().saturating_sub(route.updated_at) <= self.entry_lifetime => {
                let mut pkt = pkt;
                pkt.header.next_hop_id = Some(route.next_hop);
                NextHopDecision { has_route: true, packet_to_send: Packet::Data(pkt), ask_now: false }
            }
            _ => NextHopDecision { has_route: false, packet_to_send: Packet::Data(pkt), ask_now: false },
        }
    }

    pub(crate) fn packet_reception(&mut self, ctx: &RoutingContext, pkt: Packet, src_id: u32) {
        match pkt {
            Packet::Hello(hello) => {
                let now = ctx.now();
                let seq = self.next_direct_seq(src_id);
                self.accept(src_id, 1.0, seq, now);
                for &(dst, metric, seq) in &hello.advertisements {
                    if dst == ctx.me {
                        continue;
                    }
                    self.accept_via(src_id, dst, metric + 1.0, seq, now);
                }
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

    fn accept(&mut self, dst: u32, metric: f64, seq: u32, now: u64) {
        self.accept_via(dst, dst, metric, seq, now)
    }

    fn accept_via(&mut self, next_hop: u32, dst: u32, metric: f64, seq: u32, now: u64) {
        let should_replace = match self.table.get(&dst) {
            None => true,
            Some(existing) => seq > existing.seq || (seq == existing.seq && metric < existing.metric),
        };
        if should_replace {
            self.table.insert(dst, Route { next_hop, metric, seq, updated_at: now });
        }
    }

    pub(crate) fn on_beacon_tick(&mut self, ctx: &RoutingContext) {
        let now = ctx.now();
        let live_neighbors = ctx.neighbors();
        let urgent = self.invalidate_stale_routes(now, &live_neighbors);
        if urgent {
            self.own_seq = self.own_seq.wrapping_add(2);
        }
        let advertisements: Vec<(u32, f64, u32)> = self.table.iter().map(|(&dst, r)| (dst, r.metric, r.seq)).collect();
        let hello_id = ctx.world.id_alloc.borrow_mut().next_hello();
        let header = ctx.header(hello_id, ctx.world.config.hello_header_bits, TransmissionMode::Broadcast);
        let hello = Packet::Hello(HelloPacket { header, src: ctx.me, position: ctx.position(ctx.me), velocity: ctx.velocity(ctx.me), advertisements });
        ctx.enqueue(hello);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::geometry::Vec3;
    use crate::packet::Header;
    use crate::world::World;
    use std::rc::Rc;

    /// Concrete scenario 5 (DSDV link break): a chain's middle hop stops
    /// advertising; within `2*entry_lifetime` the route through it is
    /// invalidated and the originator stops forwarding to the stale next-hop.
    #[test]
    fn route_through_a_silent_next_hop_is_withdrawn_within_two_lifetimes() {
        let cfg = Config::default_for_tests();
        let world = Rc::new(World::new_for_tests(cfg.clone(), vec![Vec3::new(0.0, 0.0, 10.0), Vec3::new(50.0, 0.0, 10.0), Vec3::new(100.0, 0.0, 10.0)]));
        let ctx = RoutingContext { world: &world, me: 0 };
        let mut dsdv = Dsdv::new();

        dsdv.accept_via(1, 2, 2.0, 4, 0);
        let length_bits = cfg.data_header_bits + cfg.data_payload_bits;
        let make_packet = || DataPacket { header: Header::new(0, length_bits, 0, cfg.packet_lifetime, cfg.max_ttl, TransmissionMode::Unicast), src: 0, dst: 2, routing_path: None };

        let decision = dsdv.next_hop_selection(&ctx, make_packet());
        assert!(decision.has_route);

        let now = dsdv.entry_lifetime * 2 + 1;
        crate::time_driver::advance_to(now);
        let changed = dsdv.invalidate_stale_routes(now, &[]);
        assert!(changed);
        assert_eq!(dsdv.table.get(&2).unwrap().seq % 2, 1);

        let decision = dsdv.next_hop_selection(&ctx, make_packet());
        assert!(!decision.has_route);
    }
}
