//! Qldv: distance-vector propagation of Q-values (§4.7). Neighbors advertise
//! `(dst, max_q, argmax_action)` triples over the same hello wire shape DSDV
//! uses (`HelloPacket::advertisements`, §3); a receiver only accepts an
//! advertisement when the advertised best action is not itself, which is
//! exactly the loop-prevention rule §4.7 specifies.

use super::{NextHopDecision, RoutingContext};
use crate::packet::{DataPacket, ErrorAdvertisementPacket, HelloPacket, Packet, TransmissionMode};
use std::collections::{HashMap, HashSet};

struct Entry {
    max_q: f64,
    next_hop: u32,
    updated_at: u64,
}

pub struct Qldv {
    table: HashMap<u32, Entry>,
    entry_lifetime: u64,
    seen_errors: HashSet<u64>,
}

impl Qldv {
    pub fn new() -> Self {
        Qldv { table: HashMap::new(), entry_lifetime: 3_000_000, seen_errors: HashSet::new() }
    }

    pub(crate) fn next_hop_selection(&mut self, ctx: &RoutingContext, pkt: DataPacket) -> NextHopDecision {
        match self.table.get(&pkt.dst) {
            Some(entry) if ctx.now().saturating_sub(entry.updated_at) <= self.entry_lifetime => {
                let mut pkt = pkt;
                pkt.header.next_hop_id = Some(entry.next_hop);
                NextHopDecision { has_route: true, packet_to_send: Packet::Data(pkt), ask_now: false }
            }
            _ => NextHopDecision { has_route: false, packet_to_send: Packet::Data(pkt), ask_now: false },
        }
    }

    pub(crate) fn packet_reception(&mut self, ctx: &RoutingContext, pkt: Packet, src_id: u32) {
        match pkt {
            Packet::Hello(hello) => {
                let now = ctx.now();
                for &(dst, max_q, argmax_action) in &hello.advertisements {
                    if argmax_action == ctx.me || dst == ctx.me {
                        continue;
                    }
                    let decayed = max_q * 0.9;
                    let better = self.table.get(&dst).map(|e| decayed > e.max_q || now.saturating_sub(e.updated_at) > self.entry_lifetime).unwrap_or(true);
                    if better {
                        self.table.insert(dst, Entry { max_q: decayed, next_hop: src_id, updated_at: now });
                    }
                }
                self.table.entry(src_id).or_insert(Entry { max_q: 1.0, next_hop: src_id, updated_at: now }).updated_at = now;
            }
            Packet::ErrorAdvertisement(err) => {
                if !self.seen_errors.insert(err.header.packet_id) {
                    return;
                }
                let mut still_unreachable = Vec::new();
                for dst in &err.unreachable_destinations {
                    if self.table.get(dst).map(|e| e.next_hop == src_id).unwrap_or(false) {
                        self.table.remove(dst);
                        still_unreachable.push(*dst);
                    }
                }
                if !still_unreachable.is_empty() {
                    let error_id = ctx.world.id_alloc.borrow_mut().next_error();
                    let header = ctx.header(error_id, ctx.world.config.hello_header_bits, TransmissionMode::Broadcast);
                    ctx.enqueue(Packet::ErrorAdvertisement(ErrorAdvertisementPacket { header, src: ctx.me, unreachable_destinations: still_unreachable }));
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

    pub(crate) fn on_beacon_tick(&mut self, ctx: &RoutingContext) {
        let now = ctx.now();
        let live = ctx.neighbors();
        let mut lost = Vec::new();
        self.table.retain(|&dst, entry| {
            let expired = !live.contains(&entry.next_hop) && now.saturating_sub(entry.updated_at) > self.entry_lifetime;
            if expired {
                lost.push(dst);
            }
            !expired
        });
        if !lost.is_empty() {
            let error_id = ctx.world.id_alloc.borrow_mut().next_error();
            let header = ctx.header(error_id, ctx.world.config.hello_header_bits, TransmissionMode::Broadcast);
            ctx.enqueue(Packet::ErrorAdvertisement(ErrorAdvertisementPacket { header, src: ctx.me, unreachable_destinations: lost }));
        }

        let advertisements: Vec<(u32, f64, u32)> = self.table.iter().map(|(&dst, e)| (dst, e.max_q, e.next_hop)).collect();
        let hello_id = ctx.world.id_alloc.borrow_mut().next_hello();
        let header = ctx.header(hello_id, ctx.world.config.hello_header_bits, TransmissionMode::Broadcast);
        let hello = Packet::Hello(HelloPacket { header, src: ctx.me, position: ctx.position(ctx.me), velocity: ctx.velocity(ctx.me), advertisements });
        ctx.enqueue(hello);
    }
}
