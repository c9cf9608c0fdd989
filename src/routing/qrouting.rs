//! Q-routing: Q-values approximate end-to-end delay, updated from ACKs (§4.7).

use super::{NextHopDecision, RoutingContext};
use crate::packet::{DataPacket, Packet};
use std::collections::HashMap;

const LEARNING_RATE: f64 = 0.5;

pub struct QRouting {
    /// `Q[(dst, via_neighbor)]`: estimated delay to `dst` if forwarded via
    /// `via_neighbor`.
    q: HashMap<(u32, u32), f64>,
    /// Packets handed to MAC, so the matching ACK can recover which neighbor
    /// and which final destination they were for.
    pending: HashMap<u64, (u32, u32, u64)>,
}

impl QRouting {
    pub fn new() -> Self {
        QRouting { q: HashMap::new(), pending: HashMap::new() }
    }

    fn q_value(&self, dst: u32, via: u32) -> f64 {
        *self.q.get(&(dst, via)).unwrap_or(&0.0)
    }

    pub(crate) fn next_hop_selection(&mut self, ctx: &RoutingContext, pkt: DataPacket) -> NextHopDecision {
        let neighbors = ctx.neighbors();
        let best = neighbors.iter().copied().min_by(|&a, &b| self.q_value(pkt.dst, a).partial_cmp(&self.q_value(pkt.dst, b)).unwrap());
        match best {
            Some(next_hop) => {
                let mut pkt = pkt;
                pkt.header.next_hop_id = Some(next_hop);
                self.pending.insert(pkt.header.packet_id, (next_hop, pkt.dst, ctx.now()));
                NextHopDecision { has_route: true, packet_to_send: Packet::Data(pkt), ask_now: false }
            }
            None => NextHopDecision { has_route: false, packet_to_send: Packet::Data(pkt), ask_now: false },
        }
    }

    pub(crate) fn packet_reception(&mut self, ctx: &RoutingContext, pkt: Packet, src_id: u32) {
        match pkt {
            Packet::Data(data) => {
                let start = ctx.now();
                let is_destination = data.dst == ctx.me;
                let min_q = self.q.iter().filter(|((dst, _), _)| *dst == data.dst).map(|(_, &v)| v).fold(f64::INFINITY, f64::min);
                let min_q = if min_q.is_finite() { Some(min_q) } else { Some(0.0) };
                ctx.send_ack_ex(&data, src_id, start, min_q, None, Some(0), false);
                ctx.deliver_or_relay(data);
                let _ = is_destination;
            }
            Packet::Ack(ack) => {
                ctx.complete_ack_wait(ack.acked_packet_id);
                if let Some((peer, final_dst, start)) = self.pending.remove(&ack.acked_packet_id) {
                    debug_assert_eq!(peer, src_id);
                    let s = (ctx.now().saturating_sub(start)) as f64 / 1_000_000.0;
                    let q = ack.queuing_delay_micros.unwrap_or(0) as f64 / 1_000_000.0;
                    let f_is_destination = peer == final_dst;
                    let min_q = ack.min_q.unwrap_or(0.0);
                    let estimate = q + s + if f_is_destination { 0.0 } else { min_q };
                    let entry = self.q.entry((final_dst, peer)).or_insert(0.0);
                    *entry = (1.0 - LEARNING_RATE) * *entry + LEARNING_RATE * estimate;
                }
            }
            _ => {}
        }
    }

    pub(crate) fn on_beacon_tick(&mut self, _ctx: &RoutingContext) {}
}
