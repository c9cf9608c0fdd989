//! QGeo: position-based reinforcement learning (§4.7). Reward rewards
//! geometric progress per unit MAC delay; a void-area (no progress) hop is
//! penalized; the discount factor switches between 0.4 and 0.6 depending on
//! whether the chosen neighbor is predicted to keep closing on the
//! destination by the next beacon tick.

use super::{NextHopDecision, RoutingContext};
use crate::packet::{DataPacket, Packet};
use std::collections::HashMap;

const LEARNING_RATE: f64 = 0.5;

pub struct QGeo {
    q: HashMap<(u32, u32), f64>,
}

impl QGeo {
    pub fn new() -> Self {
        QGeo { q: HashMap::new() }
    }

    fn q_value(&self, dst: u32, via: u32) -> f64 {
        *self.q.get(&(dst, via)).unwrap_or(&0.0)
    }

    pub(crate) fn next_hop_selection(&mut self, ctx: &RoutingContext, pkt: DataPacket) -> NextHopDecision {
        let neighbors = ctx.neighbors();
        let best = neighbors.iter().copied().max_by(|&a, &b| self.q_value(pkt.dst, a).partial_cmp(&self.q_value(pkt.dst, b)).unwrap());
        match best {
            Some(next_hop) => {
                let mut pkt = pkt;
                pkt.header.next_hop_id = Some(next_hop);
                NextHopDecision { has_route: true, packet_to_send: Packet::Data(pkt), ask_now: false }
            }
            None => NextHopDecision { has_route: false, packet_to_send: Packet::Data(pkt), ask_now: false },
        }
    }

    pub(crate) fn packet_reception(&mut self, ctx: &RoutingContext, pkt: Packet, src_id: u32) {
        match pkt {
            Packet::Data(data) => {
                let start = ctx.now();
                let dst_pos = ctx.position(data.dst);
                let progress = ctx.position(src_id).distance(&dst_pos) - ctx.position(ctx.me).distance(&dst_pos);
                let mac_delay_s = ((start.saturating_sub(data.header.creation_time)) as f64 / 1_000_000.0).max(1e-6);
                let (reward, void_area) = if progress > 0.0 { (progress / mac_delay_s, false) } else { (-1.0, true) };
                ctx.send_ack_ex(&data, src_id, start, None, Some(reward), None, void_area);
                ctx.deliver_or_relay(data);
            }
            Packet::Ack(ack) => {
                ctx.complete_ack_wait(ack.acked_packet_id);
                let reward = ack.max_q.unwrap_or(0.0);
                let peer = src_id;
                let dst_pos = ctx.position(ack.dst);
                let my_pos = ctx.position(ctx.me);
                let peer_vel = ctx.velocity(peer);
                let hello_interval = ctx.world.config.hello_interval as f64 / 1_000_000.0;
                let predicted = ctx.position(peer).add(&peer_vel.scale(hello_interval));
                let gamma = if predicted.distance(&dst_pos) < ctx.position(peer).distance(&dst_pos) { 0.6 } else { 0.4 };
                let _ = my_pos;
                let entry = self.q.entry((ack.dst, peer)).or_insert(0.0);
                *entry += LEARNING_RATE * (gamma * reward - *entry);
            }
            _ => {}
        }
    }

    pub(crate) fn on_beacon_tick(&mut self, _ctx: &RoutingContext) {}
}
