//! PARRoT: trajectory-aware reinforcement learning via periodic chirps (§4.7).
//!
//! Chirps (§3) carry `(reward, cohesion, sequence)` but no destination field,
//! so, consistent with the note that "some experiments pin
//! dst=0", PARRoT here learns one Q-table relative to a single well-known
//! sink rather than inventing a destination field the wire format doesn't
//! have. Documented in DESIGN.md.

use super::{NextHopDecision, RoutingContext};
use crate::packet::{ChirpPacket, DataPacket, Packet, TransmissionMode};
use std::collections::{HashMap, HashSet};

const SINK: u32 = 0;
const ETA: f64 = 0.5;
const GAMMA0: f64 = 0.9;
const TAU_MICROS: u64 = 1_000_000;

pub struct Parrot {
    q: HashMap<u32, f64>,
    last_neighbors: HashSet<u32>,
    last_tick: u64,
    sequence: u32,
}

impl Parrot {
    pub fn new() -> Self {
        Parrot { q: HashMap::new(), last_neighbors: HashSet::new(), last_tick: 0, sequence: 0 }
    }

    fn q_value(&self, via: u32) -> f64 {
        *self.q.get(&via).unwrap_or(&0.0)
    }

    pub(crate) fn next_hop_selection(&mut self, ctx: &RoutingContext, pkt: DataPacket) -> NextHopDecision {
        let neighbors = ctx.neighbors();
        let best = neighbors.iter().copied().max_by(|&a, &b| self.q_value(a).partial_cmp(&self.q_value(b)).unwrap()).filter(|&id| self.q_value(id) > 0.0);
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
            Packet::Chirp(chirp) => self.learn(ctx.now(), chirp, src_id),
            Packet::Data(data) => {
                let start = ctx.now();
                ctx.send_ack(&data, src_id, start);
                ctx.deliver_or_relay(data);
            }
            Packet::Ack(ack) => ctx.complete_ack_wait(ack.acked_packet_id),
            _ => {}
        }
    }

    fn learn(&mut self, now: u64, chirp: ChirpPacket, via: u32) {
        let dt = if self.last_tick == 0 { TAU_MICROS as f64 } else { now.saturating_sub(self.last_tick) as f64 };
        let gamma = GAMMA0 * (dt.min(TAU_MICROS as f64) / TAU_MICROS as f64).sqrt() * chirp.cohesion;
        let entry = self.q.entry(via).or_insert(0.0);
        *entry += ETA * (gamma * chirp.reward - *entry);
    }

    pub(crate) fn on_beacon_tick(&mut self, ctx: &RoutingContext) {
        let now = ctx.now();
        let current: HashSet<u32> = ctx.neighbors().into_iter().collect();
        let union = current.union(&self.last_neighbors).count();
        let symmetric_diff = current.symmetric_difference(&self.last_neighbors).count();
        let cohesion = if union == 0 { 1.0 } else { (1.0 - symmetric_diff as f64 / union as f64).max(0.0).sqrt() };

        let my_pos = ctx.position(ctx.me);
        let sink_pos = ctx.position(SINK);
        let reward = if ctx.me == SINK { 1.0 } else { 1.0 / (1.0 + my_pos.distance(&sink_pos)) };

        self.sequence += 1;
        let chirp_id = ctx.world.id_alloc.borrow_mut().next_chirp();
        let header = ctx.header(chirp_id, ctx.world.config.hello_header_bits, TransmissionMode::Broadcast);
        let chirp = Packet::Chirp(ChirpPacket { header, src: ctx.me, reward, cohesion, sequence: self.sequence });
        ctx.enqueue(chirp);

        self.last_neighbors = current;
        self.last_tick = now;
    }
}
