//! Gradient (GRAd): flood-based reactive routing (§4.7).
//!
//! The packet model (§3/§6) carries remaining budget as TTL rather than a
//! dedicated gradient field, so "remaining-cost budget" here is read off
//! `MAX_TTL - header.ttl()` (the number of hops a data packet may still
//! travel), and a node only re-floods a data packet when its known cost to
//! the destination fits inside that remaining budget. Documented as a design
//! decision in DESIGN.md rather than inventing a new wire field.

use super::{NextHopDecision, RoutingContext};
use crate::packet::{DataPacket, GradientReplyPacket, GradientRequestPacket, Packet, TransmissionMode};
use std::collections::{HashMap, HashSet};

pub struct Grad {
    cost_to: HashMap<u32, u32>,
    seen_requests: HashSet<u64>,
    seen_data: HashSet<u64>,
}

impl Grad {
    pub fn new() -> Self {
        Grad { cost_to: HashMap::new(), seen_requests: HashSet::new(), seen_data: HashSet::new() }
    }

    fn remaining_budget(max_ttl: u8, ttl: u8) -> u32 {
        max_ttl.saturating_sub(ttl) as u32
    }

    pub(crate) fn next_hop_selection(&mut self, ctx: &RoutingContext, pkt: DataPacket) -> NextHopDecision {
        let budget = Self::remaining_budget(ctx.world.config.max_ttl, pkt.header.ttl());
        if let Some(&cost) = self.cost_to.get(&pkt.dst) {
            if cost <= budget {
                let mut pkt = pkt;
                pkt.header.transmission_mode = TransmissionMode::Broadcast;
                return NextHopDecision { has_route: true, packet_to_send: Packet::Data(pkt), ask_now: false };
            }
        }
        let request_id = ctx.world.id_alloc.borrow_mut().next_gradient();
        let header = ctx.header(request_id, ctx.world.config.hello_header_bits, TransmissionMode::Broadcast);
        let request = Packet::GradientRequest(GradientRequestPacket { header, src: ctx.me, dst: pkt.dst, remaining_value: ctx.world.config.max_ttl as i32 });
        NextHopDecision { has_route: false, packet_to_send: request, ask_now: true }
    }

    pub(crate) fn packet_reception(&mut self, ctx: &RoutingContext, pkt: Packet, src_id: u32) {
        match pkt {
            Packet::GradientRequest(req) => {
                if !self.seen_requests.insert(req.header.packet_id) {
                    return;
                }
                if req.dst == ctx.me {
                    let reply_id = ctx.world.id_alloc.borrow_mut().next_gradient();
                    let header = ctx.header(reply_id, ctx.world.config.hello_header_bits, TransmissionMode::Unicast);
                    let reply = Packet::GradientReply(GradientReplyPacket { header, src: ctx.me, dst: req.src, cost: 0 });
                    ctx.enqueue(reply);
                    return;
                }
                if req.remaining_value > 0 {
                    let mut req = req;
                    req.remaining_value -= 1;
                    ctx.enqueue(Packet::GradientRequest(req));
                }
            }
            Packet::GradientReply(reply) => {
                let candidate = reply.cost + 1;
                let better = self.cost_to.get(&reply.src).map(|&c| candidate < c).unwrap_or(true);
                if better {
                    self.cost_to.insert(reply.src, candidate);
                }
                if reply.dst != ctx.me {
                    let mut reply = reply;
                    reply.cost += 1;
                    ctx.enqueue(Packet::GradientReply(reply));
                }
            }
            Packet::Data(data) => {
                if !self.seen_data.insert(data.header.packet_id) {
                    return;
                }
                let start = ctx.now();
                ctx.send_ack(&data, src_id, start);
                if data.dst == ctx.me {
                    ctx.deliver_or_relay(data);
                    return;
                }
                let budget = Self::remaining_budget(ctx.world.config.max_ttl, data.header.ttl());
                let within_budget = self.cost_to.get(&data.dst).map(|&c| c <= budget).unwrap_or(false);
                if within_budget {
                    ctx.deliver_or_relay(data);
                }
            }
            Packet::Ack(ack) => ctx.complete_ack_wait(ack.acked_packet_id),
            _ => {
                let _ = src_id;
            }
        }
    }

    pub(crate) fn on_beacon_tick(&mut self, _ctx: &RoutingContext) {}
}
