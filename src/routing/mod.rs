//! Routing interface and the eight pluggable protocols (C9, §4.7).
//!
//! Dispatch is a tagged enum, not a trait object (§9 Design Notes: "expose the
//! two-operation interface... as a polymorphic handle (tagged variant or
//! vtable)"). An enum match is enough here and avoids the object-safety
//! friction of an async-fn-in-trait for `packet_reception`'s "activity" return.

pub mod dsdv;
pub mod gpsr;
pub mod grad;
pub mod opar;
pub mod parrot;
pub mod qgeo;
pub mod qldv;
pub mod qrouting;

use crate::geometry::Vec3;
use crate::packet::{AckPacket, DataPacket, Header, Packet, TransmissionMode};
use crate::world::World;
use embassy_time::{Duration, Timer};
use log::warn;
use std::rc::Rc;

/// Result of `next_hop_selection` (§4.7).
pub struct NextHopDecision {
    pub has_route: bool,
    pub packet_to_send: Packet,
    pub ask_now: bool,
}

/// Borrowed handle a routing variant uses to read world state and enqueue
/// outgoing packets, without ever holding a reference across an `.await`.
pub struct RoutingContext<'a> {
    pub world: &'a Rc<World>,
    pub me: u32,
}

impl<'a> RoutingContext<'a> {
    pub fn now(&self) -> u64 {
        crate::time_driver::now_micros()
    }

    pub fn position(&self, id: u32) -> Vec3 {
        self.world.nodes[id as usize].borrow().position
    }

    pub fn velocity(&self, id: u32) -> Vec3 {
        self.world.nodes[id as usize].borrow().velocity
    }

    pub fn neighbors(&self) -> Vec<u32> {
        self.world.neighbors_in_range(self.me)
    }

    pub fn header(&self, packet_id: u64, length_bits: u32, mode: TransmissionMode) -> Header {
        Header::new(packet_id, length_bits, self.now(), self.world.config.packet_lifetime, self.world.config.max_ttl, mode)
    }

    /// Appends a packet to this node's `transmit_queue` (it still goes through
    /// ordinary MAC contention), respecting `MAX_QUEUE_SIZE`. Returns whether it
    /// was admitted.
    pub fn enqueue(&self, pkt: Packet) -> bool {
        let mut node = self.world.nodes[self.me as usize].borrow_mut();
        if node.transmit_queue.len() >= self.world.config.max_queue_size {
            warn!("node {}: transmit queue full, dropping enqueued packet", self.me);
            self.world.metrics.borrow_mut().dropped_queue_full += 1;
            return false;
        }
        node.transmit_queue.push_back(pkt);
        true
    }

    /// Delivers locally if `data.dst == me`, otherwise re-queues it for relay;
    /// drops on full queue (counted). Hop count is derived from TTL at the
    /// point of final delivery (`Metrics::record_delivery`), not tallied here.
    pub fn deliver_or_relay(&self, data: DataPacket) {
        if data.dst == self.me {
            self.world.metrics.borrow_mut().record_delivery(&data.header, self.now());
            return;
        }
        self.enqueue(Packet::Data(data));
    }

    /// Replies with an ACK over a short inter-frame gap, bypassing MAC
    /// contention entirely (§4.7: "an *uncontended* send"). `dst` is the
    /// immediate previous hop (the `src_id` `packet_reception` received), not
    /// the packet's original source; an ACK is a link-layer reply to whoever
    /// physically sent the frame, which is only the originator on the first hop.
    pub fn send_ack(&self, acked: &DataPacket, dst: u32, transmitting_start_time: u64) {
        self.send_ack_ex(acked, dst, transmitting_start_time, None, None, None, false);
    }

    /// Extended form carrying the Q-routing/QGeo-specific ACK fields (§3:
    /// "some variants carry extra fields").
    pub fn send_ack_ex(&self, acked: &DataPacket, dst: u32, transmitting_start_time: u64, min_q: Option<f64>, max_q: Option<f64>, queuing_delay_micros: Option<u64>, void_area: bool) {
        let world = self.world.clone();
        let me = self.me;
        let ack_id = world.id_alloc.borrow_mut().next_ack();
        let header = Header::new(ack_id, world.config.ack_header_bits, self.now(), world.config.packet_lifetime, world.config.max_ttl, TransmissionMode::Unicast);
        let pkt = Packet::Ack(AckPacket { header, src: me, dst, acked_packet_id: acked.header.packet_id, min_q, max_q, queuing_delay_micros, void_area, transmitting_start_time: Some(transmitting_start_time) });
        let sifs = world.config.sifs_duration;
        world.scheduler.spawn(async move {
            Timer::after(Duration::from_micros(sifs)).await;
            let frame_duration = crate::phy::transmission_duration_micros(pkt.header().length_bits, &world.config);
            crate::channel::unicast(&world, pkt, me, dst, frame_duration);
        });
    }

    /// Completes a matching outstanding ACK-wait by signalling it (§4.5).
    pub fn complete_ack_wait(&self, acked_packet_id: u64) {
        let mut node = self.world.nodes[self.me as usize].borrow_mut();
        if let Some(signal) = node.mac.ack_waits.remove(&acked_packet_id) {
            signal.signal(());
        }
    }
}

pub enum Routing {
    Gpsr(gpsr::Gpsr),
    Dsdv(dsdv::Dsdv),
    Grad(grad::Grad),
    Opar(opar::Opar),
    Parrot(parrot::Parrot),
    QRouting(qrouting::QRouting),
    QGeo(qgeo::QGeo),
    Qldv(qldv::Qldv),
}

impl Routing {
    pub fn next_hop_selection(&mut self, ctx: &RoutingContext, pkt: DataPacket) -> NextHopDecision {
        match self {
            Routing::Gpsr(r) => r.next_hop_selection(ctx, pkt),
            Routing::Dsdv(r) => r.next_hop_selection(ctx, pkt),
            Routing::Grad(r) => r.next_hop_selection(ctx, pkt),
            Routing::Opar(r) => r.next_hop_selection(ctx, pkt),
            Routing::Parrot(r) => r.next_hop_selection(ctx, pkt),
            Routing::QRouting(r) => r.next_hop_selection(ctx, pkt),
            Routing::QGeo(r) => r.next_hop_selection(ctx, pkt),
            Routing::Qldv(r) => r.next_hop_selection(ctx, pkt),
        }
    }

    pub fn packet_reception(&mut self, ctx: &RoutingContext, pkt: Packet, src_id: u32) {
        match self {
            Routing::Gpsr(r) => r.packet_reception(ctx, pkt, src_id),
            Routing::Dsdv(r) => r.packet_reception(ctx, pkt, src_id),
            Routing::Grad(r) => r.packet_reception(ctx, pkt, src_id),
            Routing::Opar(r) => r.packet_reception(ctx, pkt, src_id),
            Routing::Parrot(r) => r.packet_reception(ctx, pkt, src_id),
            Routing::QRouting(r) => r.packet_reception(ctx, pkt, src_id),
            Routing::QGeo(r) => r.packet_reception(ctx, pkt, src_id),
            Routing::Qldv(r) => r.packet_reception(ctx, pkt, src_id),
        }
    }

    pub fn on_beacon_tick(&mut self, ctx: &RoutingContext) {
        match self {
            Routing::Gpsr(r) => r.on_beacon_tick(ctx),
            Routing::Dsdv(r) => r.on_beacon_tick(ctx),
            Routing::Grad(r) => r.on_beacon_tick(ctx),
            Routing::Opar(r) => r.on_beacon_tick(ctx),
            Routing::Parrot(r) => r.on_beacon_tick(ctx),
            Routing::QRouting(r) => r.on_beacon_tick(ctx),
            Routing::QGeo(r) => r.on_beacon_tick(ctx),
            Routing::Qldv(r) => r.on_beacon_tick(ctx),
        }
    }
}
