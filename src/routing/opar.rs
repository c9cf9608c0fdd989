//! OPAR: source-computed, link-lifetime-predictive path routing (§4.7).
//!
//! Unlike the other variants OPAR is centralized by construction: the source
//! runs Dijkstra over the *whole* topology, which this world's arena makes
//! directly readable (`ctx.world.nodes[i].borrow().position`) without any
//! neighbor-discovery protocol. The computed path is cached on the packet
//! itself (`DataPacket::routing_path`, §3) so every relay just looks up its
//! own position in that path instead of re-running Dijkstra.

use super::{NextHopDecision, RoutingContext};
use crate::geometry::link_lifetime;
use crate::packet::{DataPacket, Packet};

const HOP_WEIGHT: f64 = 1.0;
const LIFETIME_WEIGHT: f64 = 50.0;
const MAX_REFINEMENTS: u32 = 5;

pub struct Opar;

impl Opar {
    pub fn new() -> Self {
        Opar
    }

    /// Builds the link-lifetime-filtered adjacency at `threshold`: an edge
    /// `(i, j)` exists iff both are within `max_range` and their predicted
    /// link lifetime exceeds `threshold`.
    fn edge(ctx: &RoutingContext, i: u32, j: u32, threshold: f64) -> Option<f64> {
        if i == j {
            return None;
        }
        let pi = ctx.position(i);
        let pj = ctx.position(j);
        if pi.distance(&pj) > ctx.world.max_range {
            return None;
        }
        let lifetime = link_lifetime(pi, ctx.velocity(i), pj, ctx.velocity(j), ctx.world.max_range).unwrap_or(0.0);
        if lifetime <= threshold {
            return None;
        }
        Some(lifetime)
    }

    /// Dijkstra over `HOP_WEIGHT + LIFETIME_WEIGHT / lifetime` edge costs.
    /// Returns `(path, min_link_lifetime_on_path)`.
    fn shortest_path(ctx: &RoutingContext, src: u32, dst: u32, threshold: f64) -> Option<(Vec<u32>, f64)> {
        let n = ctx.world.node_count() as usize;
        let mut dist = vec![f64::INFINITY; n];
        let mut prev = vec![None; n];
        let mut min_lifetime = vec![f64::INFINITY; n];
        let mut visited = vec![false; n];
        dist[src as usize] = 0.0;

        for _ in 0..n {
            let u = (0..n as u32).filter(|&v| !visited[v as usize]).min_by(|&a, &b| dist[a as usize].partial_cmp(&dist[b as usize]).unwrap());
            let Some(u) = u else { break };
            if dist[u as usize].is_infinite() {
                break;
            }
            visited[u as usize] = true;
            if u == dst {
                break;
            }
            for v in 0..n as u32 {
                if visited[v as usize] {
                    continue;
                }
                if let Some(lifetime) = Self::edge(ctx, u, v, threshold) {
                    let cand = dist[u as usize] + HOP_WEIGHT + LIFETIME_WEIGHT / lifetime;
                    if cand < dist[v as usize] {
                        dist[v as usize] = cand;
                        prev[v as usize] = Some(u);
                        min_lifetime[v as usize] = min_lifetime[u as usize].min(lifetime).min(if u == src { f64::INFINITY } else { min_lifetime[u as usize] });
                    }
                }
            }
        }

        if dist[dst as usize].is_infinite() {
            return None;
        }
        let mut path = vec![dst];
        let mut cur = dst;
        while cur != src {
            cur = prev[cur as usize]?;
            path.push(cur);
        }
        path.reverse();
        Some((path, min_lifetime[dst as usize]))
    }

    /// Raises the threshold across `MAX_REFINEMENTS` passes, keeping the last
    /// path found before the graph disconnects (§4.7: "iterate, raising the
    /// threshold to the minimum link-lifetime of the previous best path").
    fn compute_path(ctx: &RoutingContext, src: u32, dst: u32) -> Option<Vec<u32>> {
        let mut threshold = 0.0;
        let mut best: Option<Vec<u32>> = None;
        for _ in 0..MAX_REFINEMENTS {
            match Self::shortest_path(ctx, src, dst, threshold) {
                Some((path, min_lifetime)) => {
                    best = Some(path);
                    if !min_lifetime.is_finite() || min_lifetime <= threshold {
                        break;
                    }
                    threshold = min_lifetime;
                }
                None => break,
            }
        }
        best
    }

    pub(crate) fn next_hop_selection(&mut self, ctx: &RoutingContext, mut pkt: DataPacket) -> NextHopDecision {
        let path = match &pkt.routing_path {
            Some(path) => path.clone(),
            None => match Self::compute_path(ctx, ctx.me, pkt.dst) {
                Some(path) => path,
                None => return NextHopDecision { has_route: false, packet_to_send: Packet::Data(pkt), ask_now: false },
            },
        };
        let my_index = match path.iter().position(|&id| id == ctx.me) {
            Some(i) => i,
            None => return NextHopDecision { has_route: false, packet_to_send: Packet::Data(pkt), ask_now: false },
        };
        match path.get(my_index + 1) {
            Some(&next_hop) => {
                pkt.routing_path = Some(path);
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
                ctx.send_ack(&data, src_id, start);
                ctx.deliver_or_relay(data);
            }
            Packet::Ack(ack) => ctx.complete_ack_wait(ack.acked_packet_id),
            _ => {}
        }
    }

    pub(crate) fn on_beacon_tick(&mut self, _ctx: &RoutingContext) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::geometry::Vec3;
    use crate::world::World;
    use std::rc::Rc;

    /// Concrete scenario 6 (OPAR rebuild): a second Dijkstra pass at the
    /// previous path's minimum link lifetime must produce a strictly
    /// different (or empty) path, since every edge at or below that
    /// threshold is now excluded.
    #[test]
    fn raising_the_threshold_to_the_prior_min_lifetime_changes_the_path() {
        let cfg = Config::default_for_tests();
        let world = Rc::new(World::new_for_tests(cfg, vec![Vec3::new(0.0, 0.0, 10.0), Vec3::new(50.0, 0.0, 10.0), Vec3::new(100.0, 0.0, 10.0)]));
        let ctx = RoutingContext { world: &world, me: 0 };

        let (first_path, min_lifetime) = Opar::shortest_path(&ctx, 0, 2, 0.0).expect("a path exists at threshold 0");
        assert!(first_path.len() >= 2);

        let second = Opar::shortest_path(&ctx, 0, 2, min_lifetime);
        match second {
            Some((path, _)) => assert_ne!(path, first_path),
            None => {}
        }
    }
}
