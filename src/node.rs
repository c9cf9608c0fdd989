//! Node runtime (C8, §4.6): the per-node activities spawned once per node at
//! construction (generator, feeder, receiver, and the mobility/energy tick)
//! plus the `packet_coming` helper shared by the feeder and by routing
//! modules that hand a control packet straight to MAC.
//!
//! Grounded on the teacher's `node_task.rs`: one long-lived loop per concern,
//! each with its own `Timer::after` tick, rather than a single monolithic
//! per-node state machine.

use crate::energy;
use crate::packet::{DataPacket, Header, Packet, TransmissionMode};
use crate::routing::RoutingContext;
use crate::time_driver;
use crate::world::World;
use embassy_time::{Duration, Timer};
use log::{debug, warn};
use rand::Rng;
use rand_distr::{Distribution, Exp};
use std::rc::Rc;

const FEED_TICK_MICROS: u64 = 10;
const RECEIVE_TICK_MICROS: u64 = 5;

/// Spawns the full set of activities for node `me` (§4.6, §5).
pub fn spawn_node_activities(world: &Rc<World>, me: u32) {
    world.scheduler.spawn(generate_data_packet(world.clone(), me));
    world.scheduler.spawn(feed_packet(world.clone(), me));
    world.scheduler.spawn(receive(world.clone(), me));
    world.scheduler.spawn(mobility_tick(world.clone(), me));
}

/// Periodically creates a `Data` packet bound for a chosen destination and
/// admits it to `transmit_queue` (§4.6). Terminates once the node sleeps;
/// it never wakes back up within a run (§3 Node invariants).
async fn generate_data_packet(world: Rc<World>, me: u32) {
    let mean = world.config.mean_interarrival_micros.max(1) as f64;
    let exp = Exp::new(1.0 / mean).expect("positive mean_interarrival_micros");

    loop {
        let wait = {
            let node = world.nodes[me as usize].borrow();
            exp.sample(&mut *node.rng.borrow_mut()).max(1.0) as u64
        };
        Timer::after(Duration::from_micros(wait)).await;

        if world.nodes[me as usize].borrow().sleep {
            return;
        }

        let dst = choose_destination(&world, me);
        let Some(dst) = dst else { continue };

        let mut node = world.nodes[me as usize].borrow_mut();
        if !node.can_enqueue(world.config.max_queue_size) {
            drop(node);
            warn!("node {me}: transmit queue full, dropping newly generated packet");
            world.metrics.borrow_mut().dropped_queue_full += 1;
            continue;
        }
        let now = time_driver::now_micros();
        let packet_id = { drop(node); world.id_alloc.borrow_mut().next_data() };
        let length_bits = world.config.data_header_bits + world.config.data_payload_bits;
        let header = Header::new(packet_id, length_bits, now, world.config.packet_lifetime, world.config.max_ttl, TransmissionMode::Unicast);
        let data = DataPacket { header, src: me, dst, routing_path: None };
        let mut node = world.nodes[me as usize].borrow_mut();
        node.transmit_queue.push_back(Packet::Data(data));
        drop(node);
        world.metrics.borrow_mut().generated += 1;
    }
}

fn choose_destination(world: &World, me: u32) -> Option<u32> {
    let node = world.nodes[me as usize].borrow();
    if let Some(pinned) = node.pinned_destination {
        return Some(pinned);
    }
    let n = world.node_count();
    if n <= 1 {
        return None;
    }
    let mut rng = node.rng.borrow_mut();
    loop {
        let candidate = rng.gen_range(0..n);
        if candidate != me {
            return Some(candidate);
        }
    }
}

/// Periodic 10µs tick driving packets out of `transmit_queue` through routing
/// and into the MAC pipeline (§4.6). Terminates once the node sleeps.
async fn feed_packet(world: Rc<World>, me: u32) {
    loop {
        Timer::after(Duration::from_micros(FEED_TICK_MICROS)).await;

        let (sleep, hol_blocked) = {
            let node = world.nodes[me as usize].borrow();
            (node.sleep, node.mac.hol_blocked)
        };
        if sleep {
            return;
        }
        if hol_blocked {
            continue;
        }

        // Give one routeless packet a fresh shot at `next_hop_selection` each
        // tick, ahead of the transmit queue, so a route learned since it was
        // shelved (e.g. a beacon just answered) isn't left stranded forever.
        {
            let mut node = world.nodes[me as usize].borrow_mut();
            if let Some(retry) = node.waiting_list.pop() {
                node.transmit_queue.push_front(Packet::Data(retry));
            }
        }

        let head = { world.nodes[me as usize].borrow_mut().transmit_queue.pop_front() };
        let Some(pkt) = head else { continue };

        let now = time_driver::now_micros();
        if pkt.header().is_expired(now) {
            match &pkt {
                Packet::Data(_) => {
                    debug!("node {me}: packet {} past its deadline, dropping", pkt.header().packet_id);
                    world.metrics.borrow_mut().dropped_deadline += 1;
                }
                _ => {}
            }
            continue;
        }

        match pkt {
            Packet::Data(data) => {
                if data.header.retransmission_count_for(me) >= world.config.max_retransmission_attempt {
                    warn!("node {me}: packet {} dropped, retransmission limit reached", data.header.packet_id);
                    world.metrics.borrow_mut().dropped_retransmission += 1;
                    continue;
                }
                let ctx = RoutingContext { world: &world, me };
                let decision = { world.nodes[me as usize].borrow_mut().routing.next_hop_selection(&ctx, data.clone()) };
                if decision.has_route {
                    packet_coming(world.clone(), me, decision.packet_to_send);
                } else {
                    world.nodes[me as usize].borrow_mut().waiting_list.push(data);
                    if decision.ask_now {
                        packet_coming(world.clone(), me, decision.packet_to_send);
                    }
                }
            }
            control => packet_coming(world.clone(), me, control),
        }
    }
}

/// Periodic 5µs tick scanning the inbox for newly-complete frames, arbitrating
/// among overlapping candidates by SINR, and dispatching the winner to routing
/// (§4.4, §4.6). Terminates once the node sleeps.
async fn receive(world: Rc<World>, me: u32) {
    loop {
        Timer::after(Duration::from_micros(RECEIVE_TICK_MICROS)).await;

        if world.nodes[me as usize].borrow().sleep {
            return;
        }

        let now = time_driver::now_micros();
        let max_tx_time = world.config.packet_lifetime;
        let my_pos = world.nodes[me as usize].borrow().position;

        let mut node = world.nodes[me as usize].borrow_mut();
        node.inbox.retain(|entry| !(entry.processed && now.saturating_sub(entry.injected_at) > 2 * max_tx_time));

        let complete_indices: Vec<usize> = node
            .inbox
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.processed && now >= e.injected_at + e.frame_duration)
            .map(|(i, _)| i)
            .collect();
        if complete_indices.is_empty() {
            continue;
        }

        let candidates: Vec<crate::phy::Candidate> = complete_indices
            .iter()
            .map(|&i| {
                let entry = &node.inbox[i];
                let tx_pos = world.nodes[entry.transmitter_id as usize].borrow().position;
                crate::phy::Candidate { transmitter_id: entry.transmitter_id, distance_m: my_pos.distance(&tx_pos) }
            })
            .collect();

        for &i in &complete_indices {
            node.inbox[i].processed = true;
        }
        drop(node);

        let max_ttl = world.config.max_ttl;
        let arb = crate::phy::arbitrate(&candidates, |_| true, &world.config);
        if arb.collision {
            debug!("node {me}: collision among {} overlapping frames", candidates.len());
            world.metrics.borrow_mut().collision_num += 1;
        }
        let Some(winner) = arb.winner else { continue };

        let node = world.nodes[me as usize].borrow();
        let entry_idx = complete_indices.iter().copied().find(|&i| node.inbox[i].transmitter_id == winner);
        let Some(entry_idx) = entry_idx else { continue };
        let pkt = node.inbox[entry_idx].packet.clone();
        let src = node.inbox[entry_idx].transmitter_id;
        drop(node);

        if pkt.header().is_ttl_exceeded(max_ttl) {
            debug!("node {me}: packet {} exceeded max TTL, dropping", pkt.header().packet_id);
            world.metrics.borrow_mut().dropped_ttl += 1;
            continue;
        }

        let ctx = RoutingContext { world: &world, me };
        world.nodes[me as usize].borrow_mut().routing.packet_reception(&ctx, pkt, src);
    }
}

/// Periodic mobility/energy-debit tick, independent of the other activities
/// (§5: "mobility updates are scheduled at fixed intervals"). Once residual
/// energy drops to `ENERGY_THRESHOLD`, sets `sleep=true` irreversibly and
/// terminates; the generator, feeder and receiver notice on their own next
/// tick (§7: "all three terminate within one tick").
async fn mobility_tick(world: Rc<World>, me: u32) {
    let tick = world.config.mobility_tick_micros.max(1);
    loop {
        Timer::after(Duration::from_micros(tick)).await;

        let mut node = world.nodes[me as usize].borrow_mut();
        if node.sleep {
            return;
        }
        let (position, velocity) = node.mobility.advance(tick);
        node.position = position;
        node.velocity = velocity;
        let speed = velocity.norm();
        let debit = energy::energy_debit_joules(node.energy.power_watts(speed), tick);
        node.residual_energy -= debit;
        if node.residual_energy <= world.config.energy_threshold {
            node.sleep = true;
            debug!("node {me}: residual energy exhausted, entering permanent sleep");
            return;
        }
    }
}

/// Shared dispatch helper (§4.6): scoped-acquire the send buffer, bump the
/// per-node retransmission counter, and hand the packet to MAC. Spawned as
/// its own activity so the buffer release (on drop, including on a `select`
/// cancellation inside MAC) never blocks the caller.
pub fn packet_coming(world: Rc<World>, me: u32, mut pkt: Packet) {
    world.scheduler.spawn(async move {
        let send_buffer = world.nodes[me as usize].borrow().send_buffer.clone();
        let _guard = send_buffer.request().await;

        pkt.header_mut().bump_retransmission_count(me);
        let _process_id = world.nodes[me as usize].borrow_mut().mac.next_process_id();

        crate::mac::mac_send(world.clone(), me, pkt).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::geometry::Vec3;
    use crate::scheduler::run_until_horizon;

    #[test]
    fn generator_admits_a_packet_into_the_transmit_queue() {
        let mut cfg = Config::default_for_tests();
        cfg.mean_interarrival_micros = 100;
        let world = Rc::new(World::new_for_tests(cfg, vec![Vec3::new(0.0, 0.0, 10.0), Vec3::new(10.0, 0.0, 10.0)]));
        world.scheduler.spawn(generate_data_packet(world.clone(), 0));
        run_until_horizon(&world.scheduler, 10_000);
        assert!(world.metrics.borrow().generated >= 1);
    }

    #[test]
    fn feeder_drops_an_expired_packet_without_sending() {
        let cfg = Config::default_for_tests();
        let world = Rc::new(World::new_for_tests(cfg, vec![Vec3::new(0.0, 0.0, 10.0), Vec3::new(10.0, 0.0, 10.0)]));
        let header = Header::new(0, 100, 0, 0, world.config.max_ttl, TransmissionMode::Unicast);
        let data = DataPacket { header, src: 0, dst: 1, routing_path: None };
        world.nodes[0].borrow_mut().transmit_queue.push_back(Packet::Data(data));
        world.scheduler.spawn(feed_packet(world.clone(), 0));
        run_until_horizon(&world.scheduler, 1_000);
        assert_eq!(world.metrics.borrow().dropped_deadline, 1);
    }

    /// Concrete scenario 3 (collision arbitration): two senders' frames
    /// overlap in time at a shared receiver. At most one is delivered, and
    /// the collision is counted once for the event, not once per frame.
    #[test]
    fn overlapping_frames_count_one_collision_and_deliver_at_most_one() {
        use crate::channel::InboxEntry;

        let cfg = Config::default_for_tests();
        let world = Rc::new(World::new_for_tests(
            cfg,
            vec![Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 5.0, 10.0), Vec3::new(100.0, 0.0, 10.0)],
        ));

        let length_bits = world.config.data_header_bits + world.config.data_payload_bits;
        for (tx, dst_id) in [(0u32, 2u32), (1u32, 2u32)] {
            let mut header = Header::new(tx as u64, length_bits, 0, world.config.packet_lifetime, world.config.max_ttl, TransmissionMode::Unicast);
            header.increment_ttl(world.config.max_ttl);
            let data = DataPacket { header, src: tx, dst: dst_id, routing_path: None };
            world.nodes[2].borrow_mut().inbox.push_back(InboxEntry {
                packet: Packet::Data(data),
                injected_at: 0,
                transmitter_id: tx,
                frame_duration: 100,
                processed: false,
            });
        }

        world.scheduler.spawn(receive(world.clone(), 2));
        run_until_horizon(&world.scheduler, 10_000);

        assert_eq!(world.metrics.borrow().collision_num, 1);
        assert!(world.metrics.borrow().delivered <= 1);
    }

    #[test]
    fn mobility_tick_sleeps_node_once_energy_is_exhausted() {
        let mut cfg = Config::default_for_tests();
        cfg.initial_energy = 1.0;
        cfg.energy_threshold = 0.5;
        cfg.hover_power_watts = 1_000_000.0;
        cfg.mobility_tick_micros = 1_000_000;
        let world = Rc::new(World::new_for_tests(cfg, vec![Vec3::new(0.0, 0.0, 10.0)]));
        world.scheduler.spawn(mobility_tick(world.clone(), 0));
        run_until_horizon(&world.scheduler, 5_000_000);
        assert!(world.nodes[0].borrow().sleep);
    }
}
