//! MAC: CSMA/CA (default) and Pure ALOHA behind `mac_send` (C7, §4.5).
//!
//! Grounded on the teacher's `node_task.rs` multiplexing style: the listener
//! that can interrupt an in-progress countdown is a second future raced with
//! the countdown timer via `embassy_futures::select`, exactly as the teacher
//! races `manager.receive_message()` against the node's inbound queues.

use crate::config::Config;
use crate::packet::{DataPacket, Packet, TransmissionMode};
use crate::world::World;
use crate::{channel, phy, time_driver};
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use log::{debug, warn};
use rand::Rng;
use std::rc::Rc;

pub async fn mac_send(world: Rc<World>, me: u32, pkt: Packet) {
    if world.config.use_csma_ca {
        csma_ca_send(world, me, pkt).await;
    } else {
        pure_aloha_send(world, me, pkt).await;
    }
}

fn contention_window(cfg: &Config, retransmission_count: u32) -> u32 {
    let k = retransmission_count.min(20);
    let raw = (cfg.cw_min as u64 + 1) * (1u64 << k);
    (raw.saturating_sub(1) as u32).min(cfg.cw_max)
}

/// CSMA/CA with DIFS + binary-exponential backoff and freeze-on-interrupt
/// (§4.5). `cw`/`b` are drawn once on entry; only `wait` is recomputed across
/// interruption cycles.
async fn csma_ca_send(world: Rc<World>, me: u32, pkt: Packet) {
    let retransmission_count = pkt.header().retransmission_count_for(me);
    let cw = contention_window(&world.config, retransmission_count);
    let b: u64 = { let node = world.nodes[me as usize].borrow(); let draw = node.rng.borrow_mut().gen_range(0..=cw); draw as u64 };
    let mut wait = world.config.difs_duration() + b * world.config.slot_duration;

    loop {
        while channel::busy(&world, me) {
            Timer::after(Duration::from_micros(world.config.slot_duration)).await;
        }

        let wait_start = time_driver::now_micros();
        let slot = world.config.slot_duration;
        let listener_world = world.clone();
        let listener = async move {
            loop {
                Timer::after(Duration::from_micros(slot)).await;
                if channel::busy(&listener_world, me) {
                    return;
                }
            }
        };

        match select(Timer::after(Duration::from_micros(wait)), listener).await {
            Either::First(_) => break,
            Either::Second(_) => {
                let elapsed = time_driver::now_micros().saturating_sub(wait_start);
                let remaining = wait.saturating_sub(elapsed);
                let difs = world.config.difs_duration();
                if remaining > b * world.config.slot_duration {
                    wait = difs + b * world.config.slot_duration;
                } else {
                    wait = difs + remaining;
                }
                debug!("node {me}: backoff frozen by channel activity, resuming with {wait}us remaining");
            }
        }
    }

    complete_transmission(world, me, pkt, false).await;
}

/// Pure ALOHA: transmit immediately, no carrier sense, no backoff (§4.5).
async fn pure_aloha_send(world: Rc<World>, me: u32, pkt: Packet) {
    complete_transmission(world, me, pkt, true).await;
}

/// Common tail shared by both variants: acquire `channel_use`, increment TTL,
/// inject to the channel at transmission start (matching the teacher's
/// airtime-window model; receivers detect frame completion themselves, see
/// `node::receive`), hold the token for the transmission duration, then (for
/// a unicast data frame) arm an ACK-wait.
async fn complete_transmission(world: Rc<World>, me: u32, mut pkt: Packet, pure_aloha: bool) {
    let channel_use = { world.nodes[me as usize].borrow().channel_use.clone() };
    let _guard = channel_use.request().await;

    pkt.header_mut().increment_ttl(world.config.max_ttl);
    let duration = phy::transmission_duration_micros(pkt.header().length_bits, &world.config);

    let mode = pkt.header().transmission_mode;
    let next_hop = pkt.header().next_hop_id;
    let data_for_ack = match (&pkt, mode) {
        (Packet::Data(data), TransmissionMode::Unicast) => Some(data.clone()),
        _ => None,
    };
    let is_control = pkt.is_control();

    match mode {
        TransmissionMode::Unicast => {
            if let Some(dst) = next_hop {
                channel::unicast(&world, pkt, me, dst, duration);
            }
        }
        TransmissionMode::Broadcast | TransmissionMode::Multicast => {
            channel::broadcast(&world, pkt, me, duration);
        }
    }

    if is_control {
        world.metrics.borrow_mut().routing_control_sent += 1;
    }

    Timer::after(Duration::from_micros(duration)).await;
    drop(_guard);

    if let Some(data) = data_for_ack {
        await_ack(world, me, data, pure_aloha).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::geometry::Vec3;
    use crate::packet::{Header, HelloPacket};
    use crate::scheduler::run_until_horizon;

    fn hello(id: u64, src: u32, cfg: &Config) -> Packet {
        let header = Header::new(id, cfg.hello_header_bits, 0, cfg.packet_lifetime, cfg.max_ttl, TransmissionMode::Broadcast);
        Packet::Hello(HelloPacket { header, src, position: Vec3::ZERO, velocity: Vec3::ZERO, advertisements: Vec::new() })
    }

    /// Concrete scenario 4 (CSMA backoff freeze): two neighbors contend for
    /// the same slot. Only one holds `channel_use` at a time, so the second
    /// transmitter's frame is never injected until after the first one's
    /// airtime window has fully elapsed, whatever backoff value it resumes
    /// with after being frozen mid-countdown.
    #[test]
    fn contending_neighbors_never_overlap_on_the_shared_channel() {
        let mut cfg = Config::default_for_tests();
        cfg.cw_min = 31;
        cfg.cw_max = 31;
        let world = Rc::new(World::new_for_tests(cfg.clone(), vec![Vec3::new(0.0, 0.0, 10.0), Vec3::new(10.0, 0.0, 10.0), Vec3::new(20.0, 0.0, 10.0)]));

        let pkt0 = hello(0, 0, &cfg);
        let pkt1 = hello(1, 1, &cfg);
        world.scheduler.spawn(csma_ca_send(world.clone(), 0, pkt0));
        world.scheduler.spawn(csma_ca_send(world.clone(), 1, pkt1));
        run_until_horizon(&world.scheduler, 1_000_000);

        let inbox = world.nodes[2].borrow().inbox.clone();
        assert_eq!(inbox.len(), 2);
        let mut entries: Vec<_> = inbox.iter().collect();
        entries.sort_by_key(|e| e.injected_at);
        assert!(entries[1].injected_at >= entries[0].injected_at + entries[0].frame_duration);
    }
}

/// ACK-wait activity (§4.5 "ACK handling"). Interrupted (success) by
/// `RoutingContext::complete_ack_wait` signalling the matching entry; on
/// timeout, re-enqueues for retry (CSMA/CA immediately, Pure ALOHA after a
/// random multiple of `ACK_TIMEOUT`) or drops once retransmissions are
/// exhausted. Sets head-of-line blocking for the duration of the wait.
async fn await_ack(world: Rc<World>, me: u32, data: DataPacket, pure_aloha: bool) {
    let packet_id = data.header.packet_id;
    let signal = Rc::new(Signal::<CriticalSectionRawMutex, ()>::new());
    {
        let mut node = world.nodes[me as usize].borrow_mut();
        node.mac.ack_waits.insert(packet_id, signal.clone());
        node.mac.hol_blocked = true;
    }

    let wait_start = time_driver::now_micros();
    let timed_out = matches!(select(Timer::after(Duration::from_micros(world.config.ack_timeout)), signal.wait()).await, Either::First(_));

    {
        let mut node = world.nodes[me as usize].borrow_mut();
        node.mac.ack_waits.remove(&packet_id);
        node.mac.hol_blocked = false;
    }

    if !timed_out {
        let elapsed = time_driver::now_micros().saturating_sub(wait_start);
        world.metrics.borrow_mut().mac_delay_samples.push(elapsed);
        return;
    }

    if data.header.retransmission_count_for(me) >= world.config.max_retransmission_attempt {
        warn!("node {me}: packet {packet_id} dropped, ACK wait exhausted retransmissions");
        world.metrics.borrow_mut().dropped_retransmission += 1;
        return;
    }
    debug!("node {me}: ACK wait for packet {packet_id} timed out, retrying");

    if pure_aloha {
        let k = data.header.retransmission_count_for(me).min(20);
        let delay: u64 = {
            let node = world.nodes[me as usize].borrow();
            let span = 1u64 << k;
            node.rng.borrow_mut().gen_range(0..span)
        };
        Timer::after(Duration::from_micros(delay * world.config.ack_timeout)).await;
    }

    let mut node = world.nodes[me as usize].borrow_mut();
    if node.transmit_queue.len() < world.config.max_queue_size {
        node.transmit_queue.push_back(Packet::Data(data));
    } else {
        drop(node);
        warn!("node {me}: transmit queue full, dropping retry of packet {packet_id}");
        world.metrics.borrow_mut().dropped_queue_full += 1;
    }
}
