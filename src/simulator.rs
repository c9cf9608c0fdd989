//! Simulation bootstrap (C11, §4.1/§11): builds the world from a config and a
//! scene, spawns every node's activities plus its periodic routing beacon,
//! and runs the scheduler to the configured horizon.

use crate::config::Config;
use crate::metrics::Report;
use crate::node;
use crate::routing::RoutingContext;
use crate::scene::Scene;
use crate::scheduler::run_until_horizon;
use crate::world::World;
use embassy_time::{Duration, Timer};
use rand::Rng;
use std::rc::Rc;

pub struct Simulator {
    world: Rc<World>,
}

impl Simulator {
    pub fn new(config: Config, scene: &Scene) -> Result<Self, crate::scene::SceneError> {
        scene.validate_against(config.number_of_drones)?;
        let world = Rc::new(World::new(config, scene));
        Ok(Simulator { world })
    }

    /// Spawns every node's activities and runs the scheduler to `sim_time`
    /// (§4.1: "terminates when t >= HORIZON or no events remain").
    pub fn run(&self) -> Report {
        for id in 0..self.world.node_count() {
            node::spawn_node_activities(&self.world, id);
            self.world.scheduler.spawn(beacon_task(self.world.clone(), id));
        }

        run_until_horizon(&self.world.scheduler, self.world.config.sim_time);
        self.world.metrics.borrow().report(&self.world.config)
    }
}

/// Periodic routing control-packet tick (§4.7's per-protocol beacon), jittered
/// within `[0, hello_jitter)` so nodes don't all advertise in lockstep.
/// Terminates once the node sleeps.
async fn beacon_task(world: Rc<World>, me: u32) {
    loop {
        let jitter = {
            let node = world.nodes[me as usize].borrow();
            if world.config.hello_jitter == 0 { 0 } else { node.rng.borrow_mut().gen_range(0..world.config.hello_jitter) }
        };
        Timer::after(Duration::from_micros(world.config.hello_interval + jitter)).await;

        if world.nodes[me as usize].borrow().sleep {
            return;
        }

        let ctx = RoutingContext { world: &world, me };
        world.nodes[me as usize].borrow_mut().routing.on_beacon_tick(&ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vec3;
    use crate::scene::SceneNode;

    fn two_node_scene() -> Scene {
        Scene {
            nodes: vec![
                SceneNode { node_id: 0, position: Vec3::new(0.0, 0.0, 10.0), velocity: Vec3::ZERO, pinned_destination: Some(1) },
                SceneNode { node_id: 1, position: Vec3::new(50.0, 0.0, 10.0), velocity: Vec3::ZERO, pinned_destination: None },
            ],
        }
    }

    #[test]
    fn run_completes_and_reports_metrics() {
        let mut cfg = Config::default_for_tests();
        cfg.number_of_drones = 2;
        cfg.static_case = true;
        cfg.use_csma_ca = false;
        cfg.sim_time = 5_000_000;
        cfg.mean_interarrival_micros = 200_000;
        let scene = two_node_scene();
        let sim = Simulator::new(cfg, &scene).expect("valid scene");
        let report = sim.run();
        assert!(report.pdr_percent <= 100.0);
        assert!(report.delivered <= report.generated);
    }

    #[test]
    fn rejects_a_scene_with_the_wrong_node_count() {
        let mut cfg = Config::default_for_tests();
        cfg.number_of_drones = 3;
        let scene = two_node_scene();
        assert!(Simulator::new(cfg, &scene).is_err());
    }

    /// Concrete scenario 1 (idle channel delivery): a lone packet generated on
    /// an idle channel between two neighbors delivers in one hop.
    #[test]
    fn idle_channel_delivery_reaches_destination_in_one_hop() {
        use crate::packet::{DataPacket, Header, Packet, TransmissionMode};

        let mut cfg = Config::default_for_tests();
        cfg.number_of_drones = 2;
        cfg.static_case = true;
        cfg.use_csma_ca = false;
        cfg.sim_time = 1_000_000;
        let scene = Scene {
            nodes: vec![
                SceneNode { node_id: 0, position: Vec3::new(50.0, 0.0, 10.0), velocity: Vec3::ZERO, pinned_destination: None },
                SceneNode { node_id: 1, position: Vec3::new(0.0, 0.0, 10.0), velocity: Vec3::ZERO, pinned_destination: Some(0) },
            ],
        };
        let sim = Simulator::new(cfg.clone(), &scene).expect("valid scene");

        let header = Header::new(0, cfg.data_header_bits + cfg.data_payload_bits, 100, cfg.packet_lifetime, cfg.max_ttl, TransmissionMode::Unicast);
        let data = DataPacket { header, src: 1, dst: 0, routing_path: None };
        sim.world.nodes[1].borrow_mut().transmit_queue.push_back(Packet::Data(data));
        sim.world.metrics.borrow_mut().generated += 1;

        for id in 0..sim.world.node_count() {
            node::spawn_node_activities(&sim.world, id);
        }
        run_until_horizon(&sim.world.scheduler, cfg.sim_time);

        let report = sim.world.metrics.borrow().report(&cfg);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.pdr_percent, 100.0);
        assert_eq!(report.mean_hop_count, 1.0);
    }

    /// Concrete scenario 2 (out-of-range, no route): GPSR with the destination
    /// far beyond `R_max` never finds a route; the packet stays queued for relay
    /// and at least one discovery control packet goes out.
    #[test]
    fn out_of_range_destination_never_gets_a_route() {
        use crate::packet::{DataPacket, Header, Packet, TransmissionMode};

        let mut cfg = Config::default_for_tests();
        cfg.number_of_drones = 2;
        cfg.static_case = true;
        cfg.routing_protocol = crate::config::RoutingProtocolKind::Gpsr;
        cfg.sim_time = 2_000_000;
        cfg.hello_interval = 50_000;
        cfg.hello_jitter = 0;
        let scene = Scene {
            nodes: vec![
                SceneNode { node_id: 0, position: Vec3::new(0.0, 0.0, 10.0), velocity: Vec3::ZERO, pinned_destination: None },
                SceneNode { node_id: 1, position: Vec3::new(100_000.0, 0.0, 10.0), velocity: Vec3::ZERO, pinned_destination: Some(1) },
            ],
        };
        let sim = Simulator::new(cfg.clone(), &scene).expect("valid scene");

        let header = Header::new(0, cfg.data_header_bits + cfg.data_payload_bits, 100, cfg.packet_lifetime, cfg.max_ttl, TransmissionMode::Unicast);
        let data = DataPacket { header, src: 0, dst: 1, routing_path: None };
        sim.world.nodes[0].borrow_mut().transmit_queue.push_back(Packet::Data(data));
        sim.world.metrics.borrow_mut().generated += 1;

        for id in 0..sim.world.node_count() {
            node::spawn_node_activities(&sim.world, id);
            sim.world.scheduler.spawn(beacon_task(sim.world.clone(), id));
        }
        run_until_horizon(&sim.world.scheduler, cfg.sim_time);

        assert_eq!(sim.world.metrics.borrow().delivered, 0);
        assert!(!sim.world.nodes[0].borrow().waiting_list.is_empty());
    }
}
