//! The simulator's arena: nodes stored in a vector and referenced only by index
//! (§9 Design Notes: "store nodes in a vector owned by the simulator and pass
//! indices into routing/MAC/channel, never owning back-pointers"). Every
//! activity captures an `Rc<World>` and a plain `u32` node id; no node ever
//! holds a reference to another node or to the world that outlives a single
//! synchronous step.

use crate::channel::Inbox;
use crate::config::{Config, RoutingProtocolKind};
use crate::energy::{EnergyModel, RotorcraftEnergyModel};
use crate::geometry::Vec3;
use crate::mobility::{MobilityModel, RandomWaypoint3D, StaticMobility};
use crate::packet::{DataPacket, IdAllocator, Packet};
use crate::resources::ExclusiveResource;
use crate::routing::Routing;
use crate::scene::Scene;
use crate::scheduler::Scheduler;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::metrics::Metrics;

/// Per-attempt MAC bookkeeping that has to outlive a single `mac_send` call:
/// head-of-line blocking and the signals used to interrupt an outstanding
/// ACK-wait (§4.5 "ACK handling").
#[derive(Default)]
pub struct MacTable {
    pub hol_blocked: bool,
    pub ack_waits: HashMap<u64, Rc<Signal<CriticalSectionRawMutex, ()>>>,
    next_process_id: u64,
}

impl MacTable {
    pub fn next_process_id(&mut self) -> u64 {
        let id = self.next_process_id;
        self.next_process_id += 1;
        id
    }
}

pub struct Node {
    pub id: u32,
    pub position: Vec3,
    pub velocity: Vec3,
    pub mobility: Box<dyn MobilityModel>,
    pub energy: Box<dyn EnergyModel>,
    pub residual_energy: f64,
    pub sleep: bool,
    pub inbox: Inbox,
    pub send_buffer: Rc<ExclusiveResource>,
    pub channel_use: Rc<ExclusiveResource>,
    pub transmit_queue: VecDeque<Packet>,
    pub waiting_list: Vec<DataPacket>,
    pub mac: MacTable,
    pub routing: Routing,
    pub pinned_destination: Option<u32>,
    pub rng: RefCell<StdRng>,
    pub last_mobility_tick: Cell<u64>,
}

impl Node {
    /// `!sleep` and queue not yet at `MAX_QUEUE_SIZE`: the admission test
    /// shared by the generator (§4.6) and any routing module re-queueing a
    /// packet off `waiting_list`.
    pub fn can_enqueue(&self, max_queue_size: usize) -> bool {
        !self.sleep && self.transmit_queue.len() < max_queue_size
    }
}

pub struct World {
    pub config: Config,
    pub max_range: f64,
    pub nodes: Vec<RefCell<Node>>,
    pub id_alloc: RefCell<IdAllocator>,
    pub metrics: RefCell<Metrics>,
    pub scheduler: Rc<Scheduler>,
}

impl World {
    pub fn node_count(&self) -> u32 {
        self.nodes.len() as u32
    }

    /// Neighbors of `me` within the modeled communication horizon (§4.4's
    /// `R_max`), excluding sleeping nodes and `me` itself. Iterated in
    /// ascending id order per §4.1's determinism requirement (iii).
    pub fn neighbors_in_range(&self, me: u32) -> Vec<u32> {
        let my_pos = self.nodes[me as usize].borrow().position;
        let mut out = Vec::new();
        for (id, node) in self.nodes.iter().enumerate() {
            let id = id as u32;
            if id == me {
                continue;
            }
            let node = node.borrow();
            if !node.sleep && my_pos.distance(&node.position) <= self.max_range {
                out.push(id);
            }
        }
        out
    }

    /// Builds the arena for one run from a loaded scene (§11: bootstrap
    /// wiring), constructing each node's mobility, energy and routing
    /// instances from `config`.
    pub fn new(config: Config, scene: &Scene) -> World {
        let max_range = crate::phy::max_range(&config);
        let speed_range = (1.0, 10.0);
        let pause_micros = 2_000_000;

        let nodes = scene
            .nodes
            .iter()
            .map(|scene_node| {
                let id = scene_node.node_id;
                let position = scene_node.position;
                let mobility: Box<dyn MobilityModel> = if config.static_case {
                    Box::new(StaticMobility::new(position))
                } else {
                    Box::new(RandomWaypoint3D::new(position, &config, speed_range, pause_micros, StdRng::seed_from_u64(id as u64)))
                };
                RefCell::new(Node {
                    id,
                    position,
                    velocity: scene_node.velocity,
                    mobility,
                    energy: Box::new(RotorcraftEnergyModel::from_config(&config)),
                    residual_energy: config.initial_energy,
                    sleep: false,
                    inbox: Inbox::new(),
                    send_buffer: Rc::new(ExclusiveResource::new()),
                    channel_use: Rc::new(ExclusiveResource::new()),
                    transmit_queue: VecDeque::new(),
                    waiting_list: Vec::new(),
                    mac: MacTable::default(),
                    routing: new_routing(config.routing_protocol),
                    pinned_destination: scene_node.pinned_destination,
                    rng: RefCell::new(StdRng::seed_from_u64(id as u64)),
                    last_mobility_tick: Cell::new(0),
                })
            })
            .collect();

        World { config, max_range, nodes, id_alloc: RefCell::new(IdAllocator::new()), metrics: RefCell::new(Metrics::default()), scheduler: Rc::new(Scheduler::new()) }
    }

    #[cfg(test)]
    pub fn new_for_tests(config: Config, positions: Vec<Vec3>) -> World {
        use crate::energy::RotorcraftEnergyModel;
        use crate::mobility::StaticMobility;
        use crate::routing::gpsr::Gpsr;
        use rand::SeedableRng;

        let max_range = crate::phy::max_range(&config);
        let nodes = positions
            .into_iter()
            .enumerate()
            .map(|(id, position)| {
                RefCell::new(Node {
                    id: id as u32,
                    position,
                    velocity: Vec3::ZERO,
                    mobility: Box::new(StaticMobility::new(position)),
                    energy: Box::new(RotorcraftEnergyModel::from_config(&config)),
                    residual_energy: config.initial_energy,
                    sleep: false,
                    inbox: Inbox::new(),
                    send_buffer: Rc::new(ExclusiveResource::new()),
                    channel_use: Rc::new(ExclusiveResource::new()),
                    transmit_queue: VecDeque::new(),
                    waiting_list: Vec::new(),
                    mac: MacTable::default(),
                    routing: Routing::Gpsr(Gpsr::new()),
                    pinned_destination: None,
                    rng: RefCell::new(StdRng::seed_from_u64(id as u64)),
                    last_mobility_tick: Cell::new(0),
                })
            })
            .collect();
        World { config, max_range, nodes, id_alloc: RefCell::new(IdAllocator::new()), metrics: RefCell::new(Metrics::default()), scheduler: Rc::new(Scheduler::new()) }
    }
}

/// Constructs a fresh per-node routing instance for `kind` (§4.7).
fn new_routing(kind: RoutingProtocolKind) -> Routing {
    match kind {
        RoutingProtocolKind::Gpsr => Routing::Gpsr(crate::routing::gpsr::Gpsr::new()),
        RoutingProtocolKind::Dsdv => Routing::Dsdv(crate::routing::dsdv::Dsdv::new()),
        RoutingProtocolKind::Grad => Routing::Grad(crate::routing::grad::Grad::new()),
        RoutingProtocolKind::Opar => Routing::Opar(crate::routing::opar::Opar::new()),
        RoutingProtocolKind::Parrot => Routing::Parrot(crate::routing::parrot::Parrot::new()),
        RoutingProtocolKind::QRouting => Routing::QRouting(crate::routing::qrouting::QRouting::new()),
        RoutingProtocolKind::QGeo => Routing::QGeo(crate::routing::qgeo::QGeo::new()),
        RoutingProtocolKind::Qldv => Routing::Qldv(crate::routing::qldv::Qldv::new()),
    }
}
