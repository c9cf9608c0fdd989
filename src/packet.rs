//! Packet model (C6, §3/§4.6/§6): tagged packet kinds, TTL, per-node
//! retransmission counters, id ranges partitioned by kind.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionMode {
    Unicast,
    Broadcast,
    Multicast,
}

/// Packet id ranges partitioned by kind (§9 Design Notes / §6): kind is implicit
/// in a packet's id. Owned by the simulator and handed to each node at
/// construction (§9: "reify as an id allocator owned by the simulator").
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_data: u64,
    next_hello: u64,
    next_ack: u64,
    next_gradient: u64,
    next_chirp: u64,
    next_dsdv: u64,
    next_error: u64,
}

const DATA_BASE: u64 = 0;
const HELLO_BASE: u64 = 10_000;
const ACK_BASE: u64 = 20_000;
const GRADIENT_BASE: u64 = 40_000;
const CHIRP_BASE: u64 = 50_000;
const DSDV_BASE: u64 = 60_000;
const ERROR_BASE: u64 = 70_000;
const RANGE_WIDTH: u64 = 10_000;

impl IdAllocator {
    pub fn new() -> Self {
        IdAllocator::default()
    }

    pub fn next_data(&mut self) -> u64 {
        let id = DATA_BASE + self.next_data;
        self.next_data += 1;
        id
    }

    pub fn next_hello(&mut self) -> u64 {
        let id = HELLO_BASE + self.next_hello % RANGE_WIDTH;
        self.next_hello += 1;
        id
    }

    pub fn next_ack(&mut self) -> u64 {
        let id = ACK_BASE + self.next_ack % RANGE_WIDTH;
        self.next_ack += 1;
        id
    }

    pub fn next_gradient(&mut self) -> u64 {
        let id = GRADIENT_BASE + self.next_gradient % RANGE_WIDTH;
        self.next_gradient += 1;
        id
    }

    pub fn next_chirp(&mut self) -> u64 {
        let id = CHIRP_BASE + self.next_chirp % RANGE_WIDTH;
        self.next_chirp += 1;
        id
    }

    pub fn next_dsdv(&mut self) -> u64 {
        let id = DSDV_BASE + self.next_dsdv % RANGE_WIDTH;
        self.next_dsdv += 1;
        id
    }

    pub fn next_error(&mut self) -> u64 {
        let id = ERROR_BASE + self.next_error % RANGE_WIDTH;
        self.next_error += 1;
        id
    }
}

/// Fields common to every packet kind (§3).
#[derive(Debug, Clone)]
pub struct Header {
    pub packet_id: u64,
    pub length_bits: u32,
    pub creation_time: u64,
    pub deadline: u64,
    ttl: u8,
    pub retransmission_count: HashMap<u32, u32>,
    pub transmission_mode: TransmissionMode,
    pub next_hop_id: Option<u32>,
}

impl Header {
    pub fn new(packet_id: u64, length_bits: u32, creation_time: u64, packet_lifetime: u64, max_ttl: u8, mode: TransmissionMode) -> Self {
        Header {
            packet_id,
            length_bits,
            creation_time,
            deadline: creation_time + packet_lifetime,
            ttl: 0,
            retransmission_count: HashMap::new(),
            transmission_mode: mode,
            next_hop_id: None,
        }
    }

    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    /// Increments TTL, saturating at `MAX_TTL` rather than wrapping.
    pub fn increment_ttl(&mut self, max_ttl: u8) {
        if self.ttl < max_ttl {
            self.ttl += 1;
        } else {
            self.ttl = max_ttl.saturating_add(1);
        }
    }

    pub fn is_ttl_exceeded(&self, max_ttl: u8) -> bool {
        self.ttl >= max_ttl
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.deadline
    }

    pub fn retransmission_count_for(&self, node_id: u32) -> u32 {
        *self.retransmission_count.get(&node_id).unwrap_or(&0)
    }

    pub fn bump_retransmission_count(&mut self, node_id: u32) -> u32 {
        let entry = self.retransmission_count.entry(node_id).or_insert(0);
        *entry += 1;
        *entry
    }
}

#[derive(Debug, Clone)]
pub struct DataPacket {
    pub header: Header,
    pub src: u32,
    pub dst: u32,
    /// Only populated by centralized variants (OPAR).
    pub routing_path: Option<Vec<u32>>,
}

#[derive(Debug, Clone)]
pub struct AckPacket {
    pub header: Header,
    pub src: u32,
    pub dst: u32,
    pub acked_packet_id: u64,
    /// Q-routing: sender's min Q-value for the data packet's destination.
    pub min_q: Option<f64>,
    pub max_q: Option<f64>,
    pub queuing_delay_micros: Option<u64>,
    pub void_area: bool,
    pub transmitting_start_time: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct HelloPacket {
    pub header: Header,
    pub src: u32,
    pub position: crate::geometry::Vec3,
    pub velocity: crate::geometry::Vec3,
    /// DSDV/Qldv: this node's own routing-table snapshot, `(dst, metric/qvalue, seq)`.
    pub advertisements: Vec<(u32, f64, u32)>,
}

#[derive(Debug, Clone)]
pub struct GradientRequestPacket {
    pub header: Header,
    pub src: u32,
    pub dst: u32,
    pub remaining_value: i32,
}

#[derive(Debug, Clone)]
pub struct GradientReplyPacket {
    pub header: Header,
    pub src: u32,
    pub dst: u32,
    pub cost: u32,
}

#[derive(Debug, Clone)]
pub struct ChirpPacket {
    pub header: Header,
    pub src: u32,
    pub reward: f64,
    pub cohesion: f64,
    pub sequence: u32,
}

#[derive(Debug, Clone)]
pub struct ErrorAdvertisementPacket {
    pub header: Header,
    pub src: u32,
    pub unreachable_destinations: Vec<u32>,
}

#[derive(Debug, Clone)]
pub enum Packet {
    Data(DataPacket),
    Ack(AckPacket),
    Hello(HelloPacket),
    GradientRequest(GradientRequestPacket),
    GradientReply(GradientReplyPacket),
    Chirp(ChirpPacket),
    ErrorAdvertisement(ErrorAdvertisementPacket),
}

impl Packet {
    pub fn header(&self) -> &Header {
        match self {
            Packet::Data(p) => &p.header,
            Packet::Ack(p) => &p.header,
            Packet::Hello(p) => &p.header,
            Packet::GradientRequest(p) => &p.header,
            Packet::GradientReply(p) => &p.header,
            Packet::Chirp(p) => &p.header,
            Packet::ErrorAdvertisement(p) => &p.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut Header {
        match self {
            Packet::Data(p) => &mut p.header,
            Packet::Ack(p) => &mut p.header,
            Packet::Hello(p) => &mut p.header,
            Packet::GradientRequest(p) => &mut p.header,
            Packet::GradientReply(p) => &mut p.header,
            Packet::Chirp(p) => &mut p.header,
            Packet::ErrorAdvertisement(p) => &mut p.header,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Packet::Data(_))
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Packet::Ack(_))
    }

    pub fn is_control(&self) -> bool {
        !self.is_data() && !self.is_ack()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_ranges_are_partitioned_by_kind() {
        let mut alloc = IdAllocator::new();
        assert!(alloc.next_data() < HELLO_BASE);
        assert!((HELLO_BASE..ACK_BASE).contains(&alloc.next_hello()));
        assert!((ACK_BASE..GRADIENT_BASE).contains(&alloc.next_ack()));
    }

    #[test]
    fn ttl_saturates_rather_than_wraps() {
        let mut header = Header::new(0, 100, 0, 1000, 2, TransmissionMode::Unicast);
        header.increment_ttl(2);
        header.increment_ttl(2);
        header.increment_ttl(2);
        assert!(header.is_ttl_exceeded(2));
    }

    #[test]
    fn retransmission_count_increments_per_node() {
        let mut header = Header::new(0, 100, 0, 1000, 32, TransmissionMode::Unicast);
        assert_eq!(header.bump_retransmission_count(5), 1);
        assert_eq!(header.bump_retransmission_count(5), 2);
        assert_eq!(header.retransmission_count_for(7), 0);
    }

    #[test]
    fn deadline_expiry_is_inclusive() {
        let header = Header::new(0, 100, 1000, 500, 32, TransmissionMode::Unicast);
        assert!(!header.is_expired(1499));
        assert!(header.is_expired(1500));
    }
}
