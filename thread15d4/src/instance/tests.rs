use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::vec::Vec;

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::*;
use crate::config::{CONTEXT_ID_REUSE_DELAY, MAX_ROUTE_COST};
use crate::frame::{Address, ExtAddress, Frame};
use crate::mle::Role;
use crate::net::ip6::{self, LEADER_ALOC16, LINK_LOCAL_ALL_ROUTERS};
use crate::net::Prefix;
use crate::network_data::{BorderRouterConfig, BorderRouterFlags, RoutePreference};
use crate::radio::{Radio, TxError};
use crate::settings::RamSettings;
use crate::time::{Duration, Instant};
use crate::timer::Alarm;

const KEY: [u8; 16] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
];

const APP_PORT: u16 = 49152;

/// The shared air and clock of a simulated network.
struct Medium {
    now: Instant,
    queue: VecDeque<(usize, Vec<u8>)>,
    sent: Vec<(usize, Vec<u8>)>,
    links: Vec<Vec<bool>>,
}

impl Medium {
    fn new() -> Self {
        Self {
            now: Instant::from_us(0),
            queue: VecDeque::new(),
            sent: Vec::new(),
            links: Vec::new(),
        }
    }
}

struct SimRadio {
    medium: Rc<RefCell<Medium>>,
    index: usize,
    eui64: ExtAddress,
}

impl Radio for SimRadio {
    fn ieee_eui64(&self) -> ExtAddress {
        self.eui64
    }

    fn set_pan_id(&mut self, _pan_id: u16) {}

    fn set_short_address(&mut self, _short_address: u16) {}

    fn set_extended_address(&mut self, _address: &ExtAddress) {}

    fn set_channel(&mut self, _channel: u8) {}

    fn transmit(&mut self, frame: &[u8]) -> core::result::Result<(), TxError> {
        let mut medium = self.medium.borrow_mut();
        medium.queue.push_back((self.index, frame.to_vec()));
        medium.sent.push((self.index, frame.to_vec()));
        Ok(())
    }

    fn energy_scan(&mut self, _channel: u8, _duration_ms: u16) -> i8 {
        -90
    }
}

struct SimAlarm {
    medium: Rc<RefCell<Medium>>,
}

impl Alarm for SimAlarm {
    fn now(&self) -> Instant {
        self.medium.borrow().now
    }

    fn start_at(&mut self, _t0: Instant, _dt: Duration) {}

    fn stop(&mut self) {}
}

struct SimDelay {
    medium: Rc<RefCell<Medium>>,
}

impl embedded_hal_async::delay::DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        let mut medium = self.medium.borrow_mut();
        medium.now = medium.now + Duration::from_us(ns as i64 / 1000);
    }
}

type Node = Instance<SimRadio, SimAlarm, RamSettings<32>, StdRng>;

struct Sim {
    medium: Rc<RefCell<Medium>>,
    nodes: Vec<Node>,
}

impl Sim {
    fn new() -> Self {
        Self {
            medium: Rc::new(RefCell::new(Medium::new())),
            nodes: Vec::new(),
        }
    }

    fn eui64(index: usize) -> ExtAddress {
        ExtAddress::new([0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, index as u8 + 1])
    }

    fn build(&self, index: usize, settings: RamSettings<32>) -> Node {
        let radio = SimRadio {
            medium: self.medium.clone(),
            index,
            eui64: Self::eui64(index),
        };
        let alarm = SimAlarm {
            medium: self.medium.clone(),
        };
        let rng = StdRng::seed_from_u64(0x5eed + index as u64 * 7919);
        let mut node = Instance::new(radio, alarm, settings, rng);
        node.set_master_key(&KEY).unwrap();
        node
    }

    /// Add a node linked to every existing node.
    fn add_node(&mut self) -> usize {
        let index = self.nodes.len();
        let node = self.build(index, RamSettings::new());
        self.nodes.push(node);

        let mut medium = self.medium.borrow_mut();
        for row in medium.links.iter_mut() {
            row.push(true);
        }
        medium.links.push(std::vec![true; index + 1]);
        drop(medium);
        index
    }

    fn set_link(&mut self, a: usize, b: usize, up: bool) {
        let mut medium = self.medium.borrow_mut();
        medium.links[a][b] = up;
        medium.links[b][a] = up;
    }

    fn now(&self) -> Instant {
        self.medium.borrow().now
    }

    fn sent_count(&self) -> usize {
        self.medium.borrow().sent.len()
    }

    fn sent_since(&self, mark: usize, from: usize) -> Vec<Vec<u8>> {
        self.medium.borrow().sent[mark..]
            .iter()
            .filter(|(sender, _)| *sender == from)
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    /// Hand the oldest frame in the air to every linked node.
    fn deliver_one(&mut self) -> bool {
        let next = self.medium.borrow_mut().queue.pop_front();
        let Some((from, frame)) = next else {
            return false;
        };
        for (index, node) in self.nodes.iter().enumerate() {
            let linked = self.medium.borrow().links[from][index];
            if index != from && linked {
                node.signal_frame_received(&frame, -40, 255);
            }
        }
        true
    }

    /// Process and exchange frames until the network is quiet, without
    /// advancing time.
    fn settle(&mut self) {
        for _ in 0..100_000 {
            for node in self.nodes.iter_mut() {
                node.process();
            }
            if !self.deliver_one() {
                return;
            }
        }
        panic!("network never settled");
    }

    fn run_for(&mut self, duration: Duration) {
        let end = self.now() + duration;
        for _ in 0..1_000_000 {
            self.settle();
            let next = self
                .nodes
                .iter()
                .filter_map(|n| n.timers.next_deadline())
                .min();
            let now = self.now();
            match next {
                Some(deadline) if deadline <= end => {
                    if deadline > now {
                        self.medium.borrow_mut().now = deadline;
                    }
                }
                _ => {
                    self.medium.borrow_mut().now = end;
                    self.settle();
                    return;
                }
            }
        }
        panic!("simulation did not reach its end time");
    }
}

std::thread_local! {
    static CHANGES: Cell<u32> = const { Cell::new(0) };
}

fn record_changes(flags: ChangedFlags) {
    CHANGES.with(|c| c.set(c.get() | flags.bits()));
}

static UDP_RECEIVED: AtomicUsize = AtomicUsize::new(0);

fn count_udp(info: &UdpInfo, payload: &[u8]) {
    if info.dst_port == APP_PORT && payload == b"ping" {
        UDP_RECEIVED.fetch_add(1, Ordering::SeqCst);
    }
}

fn has_address(node: &Node, address: &Ipv6Addr) -> bool {
    node.unicast_addresses().any(|a| a.address == *address)
}

#[test]
fn lone_node_forms_partition() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut sim = Sim::new();
    let n = sim.add_node();
    CHANGES.with(|c| c.set(0));
    sim.nodes[n].set_state_changed_callback(Some(record_changes));

    sim.nodes[n].start().unwrap();
    assert_eq!(sim.nodes[n].role(), Role::Detached);
    assert_eq!(sim.nodes[n].start(), Err(Error::Failed));

    sim.run_for(Duration::from_secs(5));

    let node = &sim.nodes[n];
    assert_eq!(node.role(), Role::Leader);
    let router_id = node.router_id().unwrap();
    assert_eq!(node.rloc16(), topology::rloc16_from_router_id(router_id));
    assert_eq!(node.leader_data().leader_router_id, router_id);
    assert_eq!(node.routers().count(), 1);

    let aloc = ip6::locator(&node.mesh_local_prefix(), LEADER_ALOC16);
    assert!(has_address(node, &aloc));
    assert!(has_address(node, &node.rloc_address().unwrap()));
    assert!(has_address(node, &node.mesh_local_eid()));
    assert!(node.multicast_addresses().any(|a| *a == LINK_LOCAL_ALL_ROUTERS));

    let changes = ChangedFlags::from_bits_truncate(CHANGES.with(|c| c.get()));
    assert!(changes.contains(ChangedFlags::ROLE | ChangedFlags::PARTITION_ID));
    assert!(changes.contains(ChangedFlags::IP6_ADDRESSES));
}

#[test]
fn stop_leaves_the_partition() {
    let mut sim = Sim::new();
    let n = sim.add_node();
    sim.nodes[n].start().unwrap();
    sim.run_for(Duration::from_secs(5));
    assert_eq!(sim.nodes[n].role(), Role::Leader);

    sim.nodes[n].stop().unwrap();
    assert_eq!(sim.nodes[n].role(), Role::Disabled);
    assert_eq!(sim.nodes[n].unicast_addresses().count(), 0);
    assert_eq!(sim.nodes[n].stop(), Err(Error::Failed));

    let dst = ip6::locator(&sim.nodes[n].mesh_local_prefix(), 0x0400);
    assert_eq!(
        sim.nodes[n].send_udp(1000, dst, 1000, b"x"),
        Err(Error::NoAddress)
    );
}

#[test]
fn child_attaches_then_becomes_router() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut sim = Sim::new();
    let leader = sim.add_node();
    let joiner = sim.add_node();

    sim.nodes[leader].start().unwrap();
    sim.run_for(Duration::from_secs(5));
    assert_eq!(sim.nodes[leader].role(), Role::Leader);

    sim.nodes[joiner].set_router_selection_jitter(1).unwrap();
    sim.nodes[joiner].start().unwrap();
    sim.run_for(Duration::from_ms(900));

    {
        let (l, j) = (&sim.nodes[leader], &sim.nodes[joiner]);
        assert_eq!(j.role(), Role::Child);
        assert_eq!(j.partition_id(), l.partition_id());
        assert_eq!(j.parent().unwrap().ext_address, l.ext_address());
        assert!(l.children().any(|c| c.neighbor.ext_address == j.ext_address()));
        assert_eq!(j.next_hop(l.rloc16()), Some(l.rloc16()));
        assert_eq!(j.route_cost(l.rloc16()), 1);
    }

    sim.run_for(Duration::from_secs(10));

    let (l, j) = (&sim.nodes[leader], &sim.nodes[joiner]);
    assert_eq!(j.role(), Role::Router);
    let router_id = j.router_id().unwrap();
    assert_ne!(Some(router_id), l.router_id());
    assert!(l.routers().is_allocated(router_id));
    assert_eq!(l.routers().count(), 2);
    assert_eq!(j.partition_id(), l.partition_id());
    assert!(l.check_reachability(&j.rloc_address().unwrap()).is_ok());
}

#[test]
fn replayed_frame_is_dropped() {
    let mut sim = Sim::new();
    let leader = sim.add_node();
    let child = sim.add_node();

    sim.nodes[leader].set_udp_receiver(Some(count_udp));
    sim.nodes[leader].start().unwrap();
    sim.run_for(Duration::from_secs(5));

    // one router is enough, stay a child
    sim.nodes[child].set_router_upgrade_threshold(1).unwrap();
    sim.nodes[child].start().unwrap();
    sim.run_for(Duration::from_secs(2));
    assert_eq!(sim.nodes[child].role(), Role::Child);

    let before = UDP_RECEIVED.load(Ordering::SeqCst);
    let dst = sim.nodes[leader].rloc_address().unwrap();
    let mark = sim.sent_count();
    sim.nodes[child]
        .send_udp(4000, dst, APP_PORT, b"ping")
        .unwrap();
    sim.settle();
    assert_eq!(UDP_RECEIVED.load(Ordering::SeqCst), before + 1);

    let frame = sim.sent_since(mark, child).pop().unwrap();
    let duplicated = sim.nodes[leader].mac_counters().rx_duplicated;
    sim.nodes[leader].signal_frame_received(&frame, -40, 255);
    sim.nodes[leader].process();

    assert_eq!(sim.nodes[leader].mac_counters().rx_duplicated, duplicated + 1);
    assert_eq!(UDP_RECEIVED.load(Ordering::SeqCst), before + 1);
}

#[test]
fn stable_network_data_projection() {
    let mut sim = Sim::new();
    let n = sim.add_node();
    sim.nodes[n].start().unwrap();
    sim.run_for(Duration::from_secs(5));

    let stable_prefix = Prefix::new(&[0xfd, 0x00, 0x00, 0x01, 0, 0, 0, 0], 64).unwrap();
    let temporary_prefix = Prefix::new(&[0xfd, 0x00, 0x00, 0x02, 0, 0, 0, 0], 64).unwrap();
    let node = &mut sim.nodes[n];
    node.add_on_mesh_prefix(&BorderRouterConfig {
        prefix: stable_prefix,
        preference: RoutePreference::Medium,
        flags: BorderRouterFlags::ON_MESH | BorderRouterFlags::SLAAC,
        stable: true,
        rloc16: 0,
    })
    .unwrap();
    node.add_on_mesh_prefix(&BorderRouterConfig {
        prefix: temporary_prefix,
        preference: RoutePreference::High,
        flags: BorderRouterFlags::ON_MESH,
        stable: false,
        rloc16: 0,
    })
    .unwrap();
    sim.settle();

    let node = &sim.nodes[n];
    let full = node.network_data(false).unwrap();
    assert_eq!(full.border_routers().count(), 2);
    assert!(full.border_routers().all(|br| br.rloc16 == node.rloc16()));

    let stable = node.network_data(true).unwrap();
    let brs: Vec<_> = stable.border_routers().collect();
    assert_eq!(brs.len(), 1);
    assert_eq!(brs[0].prefix, stable_prefix);

    let slaac = ip6::from_parts(&[0xfd, 0x00, 0x00, 0x01, 0, 0, 0, 0], &node.mle.mesh_local_iid);
    assert!(has_address(node, &slaac));

    let node = &mut sim.nodes[n];
    node.remove_on_mesh_prefix(&stable_prefix).unwrap();
    assert_eq!(node.network_data(false).unwrap().border_routers().count(), 1);
    assert_eq!(node.network_data(true).unwrap().border_routers().count(), 0);
    assert!(!has_address(node, &slaac));
}

#[test]
fn heavier_partition_absorbs_lighter_one() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut sim = Sim::new();
    let light = sim.add_node();
    let heavy = sim.add_node();
    sim.set_link(light, heavy, false);

    sim.nodes[heavy].set_leader_weight(128);
    sim.nodes[light].start().unwrap();
    sim.nodes[heavy].start().unwrap();
    sim.run_for(Duration::from_secs(5));
    assert_eq!(sim.nodes[light].role(), Role::Leader);
    assert_eq!(sim.nodes[heavy].role(), Role::Leader);
    assert_ne!(sim.nodes[light].partition_id(), sim.nodes[heavy].partition_id());

    let detached = sim.nodes[light].mle_counters().detached_role;
    let child = sim.nodes[light].mle_counters().child_role;
    sim.set_link(light, heavy, true);
    sim.run_for(Duration::from_secs(120));

    let (l, h) = (&sim.nodes[light], &sim.nodes[heavy]);
    assert_eq!(h.role(), Role::Leader);
    assert!(l.role().is_attached());
    assert_ne!(l.role(), Role::Leader);
    assert_eq!(l.partition_id(), h.partition_id());
    assert_eq!(l.leader_data().weighting, 128);
    assert!(l.mle_counters().better_partition_attach_attempts >= 1);

    // leader, then detached, then child of the heavier partition
    assert!(l.mle_counters().detached_role > detached);
    assert!(l.mle_counters().child_role > child);
}

#[test]
fn leader_advertises_on_trickle_schedule() {
    let mut sim = Sim::new();
    let n = sim.add_node();
    sim.nodes[n].start().unwrap();
    sim.run_for(Duration::from_secs(5));
    assert_eq!(sim.nodes[n].role(), Role::Leader);
    assert!(sim.nodes[n].timers.is_running(Timer::Advertise));

    let mark = sim.sent_count();
    let tx_total = sim.nodes[n].mle_counters().tx_total;
    sim.run_for(Duration::from_secs(60));

    // intervals of 4, 8, 16 and 32 seconds end within the minute
    let sent = sim.sent_since(mark, n);
    assert!((3..=5).contains(&sent.len()), "{} advertisements", sent.len());
    assert_eq!(
        sim.nodes[n].mle_counters().tx_total - tx_total,
        sent.len() as u32
    );
    for bytes in sent.iter() {
        let frame = Frame::new(&bytes[..]).unwrap();
        assert_eq!(frame.addressing().dst_address(), Some(Address::BROADCAST));
    }

    sim.nodes[n].stop().unwrap();
    assert!(!sim.nodes[n].timers.is_running(Timer::Advertise));
}

#[test]
fn simultaneous_start_elects_one_leader() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut sim = Sim::new();
    let nodes: Vec<usize> = (0..3).map(|_| sim.add_node()).collect();
    for &n in nodes.iter() {
        sim.nodes[n].start().unwrap();
    }
    sim.run_for(Duration::from_secs(120));

    let leaders: Vec<usize> = nodes
        .iter()
        .copied()
        .filter(|&n| sim.nodes[n].role() == Role::Leader)
        .collect();
    assert_eq!(leaders.len(), 1);

    let partition_id = sim.nodes[leaders[0]].partition_id();
    for &n in nodes.iter() {
        assert!(sim.nodes[n].role().is_attached());
        assert_eq!(sim.nodes[n].partition_id(), partition_id);
    }
}

#[test]
fn line_topology_routes_without_loops() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut sim = Sim::new();
    let nodes: Vec<usize> = (0..4).map(|_| sim.add_node()).collect();
    // 0 - 1 - 2 - 3
    for a in 0..nodes.len() {
        for b in a + 2..nodes.len() {
            sim.set_link(a, b, false);
        }
    }

    sim.nodes[0].start().unwrap();
    sim.run_for(Duration::from_secs(5));
    for &n in &nodes[1..] {
        sim.nodes[n].set_router_selection_jitter(1).unwrap();
        sim.nodes[n].start().unwrap();
        sim.run_for(Duration::from_secs(15));
        assert_eq!(sim.nodes[n].role(), Role::Router);
    }
    sim.run_for(Duration::from_secs(90));

    assert_eq!(sim.nodes[0].role(), Role::Leader);
    let partition_id = sim.nodes[0].partition_id();
    let rloc16s: Vec<u16> = nodes.iter().map(|&n| sim.nodes[n].rloc16()).collect();

    for &a in nodes.iter() {
        assert_eq!(sim.nodes[a].partition_id(), partition_id);
        for &b in nodes.iter() {
            let mut visited = std::vec![a];
            let mut at = a;
            while at != b {
                let hop = sim.nodes[at].next_hop(rloc16s[b]).unwrap();
                at = rloc16s.iter().position(|&r| r == hop).unwrap();
                assert!(!visited.contains(&at), "loop on the way from {} to {}", a, b);
                visited.push(at);
            }

            let hops = a.abs_diff(b);
            assert_eq!(visited.len() - 1, hops);
            let cost = sim.nodes[a].route_cost(rloc16s[b]);
            assert_eq!(cost as usize, hops);
            assert!(cost < MAX_ROUTE_COST);
        }
    }
}

#[test]
fn mismatched_link_accept_is_rejected() {
    let mut sim = Sim::new();
    let leader = sim.add_node();
    let router = sim.add_node();

    sim.nodes[leader].start().unwrap();
    sim.run_for(Duration::from_secs(5));
    sim.nodes[router].set_router_selection_jitter(1).unwrap();
    sim.nodes[router].start().unwrap();
    sim.run_for(Duration::from_secs(15));
    assert_eq!(sim.nodes[router].role(), Role::Router);

    let leader_id = sim.nodes[leader].router_id().unwrap();
    let router_id = sim.nodes[router].router_id().unwrap();
    assert_eq!(sim.nodes[leader].mle.link_request_attempts, 0);

    // the accept answers a challenge the requester no longer expects
    let security = sim.nodes[router].mle_counters().rx_err_security;
    sim.nodes[router].send_link_request(Some(leader_id)).unwrap();
    sim.nodes[router]
        .routers
        .get_mut(leader_id)
        .unwrap()
        .neighbor
        .challenge = [0xa5; 8];
    sim.settle();

    assert_eq!(sim.nodes[router].mle_counters().rx_err_security, security + 1);
    // the rejected side asked again and the link came back
    assert_eq!(sim.nodes[leader].mle.link_request_attempts, 1);
    assert!(sim.nodes[leader].routers().get(router_id).unwrap().neighbor.is_valid());
    assert!(sim.nodes[router].routers().get(leader_id).unwrap().neighbor.is_valid());

    sim.run_for(Duration::from_secs(5));
    assert_eq!(sim.nodes[router].mle.link_request_attempts, 0);

    // an unanswered request gives up after the retries
    sim.set_link(leader, router, false);
    sim.nodes[router].send_link_request(Some(leader_id)).unwrap();
    sim.run_for(Duration::from_secs(10));

    let node = &sim.nodes[router];
    assert_eq!(
        node.routers().get(leader_id).unwrap().neighbor.state,
        NeighborState::Invalid
    );
    assert_eq!(node.mle.link_request_attempts, 0);
    assert!(!node.timers.is_running(Timer::LinkRequest));
}

#[test]
fn refused_router_id_backs_off() {
    let mut sim = Sim::new();
    let leader = sim.add_node();
    let reed = sim.add_node();

    sim.nodes[leader].start().unwrap();
    sim.run_for(Duration::from_secs(5));
    // the leader alone is enough routers
    sim.nodes[leader].set_router_upgrade_threshold(1).unwrap();

    sim.nodes[reed].set_router_selection_jitter(1).unwrap();
    sim.nodes[reed].start().unwrap();
    sim.run_for(Duration::from_secs(3));
    assert_eq!(sim.nodes[reed].role(), Role::Child);
    assert_eq!(sim.nodes[reed].mle.solicit_failures, 1);

    // each refusal doubles the delay, up to eight times the jitter
    let mut deadline = sim.nodes[reed].timers.deadline(Timer::RouterSelection).unwrap();
    for (failures, delay) in [(2, 4), (3, 8), (4, 8)] {
        sim.run_for(deadline - sim.now() + Duration::from_ms(1));
        let node = &sim.nodes[reed];
        assert_eq!(node.role(), Role::Child);
        assert_eq!(node.mle.solicit_failures, failures);
        let next = node.timers.deadline(Timer::RouterSelection).unwrap();
        assert_eq!(next - deadline, Duration::from_secs(delay));
        deadline = next;
    }
    assert_eq!(sim.nodes[leader].routers().count(), 1);
}

#[test]
fn leader_ages_out_unreachable_router() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut sim = Sim::new();
    let leader = sim.add_node();
    let lost = sim.add_node();
    let early = sim.add_node();
    let late = sim.add_node();
    sim.set_link(lost, early, false);
    sim.set_link(lost, late, false);
    sim.set_link(early, late, false);

    sim.nodes[leader].set_network_id_timeout(10).unwrap();
    sim.nodes[leader].start().unwrap();
    sim.run_for(Duration::from_secs(5));

    sim.nodes[lost].set_router_selection_jitter(1).unwrap();
    sim.nodes[lost].start().unwrap();
    sim.run_for(Duration::from_secs(15));
    let lost_id = sim.nodes[lost].router_id().unwrap();
    assert!(sim.nodes[leader].routers().is_allocated(lost_id));

    sim.set_link(leader, lost, false);
    let cut = sim.now();
    let mut released = None;
    for _ in 0..300 {
        sim.run_for(Duration::from_secs(1));
        if !sim.nodes[leader].routers().is_allocated(lost_id) {
            released = Some(sim.now());
            break;
        }
    }
    let released = released.expect("router id never released");
    assert!(released - cut > Duration::from_secs(10));

    // the released ID is held back
    sim.nodes[early].set_router_selection_jitter(1).unwrap();
    sim.nodes[early].start().unwrap();
    sim.run_for(Duration::from_secs(10));
    let early_id = sim.nodes[early].router_id().unwrap();
    assert_ne!(early_id, lost_id);
    assert!(!sim.nodes[leader].routers().is_allocated(lost_id));

    // and handed out again once the reuse delay passed
    let reusable = released + Duration::from_secs(CONTEXT_ID_REUSE_DELAY as i64);
    sim.run_for(reusable - sim.now());
    sim.nodes[late].set_router_selection_jitter(1).unwrap();
    sim.nodes[late].start().unwrap();
    sim.run_for(Duration::from_secs(10));
    assert_eq!(sim.nodes[late].router_id(), Some(lost_id));
}

#[test]
fn restart_resumes_counters_and_router_id() {
    let mut sim = Sim::new();
    let n = sim.add_node();
    sim.nodes[n].start().unwrap();
    sim.run_for(Duration::from_secs(30));
    assert_eq!(sim.nodes[n].role(), Role::Leader);

    let router_id = sim.nodes[n].router_id();
    let mle_counter = sim.nodes[n].keys.mle_frame_counter();
    let eid = sim.nodes[n].mesh_local_eid();
    sim.nodes[n].stop().unwrap();

    let settings = core::mem::take(&mut sim.nodes[n].settings);
    let rebooted = sim.build(n, settings);
    sim.nodes[n] = rebooted;
    sim.nodes[n].start().unwrap();

    assert!(sim.nodes[n].keys.mle_frame_counter() > mle_counter);
    assert_eq!(sim.nodes[n].mesh_local_eid(), eid);

    sim.run_for(Duration::from_secs(5));
    assert_eq!(sim.nodes[n].role(), Role::Leader);
    assert_eq!(sim.nodes[n].router_id(), router_id);
}

#[test]
fn factory_reset_forgets_the_network() {
    let mut sim = Sim::new();
    let n = sim.add_node();
    sim.nodes[n].start().unwrap();
    sim.run_for(Duration::from_secs(5));
    sim.nodes[n].factory_reset();
    assert_eq!(sim.nodes[n].role(), Role::Disabled);

    let settings = core::mem::take(&mut sim.nodes[n].settings);
    let mut buffer = [0u8; 64];
    assert_eq!(
        settings.get(SettingsKey::NetworkInfo, 0, &mut buffer),
        Ok(None)
    );
}

#[test]
fn configuration_is_validated() {
    let mut sim = Sim::new();
    let n = sim.add_node();
    let node = &mut sim.nodes[n];

    assert_eq!(node.set_channel(10), Err(Error::InvalidArgs));
    node.set_channel(15).unwrap();
    assert_eq!(node.channel(), 15);
    assert_eq!(node.set_pan_id(0xffff), Err(Error::InvalidArgs));
    assert_eq!(node.set_router_upgrade_threshold(0), Err(Error::InvalidArgs));
    assert_eq!(node.set_master_key(&[0u8; 17]), Err(Error::InvalidArgs));
    assert_eq!(
        node.set_device_mode(DeviceMode::FULL_THREAD_DEVICE),
        Err(Error::InvalidArgs)
    );
    assert_eq!(node.energy_scan(27, 10), Err(Error::InvalidArgs));
    assert_eq!(node.energy_scan(20, 10), Ok(-90));

    node.start().unwrap();
    assert_eq!(node.set_master_key(&KEY), Err(Error::Failed));
    assert_eq!(node.set_mesh_local_prefix([0xfd; 8]), Err(Error::Failed));
}

#[pollster::test]
async fn step_sleeps_until_the_next_deadline() {
    let mut sim = Sim::new();
    let n = sim.add_node();
    let mut delay = SimDelay {
        medium: sim.medium.clone(),
    };
    sim.nodes[n].start().unwrap();

    let start = sim.now();
    while sim.nodes[n].role() != Role::Leader {
        sim.nodes[n].step(&mut delay).await;
        // a lone node has nobody to hear it
        sim.medium.borrow_mut().queue.clear();
        assert!(sim.now() - start < Duration::from_secs(10));
    }
    assert!(sim.now() - start >= Duration::from_ms(750));
}
