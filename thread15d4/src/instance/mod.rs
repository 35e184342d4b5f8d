//! A Thread node: MAC, mesh link establishment, network data and the
//! scheduler driving them.
//!
//! The platform hands the instance a [`Radio`], an [`Alarm`], a [`Settings`]
//! store and a random number generator. Interrupt handlers only record
//! events through [`Instance::signal_alarm_fired`] and
//! [`Instance::signal_frame_received`]; all protocol work happens when the
//! host calls [`Instance::process`] (or awaits [`Instance::step`]).

use core::cell::RefCell;
use core::net::Ipv6Addr;

use bitflags::bitflags;
use critical_section::Mutex;
use embedded_hal_async::delay::DelayNs;
use heapless::Deque;
use rand_core::RngCore;

use crate::config::{FRAME_COUNTER_STORE_AHEAD, MAX_CHILDREN, MESSAGE_POOL_BUFFERS};
use crate::dataset::Dataset;
use crate::frame::{ExtAddress, MAX_PHY_PACKET_SIZE};
use crate::key_manager::KeyManager;
use crate::mac::{AllowList, Mac, MacCounters, NetworkName};
use crate::message::{Message, MessagePool};
use crate::mle::{AttachFilter, DeviceMode, Mle, MleCounters, Role};
use crate::mle::tlv::LeaderData;
use crate::net::ip6::{self, UdpInfo, LEADER_ALOC16};
use crate::net::ip6::{LINK_LOCAL_ALL_NODES, LINK_LOCAL_ALL_ROUTERS};
use crate::net::ip6::{REALM_LOCAL_ALL_NODES, REALM_LOCAL_ALL_ROUTERS};
use crate::net::{AddressOrigin, Netif, NetifAddress, Prefix};
use crate::network_data::{self, BorderRouterConfig, BorderRouterFlags, ExternalRouteConfig};
use crate::network_data::NetworkData;
use crate::radio::{self, Radio};
use crate::settings::{ChildInfo, FrameCounterInfo, NetworkInfo, Settings, SettingsKey};
use crate::tasklet::TaskletScheduler;
use crate::time::{Duration, Instant};
use crate::timer::{Alarm, TimerScheduler};
use crate::topology::{self, Child, ChildTable, Neighbor, NeighborState, RouterTable};
use crate::topology::{INVALID_RLOC16, INVALID_ROUTER_ID};
use crate::mle::MLE_PORT;
use crate::{Error, Result};

mod rx;
mod tx;

#[cfg(test)]
mod tests;

/// Received frames buffered between the radio interrupt and [`Instance::process`].
const RX_QUEUE_LEN: usize = 8;
const SEND_QUEUE_LEN: usize = 16;
const TIMER_COUNT: usize = 10;
const TASKLET_COUNT: usize = 4;

/// Upper bound on how long [`Instance::step`] sleeps without checking for
/// signalled events.
const POLL_INTERVAL: Duration = Duration::from_ms(10);

const DEFAULT_CHANNEL: u8 = 11;
const DEFAULT_PAN_ID: u16 = 0xface;
const DEFAULT_NETWORK_NAME: &str = "thread15d4";
const DEFAULT_EXTENDED_PAN_ID: [u8; 8] = [0xde, 0xad, 0x00, 0xbe, 0xef, 0x00, 0xca, 0xfe];
const DEFAULT_MESH_LOCAL_PREFIX: [u8; 8] = [0xfd, 0xde, 0xad, 0x00, 0xbe, 0xef, 0x00, 0x00];

/// The timers of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum Timer {
    Attach,
    ChildUpdate,
    DataPoll,
    StateUpdate,
    LinkRequest,
    AddressSolicit,
    RouterSelection,
    Advertise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tasklet {
    Notify,
    SendMessages,
}

bitflags! {
    /// State changes reported to the state changed callback.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct ChangedFlags: u32 {
        const ROLE = 1 << 0;
        const RLOC16 = 1 << 1;
        const PARTITION_ID = 1 << 2;
        const NETWORK_DATA = 1 << 3;
        const KEY_SEQUENCE = 1 << 4;
        const CHILD_ADDED = 1 << 5;
        const CHILD_REMOVED = 1 << 6;
        const ROUTER_SET = 1 << 7;
        const IP6_ADDRESSES = 1 << 8;
    }
}

pub(crate) struct RxFrame {
    pub data: heapless::Vec<u8, MAX_PHY_PACKET_SIZE>,
    pub rssi: i8,
    pub lqi: u8,
}

#[derive(Default)]
pub(crate) struct Signals {
    pub frames: Deque<RxFrame, RX_QUEUE_LEN>,
    pub alarm_fired: bool,
}

pub type StateChangedCallback = fn(ChangedFlags);
pub type UdpReceiver = fn(&UdpInfo, &[u8]);

/// A Thread node.
pub struct Instance<R: Radio, A: Alarm, S: Settings, G: RngCore> {
    pub(crate) radio: R,
    pub(crate) alarm: A,
    pub(crate) settings: S,
    pub(crate) rng: G,

    pub(crate) signals: Mutex<RefCell<Signals>>,
    tasklets: TaskletScheduler<Tasklet, TASKLET_COUNT>,
    pub(crate) timers: TimerScheduler<Timer, TIMER_COUNT>,

    pub(crate) pool: MessagePool<MESSAGE_POOL_BUFFERS>,
    pub(crate) send_queue: Deque<Message, SEND_QUEUE_LEN>,

    pub(crate) mac: Mac,
    pub(crate) keys: KeyManager,
    pub(crate) netif: Netif,
    pub(crate) mle: Mle,
    pub(crate) routers: RouterTable,
    pub(crate) children: ChildTable,

    /// The partition's Network Data as last received or published.
    pub(crate) network_data: NetworkData,
    /// Prefixes and routes this node serves.
    pub(crate) local_network_data: NetworkData,
    pub(crate) leader: network_data::Leader,

    pub(crate) network_name: NetworkName,
    pub(crate) extended_pan_id: [u8; 8],
    pub(crate) mesh_local_prefix: [u8; 8],

    changed: ChangedFlags,
    state_changed: Option<StateChangedCallback>,
    pub(crate) udp_receiver: Option<UdpReceiver>,
}

impl<R: Radio, A: Alarm, S: Settings, G: RngCore> Instance<R, A, S, G> {
    pub fn new(radio: R, alarm: A, settings: S, mut rng: G) -> Self {
        let ext_address = radio.ieee_eui64();
        let sequence = rng.next_u32() as u8;
        let mut mesh_local_iid = [0u8; 8];
        rng.fill_bytes(&mut mesh_local_iid);

        let mut mac = Mac::new(ext_address, sequence);
        mac.channel = DEFAULT_CHANNEL;
        mac.pan_id = DEFAULT_PAN_ID;

        Self {
            radio,
            alarm,
            settings,
            rng,
            signals: Mutex::new(RefCell::new(Signals::default())),
            tasklets: TaskletScheduler::new(),
            timers: TimerScheduler::new(),
            pool: MessagePool::new(),
            send_queue: Deque::new(),
            mac,
            keys: KeyManager::new(),
            netif: Netif::new(),
            mle: Mle::new(mesh_local_iid),
            routers: RouterTable::new(),
            children: ChildTable::new(),
            network_data: NetworkData::new(),
            local_network_data: NetworkData::new(),
            leader: network_data::Leader::new(),
            network_name: NetworkName::new(DEFAULT_NETWORK_NAME).unwrap_or_default(),
            extended_pan_id: DEFAULT_EXTENDED_PAN_ID,
            mesh_local_prefix: DEFAULT_MESH_LOCAL_PREFIX,
            changed: ChangedFlags::empty(),
            state_changed: None,
            udp_receiver: None,
        }
    }

    pub(crate) fn now(&self) -> Instant {
        self.alarm.now()
    }

    pub(crate) fn link_local_address(&self) -> Ipv6Addr {
        ip6::link_local(&self.mac.ext_address)
    }

    /// The mesh-local EID, stable for the lifetime of the node.
    pub fn mesh_local_eid(&self) -> Ipv6Addr {
        ip6::from_parts(&self.mesh_local_prefix, &self.mle.mesh_local_iid)
    }

    pub fn rloc_address(&self) -> Option<Ipv6Addr> {
        (self.mle.rloc16 != INVALID_RLOC16)
            .then(|| ip6::locator(&self.mesh_local_prefix, self.mle.rloc16))
    }

    // Events

    /// Record an alarm expiration. Safe to call from interrupt context.
    pub fn signal_alarm_fired(&self) {
        critical_section::with(|cs| self.signals.borrow_ref_mut(cs).alarm_fired = true);
    }

    /// Queue a received frame (FCS excluded). Safe to call from interrupt
    /// context. Frames are dropped while the queue is full.
    pub fn signal_frame_received(&self, frame: &[u8], rssi: i8, lqi: u8) {
        let Ok(data) = heapless::Vec::from_slice(frame) else {
            return;
        };
        critical_section::with(|cs| {
            let mut signals = self.signals.borrow_ref_mut(cs);
            if signals.frames.push_back(RxFrame { data, rssi, lqi }).is_err() {
                trace!("rx: queue full, frame dropped");
            }
        });
    }

    /// Record state changes and schedule their notification.
    pub(crate) fn notify(&mut self, flags: ChangedFlags) {
        self.changed |= flags;
        match self.tasklets.post(Tasklet::Notify) {
            Ok(_) | Err(Error::Busy) => {}
            Err(e) => warn!("tasklet: notify not posted: {}", e),
        }
    }

    pub(crate) fn post_send_messages(&mut self) {
        match self.tasklets.post(Tasklet::SendMessages) {
            Ok(_) | Err(Error::Busy) => {}
            Err(e) => warn!("tasklet: send not posted: {}", e),
        }
    }

    fn run_notify(&mut self) {
        let flags = core::mem::take(&mut self.changed);
        if flags.is_empty() {
            return;
        }
        debug!("notify: {:08x}", flags.bits());
        if flags.contains(ChangedFlags::KEY_SEQUENCE) {
            self.store_frame_counters();
            self.store_network_info();
        }
        if let Some(callback) = self.state_changed {
            callback(flags);
        }
    }

    fn handle_timer(&mut self, timer: Timer) {
        trace!("timer: {:?} fired", timer);
        let result = match timer {
            Timer::Attach => self.handle_attach_timer(),
            Timer::ChildUpdate => self.handle_child_update_timer(),
            Timer::DataPoll => self.handle_data_poll_timer(),
            Timer::StateUpdate => self.handle_state_update_timer(),
            Timer::LinkRequest => self.handle_link_request_timer(),
            Timer::AddressSolicit => self.handle_address_solicit_timer(),
            Timer::RouterSelection => self.handle_router_selection_timer(),
            Timer::Advertise => self.handle_advertise_timer(),
        };
        if let Err(e) = result {
            debug!("timer: {:?} failed: {}", timer, e);
        }
    }

    /// Run everything that is due: expired timers, received frames and
    /// posted tasklets. The alarm is re-armed for the next deadline.
    pub fn process(&mut self) {
        critical_section::with(|cs| self.signals.borrow_ref_mut(cs).alarm_fired = false);

        let now = self.now();
        while let Some(timer) = self.timers.pop_expired(now) {
            self.handle_timer(timer);
        }

        while let Some(frame) =
            critical_section::with(|cs| self.signals.borrow_ref_mut(cs).frames.pop_front())
        {
            let mut data = frame.data;
            self.handle_frame(&mut data, frame.rssi, frame.lqi);
        }

        while let Some(tasklet) = self.tasklets.pop() {
            match tasklet {
                Tasklet::Notify => self.run_notify(),
                Tasklet::SendMessages => self.send_messages(),
            }
        }

        match self.timers.next_deadline() {
            Some(deadline) => {
                let now = self.now();
                self.alarm.start_at(now, deadline.saturating_since(now));
            }
            None => self.alarm.stop(),
        }
    }

    /// Whether [`process`](Self::process) has work to do right now.
    pub fn has_pending_work(&self) -> bool {
        let now = self.now();
        let signalled = critical_section::with(|cs| {
            let signals = self.signals.borrow_ref(cs);
            signals.alarm_fired || !signals.frames.is_empty()
        });
        signalled
            || self.tasklets.are_pending()
            || self.timers.next_deadline().is_some_and(|d| d <= now)
    }

    /// Process pending work, then sleep until the next deadline.
    pub async fn step(&mut self, delay: &mut impl DelayNs) {
        self.process();
        let now = self.now();
        let sleep = match self.timers.next_deadline() {
            Some(deadline) => {
                let until = deadline.saturating_since(now);
                if until.as_us() < POLL_INTERVAL.as_us() {
                    until
                } else {
                    POLL_INTERVAL
                }
            }
            None => POLL_INTERVAL,
        };
        if sleep.as_us() > 0 {
            delay.delay_us(sleep.as_us() as u32).await;
        }
    }

    pub async fn run(&mut self, delay: &mut impl DelayNs) -> ! {
        loop {
            self.step(delay).await;
        }
    }

    // Lifecycle

    /// Bring the node up: configure the radio, restore the persisted state
    /// and start attaching.
    pub fn start(&mut self) -> Result<()> {
        if self.mle.role != Role::Disabled {
            return Err(Error::Failed);
        }

        if let Err(e) = self.restore() {
            warn!("settings: corrupt, wiping: {}", e);
            self.settings.wipe();
        }

        self.radio.set_extended_address(&self.mac.ext_address);
        self.radio.set_pan_id(self.mac.pan_id);
        self.radio.set_channel(self.mac.channel);
        self.radio.set_short_address(self.mac.short_address);
        self.mac.rx_on_when_idle = self.mle.device_mode.contains(DeviceMode::RX_ON_WHEN_IDLE);

        // never reuse a counter handed out before a reset
        self.store_frame_counters();
        info!(
            "instance: starting on channel {} pan {:04x} as {}",
            self.mac.channel, self.mac.pan_id, self.mac.ext_address
        );

        self.set_role(Role::Detached);
        self.become_child(AttachFilter::Any)
    }

    fn restore(&mut self) -> Result<()> {
        let mut buffer = [0u8; Dataset::MAX_LEN + 16];
        if let Some(len) = self.settings.get(SettingsKey::ActiveDataset, 0, &mut buffer)? {
            let dataset = Dataset::parse(&buffer[..len])?;
            self.apply_dataset(&dataset)?;
        }

        let mut counters = None;
        if let Some(len) = self.settings.get(SettingsKey::FrameCounter, 0, &mut buffer)? {
            counters = Some(FrameCounterInfo::parse(&buffer[..len])?);
        }

        let Some(len) = self.settings.get(SettingsKey::NetworkInfo, 0, &mut buffer)? else {
            if let Some(counters) = counters {
                self.keys.restore(
                    counters.key_sequence,
                    counters.mac_frame_counter,
                    counters.mle_frame_counter,
                )?;
            }
            return Ok(());
        };
        let info = NetworkInfo::parse(&buffer[..len])?;

        let (mut mac_counter, mut mle_counter) = (info.mac_frame_counter, info.mle_frame_counter);
        let mut key_sequence = info.key_sequence;
        if let Some(counters) = counters {
            key_sequence = key_sequence.max(counters.key_sequence);
            mac_counter = mac_counter.max(counters.mac_frame_counter);
            mle_counter = mle_counter.max(counters.mle_frame_counter);
        }
        self.keys.restore(key_sequence, mac_counter, mle_counter)?;
        self.mle.device_mode = info.device_mode;
        self.mle.mesh_local_iid = info.mesh_local_iid;
        if topology::is_router_rloc16(info.rloc16) {
            self.mle.previous_router_id = topology::router_id_from_rloc16(info.rloc16);
        }
        debug!(
            "settings: restored {} {:04x} key sequence {}",
            info.role, info.rloc16, key_sequence
        );

        if info.role.is_router_or_leader() {
            self.restore_children()?;
        }
        Ok(())
    }

    fn restore_children(&mut self) -> Result<()> {
        let now = self.now();
        let mut buffer = [0u8; ChildInfo::LEN];
        for index in 0..MAX_CHILDREN {
            let Some(len) = self.settings.get(SettingsKey::ChildInfo, index, &mut buffer)? else {
                break;
            };
            let info = ChildInfo::parse(&buffer[..len])?;
            let child = self.children.add(info.ext_address, now)?;
            child.neighbor.rloc16 = info.rloc16;
            child.neighbor.mode = info.mode;
            child.neighbor.state = NeighborState::Valid;
            child.timeout = info.timeout;
        }
        if !self.children.is_empty() {
            info!("settings: restored {} children", self.children.len());
        }
        Ok(())
    }

    /// Leave the network and stop protocol operation. The persisted state
    /// is kept.
    pub fn stop(&mut self) -> Result<()> {
        if self.mle.role == Role::Disabled {
            return Err(Error::Failed);
        }
        self.store_network_info();
        self.leave_partition();
        self.timers.stop(Timer::Attach);
        self.mle.attach = Default::default();
        self.mle.candidate = None;
        while let Some(message) = self.send_queue.pop_front() {
            self.pool.free(message);
        }
        self.set_role(Role::Disabled);
        Ok(())
    }

    /// Stop, erase the persisted state and forget the network keys.
    pub fn factory_reset(&mut self) {
        if self.mle.role != Role::Disabled {
            if let Err(e) = self.stop() {
                debug!("instance: stop before reset failed: {}", e);
            }
        }
        self.settings.wipe();
        self.keys = KeyManager::new();
        self.rng.fill_bytes(&mut self.mle.mesh_local_iid);
        self.mle.previous_router_id = INVALID_ROUTER_ID;
        self.local_network_data = NetworkData::new();
        self.network_data = NetworkData::new();
        info!("instance: factory reset");
    }

    // Addresses

    /// Rebuild the Thread addresses and multicast subscriptions from the
    /// role, RLOC16 and Network Data.
    pub(crate) fn update_addresses(&mut self) {
        let before = self.address_digest();

        self.netif.remove_origin(AddressOrigin::Thread);
        self.netif.remove_origin(AddressOrigin::Slaac);
        for group in [
            LINK_LOCAL_ALL_NODES,
            REALM_LOCAL_ALL_NODES,
            LINK_LOCAL_ALL_ROUTERS,
            REALM_LOCAL_ALL_ROUTERS,
        ] {
            // groups of the previous role only
            if let Err(e) = self.netif.unsubscribe(&group) {
                trace!("netif: {} not subscribed: {}", group, e);
            }
        }

        if self.mle.role != Role::Disabled {
            let thread = |address, prefix_len| NetifAddress {
                address,
                prefix_len,
                origin: AddressOrigin::Thread,
            };
            let aloc = (self.mle.role == Role::Leader)
                .then(|| ip6::locator(&self.mesh_local_prefix, LEADER_ALOC16));
            let addresses = [
                Some(self.link_local_address()),
                Some(self.mesh_local_eid()),
                self.rloc_address(),
                aloc,
            ];
            for entry in addresses.into_iter().flatten().map(|a| thread(a, 64)) {
                if let Err(e) = self.netif.add_unicast(entry) {
                    warn!("netif: {} not added: {}", entry.address, e);
                }
            }

            let router = self.mle.role.is_router_or_leader();
            for (group, wanted) in [
                (LINK_LOCAL_ALL_NODES, true),
                (REALM_LOCAL_ALL_NODES, true),
                (LINK_LOCAL_ALL_ROUTERS, router),
                (REALM_LOCAL_ALL_ROUTERS, router),
            ] {
                if !wanted {
                    continue;
                }
                if let Err(e) = self.netif.subscribe(group) {
                    warn!("netif: {} not subscribed: {}", group, e);
                }
            }
        }

        if self.mle.role.is_attached() {
            let iid = self.mle.mesh_local_iid;
            let slaac: heapless::Vec<Prefix, 4> = self
                .network_data
                .border_routers()
                .filter(|br| {
                    br.flags
                        .contains(BorderRouterFlags::ON_MESH | BorderRouterFlags::SLAAC)
                        && br.prefix.len() == 64
                })
                .map(|br| br.prefix)
                .fold(heapless::Vec::new(), |mut acc, prefix| {
                    if !acc.contains(&prefix) {
                        let _ = acc.push(prefix);
                    }
                    acc
                });
            for prefix in slaac {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&prefix.as_bytes()[..8]);
                let entry = NetifAddress {
                    address: ip6::from_parts(&bytes, &iid),
                    prefix_len: 64,
                    origin: AddressOrigin::Slaac,
                };
                if let Err(e) = self.netif.add_unicast(entry) {
                    warn!("netif: slaac {} not added: {}", entry.address, e);
                }
            }
        }

        if self.address_digest() != before {
            self.notify(ChangedFlags::IP6_ADDRESSES);
        }
    }

    /// Cheap summary of the interface addresses, used to detect changes.
    fn address_digest(&self) -> (usize, usize, u32) {
        let mut sum = 0u32;
        for entry in self.netif.unicast_addresses() {
            for chunk in entry.address.octets().chunks_exact(4) {
                sum = sum
                    .rotate_left(5)
                    .wrapping_add(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
            }
        }
        (
            self.netif.unicast_addresses().count(),
            self.netif.multicast_addresses().count(),
            sum,
        )
    }

    // Persistence

    pub(crate) fn store_network_info(&mut self) {
        let (mac_frame_counter, mle_frame_counter) =
            self.keys.frame_counters_to_store(FRAME_COUNTER_STORE_AHEAD);
        let mut network_name = [0u8; 16];
        let name = self.network_name.as_bytes();
        network_name[..name.len()].copy_from_slice(name);

        let info = NetworkInfo {
            role: self.mle.role,
            device_mode: self.mle.device_mode,
            rloc16: self.mle.rloc16,
            key_sequence: self.keys.key_sequence(),
            mle_frame_counter,
            mac_frame_counter,
            mesh_local_iid: self.mle.mesh_local_iid,
            extended_pan_id: self.extended_pan_id,
            network_name,
        };
        if let Err(e) = self.settings.set(SettingsKey::NetworkInfo, &info.emit()) {
            warn!("settings: network info not stored: {}", e);
        }
        self.write_frame_counters(mac_frame_counter, mle_frame_counter);
    }

    pub(crate) fn store_frame_counters(&mut self) {
        let (mac, mle) = self.keys.frame_counters_to_store(FRAME_COUNTER_STORE_AHEAD);
        self.write_frame_counters(mac, mle);
    }

    fn write_frame_counters(&mut self, mac_frame_counter: u32, mle_frame_counter: u32) {
        let info = FrameCounterInfo {
            key_sequence: self.keys.key_sequence(),
            mac_frame_counter,
            mle_frame_counter,
        };
        if let Err(e) = self.settings.set(SettingsKey::FrameCounter, &info.emit()) {
            warn!("settings: frame counters not stored: {}", e);
        }
    }

    /// Persist the frame counters once they caught up with the stored ones.
    pub(crate) fn store_frame_counters_if_needed(&mut self) {
        if self.keys.needs_store() {
            trace!("settings: frame counters reached the stored values");
            self.store_frame_counters();
        }
    }

    fn store_active_dataset(&mut self) {
        let dataset = self.active_dataset();
        let mut buffer = [0u8; Dataset::MAX_LEN];
        let result = dataset
            .emit(&mut buffer)
            .and_then(|len| self.settings.set(SettingsKey::ActiveDataset, &buffer[..len]));
        if let Err(e) = result {
            warn!("settings: dataset not stored: {}", e);
        }
    }

    // Configuration

    fn require_disabled(&self) -> Result<()> {
        if self.mle.role == Role::Disabled {
            Ok(())
        } else {
            Err(Error::Failed)
        }
    }

    pub fn set_channel(&mut self, channel: u8) -> Result<()> {
        if !radio::is_valid_channel(channel) {
            return Err(Error::InvalidArgs);
        }
        self.mac.channel = channel;
        self.radio.set_channel(channel);
        self.store_active_dataset();
        Ok(())
    }

    pub fn channel(&self) -> u8 {
        self.mac.channel
    }

    pub fn set_pan_id(&mut self, pan_id: u16) -> Result<()> {
        if pan_id == crate::mac::BROADCAST_PAN_ID {
            return Err(Error::InvalidArgs);
        }
        self.mac.pan_id = pan_id;
        self.radio.set_pan_id(pan_id);
        self.store_active_dataset();
        Ok(())
    }

    pub fn pan_id(&self) -> u16 {
        self.mac.pan_id
    }

    /// Set the master key. Only allowed while the node is disabled.
    pub fn set_master_key(&mut self, key: &[u8]) -> Result<()> {
        self.require_disabled()?;
        self.keys.set_master_key(key)?;
        self.store_active_dataset();
        self.store_frame_counters();
        Ok(())
    }

    pub fn master_key(&self) -> &crate::crypto::Key {
        self.keys.master_key()
    }

    pub fn set_network_name(&mut self, name: &str) -> Result<()> {
        self.network_name = NetworkName::new(name).map_err(|_| Error::InvalidArgs)?;
        self.store_active_dataset();
        Ok(())
    }

    pub fn network_name(&self) -> &str {
        self.network_name.as_str()
    }

    pub fn set_extended_pan_id(&mut self, extended_pan_id: [u8; 8]) -> Result<()> {
        self.require_disabled()?;
        self.extended_pan_id = extended_pan_id;
        self.store_active_dataset();
        Ok(())
    }

    pub fn extended_pan_id(&self) -> [u8; 8] {
        self.extended_pan_id
    }

    pub fn set_mesh_local_prefix(&mut self, prefix: [u8; 8]) -> Result<()> {
        self.require_disabled()?;
        self.mesh_local_prefix = prefix;
        self.store_active_dataset();
        self.update_addresses();
        Ok(())
    }

    pub fn mesh_local_prefix(&self) -> [u8; 8] {
        self.mesh_local_prefix
    }

    /// Apply an operational dataset and persist it as the active one.
    pub fn set_active_dataset(&mut self, dataset: &Dataset) -> Result<()> {
        self.require_disabled()?;
        self.apply_dataset(dataset)?;
        self.store_active_dataset();
        Ok(())
    }

    fn apply_dataset(&mut self, dataset: &Dataset) -> Result<()> {
        if let Some(channel) = dataset.channel {
            if !radio::is_valid_channel(channel) {
                return Err(Error::InvalidArgs);
            }
            self.mac.channel = channel;
        }
        if let Some(pan_id) = dataset.pan_id {
            self.mac.pan_id = pan_id;
        }
        if let Some(extended_pan_id) = dataset.extended_pan_id {
            self.extended_pan_id = extended_pan_id;
        }
        if let Some(name) = dataset.network_name {
            self.network_name = name;
        }
        if let Some(key) = &dataset.master_key {
            if key != self.keys.master_key() {
                self.keys.set_master_key(key)?;
            }
        }
        if let Some(prefix) = dataset.mesh_local_prefix {
            self.mesh_local_prefix = prefix;
        }
        Ok(())
    }

    /// The current network parameters as an operational dataset.
    pub fn active_dataset(&self) -> Dataset {
        Dataset {
            channel: Some(self.mac.channel),
            pan_id: Some(self.mac.pan_id),
            extended_pan_id: Some(self.extended_pan_id),
            network_name: Some(self.network_name),
            master_key: Some(*self.keys.master_key()),
            mesh_local_prefix: Some(self.mesh_local_prefix),
        }
    }

    /// Set the device mode. Only allowed while detached or disabled.
    pub fn set_device_mode(&mut self, mode: DeviceMode) -> Result<()> {
        if self.mle.role.is_attached() {
            return Err(Error::Failed);
        }
        if mode.contains(DeviceMode::FULL_THREAD_DEVICE)
            && !mode.contains(DeviceMode::RX_ON_WHEN_IDLE)
        {
            return Err(Error::InvalidArgs);
        }
        self.mle.device_mode = mode;
        self.mac.rx_on_when_idle = mode.contains(DeviceMode::RX_ON_WHEN_IDLE);
        Ok(())
    }

    pub fn device_mode(&self) -> DeviceMode {
        self.mle.device_mode
    }

    pub fn set_leader_weight(&mut self, weight: u8) {
        self.mle.leader_weight = weight;
    }

    pub fn leader_weight(&self) -> u8 {
        self.mle.leader_weight
    }

    pub fn set_network_id_timeout(&mut self, timeout: u8) -> Result<()> {
        if timeout == 0 {
            return Err(Error::InvalidArgs);
        }
        self.mle.network_id_timeout = timeout;
        Ok(())
    }

    pub fn set_router_upgrade_threshold(&mut self, threshold: u8) -> Result<()> {
        if !(1..=63).contains(&threshold) {
            return Err(Error::InvalidArgs);
        }
        self.mle.router_upgrade_threshold = threshold;
        Ok(())
    }

    pub fn set_router_selection_jitter(&mut self, jitter: u8) -> Result<()> {
        if jitter == 0 {
            return Err(Error::InvalidArgs);
        }
        self.mle.router_selection_jitter = jitter;
        Ok(())
    }

    /// Set the timeout (seconds) requested from a parent.
    pub fn set_child_timeout(&mut self, timeout: u32) -> Result<()> {
        if timeout == 0 {
            return Err(Error::InvalidArgs);
        }
        self.mle.child_timeout = timeout;
        Ok(())
    }

    pub fn set_state_changed_callback(&mut self, callback: Option<StateChangedCallback>) {
        self.state_changed = callback;
    }

    /// Receive UDP datagrams to ports other than MLE and TMF.
    pub fn set_udp_receiver(&mut self, receiver: Option<UdpReceiver>) {
        self.udp_receiver = receiver;
    }

    // State

    pub fn role(&self) -> Role {
        self.mle.role
    }

    pub fn rloc16(&self) -> u16 {
        self.mle.rloc16
    }

    pub fn router_id(&self) -> Option<u8> {
        (self.mle.router_id != INVALID_ROUTER_ID).then_some(self.mle.router_id)
    }

    pub fn ext_address(&self) -> ExtAddress {
        self.mac.ext_address
    }

    pub fn leader_data(&self) -> &LeaderData {
        &self.mle.leader_data
    }

    pub fn partition_id(&self) -> u32 {
        self.mle.leader_data.partition_id
    }

    pub fn key_sequence(&self) -> u32 {
        self.keys.key_sequence()
    }

    /// Switch to a new key sequence. Neighbors follow when they hear us.
    pub fn set_key_sequence(&mut self, key_sequence: u32) -> Result<()> {
        self.keys.set_key_sequence(key_sequence)?;
        self.notify(ChangedFlags::KEY_SEQUENCE);
        Ok(())
    }

    pub fn unicast_addresses(&self) -> impl Iterator<Item = &NetifAddress> {
        self.netif.unicast_addresses()
    }

    pub fn multicast_addresses(&self) -> impl Iterator<Item = &Ipv6Addr> {
        self.netif.multicast_addresses()
    }

    pub fn mac_counters(&self) -> &MacCounters {
        &self.mac.counters
    }

    pub fn mle_counters(&self) -> &MleCounters {
        &self.mle.counters
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.mac.allow_list
    }

    pub fn allow_list_mut(&mut self) -> &mut AllowList {
        &mut self.mac.allow_list
    }

    pub fn children(&self) -> impl Iterator<Item = &Child> {
        self.children.valid()
    }

    pub fn routers(&self) -> &RouterTable {
        &self.routers
    }

    pub fn parent(&self) -> Option<&Neighbor> {
        self.mle.parent.as_ref()
    }

    /// The partition's Network Data, or only its stable part.
    pub fn network_data(&self, stable: bool) -> Result<NetworkData> {
        if stable {
            self.network_data.stable()
        } else {
            Ok(self.network_data.clone())
        }
    }

    /// The Network Data this node registers with the leader.
    pub fn local_network_data(&self) -> &NetworkData {
        &self.local_network_data
    }

    // Server data

    /// Serve an on-mesh prefix. The entry is registered with the leader
    /// once attached.
    pub fn add_on_mesh_prefix(&mut self, config: &BorderRouterConfig) -> Result<()> {
        if !config.prefix.is_valid_on_mesh() {
            return Err(Error::InvalidArgs);
        }
        let config = BorderRouterConfig {
            rloc16: self.mle.rloc16,
            ..*config
        };
        self.local_network_data.add_border_router(&config)?;
        self.register_server_data()
    }

    pub fn remove_on_mesh_prefix(&mut self, prefix: &Prefix) -> Result<()> {
        self.local_network_data.remove_border_router(prefix)?;
        self.register_server_data()
    }

    pub fn add_external_route(&mut self, config: &ExternalRouteConfig) -> Result<()> {
        if config.prefix.len() > 128 {
            return Err(Error::InvalidArgs);
        }
        let config = ExternalRouteConfig {
            rloc16: self.mle.rloc16,
            ..*config
        };
        self.local_network_data.add_has_route(&config)?;
        self.register_server_data()
    }

    pub fn remove_external_route(&mut self, prefix: &Prefix) -> Result<()> {
        self.local_network_data.remove_has_route(prefix)?;
        self.register_server_data()
    }

    // Routing

    /// The RLOC16 of the next hop towards `rloc16`.
    pub fn next_hop(&self, rloc16: u16) -> Option<u16> {
        if rloc16 == self.mle.rloc16 {
            return Some(rloc16);
        }
        match self.mle.role {
            Role::Child => self.mle.parent.map(|p| p.rloc16),
            Role::Router | Role::Leader => {
                if self.children.find_by_rloc16(rloc16).is_some_and(|c| c.neighbor.is_valid()) {
                    return Some(rloc16);
                }
                let router_id = topology::router_id_from_rloc16(rloc16);
                if router_id == self.mle.router_id {
                    // a child of ours we do not know
                    return None;
                }
                self.routers
                    .next_hop(router_id)
                    .map(topology::rloc16_from_router_id)
            }
            Role::Disabled | Role::Detached => None,
        }
    }

    /// Cost of the path to `rloc16`, [`MAX_ROUTE_COST`](crate::config::MAX_ROUTE_COST)
    /// when unreachable.
    pub fn route_cost(&self, rloc16: u16) -> u8 {
        use crate::config::MAX_ROUTE_COST;
        if rloc16 == self.mle.rloc16 {
            return 0;
        }
        match self.mle.role {
            Role::Child => match self.mle.parent {
                // a child only knows the cost of its own link
                Some(parent) if parent.rloc16 == rloc16 => 1,
                _ => MAX_ROUTE_COST,
            },
            Role::Router | Role::Leader => {
                if self.children.find_by_rloc16(rloc16).is_some_and(|c| c.neighbor.is_valid()) {
                    return 1;
                }
                let router_id = topology::router_id_from_rloc16(rloc16);
                let cost = self.routers.route_cost(router_id);
                if topology::is_router_rloc16(rloc16) {
                    cost
                } else {
                    // one more hop from the parent router to its child
                    cost.saturating_add(1).min(MAX_ROUTE_COST)
                }
            }
            Role::Disabled | Role::Detached => MAX_ROUTE_COST,
        }
    }

    /// Cost of the direct link to a neighboring router.
    pub fn link_cost(&self, router_id: u8) -> u8 {
        self.routers.link_cost(router_id)
    }

    /// Check that a datagram to `destination` would find a route.
    pub fn check_reachability(&self, destination: &Ipv6Addr) -> Result<()> {
        self.resolve(destination).map(|_| ())
    }

    // Applications

    /// Send a UDP datagram from the best matching local address.
    pub fn send_udp(
        &mut self,
        src_port: u16,
        destination: Ipv6Addr,
        dst_port: u16,
        payload: &[u8],
    ) -> Result<()> {
        if dst_port == MLE_PORT || src_port == MLE_PORT {
            return Err(Error::InvalidArgs);
        }
        let src = self.netif.select_source(&destination).ok_or(Error::NoAddress)?;
        let info = UdpInfo {
            src,
            dst: destination,
            src_port,
            dst_port,
            hop_limit: 64,
            link_security: true,
        };
        self.send_datagram(&info, payload)
    }

    /// Peak RSSI seen on `channel` over `duration_ms`.
    pub fn energy_scan(&mut self, channel: u8, duration_ms: u16) -> Result<i8> {
        if !radio::is_valid_channel(channel) {
            return Err(Error::InvalidArgs);
        }
        let rssi = self.radio.energy_scan(channel, duration_ms);
        self.radio.set_channel(self.mac.channel);
        Ok(rssi)
    }

    /// Free message buffers.
    pub fn free_buffers(&self) -> usize {
        self.pool.free_buffers()
    }
}
