//! Mesh Link Establishment.
//!
//! MLE messages are UDP datagrams on port [`MLE_PORT`], protected with the
//! MLE key (see [`security`]). This module holds the role-independent part
//! of the engine: the per-node MLE state, message reception and dispatch,
//! and the TLVs most messages carry. Attaching lives in [`attach`], the
//! router role in [`router`] and the leader role in [`leader`].

use core::net::Ipv6Addr;

use bitflags::bitflags;
use rand_core::RngCore;

use crate::config::{ADVERTISE_INTERVAL_MAX, ADVERTISE_INTERVAL_MIN, MAX_ROUTER_ID};
use crate::config::{ATTACH_BACKOFF_MIN, CHILD_TIMEOUT, LEADER_WEIGHT, NETWORK_ID_TIMEOUT};
use crate::config::{ROUTER_SELECTION_JITTER, ROUTER_UPGRADE_THRESHOLD};
use crate::frame::ExtAddress;
use crate::instance::{ChangedFlags, Instance, Timer};
use crate::net::ip6::{self, UdpInfo};
use crate::radio::Radio;
use crate::settings::Settings;
use crate::time::{Duration, Instant};
use crate::timer::Alarm;
use crate::topology::{Neighbor, NeighborState, INVALID_RLOC16, INVALID_ROUTER_ID};
use crate::utils::tlv::{TlvWriter, Tlvs};
use crate::{Error, Result};

pub mod attach;
pub mod leader;
pub mod route;
pub mod router;
pub mod security;
pub mod tlv;
pub mod trickle;

use security::{HEADER_LEN, MIC_LEN};
use tlv::{tlv_type, Command, LeaderData, CHALLENGE_LEN, THREAD_VERSION};
use trickle::TrickleTimer;

/// UDP port of MLE.
pub const MLE_PORT: u16 = 19788;

/// Largest MLE message this node builds.
pub(crate) const MLE_BUFFER_LEN: usize = 127;

const ROUTER_COUNT: usize = MAX_ROUTER_ID as usize + 1;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Role {
    #[default]
    Disabled = 0,
    Detached = 1,
    Child = 2,
    Router = 3,
    Leader = 4,
}

impl Role {
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Disabled,
            1 => Self::Detached,
            2 => Self::Child,
            3 => Self::Router,
            4 => Self::Leader,
            _ => return None,
        })
    }

    /// Attached to a partition.
    pub fn is_attached(self) -> bool {
        matches!(self, Self::Child | Self::Router | Self::Leader)
    }

    pub fn is_router_or_leader(self) -> bool {
        matches!(self, Self::Router | Self::Leader)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Disabled => "disabled",
            Self::Detached => "detached",
            Self::Child => "child",
            Self::Router => "router",
            Self::Leader => "leader",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Mode TLV bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceMode: u8 {
        const RX_ON_WHEN_IDLE = 0x08;
        const SECURE_DATA_REQUESTS = 0x04;
        const FULL_THREAD_DEVICE = 0x02;
        const FULL_NETWORK_DATA = 0x01;
    }
}

impl DeviceMode {
    /// A router-eligible device.
    pub const FTD: Self = Self::RX_ON_WHEN_IDLE
        .union(Self::SECURE_DATA_REQUESTS)
        .union(Self::FULL_THREAD_DEVICE)
        .union(Self::FULL_NETWORK_DATA);

    /// A sleepy end device.
    pub const SED: Self = Self::SECURE_DATA_REQUESTS;

    pub fn is_ftd(self) -> bool {
        self.contains(Self::FULL_THREAD_DEVICE)
    }
}

/// Which partitions an attach attempt accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AttachFilter {
    Any,
    /// Only the current partition.
    Same,
    /// Only partitions that win over the current one.
    Better,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttachState {
    #[default]
    Idle,
    /// Parent Request sent, collecting Parent Responses. `reeds` once the
    /// request went to routers and REEDs.
    ParentRequest { reeds: bool },
    ChildIdRequest,
}

/// Best Parent Response heard during an attach attempt.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParentCandidate {
    pub neighbor: Neighbor,
    pub leader_data: LeaderData,
    pub connectivity: tlv::Connectivity,
    /// Two-way link quality.
    pub link_quality: u8,
    /// Challenge of the Parent Response, echoed in the Child ID Request.
    pub challenge: [u8; CHALLENGE_LEN],
}

/// Pending Address Solicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingSolicit {
    pub message_id: u16,
    pub token: [u8; 2],
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MleCounters {
    pub disabled_role: u16,
    pub detached_role: u16,
    pub child_role: u16,
    pub router_role: u16,
    pub leader_role: u16,
    pub attach_attempts: u16,
    pub partition_id_changes: u16,
    pub better_partition_attach_attempts: u16,
    pub parent_changes: u16,
    pub rx_err_parse: u32,
    pub rx_err_security: u32,
    pub rx_err_replay: u32,
    pub tx_total: u32,
}

/// MLE state of a node.
pub struct Mle {
    pub(crate) role: Role,
    pub(crate) device_mode: DeviceMode,
    pub(crate) rloc16: u16,
    pub(crate) router_id: u8,
    pub(crate) previous_router_id: u8,
    pub(crate) leader_data: LeaderData,
    pub(crate) parent: Option<Neighbor>,

    pub(crate) attach: AttachState,
    pub(crate) attach_filter: AttachFilter,
    pub(crate) candidate: Option<ParentCandidate>,
    pub(crate) attach_backoff: Duration,
    /// Challenge of the pending Parent Request, Child Update Request or
    /// multicast Link Request.
    pub(crate) challenge: [u8; CHALLENGE_LEN],
    pub(crate) link_request_pending: bool,
    pub(crate) link_request_attempts: u8,
    pub(crate) child_update_attempts: u8,
    pub(crate) solicit: Option<PendingSolicit>,
    /// Address Solicits refused or unanswered since the last success.
    pub(crate) solicit_failures: u8,
    pub(crate) message_id: u16,

    pub(crate) trickle: TrickleTimer,
    pub(crate) mesh_local_iid: [u8; 8],
    pub(crate) leader_weight: u8,
    pub(crate) network_id_timeout: u8,
    pub(crate) router_upgrade_threshold: u8,
    pub(crate) router_selection_jitter: u8,
    pub(crate) child_timeout: u32,

    /// Leader: last time each router was reachable.
    pub(crate) router_last_seen: [Instant; ROUTER_COUNT],
    /// Router: last time the leader was reachable.
    pub(crate) leader_last_heard: Instant,

    pub(crate) counters: MleCounters,
}

impl Mle {
    pub fn new(mesh_local_iid: [u8; 8]) -> Self {
        Self {
            role: Role::Disabled,
            device_mode: DeviceMode::FTD,
            rloc16: INVALID_RLOC16,
            router_id: INVALID_ROUTER_ID,
            previous_router_id: INVALID_ROUTER_ID,
            leader_data: LeaderData::default(),
            parent: None,
            attach: AttachState::Idle,
            attach_filter: AttachFilter::Any,
            candidate: None,
            attach_backoff: ATTACH_BACKOFF_MIN,
            challenge: [0; CHALLENGE_LEN],
            link_request_pending: false,
            link_request_attempts: 0,
            child_update_attempts: 0,
            solicit: None,
            solicit_failures: 0,
            message_id: 0,
            trickle: TrickleTimer::new(ADVERTISE_INTERVAL_MIN, ADVERTISE_INTERVAL_MAX),
            mesh_local_iid,
            leader_weight: LEADER_WEIGHT,
            network_id_timeout: NETWORK_ID_TIMEOUT,
            router_upgrade_threshold: ROUTER_UPGRADE_THRESHOLD,
            router_selection_jitter: ROUTER_SELECTION_JITTER,
            child_timeout: CHILD_TIMEOUT,
            router_last_seen: [Instant::ZERO; ROUTER_COUNT],
            leader_last_heard: Instant::ZERO,
            counters: MleCounters::default(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn device_mode(&self) -> DeviceMode {
        self.device_mode
    }

    pub fn rloc16(&self) -> u16 {
        self.rloc16
    }

    pub fn leader_data(&self) -> &LeaderData {
        &self.leader_data
    }

    pub fn parent(&self) -> Option<&Neighbor> {
        self.parent.as_ref()
    }

    pub fn counters(&self) -> &MleCounters {
        &self.counters
    }

    pub(crate) fn network_id_timeout(&self) -> Duration {
        Duration::from_secs(self.network_id_timeout as i64)
    }
}

/// A received, authenticated MLE message.
pub(crate) struct RxMessage<'a> {
    pub info: UdpInfo,
    /// MAC extended source address of the sender.
    pub ext: ExtAddress,
    pub link_margin: u8,
    pub key_sequence: u32,
    pub frame_counter: u32,
    pub command: Command,
    pub tlvs: &'a [u8],
}

impl<'a> RxMessage<'a> {
    pub fn source_address(&self) -> Result<u16> {
        Tlvs::require(self.tlvs, tlv_type::SOURCE_ADDRESS)?.u16()
    }

    pub fn leader_data(&self) -> Result<LeaderData> {
        LeaderData::parse(Tlvs::require(self.tlvs, tlv_type::LEADER_DATA)?.value)
    }

    pub fn challenge(&self) -> Result<&'a [u8]> {
        let value = Tlvs::require(self.tlvs, tlv_type::CHALLENGE)?.value;
        if (4..=8).contains(&value.len()) {
            Ok(value)
        } else {
            Err(Error::Parse)
        }
    }

    /// Check the Response TLV against the challenge we sent.
    pub fn has_response(&self, challenge: &[u8]) -> bool {
        Tlvs::find(self.tlvs, tlv_type::RESPONSE)
            .map(|t| t.value == challenge)
            .unwrap_or(false)
    }

    pub fn find(&self, typ: u8) -> Option<&'a [u8]> {
        Tlvs::find(self.tlvs, typ).map(|t| t.value)
    }

    pub fn u32(&self, typ: u8) -> Result<u32> {
        Tlvs::require(self.tlvs, typ)?.u32()
    }

    /// Take over the frame counters a peer announced in a handshake.
    pub fn init_counters(&self, neighbor: &mut Neighbor) -> Result<()> {
        let link_frame_counter = self.u32(tlv_type::LINK_FRAME_COUNTER)?;
        neighbor.key_sequence = self.key_sequence;
        neighbor.link_frame_counter = link_frame_counter;
        neighbor.mle_frame_counter = self.frame_counter.saturating_add(1);
        Ok(())
    }

    /// Whether the TLV Request TLV asks for `typ`.
    pub fn requests(&self, typ: u8) -> bool {
        self.find(tlv_type::TLV_REQUEST)
            .map(|v| v.contains(&typ))
            .unwrap_or(false)
    }
}

/// Space for the TLVs of an outgoing MLE message.
pub(crate) fn tlv_area(buffer: &mut [u8; MLE_BUFFER_LEN]) -> &mut [u8] {
    &mut buffer[HEADER_LEN + 1..MLE_BUFFER_LEN - MIC_LEN]
}

impl<R: Radio, A: Alarm, S: Settings, G: RngCore> Instance<R, A, S, G> {
    /// Process a received MLE datagram. `payload` is decrypted in place.
    pub(crate) fn handle_mle(
        &mut self,
        info: &UdpInfo,
        payload: &mut [u8],
        ext: ExtAddress,
        link_margin: u8,
    ) {
        if let Err(e) = self.receive_mle(info, payload, ext, link_margin) {
            match e {
                Error::Security => {
                    self.mle.counters.rx_err_security += 1;
                    warn!("mle: security failure from {}", ext);
                }
                Error::Drop => {
                    self.mle.counters.rx_err_replay += 1;
                    debug!("mle: replay from {}", ext);
                }
                Error::Parse => {
                    self.mle.counters.rx_err_parse += 1;
                    debug!("mle: malformed message from {}", ext);
                }
                e => debug!("mle: message from {} dropped: {}", ext, e),
            }
        }
    }

    fn receive_mle(
        &mut self,
        info: &UdpInfo,
        payload: &mut [u8],
        ext: ExtAddress,
        link_margin: u8,
    ) -> Result<()> {
        if self.mle.role == Role::Disabled {
            return Err(Error::NotReceiving);
        }
        let header = security::parse_header(payload)?;
        if !self.keys.is_acceptable(header.key_sequence) {
            return Err(Error::Security);
        }
        let key = self.keys.keys(header.key_sequence)?.mle;
        let end = security::unsecure(payload, &key, &ext, &info.src, &info.dst)?;

        let (&command, tlvs) = payload[HEADER_LEN..end]
            .split_first()
            .ok_or(Error::Parse)?;
        Tlvs::validate(tlvs)?;
        let command = Command::from_u8(command).ok_or(Error::Parse)?;

        let now = self.now();
        let mut trusted = false;
        if let Some(neighbor) = self.valid_neighbor_mut(&ext) {
            neighbor.check_mle_frame_counter(header.key_sequence, header.frame_counter)?;
            neighbor.commit_mle_frame_counter(header.key_sequence, header.frame_counter);
            neighbor.last_heard = now;
            neighbor.update_link_margin(link_margin);
            trusted = true;
        }
        if trusted && header.key_sequence > self.keys.key_sequence() {
            info!("mle: key sequence {} from {}", header.key_sequence, ext);
            self.keys.set_key_sequence(header.key_sequence)?;
            self.notify(ChangedFlags::KEY_SEQUENCE);
        }

        let rx = RxMessage {
            info: *info,
            ext,
            link_margin,
            key_sequence: header.key_sequence,
            frame_counter: header.frame_counter,
            command,
            tlvs,
        };
        trace!("mle: {:?} from {}", command, ext);

        match command {
            Command::ParentRequest => self.handle_parent_request(&rx),
            Command::ParentResponse => self.handle_parent_response(&rx),
            Command::ChildIdRequest => self.handle_child_id_request(&rx),
            Command::ChildIdResponse => self.handle_child_id_response(&rx),
            Command::ChildUpdateRequest => self.handle_child_update_request(&rx),
            Command::ChildUpdateResponse => self.handle_child_update_response(&rx),
            Command::LinkRequest => self.handle_link_request(&rx),
            Command::LinkAccept => self.handle_link_accept(&rx, false),
            Command::LinkAcceptAndRequest => self.handle_link_accept(&rx, true),
            Command::LinkReject => self.handle_link_reject(&rx),
            Command::Advertisement => self.handle_advertisement(&rx),
            Command::DataRequest => self.handle_data_request(&rx),
            Command::DataResponse => self.handle_data_response(&rx),
        }
    }

    /// The valid neighbor (parent, child or router) with this address.
    pub(crate) fn valid_neighbor_mut(&mut self, ext: &ExtAddress) -> Option<&mut Neighbor> {
        if let Some(parent) = self.mle.parent.as_mut().filter(|p| p.ext_address == *ext) {
            return Some(parent);
        }
        if let Some(child) = self
            .children
            .find_by_ext_mut(ext)
            .filter(|c| c.neighbor.is_valid())
        {
            return Some(&mut child.neighbor);
        }
        self.routers
            .neighbor_by_ext_mut(ext)
            .map(|r| &mut r.neighbor)
            .filter(|n| n.state == NeighborState::Valid)
    }

    /// Secure and send an MLE message whose TLVs were written to
    /// [`tlv_area`].
    pub(crate) fn send_mle(
        &mut self,
        dst: Ipv6Addr,
        command: Command,
        buffer: &mut [u8; MLE_BUFFER_LEN],
        tlv_len: usize,
    ) -> Result<()> {
        let key_sequence = self.keys.key_sequence();
        let frame_counter = self.keys.next_mle_frame_counter();
        security::emit_header(buffer, key_sequence, frame_counter)?;
        buffer[HEADER_LEN] = command as u8;

        let src = self.link_local_address();
        let key = self.keys.current_keys().mle;
        let len = security::secure(
            buffer,
            HEADER_LEN + 1 + tlv_len,
            &key,
            &self.mac.ext_address,
            &src,
            &dst,
        )?;

        let info = UdpInfo {
            src,
            dst,
            src_port: MLE_PORT,
            dst_port: MLE_PORT,
            hop_limit: 255,
            link_security: false,
        };
        trace!("mle: {:?} to {}", command, dst);
        self.mle.counters.tx_total += 1;
        self.send_datagram(&info, &buffer[..len])
    }

    pub(crate) fn new_challenge(&mut self) -> [u8; CHALLENGE_LEN] {
        let mut challenge = [0u8; CHALLENGE_LEN];
        self.rng.fill_bytes(&mut challenge);
        challenge
    }

    pub(crate) fn random_jitter(&mut self, max_secs: u8) -> Duration {
        trickle::random_duration(
            &mut self.rng,
            Duration::from_secs(1),
            Duration::from_secs(max_secs.max(1) as i64),
        )
    }

    pub(crate) fn append_source_address(&self, w: &mut TlvWriter<'_>) -> Result<()> {
        w.push_u16(tlv_type::SOURCE_ADDRESS, self.mle.rloc16)
    }

    pub(crate) fn append_leader_data(&self, w: &mut TlvWriter<'_>) -> Result<()> {
        self.mle.leader_data.emit(w)
    }

    pub(crate) fn append_mode(&self, w: &mut TlvWriter<'_>) -> Result<()> {
        w.push_u8(tlv_type::MODE, self.mle.device_mode.bits())
    }

    pub(crate) fn append_version(&self, w: &mut TlvWriter<'_>) -> Result<()> {
        w.push_u16(tlv_type::VERSION, THREAD_VERSION)
    }

    pub(crate) fn append_frame_counters(&self, w: &mut TlvWriter<'_>) -> Result<()> {
        w.push_u32(tlv_type::LINK_FRAME_COUNTER, self.keys.mac_frame_counter())?;
        w.push_u32(tlv_type::MLE_FRAME_COUNTER, self.keys.mle_frame_counter())
    }

    pub(crate) fn append_route64(&self, w: &mut TlvWriter<'_>) -> Result<()> {
        route::build_route64(&self.routers, self.mle.router_id).emit(w)
    }

    /// Network Data TLV, only the stable part unless `full`.
    pub(crate) fn append_network_data(&self, w: &mut TlvWriter<'_>, full: bool) -> Result<()> {
        if full {
            w.push(tlv_type::NETWORK_DATA, self.network_data.as_bytes())
        } else {
            w.push(tlv_type::NETWORK_DATA, self.network_data.stable()?.as_bytes())
        }
    }

    /// Change role, keeping the counters, addresses and notifier in sync.
    pub(crate) fn set_role(&mut self, role: Role) {
        if self.mle.role == role {
            return;
        }
        info!("mle: role {} -> {}", self.mle.role, role);
        self.mle.role = role;
        let counter = match role {
            Role::Disabled => &mut self.mle.counters.disabled_role,
            Role::Detached => &mut self.mle.counters.detached_role,
            Role::Child => &mut self.mle.counters.child_role,
            Role::Router => &mut self.mle.counters.router_role,
            Role::Leader => &mut self.mle.counters.leader_role,
        };
        *counter = counter.wrapping_add(1);
        self.update_addresses();
        self.notify(ChangedFlags::ROLE);
    }

    pub(crate) fn set_rloc16(&mut self, rloc16: u16) {
        if self.mle.rloc16 == rloc16 {
            return;
        }
        self.mle.rloc16 = rloc16;
        self.mac.short_address = rloc16;
        self.radio.set_short_address(rloc16);
        self.update_addresses();
        self.notify(ChangedFlags::RLOC16);
    }

    /// Leave the partition, forgetting parent, children and routes.
    pub fn become_detached(&mut self) -> Result<()> {
        if self.mle.role == Role::Disabled {
            return Err(Error::Failed);
        }
        self.leave_partition();
        self.mle.attach = AttachState::Idle;
        self.mle.candidate = None;
        self.timers.stop(Timer::Attach);
        self.set_role(Role::Detached);
        Ok(())
    }

    /// Drop every role specific state: parent, children, routes, timers.
    pub(crate) fn leave_partition(&mut self) {
        self.leave_router_role();
        for timer in [Timer::ChildUpdate, Timer::DataPoll, Timer::RouterSelection, Timer::AddressSolicit] {
            self.timers.stop(timer);
        }
        self.mle.parent = None;
        self.mle.solicit = None;
        self.mle.child_update_attempts = 0;
        self.set_rloc16(INVALID_RLOC16);
    }

    /// Stop acting as a router: forget children, links and routes.
    pub(crate) fn leave_router_role(&mut self) {
        self.mle.trickle.stop();
        for timer in [Timer::Advertise, Timer::StateUpdate, Timer::LinkRequest] {
            self.timers.stop(timer);
        }
        self.mle.link_request_pending = false;
        if self.mle.router_id != INVALID_ROUTER_ID {
            self.mle.previous_router_id = self.mle.router_id;
            self.mle.router_id = INVALID_ROUTER_ID;
        }
        self.remove_all_children();
        self.routers.clear();
    }

    /// Router or leader whose trickle timer fired: advertise, and re-arm.
    pub(crate) fn schedule_advertisement(&mut self) {
        match self.mle.trickle.poll_at() {
            Some(at) => {
                if let Err(e) = self.timers.start_at(Timer::Advertise, at) {
                    warn!("mle: cannot schedule advertisement: {}", e);
                }
            }
            None => self.timers.stop(Timer::Advertise),
        }
    }

    /// Entering the router or leader role: advertise from the minimum
    /// interval on.
    pub(crate) fn start_trickle(&mut self) {
        let now = self.now();
        self.mle.trickle.start(now, &mut self.rng);
        self.schedule_advertisement();
    }

    pub(crate) fn reset_trickle(&mut self) {
        let now = self.now();
        self.mle.trickle.reset(now, &mut self.rng);
        self.schedule_advertisement();
    }

    pub(crate) fn is_parent(&self, ext: &ExtAddress) -> bool {
        self.mle
            .parent
            .as_ref()
            .map(|p| p.ext_address == *ext)
            .unwrap_or(false)
    }

    pub(crate) fn link_local_of(ext: &ExtAddress) -> Ipv6Addr {
        ip6::link_local(ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_codes() {
        for role in [Role::Disabled, Role::Detached, Role::Child, Role::Router, Role::Leader] {
            assert_eq!(Role::from_u8(role as u8), Some(role));
        }
        assert_eq!(Role::from_u8(5), None);
        assert!(Role::Leader.is_router_or_leader());
        assert!(!Role::Detached.is_attached());
        assert_eq!(std::format!("{}", Role::Child), "child");
    }

    #[test]
    fn device_modes() {
        assert_eq!(DeviceMode::FTD.bits(), 0x0f);
        assert!(DeviceMode::FTD.is_ftd());
        assert!(!DeviceMode::SED.contains(DeviceMode::RX_ON_WHEN_IDLE));
    }
}
