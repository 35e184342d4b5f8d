//! The router role: parent of children, links to neighboring routers,
//! advertisements and Network Data distribution.

use core::cmp::Ordering;

use heapless::Vec;
use rand_core::RngCore;

use crate::config::{ADDRESS_SOLICIT_TIMEOUT, MAX_CHILDREN, MAX_LINK_REQUEST_ATTEMPTS};
use crate::config::{MAX_NEIGHBOR_AGE, MAX_ROUTER_ID, MAX_ROUTE_COST, STATE_UPDATE_PERIOD};
use crate::frame::ExtAddress;
use crate::instance::{ChangedFlags, Instance, Timer};
use crate::mac;
use crate::net::ip6::{self, LEADER_ALOC16, LINK_LOCAL_ALL_NODES, LINK_LOCAL_ALL_ROUTERS};
use crate::network_data::NetworkData;
use crate::radio::Radio;
use crate::settings::{ChildInfo, Settings, SettingsKey};
use crate::time::Duration;
use crate::timer::Alarm;
use crate::tmf::address::{status, AddressSolicit, AddressSolicitResponse};
use crate::tmf::coap::{CoapMessage, Code, Type};
use crate::tmf::uri;
use crate::topology::{is_router_rloc16, rloc16_from_router_id, router_id_from_rloc16};
use crate::topology::{sequence_newer, NeighborState, INVALID_ROUTER_ID};
use crate::utils::tlv::TlvWriter;
use crate::{Error, Result};

use super::route::apply_route64;
use super::tlv::{self, tlv_type, Command, Connectivity, LeaderData, Route64};
use super::tlv::{SCAN_MASK_ROUTER, STATUS_ERROR};
use super::{tlv_area, AttachFilter, DeviceMode, PendingSolicit, Role, RxMessage, MLE_BUFFER_LEN};

/// Time to wait for a Link Accept.
const LINK_ACCEPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Children that sent a Parent Request but no Child ID Request are
/// forgotten after this time.
const PENDING_CHILD_TIMEOUT: Duration = Duration::from_secs(5);

impl<R: Radio, A: Alarm, S: Settings, G: RngCore> Instance<R, A, S, G> {
    pub(crate) fn handle_parent_request(&mut self, rx: &RxMessage<'_>) -> Result<()> {
        if !self.mle.role.is_router_or_leader() {
            return Err(Error::Drop);
        }
        let scan_mask = rx
            .find(tlv_type::SCAN_MASK)
            .and_then(|v| v.first().copied())
            .ok_or(Error::Parse)?;
        if scan_mask & SCAN_MASK_ROUTER == 0 {
            return Ok(());
        }
        let mode = rx
            .find(tlv_type::MODE)
            .and_then(|v| v.first().copied())
            .map(DeviceMode::from_bits_truncate)
            .ok_or(Error::Parse)?;
        let their_challenge = rx.challenge()?;

        let challenge = self.new_challenge();
        let now = self.now();
        let child = self.children.add(rx.ext, now)?;
        if !child.neighbor.is_valid() {
            child.neighbor.state = NeighborState::ChildIdRequest;
        }
        child.neighbor.mode = mode;
        child.neighbor.challenge = challenge;
        child.neighbor.last_heard = now;
        child.neighbor.update_link_margin(rx.link_margin);

        let connectivity = self.connectivity();
        let mut buffer = [0u8; MLE_BUFFER_LEN];
        let mut w = TlvWriter::new(tlv_area(&mut buffer));
        self.append_source_address(&mut w)?;
        self.append_leader_data(&mut w)?;
        self.append_frame_counters(&mut w)?;
        w.push(tlv_type::RESPONSE, their_challenge)?;
        w.push(tlv_type::CHALLENGE, &challenge)?;
        w.push_u8(tlv_type::LINK_MARGIN, rx.link_margin)?;
        connectivity.emit(&mut w)?;
        self.append_version(&mut w)?;
        let len = w.len();

        debug!("mle: parent response to {}", rx.ext);
        let dst = Self::link_local_of(&rx.ext);
        self.send_mle(dst, Command::ParentResponse, &mut buffer, len)
    }

    fn connectivity(&self) -> Connectivity {
        let mut connectivity = Connectivity {
            parent_priority: 0,
            id_sequence: self.routers.id_sequence(),
            active_routers: self.routers.count() as u8,
            ..Default::default()
        };
        for router in self.routers.neighbors() {
            match router.neighbor.link_quality_in().min(router.link_quality_out) {
                3 => connectivity.link_quality_3 += 1,
                2 => connectivity.link_quality_2 += 1,
                1 => connectivity.link_quality_1 += 1,
                _ => {}
            }
        }
        connectivity.leader_cost = if self.mle.role == Role::Leader {
            0
        } else {
            self.routers.route_cost(self.mle.leader_data.leader_router_id)
        };
        connectivity
    }

    pub(crate) fn handle_child_id_request(&mut self, rx: &RxMessage<'_>) -> Result<()> {
        if !self.mle.role.is_router_or_leader() {
            return Err(Error::Drop);
        }
        let (challenge, previous_rloc16) = self
            .children
            .find_by_ext(&rx.ext)
            .filter(|c| {
                matches!(
                    c.neighbor.state,
                    NeighborState::ChildIdRequest | NeighborState::Valid
                )
            })
            .map(|c| (c.neighbor.challenge, c.rloc16()))
            .ok_or(Error::Drop)?;
        if !rx.has_response(&challenge) {
            return Err(Error::Security);
        }

        let mode = rx
            .find(tlv_type::MODE)
            .and_then(|v| v.first().copied())
            .map(DeviceMode::from_bits_truncate)
            .ok_or(Error::Parse)?;
        let timeout = rx.u32(tlv_type::TIMEOUT)?;

        let rloc16 = if is_router_rloc16(previous_rloc16)
            || router_id_from_rloc16(previous_rloc16) != self.mle.router_id
        {
            self.children.allocate_rloc16(self.mle.router_id)?
        } else {
            previous_rloc16
        };

        let now = self.now();
        let version = self.mle.leader_data.data_version;
        let ml_prefix = self.mesh_local_prefix;
        let child = self.children.find_by_ext_mut(&rx.ext).ok_or(Error::Drop)?;
        rx.init_counters(&mut child.neighbor)?;
        child.neighbor.rloc16 = rloc16;
        child.neighbor.mode = mode;
        child.neighbor.state = NeighborState::Valid;
        child.neighbor.last_heard = now;
        child.timeout = timeout;
        child.network_data_version = version;
        if let Some(value) = rx.find(tlv_type::ADDRESS_REGISTRATION) {
            child.set_addresses(tlv::address_registrations(value, &ml_prefix));
        }

        let mut buffer = [0u8; MLE_BUFFER_LEN];
        let mut w = TlvWriter::new(tlv_area(&mut buffer));
        self.append_source_address(&mut w)?;
        self.append_leader_data(&mut w)?;
        w.push_u16(tlv_type::ADDRESS16, rloc16)?;
        self.append_network_data(&mut w, mode.contains(DeviceMode::FULL_NETWORK_DATA))?;
        if rx.requests(tlv_type::ROUTE64) && mode.is_ftd() {
            self.append_route64(&mut w)?;
        }
        w.push_u32(tlv_type::TIMEOUT, timeout)?;
        let len = w.len();

        info!("mle: child {} attached as {:04x}", rx.ext, rloc16);
        let dst = Self::link_local_of(&rx.ext);
        self.send_mle(dst, Command::ChildIdResponse, &mut buffer, len)?;
        self.notify(ChangedFlags::CHILD_ADDED);
        self.store_children();
        Ok(())
    }

    pub(crate) fn handle_child_update_request(&mut self, rx: &RxMessage<'_>) -> Result<()> {
        if !self.mle.role.is_router_or_leader() {
            return Err(Error::Drop);
        }
        let their_challenge = rx.find(tlv_type::CHALLENGE);
        let ml_prefix = self.mesh_local_prefix;

        let mut buffer = [0u8; MLE_BUFFER_LEN];
        let mut w = TlvWriter::new(tlv_area(&mut buffer));

        let known = match self
            .children
            .find_by_ext_mut(&rx.ext)
            .filter(|c| c.neighbor.is_valid())
        {
            Some(child) => {
                if let Some(mode) = rx.find(tlv_type::MODE).and_then(|v| v.first()) {
                    child.neighbor.mode = DeviceMode::from_bits_truncate(*mode);
                }
                if let Ok(timeout) = rx.u32(tlv_type::TIMEOUT) {
                    child.timeout = timeout;
                }
                if let Some(value) = rx.find(tlv_type::ADDRESS_REGISTRATION) {
                    child.set_addresses(tlv::address_registrations(value, &ml_prefix));
                }
                Some((child.neighbor.mode, child.timeout))
            }
            None => None,
        };

        match known {
            Some((mode, timeout)) => {
                self.append_source_address(&mut w)?;
                self.append_leader_data(&mut w)?;
                w.push_u8(tlv_type::MODE, mode.bits())?;
                w.push_u32(tlv_type::TIMEOUT, timeout)?;
            }
            None => {
                debug!("mle: child update from unknown {}", rx.ext);
                w.push_u8(tlv_type::STATUS, STATUS_ERROR)?;
            }
        }
        if let Some(challenge) = their_challenge {
            w.push(tlv_type::RESPONSE, challenge)?;
        }
        let len = w.len();
        let dst = Self::link_local_of(&rx.ext);
        self.send_mle(dst, Command::ChildUpdateResponse, &mut buffer, len)
    }

    /// Send a Link Request to `router_id`, or to every router.
    pub(crate) fn send_link_request(&mut self, router_id: Option<u8>) -> Result<()> {
        let challenge = self.new_challenge();
        let dst = match router_id {
            None => {
                self.mle.challenge = challenge;
                self.mle.link_request_pending = true;
                LINK_LOCAL_ALL_ROUTERS
            }
            Some(id) => {
                let router = self.routers.get_mut(id).ok_or(Error::NoRoute)?;
                router.neighbor.state = NeighborState::LinkRequest;
                router.neighbor.challenge = challenge;
                Self::link_local_of(&router.neighbor.ext_address)
            }
        };
        let now = self.now();
        self.timers.start(Timer::LinkRequest, now, LINK_ACCEPT_TIMEOUT)?;

        let mut buffer = [0u8; MLE_BUFFER_LEN];
        let mut w = TlvWriter::new(tlv_area(&mut buffer));
        self.append_source_address(&mut w)?;
        self.append_leader_data(&mut w)?;
        w.push(tlv_type::CHALLENGE, &challenge)?;
        self.append_version(&mut w)?;
        w.push(tlv_type::TLV_REQUEST, &[tlv_type::LINK_MARGIN, tlv_type::ROUTE64])?;
        let len = w.len();
        self.send_mle(dst, Command::LinkRequest, &mut buffer, len)
    }

    pub(crate) fn handle_link_request_timer(&mut self) -> Result<()> {
        self.mle.link_request_pending = false;

        let pending: Vec<u8, { MAX_ROUTER_ID as usize + 1 }> = self
            .routers
            .allocated_ids()
            .filter(|&id| {
                self.routers
                    .get(id)
                    .is_some_and(|r| r.neighbor.state == NeighborState::LinkRequest)
            })
            .collect();
        if pending.is_empty() {
            self.mle.link_request_attempts = 0;
            return Ok(());
        }
        if self.mle.link_request_attempts >= MAX_LINK_REQUEST_ATTEMPTS {
            for id in pending {
                debug!("mle: no link accept from router {}", id);
                self.routers.remove_link(id);
            }
            self.mle.link_request_attempts = 0;
            return Ok(());
        }
        self.mle.link_request_attempts += 1;
        for id in pending {
            self.send_link_request(Some(id))?;
        }
        Ok(())
    }

    /// Router ID of a router neighbor sending from `source`, checked against
    /// the router set.
    fn sender_router_id(&self, source: u16) -> Result<u8> {
        if !is_router_rloc16(source) {
            return Err(Error::Drop);
        }
        let id = router_id_from_rloc16(source);
        if id == self.mle.router_id || !self.routers.is_allocated(id) {
            return Err(Error::Drop);
        }
        Ok(id)
    }

    pub(crate) fn handle_link_request(&mut self, rx: &RxMessage<'_>) -> Result<()> {
        if !self.mle.role.is_router_or_leader() {
            return Err(Error::Drop);
        }
        let leader_data = rx.leader_data()?;
        if leader_data.partition_id != self.mle.leader_data.partition_id {
            return Err(Error::Drop);
        }
        let id = self.sender_router_id(rx.source_address()?)?;
        let their_challenge = rx.challenge()?;

        // a former child that became a router
        if self.children.find_by_ext(&rx.ext).is_some() {
            self.remove_child(&rx.ext);
        }

        let challenge = self.new_challenge();
        let router = self.routers.get_mut(id).ok_or(Error::Drop)?;
        let command = if router.neighbor.is_valid() && router.neighbor.ext_address == rx.ext {
            Command::LinkAccept
        } else {
            router.neighbor.ext_address = rx.ext;
            router.neighbor.rloc16 = rloc16_from_router_id(id);
            router.neighbor.state = NeighborState::LinkRequest;
            router.neighbor.challenge = challenge;
            Command::LinkAcceptAndRequest
        };

        let mut buffer = [0u8; MLE_BUFFER_LEN];
        let mut w = TlvWriter::new(tlv_area(&mut buffer));
        self.append_source_address(&mut w)?;
        self.append_leader_data(&mut w)?;
        w.push(tlv_type::RESPONSE, their_challenge)?;
        self.append_frame_counters(&mut w)?;
        w.push_u8(tlv_type::LINK_MARGIN, rx.link_margin)?;
        self.append_version(&mut w)?;
        self.append_route64(&mut w)?;
        if command == Command::LinkAcceptAndRequest {
            w.push(tlv_type::CHALLENGE, &challenge)?;
        }
        let len = w.len();
        let dst = Self::link_local_of(&rx.ext);
        self.send_mle(dst, command, &mut buffer, len)
    }

    pub(crate) fn handle_link_accept(&mut self, rx: &RxMessage<'_>, and_request: bool) -> Result<()> {
        if !self.mle.role.is_router_or_leader() {
            return Err(Error::Drop);
        }
        let id = self.sender_router_id(rx.source_address()?)?;

        let multicast = self.mle.link_request_pending && rx.has_response(&self.mle.challenge);
        let unicast = self.routers.get(id).is_some_and(|r| {
            r.neighbor.state == NeighborState::LinkRequest && rx.has_response(&r.neighbor.challenge)
        });
        if !multicast && !unicast {
            self.send_link_reject(rx.ext)?;
            return Err(Error::Security);
        }

        let leader_data = rx.leader_data()?;
        if leader_data.partition_id != self.mle.leader_data.partition_id {
            return Err(Error::Drop);
        }
        let link_margin = rx
            .find(tlv_type::LINK_MARGIN)
            .and_then(|v| v.first().copied())
            .ok_or(Error::Parse)?;
        let route = rx.find(tlv_type::ROUTE64).map(Route64::parse).transpose()?;

        let now = self.now();
        let router = self.routers.get_mut(id).ok_or(Error::Drop)?;
        router.neighbor.ext_address = rx.ext;
        router.neighbor.rloc16 = rloc16_from_router_id(id);
        rx.init_counters(&mut router.neighbor)?;
        router.neighbor.state = NeighborState::Valid;
        router.neighbor.last_heard = now;
        router.neighbor.update_link_margin(rx.link_margin);
        router.link_quality_out = mac::link_quality(link_margin);
        if let Some(route) = &route {
            apply_route64(&mut self.routers, self.mle.router_id, id, route);
        }
        info!("mle: link to router {} ({}) established", id, rx.ext);
        // a former child now reached as a router
        if self.children.find_by_ext(&rx.ext).is_some() {
            self.remove_child(&rx.ext);
        }
        self.reset_trickle();

        if and_request {
            let their_challenge = rx.challenge()?;
            let mut buffer = [0u8; MLE_BUFFER_LEN];
            let mut w = TlvWriter::new(tlv_area(&mut buffer));
            self.append_source_address(&mut w)?;
            self.append_leader_data(&mut w)?;
            w.push(tlv_type::RESPONSE, their_challenge)?;
            self.append_frame_counters(&mut w)?;
            w.push_u8(tlv_type::LINK_MARGIN, rx.link_margin)?;
            self.append_version(&mut w)?;
            self.append_route64(&mut w)?;
            let len = w.len();
            let dst = Self::link_local_of(&rx.ext);
            self.send_mle(dst, Command::LinkAccept, &mut buffer, len)?;
        }
        Ok(())
    }

    fn send_link_reject(&mut self, ext: ExtAddress) -> Result<()> {
        let mut buffer = [0u8; MLE_BUFFER_LEN];
        let mut w = TlvWriter::new(tlv_area(&mut buffer));
        self.append_source_address(&mut w)?;
        w.push_u8(tlv_type::STATUS, STATUS_ERROR)?;
        let len = w.len();
        let dst = Self::link_local_of(&ext);
        self.send_mle(dst, Command::LinkReject, &mut buffer, len)
    }

    pub(crate) fn handle_link_reject(&mut self, rx: &RxMessage<'_>) -> Result<()> {
        if !self.mle.role.is_router_or_leader() {
            return Err(Error::Drop);
        }
        let Some(id) = self.routers.neighbor_by_ext(&rx.ext).map(|r| r.router_id) else {
            return Ok(());
        };
        debug!("mle: link to router {} rejected", id);
        self.routers.remove_link(id);
        if self.mle.link_request_attempts < MAX_LINK_REQUEST_ATTEMPTS {
            self.mle.link_request_attempts += 1;
            self.send_link_request(Some(id))?;
        }
        Ok(())
    }

    pub(crate) fn handle_advertise_timer(&mut self) -> Result<()> {
        let now = self.now();
        let fire = self.mle.trickle.poll(now, &mut self.rng);
        self.schedule_advertisement();
        if fire && self.mle.role.is_router_or_leader() {
            self.send_advertisement()?;
        }
        Ok(())
    }

    fn send_advertisement(&mut self) -> Result<()> {
        let mut buffer = [0u8; MLE_BUFFER_LEN];
        let mut w = TlvWriter::new(tlv_area(&mut buffer));
        self.append_source_address(&mut w)?;
        self.append_leader_data(&mut w)?;
        self.append_route64(&mut w)?;
        let len = w.len();
        self.send_mle(LINK_LOCAL_ALL_NODES, Command::Advertisement, &mut buffer, len)
    }

    pub(crate) fn handle_advertisement(&mut self, rx: &RxMessage<'_>) -> Result<()> {
        let source = rx.source_address()?;
        if !is_router_rloc16(source) {
            return Err(Error::Parse);
        }
        let leader_data = rx.leader_data()?;
        let route = Route64::parse(rx.find(tlv_type::ROUTE64).ok_or(Error::Parse)?)?;

        if !self.mle.role.is_attached() {
            return Ok(());
        }

        if leader_data.partition_id != self.mle.leader_data.partition_id {
            if self.mle.role == Role::Child && self.is_parent(&rx.ext) {
                return self.process_leader_data(leader_data, rx);
            }
            if self.mle.device_mode.is_ftd()
                && leader_data.compare_partition(&self.mle.leader_data) == Ordering::Greater
            {
                info!(
                    "mle: better partition {:08x} (weight {}) heard",
                    leader_data.partition_id, leader_data.weighting
                );
                self.mle.counters.better_partition_attach_attempts += 1;
                // the old partition is left before joining the new one
                self.become_detached()?;
                self.become_child(AttachFilter::Better)?;
            }
            return Ok(());
        }

        if self.mle.role == Role::Child {
            if !self.is_parent(&rx.ext) {
                return Ok(());
            }
            if sequence_newer(route.id_sequence, self.routers.id_sequence())
                || self.routers.count() == 0
            {
                self.routers.update_router_set(route.id_sequence, &route.mask);
            }
            if let Some(parent) = self.mle.parent.as_mut() {
                parent.rloc16 = source;
            }
            return self.process_leader_data(leader_data, rx);
        }

        let id = router_id_from_rloc16(source);
        if self.mle.role == Role::Router && sequence_newer(route.id_sequence, self.routers.id_sequence()) {
            self.routers.update_router_set(route.id_sequence, &route.mask);
            if !self.routers.is_allocated(self.mle.router_id) {
                info!("mle: router id {} was released", self.mle.router_id);
                return self.reattach();
            }
            self.notify(ChangedFlags::ROUTER_SET);
            self.reset_trickle();
        }
        if id == self.mle.router_id || !self.routers.is_allocated(id) {
            return Ok(());
        }

        let router = self.routers.get_mut(id).ok_or(Error::Drop)?;
        if router.neighbor.is_valid() && router.neighbor.ext_address == rx.ext {
            apply_route64(&mut self.routers, self.mle.router_id, id, &route);
        } else if router.neighbor.state != NeighborState::LinkRequest {
            router.neighbor.ext_address = rx.ext;
            router.neighbor.rloc16 = source;
            self.send_link_request(Some(id))?;
        }

        if sequence_newer(leader_data.data_version, self.mle.leader_data.data_version)
            && self.mle.role == Role::Router
        {
            self.send_data_request(rx.ext)?;
        }
        Ok(())
    }

    pub(crate) fn send_data_request(&mut self, ext: ExtAddress) -> Result<()> {
        let mut buffer = [0u8; MLE_BUFFER_LEN];
        let mut w = TlvWriter::new(tlv_area(&mut buffer));
        w.push(tlv_type::TLV_REQUEST, &[tlv_type::NETWORK_DATA])?;
        let len = w.len();
        let dst = Self::link_local_of(&ext);
        self.send_mle(dst, Command::DataRequest, &mut buffer, len)
    }

    fn send_data_response(&mut self, ext: ExtAddress, full: bool) -> Result<()> {
        let mut buffer = [0u8; MLE_BUFFER_LEN];
        let mut w = TlvWriter::new(tlv_area(&mut buffer));
        self.append_source_address(&mut w)?;
        self.append_leader_data(&mut w)?;
        self.append_network_data(&mut w, full)?;
        let len = w.len();
        let dst = Self::link_local_of(&ext);
        self.send_mle(dst, Command::DataResponse, &mut buffer, len)
    }

    pub(crate) fn handle_data_request(&mut self, rx: &RxMessage<'_>) -> Result<()> {
        if !self.mle.role.is_router_or_leader() {
            return Err(Error::Drop);
        }
        let full = match self.children.find_by_ext(&rx.ext) {
            Some(child) if child.neighbor.is_valid() => {
                child.mode().contains(DeviceMode::FULL_NETWORK_DATA)
            }
            Some(_) => return Err(Error::Drop),
            None if self.routers.neighbor_by_ext(&rx.ext).is_some() => true,
            None => return Err(Error::Drop),
        };
        self.send_data_response(rx.ext, full)
    }

    pub(crate) fn handle_data_response(&mut self, rx: &RxMessage<'_>) -> Result<()> {
        let trusted = match self.mle.role {
            Role::Child => self.is_parent(&rx.ext),
            Role::Router => self.routers.neighbor_by_ext(&rx.ext).is_some(),
            _ => false,
        };
        if !trusted {
            return Err(Error::Drop);
        }
        let leader_data = rx.leader_data()?;
        if leader_data.partition_id != self.mle.leader_data.partition_id {
            return Err(Error::Drop);
        }
        let newer = sequence_newer(leader_data.data_version, self.mle.leader_data.data_version)
            || sequence_newer(
                leader_data.stable_data_version,
                self.mle.leader_data.stable_data_version,
            );
        if !newer {
            return Ok(());
        }
        let network_data =
            NetworkData::from_bytes(rx.find(tlv_type::NETWORK_DATA).ok_or(Error::Parse)?)?;
        self.set_network_data(network_data, leader_data);
        Ok(())
    }

    /// Install new Network Data and Leader Data heard from the partition.
    pub(crate) fn set_network_data(&mut self, network_data: NetworkData, leader_data: LeaderData) {
        let changed = self.network_data != network_data;
        self.network_data = network_data;
        self.mle.leader_data = leader_data;
        if changed {
            debug!(
                "mle: network data version {}/{}",
                leader_data.data_version, leader_data.stable_data_version
            );
            self.update_addresses();
            self.notify(ChangedFlags::NETWORK_DATA);
        }
        if self.mle.role.is_router_or_leader() {
            self.push_network_data();
        }
    }

    /// Send the current Network Data to children holding an older version.
    fn push_network_data(&mut self) {
        let version = self.mle.leader_data.data_version;
        let outdated: Vec<(ExtAddress, bool), MAX_CHILDREN> = self
            .children
            .iter_mut()
            .filter(|c| c.neighbor.is_valid() && c.network_data_version != version)
            .map(|c| {
                c.network_data_version = version;
                (
                    c.neighbor.ext_address,
                    c.mode().contains(DeviceMode::FULL_NETWORK_DATA),
                )
            })
            .collect();
        for (ext, full) in outdated {
            if let Err(e) = self.send_data_response(ext, full) {
                warn!("mle: network data not sent to {}: {}", ext, e);
            }
        }
    }

    pub(crate) fn handle_state_update_timer(&mut self) -> Result<()> {
        if !self.mle.role.is_router_or_leader() {
            return Ok(());
        }
        let now = self.now();
        self.timers.start(Timer::StateUpdate, now, STATE_UPDATE_PERIOD)?;

        for ext in self.children.timed_out(now) {
            info!("mle: child {} timed out", ext);
            self.remove_child(&ext);
        }
        let pending: Vec<ExtAddress, MAX_CHILDREN> = self
            .children
            .iter()
            .filter(|c| c.neighbor.state == NeighborState::ChildIdRequest)
            .filter(|c| now.saturating_since(c.neighbor.last_heard) > PENDING_CHILD_TIMEOUT)
            .map(|c| c.neighbor.ext_address)
            .collect();
        for ext in pending {
            self.children.remove(&ext);
        }

        let stale: Vec<u8, { MAX_ROUTER_ID as usize + 1 }> =
            self.routers.stale_links(now, MAX_NEIGHBOR_AGE).collect();
        for id in stale {
            info!("mle: link to router {} lost", id);
            self.routers.remove_link(id);
        }

        if self.mle.role == Role::Leader {
            self.leader_age();
            return Ok(());
        }

        let leader_id = self.mle.leader_data.leader_router_id;
        if self.routers.route_cost(leader_id) < MAX_ROUTE_COST {
            self.mle.leader_last_heard = now;
        } else if now.saturating_since(self.mle.leader_last_heard) > self.mle.network_id_timeout() {
            info!("mle: leader {} unreachable", leader_id);
            return self.reattach();
        }
        Ok(())
    }

    /// Remove a child and the frames queued for it.
    pub(crate) fn remove_child(&mut self, ext: &ExtAddress) {
        let Some(mut child) = self.children.remove(ext) else {
            return;
        };
        while let Some(message) = child.indirect.pop_front() {
            self.pool.free(message);
        }
        if child.neighbor.is_valid() {
            self.notify(ChangedFlags::CHILD_REMOVED);
            self.store_children();
        }
    }

    pub(crate) fn remove_all_children(&mut self) {
        let mut removed = false;
        for mut child in self.children.drain() {
            while let Some(message) = child.indirect.pop_front() {
                self.pool.free(message);
            }
            removed = true;
        }
        if removed {
            self.notify(ChangedFlags::CHILD_REMOVED);
            self.store_children();
        }
    }

    fn store_children(&mut self) {
        match self.settings.delete(SettingsKey::ChildInfo, None) {
            Ok(()) | Err(Error::NoAddress) => {}
            Err(e) => warn!("settings: child info not cleared: {}", e),
        }
        for child in self.children.valid() {
            let info = ChildInfo {
                ext_address: child.neighbor.ext_address,
                timeout: child.timeout,
                rloc16: child.rloc16(),
                mode: child.mode(),
            };
            if let Err(e) = self.settings.add(SettingsKey::ChildInfo, &info.emit()) {
                warn!("settings: child info not stored: {}", e);
            }
        }
    }

    /// Ask the Leader for a Router ID and become a router.
    pub fn become_router(&mut self) -> Result<()> {
        match self.mle.role {
            Role::Router | Role::Leader => return Ok(()),
            Role::Child => {}
            _ => return Err(Error::Failed),
        }
        if !self.mle.device_mode.is_ftd() {
            return Err(Error::InvalidArgs);
        }
        if self.mle.solicit.is_some() {
            return Err(Error::Busy);
        }
        self.send_address_solicit(status::TOO_FEW_ROUTERS)
    }

    fn send_address_solicit(&mut self, reason: u8) -> Result<()> {
        let rloc16 = (self.mle.previous_router_id != INVALID_ROUTER_ID)
            .then(|| rloc16_from_router_id(self.mle.previous_router_id));
        let solicit = AddressSolicit {
            ext_address: self.mac.ext_address,
            rloc16,
            reason,
        };
        let mut payload = [0u8; 32];
        let len = solicit.emit(&mut payload)?;

        let mut token = [0u8; 2];
        self.rng.fill_bytes(&mut token);
        let message_id = self.next_message_id();
        let request = CoapMessage::request(
            Type::Confirmable,
            Code::POST,
            message_id,
            &token,
            uri::ADDRESS_SOLICIT,
            &payload[..len],
        )?;

        info!("mle: soliciting a router id");
        let dst = ip6::locator(&self.mesh_local_prefix, LEADER_ALOC16);
        self.send_tmf(dst, &request)?;
        self.mle.solicit = Some(PendingSolicit { message_id, token });
        let now = self.now();
        self.timers.start(Timer::AddressSolicit, now, ADDRESS_SOLICIT_TIMEOUT)
    }

    pub(crate) fn next_message_id(&mut self) -> u16 {
        self.mle.message_id = self.mle.message_id.wrapping_add(1);
        self.mle.message_id
    }

    pub(crate) fn handle_address_solicit_timer(&mut self) -> Result<()> {
        if self.mle.solicit.take().is_some() {
            info!("mle: address solicit timed out");
            self.mle.solicit_failures = self.mle.solicit_failures.saturating_add(1);
            self.schedule_router_upgrade();
        }
        Ok(())
    }

    pub(crate) fn handle_router_selection_timer(&mut self) -> Result<()> {
        if self.mle.role == Role::Child
            && self.mle.solicit.is_none()
            && self.routers.count() < self.mle.router_upgrade_threshold as usize
        {
            self.become_router()?;
        }
        Ok(())
    }

    pub(crate) fn handle_address_solicit_response(&mut self, response: &CoapMessage<'_>) -> Result<()> {
        let Some(pending) = self.mle.solicit else {
            return Err(Error::Drop);
        };
        if pending.message_id != response.message_id || pending.token[..] != *response.token {
            return Err(Error::Drop);
        }
        self.mle.solicit = None;
        self.timers.stop(Timer::AddressSolicit);
        if self.mle.role != Role::Child {
            return Ok(());
        }

        let reply = AddressSolicitResponse::parse(response.payload)?;
        let (Some(rloc16), Some(mask), status::SUCCESS) = (reply.rloc16, reply.router_mask, reply.status)
        else {
            info!("mle: router id refused ({})", reply.status);
            self.mle.solicit_failures = self.mle.solicit_failures.saturating_add(1);
            self.schedule_router_upgrade();
            return Ok(());
        };

        let router_id = router_id_from_rloc16(rloc16);
        let parent = self.mle.parent.take();
        self.routers.clear();
        self.routers.update_router_set(mask.id_sequence, &mask.mask);
        if let Some(parent) = parent.filter(|p| is_router_rloc16(p.rloc16)) {
            if let Some(router) = self.routers.get_mut(router_id_from_rloc16(parent.rloc16)) {
                router.neighbor = parent;
                router.neighbor.state = NeighborState::Valid;
                // symmetric until the parent advertises its view
                router.link_quality_out = parent.link_quality_in();
            }
        }

        for timer in [Timer::ChildUpdate, Timer::DataPoll, Timer::RouterSelection] {
            self.timers.stop(timer);
        }
        self.mle.router_id = router_id;
        self.set_rloc16(rloc16);
        self.set_role(Role::Router);
        self.notify(ChangedFlags::ROUTER_SET);

        let now = self.now();
        self.mle.leader_last_heard = now;
        self.mle.link_request_attempts = 0;
        self.mle.solicit_failures = 0;
        self.start_trickle();
        self.timers.start(Timer::StateUpdate, now, STATE_UPDATE_PERIOD)?;
        self.store_network_info();
        self.send_link_request(None)
    }

    /// Leave the router role: release the Router ID and attach as a child.
    pub fn become_reed(&mut self) -> Result<()> {
        if self.mle.role != Role::Router {
            return Err(Error::Failed);
        }
        self.send_address_release()?;
        self.reattach()
    }
}

/// Two-way link quality from the link margins measured on both ends.
pub(crate) fn two_way_link_quality(margin_in: u8, margin_out: u8) -> u8 {
    mac::link_quality(margin_in).min(mac::link_quality(margin_out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_quality_is_the_weaker_direction() {
        assert_eq!(two_way_link_quality(30, 30), 3);
        assert_eq!(two_way_link_quality(30, 5), 1);
        assert_eq!(two_way_link_quality(0, 30), 0);
    }

    #[test]
    fn solicit_payload_fits() {
        let solicit = AddressSolicit {
            ext_address: ExtAddress([0xff; 8]),
            rloc16: Some(0xfc00),
            reason: status::TOO_FEW_ROUTERS,
        };
        let mut payload = [0u8; 32];
        assert_eq!(solicit.emit(&mut payload), Ok(17));
    }
}
