//! Attaching to a parent, and the child side of the parent/child link.
//!
//! An attach attempt multicasts a Parent Request to routers, then to routers
//! and REEDs, keeps the best Parent Response, and completes with a Child ID
//! Request/Response exchange with that parent.

use core::cmp::Ordering;

use rand_core::RngCore;

use crate::config::{ATTACH_BACKOFF_MIN, ATTACH_RETRY_MAX, CHILD_ID_RESPONSE_TIMEOUT};
use crate::config::{DATA_POLL_PERIOD, MAX_CHILD_UPDATE_ATTEMPTS, MAX_SOLICIT_BACKOFF_EXPONENT};
use crate::config::{PARENT_REQUEST_REED_TIMEOUT, PARENT_REQUEST_ROUTER_TIMEOUT};
use crate::instance::{ChangedFlags, Instance, Timer};
use crate::net::ip6::LINK_LOCAL_ALL_ROUTERS;
use crate::network_data::NetworkData;
use crate::radio::Radio;
use crate::settings::{ParentInfo, Settings, SettingsKey};
use crate::time::Duration;
use crate::timer::Alarm;
use crate::topology::{Neighbor, NeighborState};
use crate::utils::tlv::{array, TlvWriter, Tlvs};
use crate::{Error, Result};

use super::tlv::{self, tlv_type, Command, Connectivity, LeaderData, Route64};
use super::tlv::{SCAN_MASK_END_DEVICE, SCAN_MASK_ROUTER};
use super::{tlv_area, AttachFilter, AttachState, DeviceMode, ParentCandidate, Role};
use super::router::two_way_link_quality;
use super::{RxMessage, MLE_BUFFER_LEN};

/// Retransmission interval of unanswered Child Update Requests.
const CHILD_UPDATE_RETRY: Duration = Duration::from_secs(1);

fn is_better_parent(new: &ParentCandidate, old: &ParentCandidate) -> bool {
    if new.leader_data.partition_id != old.leader_data.partition_id {
        return new.leader_data.compare_partition(&old.leader_data) == Ordering::Greater;
    }
    new.link_quality
        .cmp(&old.link_quality)
        .then(
            new.connectivity
                .parent_priority
                .cmp(&old.connectivity.parent_priority),
        )
        .then(
            new.connectivity
                .link_quality_3
                .cmp(&old.connectivity.link_quality_3),
        )
        == Ordering::Greater
}

impl<R: Radio, A: Alarm, S: Settings, G: RngCore> Instance<R, A, S, G> {
    /// Start attaching to a parent of a partition accepted by `filter`.
    ///
    /// An attached node keeps its role until the new parent accepted it.
    /// A detached node attaching with [`AttachFilter::Better`] compares
    /// against the partition it last belonged to.
    pub fn become_child(&mut self, filter: AttachFilter) -> Result<()> {
        if self.mle.role == Role::Disabled {
            return Err(Error::Failed);
        }
        if self.mle.attach != AttachState::Idle {
            return Err(Error::Busy);
        }
        if filter == AttachFilter::Same && !self.mle.role.is_attached() {
            return Err(Error::InvalidArgs);
        }

        info!("mle: attaching ({:?})", filter);
        self.mle.attach_filter = filter;
        self.mle.candidate = None;
        self.mle.counters.attach_attempts += 1;
        self.send_parent_request(false)
    }

    fn send_parent_request(&mut self, reeds: bool) -> Result<()> {
        let challenge = self.new_challenge();
        self.mle.challenge = challenge;
        self.mle.attach = AttachState::ParentRequest { reeds };

        let now = self.now();
        let timeout = if reeds {
            PARENT_REQUEST_REED_TIMEOUT
        } else {
            PARENT_REQUEST_ROUTER_TIMEOUT
        };
        self.timers.start(Timer::Attach, now, timeout)?;

        let scan_mask = if reeds {
            SCAN_MASK_ROUTER | SCAN_MASK_END_DEVICE
        } else {
            SCAN_MASK_ROUTER
        };
        let mut buffer = [0u8; MLE_BUFFER_LEN];
        let mut w = TlvWriter::new(tlv_area(&mut buffer));
        self.append_mode(&mut w)?;
        w.push(tlv_type::CHALLENGE, &challenge)?;
        w.push_u8(tlv_type::SCAN_MASK, scan_mask)?;
        self.append_version(&mut w)?;
        let len = w.len();
        self.send_mle(LINK_LOCAL_ALL_ROUTERS, Command::ParentRequest, &mut buffer, len)
    }

    pub(crate) fn handle_parent_response(&mut self, rx: &RxMessage<'_>) -> Result<()> {
        if !matches!(self.mle.attach, AttachState::ParentRequest { .. }) {
            return Err(Error::Drop);
        }
        if !rx.has_response(&self.mle.challenge) {
            return Err(Error::Security);
        }

        let leader_data = rx.leader_data()?;
        let own = &self.mle.leader_data;
        let acceptable = match self.mle.attach_filter {
            AttachFilter::Any => true,
            AttachFilter::Same => leader_data.partition_id == own.partition_id,
            AttachFilter::Better => {
                leader_data.partition_id != own.partition_id
                    && leader_data.compare_partition(own) == Ordering::Greater
            }
        };
        if !acceptable {
            debug!("mle: parent response from {} filtered", rx.ext);
            return Ok(());
        }

        let link_margin = rx
            .find(tlv_type::LINK_MARGIN)
            .and_then(|v| v.first().copied())
            .ok_or(Error::Parse)?;
        let connectivity =
            Connectivity::parse(rx.find(tlv_type::CONNECTIVITY).ok_or(Error::Parse)?)?;
        let challenge = array(rx.challenge()?)?;

        let mut neighbor = Neighbor::new(rx.ext, rx.source_address()?, self.now());
        rx.init_counters(&mut neighbor)?;
        neighbor.update_link_margin(rx.link_margin);

        let candidate = ParentCandidate {
            neighbor,
            leader_data,
            connectivity,
            link_quality: two_way_link_quality(rx.link_margin, link_margin),
            challenge,
        };
        let better = match &self.mle.candidate {
            Some(current) => is_better_parent(&candidate, current),
            None => true,
        };
        if better {
            debug!(
                "mle: parent candidate {} rloc16 {:04x} lq {}",
                rx.ext, neighbor.rloc16, candidate.link_quality
            );
            self.mle.candidate = Some(candidate);
        }
        Ok(())
    }

    pub(crate) fn handle_attach_timer(&mut self) -> Result<()> {
        match self.mle.attach {
            AttachState::Idle => {
                // attach backoff elapsed
                if self.mle.role == Role::Detached {
                    self.become_child(AttachFilter::Any)?;
                }
                Ok(())
            }
            AttachState::ParentRequest { reeds } => {
                if self.mle.candidate.is_some() {
                    self.send_child_id_request()
                } else if !reeds {
                    self.send_parent_request(true)
                } else {
                    self.attach_failed()
                }
            }
            AttachState::ChildIdRequest => self.attach_failed(),
        }
    }

    fn send_child_id_request(&mut self) -> Result<()> {
        let Some(candidate) = self.mle.candidate else {
            return self.attach_failed();
        };
        self.mle.attach = AttachState::ChildIdRequest;
        let now = self.now();
        self.timers.start(Timer::Attach, now, CHILD_ID_RESPONSE_TIMEOUT)?;

        let mut requested: heapless::Vec<u8, 3> = heapless::Vec::new();
        let _ = requested.push(tlv_type::ADDRESS16);
        let _ = requested.push(tlv_type::NETWORK_DATA);
        if self.mle.device_mode.is_ftd() {
            let _ = requested.push(tlv_type::ROUTE64);
        }

        let ml_eid = self.mesh_local_eid();
        let mut buffer = [0u8; MLE_BUFFER_LEN];
        let mut w = TlvWriter::new(tlv_area(&mut buffer));
        w.push(tlv_type::RESPONSE, &candidate.challenge)?;
        self.append_frame_counters(&mut w)?;
        self.append_mode(&mut w)?;
        w.push_u32(tlv_type::TIMEOUT, self.mle.child_timeout)?;
        self.append_version(&mut w)?;
        w.push(tlv_type::TLV_REQUEST, &requested)?;
        tlv::emit_address_registration(&mut w, &self.mesh_local_prefix, core::iter::once(ml_eid))?;
        let len = w.len();
        let dst = Self::link_local_of(&candidate.neighbor.ext_address);
        self.send_mle(dst, Command::ChildIdRequest, &mut buffer, len)
    }

    fn attach_failed(&mut self) -> Result<()> {
        self.mle.attach = AttachState::Idle;
        self.mle.candidate = None;
        self.timers.stop(Timer::Attach);

        if self.mle.role.is_attached() {
            debug!("mle: no better parent found");
            return Ok(());
        }

        if self.mle.device_mode.is_ftd() && self.mle.attach_filter == AttachFilter::Any {
            info!("mle: no parent found, forming a partition");
            return self.become_leader();
        }

        let backoff = self.mle.attach_backoff;
        self.mle.attach_backoff = (backoff * 2).min(ATTACH_RETRY_MAX);
        info!("mle: no parent found, retrying in {}", backoff);
        let now = self.now();
        self.timers.start(Timer::Attach, now, backoff)
    }

    pub(crate) fn handle_child_id_response(&mut self, rx: &RxMessage<'_>) -> Result<()> {
        if self.mle.attach != AttachState::ChildIdRequest {
            return Err(Error::Drop);
        }
        let Some(candidate) = self.mle.candidate else {
            return Err(Error::Drop);
        };
        if candidate.neighbor.ext_address != rx.ext {
            return Err(Error::Drop);
        }

        let source = rx.source_address()?;
        let leader_data = rx.leader_data()?;
        let rloc16 = Tlvs::require(rx.tlvs, tlv_type::ADDRESS16)?.u16()?;
        let network_data = match rx.find(tlv_type::NETWORK_DATA) {
            Some(value) => NetworkData::from_bytes(value)?,
            None => NetworkData::new(),
        };
        let route = rx.find(tlv_type::ROUTE64).map(Route64::parse).transpose()?;

        let previous_partition = self.mle.leader_data.partition_id;
        let previous_parent = self.mle.parent.map(|p| p.ext_address);
        let was_attached = self.mle.role.is_attached();

        // an attached router or leader gives up its role in the old partition
        if self.mle.role.is_router_or_leader() {
            self.leave_router_role();
        }

        let mut parent = candidate.neighbor;
        parent.rloc16 = source;
        parent.state = NeighborState::Valid;
        parent.last_heard = self.now();
        self.mle.parent = Some(parent);
        self.mle.attach = AttachState::Idle;
        self.mle.candidate = None;
        self.mle.attach_backoff = ATTACH_BACKOFF_MIN;
        self.mle.child_update_attempts = 0;
        self.timers.stop(Timer::Attach);

        self.routers.clear();
        if let Some(route) = &route {
            self.routers.update_router_set(route.id_sequence, &route.mask);
        }

        self.set_rloc16(rloc16);
        self.set_network_data(network_data, leader_data);
        self.set_role(Role::Child);

        if !was_attached || previous_partition != leader_data.partition_id {
            self.mle.counters.partition_id_changes += 1;
            self.mle.solicit_failures = 0;
            self.notify(ChangedFlags::PARTITION_ID);
        }
        if previous_parent.is_some_and(|p| p != rx.ext) {
            self.mle.counters.parent_changes += 1;
        }
        info!(
            "mle: attached to {} as {:04x}, partition {:08x}",
            rx.ext, rloc16, leader_data.partition_id
        );

        self.schedule_keep_alive()?;
        self.store_parent_info();
        self.store_network_info();
        self.schedule_router_upgrade();
        if !self.local_network_data.is_empty() {
            self.register_server_data()?;
        }
        Ok(())
    }

    /// Child Update Requests for rx-on children, data polls for sleepy ones.
    fn schedule_keep_alive(&mut self) -> Result<()> {
        let now = self.now();
        if self.mle.device_mode.contains(DeviceMode::RX_ON_WHEN_IDLE) {
            let period = Duration::from_secs(self.mle.child_timeout as i64) / 2;
            self.timers.start(Timer::ChildUpdate, now, period)
        } else {
            self.timers.start(Timer::DataPoll, now, DATA_POLL_PERIOD)
        }
    }

    /// REEDs become routers when the partition lacks routers. Each failed
    /// Address Solicit doubles the delay.
    pub(crate) fn schedule_router_upgrade(&mut self) {
        if self.mle.role != Role::Child
            || !self.mle.device_mode.is_ftd()
            || self.routers.count() >= self.mle.router_upgrade_threshold as usize
        {
            return;
        }
        let jitter = self.random_jitter(self.mle.router_selection_jitter);
        let backoff = 1u32 << self.mle.solicit_failures.min(MAX_SOLICIT_BACKOFF_EXPONENT);
        let now = self.now();
        if let Err(e) = self.timers.start(Timer::RouterSelection, now, jitter * backoff) {
            warn!("mle: cannot schedule router selection: {}", e);
        }
    }

    pub(crate) fn handle_child_update_timer(&mut self) -> Result<()> {
        if self.mle.role != Role::Child {
            return Ok(());
        }
        if self.mle.child_update_attempts >= MAX_CHILD_UPDATE_ATTEMPTS {
            info!("mle: parent lost");
            return self.reattach();
        }
        self.mle.child_update_attempts += 1;
        let now = self.now();
        self.timers.start(Timer::ChildUpdate, now, CHILD_UPDATE_RETRY)?;
        self.send_child_update_request()
    }

    fn send_child_update_request(&mut self) -> Result<()> {
        let Some(parent) = self.mle.parent else {
            return Err(Error::Failed);
        };
        let challenge = self.new_challenge();
        self.mle.challenge = challenge;

        let ml_eid = self.mesh_local_eid();
        let mut buffer = [0u8; MLE_BUFFER_LEN];
        let mut w = TlvWriter::new(tlv_area(&mut buffer));
        self.append_source_address(&mut w)?;
        self.append_mode(&mut w)?;
        w.push_u32(tlv_type::TIMEOUT, self.mle.child_timeout)?;
        w.push(tlv_type::CHALLENGE, &challenge)?;
        self.append_leader_data(&mut w)?;
        tlv::emit_address_registration(&mut w, &self.mesh_local_prefix, core::iter::once(ml_eid))?;
        let len = w.len();
        let dst = Self::link_local_of(&parent.ext_address);
        self.send_mle(dst, Command::ChildUpdateRequest, &mut buffer, len)
    }

    pub(crate) fn handle_child_update_response(&mut self, rx: &RxMessage<'_>) -> Result<()> {
        if self.mle.role.is_router_or_leader() {
            return Err(Error::Drop);
        }
        if self.mle.role != Role::Child || !self.is_parent(&rx.ext) {
            return Err(Error::Drop);
        }
        if rx.find(tlv_type::STATUS).is_some() {
            info!("mle: parent dropped us");
            return self.reattach();
        }
        if rx.find(tlv_type::RESPONSE).is_some() && !rx.has_response(&self.mle.challenge) {
            return Err(Error::Security);
        }

        self.mle.child_update_attempts = 0;
        if let Some(leader_data) = rx.find(tlv_type::LEADER_DATA) {
            self.process_leader_data(LeaderData::parse(leader_data)?, rx)?;
        }
        if self.mle.role == Role::Child {
            self.schedule_keep_alive()?;
        }
        Ok(())
    }

    /// Compare Leader Data heard from the parent with ours.
    pub(crate) fn process_leader_data(
        &mut self,
        leader_data: LeaderData,
        rx: &RxMessage<'_>,
    ) -> Result<()> {
        if leader_data.partition_id != self.mle.leader_data.partition_id {
            info!("mle: parent moved to partition {:08x}", leader_data.partition_id);
            return self.reattach();
        }
        let newer = if self.mle.device_mode.contains(DeviceMode::FULL_NETWORK_DATA) {
            leader_data.data_version != self.mle.leader_data.data_version
        } else {
            leader_data.stable_data_version != self.mle.leader_data.stable_data_version
        };
        if newer {
            self.send_data_request(rx.ext)?;
        }
        Ok(())
    }

    /// Detach and attach again to any partition.
    pub(crate) fn reattach(&mut self) -> Result<()> {
        self.become_detached()?;
        self.become_child(AttachFilter::Any)
    }

    pub(crate) fn handle_data_poll_timer(&mut self) -> Result<()> {
        if self.mle.role != Role::Child {
            return Ok(());
        }
        let now = self.now();
        self.timers.start(Timer::DataPoll, now, DATA_POLL_PERIOD)?;
        self.send_data_poll()
    }

    fn store_parent_info(&mut self) {
        let Some(parent) = self.mle.parent else {
            return;
        };
        let info = ParentInfo {
            ext_address: parent.ext_address,
        };
        if let Err(e) = self.settings.set(SettingsKey::ParentInfo, &info.emit()) {
            warn!("settings: parent info not stored: {}", e);
        }
    }
}
