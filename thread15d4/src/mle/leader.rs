//! The leader role: forming a partition, Router ID assignment and the
//! partition's Network Data.

use heapless::Vec;
use rand_core::RngCore;

use crate::config::{MAX_ROUTER_ID, MAX_ROUTE_COST, STATE_UPDATE_PERIOD};
use crate::instance::{ChangedFlags, Instance, Timer};
use crate::net::ip6::{self, UdpInfo, LEADER_ALOC16};
use crate::radio::Radio;
use crate::settings::Settings;
use crate::timer::Alarm;
use crate::tmf::address::{status, AddressRelease, AddressSolicit, AddressSolicitResponse};
use crate::tmf::address::{RouterMask, ServerData};
use crate::tmf::coap::{CoapMessage, Code, Type};
use crate::tmf::uri;
use crate::topology::{rloc16_from_router_id, router_id_from_rloc16, INVALID_ROUTER_ID};
use crate::{Error, Result};

use super::tlv::LeaderData;
use super::{AttachState, Role};

impl<R: Radio, A: Alarm, S: Settings, G: RngCore> Instance<R, A, S, G> {
    /// Form a new partition with this node as its leader.
    pub fn become_leader(&mut self) -> Result<()> {
        match self.mle.role {
            Role::Disabled => return Err(Error::Failed),
            Role::Leader => return Ok(()),
            _ => {}
        }
        if !self.mle.device_mode.is_ftd() {
            return Err(Error::InvalidArgs);
        }

        self.leave_partition();
        self.mle.attach = AttachState::Idle;
        self.mle.candidate = None;
        self.mle.attach_backoff = crate::config::ATTACH_BACKOFF_MIN;
        self.timers.stop(Timer::Attach);

        let now = self.now();
        let partition_id = self.rng.next_u32();
        let mut random = [0u8; 3];
        self.rng.fill_bytes(&mut random);

        self.routers.clear();
        self.routers.set_id_sequence(random[0]);
        let preferred =
            (self.mle.previous_router_id != INVALID_ROUTER_ID).then_some(self.mle.previous_router_id);
        let router_id = self.routers.allocate(preferred, now)?;
        self.mle.router_id = router_id;
        self.mle.router_last_seen = [now; MAX_ROUTER_ID as usize + 1];

        self.leader.reset(random[1], random[2]);
        let leader_data = LeaderData {
            partition_id,
            weighting: self.mle.leader_weight,
            data_version: self.leader.version(),
            stable_data_version: self.leader.stable_version(),
            leader_router_id: router_id,
        };
        self.mle.leader_data = leader_data;
        self.network_data = self.leader.network_data().clone();

        self.set_rloc16(rloc16_from_router_id(router_id));
        self.set_role(Role::Leader);
        self.mle.counters.partition_id_changes += 1;
        self.notify(ChangedFlags::PARTITION_ID | ChangedFlags::ROUTER_SET | ChangedFlags::NETWORK_DATA);
        info!(
            "mle: leader of partition {:08x} with router id {}",
            partition_id, router_id
        );

        self.start_trickle();
        self.timers.start(Timer::StateUpdate, now, STATE_UPDATE_PERIOD)?;
        self.store_network_info();
        if !self.local_network_data.is_empty() {
            self.register_server_data()?;
        }
        Ok(())
    }

    pub(crate) fn handle_address_solicit(
        &mut self,
        request: &CoapMessage<'_>,
        info: &UdpInfo,
    ) -> Result<()> {
        if self.mle.role != Role::Leader {
            return Err(Error::Drop);
        }
        let solicit = AddressSolicit::parse(request.payload)?;

        // a router soliciting again, e.g. after a lost response, keeps its ID
        let own_id = self.mle.router_id;
        let existing = self.routers.allocated_ids().find(|&id| {
            id != own_id
                && self
                    .routers
                    .get(id)
                    .is_some_and(|r| r.neighbor.ext_address == solicit.ext_address)
        });

        let mut assigned = false;
        let allocated = if existing.is_some() {
            existing
        } else if solicit.reason == status::TOO_FEW_ROUTERS
            && self.routers.count() >= self.mle.router_upgrade_threshold as usize
        {
            None
        } else {
            let preferred = solicit.rloc16.map(router_id_from_rloc16);
            let now = self.now();
            let id = self.routers.allocate(preferred, now).ok();
            if let Some(router) = id.and_then(|id| self.routers.get_mut(id)) {
                router.neighbor.ext_address = solicit.ext_address;
                assigned = true;
            }
            id
        };

        let response = match allocated {
            Some(id) => {
                self.mle.router_last_seen[id as usize] = self.now();
                info!("mle: router id {} assigned to {}", id, solicit.ext_address);
                AddressSolicitResponse {
                    status: status::SUCCESS,
                    rloc16: Some(rloc16_from_router_id(id)),
                    router_mask: Some(RouterMask {
                        id_sequence: self.routers.id_sequence(),
                        mask: self.routers.mask(),
                    }),
                }
            }
            None => {
                info!("mle: no router id for {}", solicit.ext_address);
                AddressSolicitResponse {
                    status: status::NO_ADDRESS_AVAILABLE,
                    rloc16: None,
                    router_mask: None,
                }
            }
        };

        let mut payload = [0u8; 32];
        let len = response.emit(&mut payload)?;
        let reply = CoapMessage::response(request, Code::CHANGED, &payload[..len]);
        self.send_tmf(info.src, &reply)?;

        if assigned {
            self.notify(ChangedFlags::ROUTER_SET);
            self.reset_trickle();
        }
        Ok(())
    }

    pub(crate) fn handle_address_release(
        &mut self,
        request: &CoapMessage<'_>,
        info: &UdpInfo,
    ) -> Result<()> {
        if self.mle.role != Role::Leader {
            return Err(Error::Drop);
        }
        let release = AddressRelease::parse(request.payload)?;
        let id = router_id_from_rloc16(release.rloc16);
        if self.routers.get(id).is_some() && id != self.mle.router_id {
            self.release_router_id(id)?;
        }
        if request.typ == Type::Confirmable {
            let reply = CoapMessage::response(request, Code::CHANGED, &[]);
            self.send_tmf(info.src, &reply)?;
        }
        Ok(())
    }

    /// Router: give the Router ID back to the leader.
    pub(crate) fn send_address_release(&mut self) -> Result<()> {
        let release = AddressRelease {
            rloc16: self.mle.rloc16,
            ext_address: self.mac.ext_address,
        };
        let mut payload = [0u8; 16];
        let len = release.emit(&mut payload)?;
        let message_id = self.next_message_id();
        let request = CoapMessage::request(
            Type::NonConfirmable,
            Code::POST,
            message_id,
            &[],
            uri::ADDRESS_RELEASE,
            &payload[..len],
        )?;
        let dst = ip6::locator(&self.mesh_local_prefix, LEADER_ALOC16);
        self.send_tmf(dst, &request)
    }

    /// Leader: release a Router ID and the Network Data registered under it.
    pub fn release_router_id(&mut self, router_id: u8) -> Result<()> {
        if self.mle.role != Role::Leader {
            return Err(Error::Failed);
        }
        if router_id == self.mle.router_id {
            return Err(Error::InvalidArgs);
        }
        let now = self.now();
        self.routers.release(router_id, now)?;
        info!("mle: router id {} released", router_id);

        if self.leader.remove_rloc(rloc16_from_router_id(router_id), now) {
            self.apply_leader_network_data();
        }
        self.notify(ChangedFlags::ROUTER_SET);
        self.reset_trickle();
        Ok(())
    }

    /// Release the Router IDs of routers unreachable for longer than the
    /// network ID timeout. Returns how many were released.
    pub fn leader_age(&mut self) -> usize {
        if self.mle.role != Role::Leader {
            return 0;
        }
        let now = self.now();
        let timeout = self.mle.network_id_timeout();
        let mut expired: Vec<u8, { MAX_ROUTER_ID as usize + 1 }> = Vec::new();
        for id in self.routers.allocated_ids() {
            if id == self.mle.router_id {
                continue;
            }
            let last_seen = &mut self.mle.router_last_seen[id as usize];
            if self.routers.route_cost(id) < MAX_ROUTE_COST {
                *last_seen = now;
            } else if now.saturating_since(*last_seen) > timeout {
                let _ = expired.push(id);
            }
        }

        let mut released = 0;
        for id in expired {
            if self.release_router_id(id).is_ok() {
                released += 1;
            }
        }
        released
    }

    pub(crate) fn handle_server_data(
        &mut self,
        request: &CoapMessage<'_>,
        info: &UdpInfo,
    ) -> Result<()> {
        if self.mle.role != Role::Leader {
            return Err(Error::Drop);
        }
        let server = ServerData::parse(request.payload)?;
        let now = self.now();
        if self
            .leader
            .register_server_data(server.rloc16, &server.network_data, now)?
        {
            info!("mle: server data of {:04x} registered", server.rloc16);
            self.apply_leader_network_data();
        }
        if request.typ == Type::Confirmable {
            let reply = CoapMessage::response(request, Code::CHANGED, &[]);
            self.send_tmf(info.src, &reply)?;
        }
        Ok(())
    }

    /// Register the local server data with the leader.
    pub(crate) fn register_server_data(&mut self) -> Result<()> {
        match self.mle.role {
            Role::Leader => {
                let now = self.now();
                let rloc16 = self.mle.rloc16;
                if self
                    .leader
                    .register_server_data(rloc16, &self.local_network_data, now)?
                {
                    self.apply_leader_network_data();
                }
                Ok(())
            }
            Role::Router | Role::Child => {
                let server = ServerData {
                    rloc16: self.mle.rloc16,
                    network_data: self.local_network_data.clone(),
                };
                let mut payload = [0u8; 96];
                let len = server.emit(&mut payload)?;
                let message_id = self.next_message_id();
                let request = CoapMessage::request(
                    Type::NonConfirmable,
                    Code::POST,
                    message_id,
                    &[],
                    uri::SERVER_DATA,
                    &payload[..len],
                )?;
                let dst = ip6::locator(&self.mesh_local_prefix, LEADER_ALOC16);
                self.send_tmf(dst, &request)
            }
            // registered once attached
            Role::Disabled | Role::Detached => Ok(()),
        }
    }

    /// Publish the leader's Network Data to the partition.
    pub(crate) fn apply_leader_network_data(&mut self) {
        let leader_data = LeaderData {
            data_version: self.leader.version(),
            stable_data_version: self.leader.stable_version(),
            ..self.mle.leader_data
        };
        let network_data = self.leader.network_data().clone();
        self.set_network_data(network_data, leader_data);
        self.reset_trickle();
    }
}
