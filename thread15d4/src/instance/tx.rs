//! Outgoing path: route resolution, 6LoWPAN encapsulation, the send queue
//! and MAC frame construction.

use core::net::Ipv6Addr;

use rand_core::RngCore;

use crate::frame::{Address, CommandId, Frame, FrameBuilder, FrameRepr, KeyIdentifier};
use crate::frame::{SecurityLevel, MAX_FRAME_LEN};
use crate::key_manager;
use crate::mac::security;
use crate::mac::ThreadBeacon;
use crate::message::{MessageInfo, Priority};
use crate::mle::{Role, MLE_PORT};
use crate::net::ip6::{self, UdpInfo, LEADER_ALOC16};
use crate::net::lowpan::{self, LinkAddresses, MeshHeader, MAX_HOPS};
use crate::radio::{Radio, TxError};
use crate::settings::Settings;
use crate::timer::Alarm;
use crate::tmf::TMF_PORT;
use crate::topology::{self, INVALID_RLOC16};
use crate::{Error, Result};

use super::Instance;

/// Where a datagram goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    /// One of our own addresses.
    Local,
    /// A neighbor, or every neighbor for a broadcast.
    Link(Address),
    /// A node of the partition, by RLOC16.
    Mesh(u16),
}

impl<R: Radio, A: Alarm, S: Settings, G: RngCore> Instance<R, A, S, G> {
    pub(crate) fn resolve(&self, destination: &Ipv6Addr) -> Result<Route> {
        if self.netif.has_unicast(destination) {
            return Ok(Route::Local);
        }
        if destination.is_multicast() {
            return Ok(Route::Link(Address::BROADCAST));
        }
        if ip6::is_link_local(destination) {
            let iid = ip6::iid(destination);
            let locator = ip6::locator_iid(0);
            return Ok(Route::Link(if iid[..6] == locator[..6] {
                Address::Short(u16::from_be_bytes([iid[6], iid[7]]))
            } else {
                Address::Extended(ip6::ext_from_iid(&iid))
            }));
        }

        let rloc16 = if let Some(locator16) = ip6::locator16(&self.mesh_local_prefix, destination)
        {
            match locator16 {
                LEADER_ALOC16 => {
                    topology::rloc16_from_router_id(self.mle.leader_data.leader_router_id)
                }
                l if ip6::is_aloc16(l) => return Err(Error::NoRoute),
                l => l,
            }
        } else if let Some(child) = self.children.find_by_ip6(destination) {
            child.rloc16()
        } else if ip6::is_mesh_local(&self.mesh_local_prefix, destination) {
            // mesh-local EIDs of non-neighbors would need an address query
            return Err(Error::NoRoute);
        } else {
            self.network_data
                .route_lookup(destination, |rloc16| self.route_cost(rloc16))
                .ok_or(Error::NoRoute)?
        };

        if !self.mle.role.is_attached() || self.mle.rloc16 == INVALID_RLOC16 {
            return Err(Error::NoRoute);
        }
        if rloc16 == self.mle.rloc16 {
            return Ok(Route::Local);
        }
        Ok(Route::Mesh(rloc16))
    }

    /// Send a UDP datagram. MLE messages pass `link_security: false`.
    pub(crate) fn send_datagram(&mut self, info: &UdpInfo, payload: &[u8]) -> Result<()> {
        if self.mle.role == Role::Disabled {
            return Err(Error::NotReceiving);
        }
        self.store_frame_counters_if_needed();

        let secure = info.link_security;
        let mut buffer = [0u8; MAX_FRAME_LEN];
        match self.resolve(&info.dst)? {
            Route::Local => {
                self.deliver_local(info, payload);
                Ok(())
            }
            Route::Link(peer) => {
                let link = LinkAddresses {
                    src: self.mac_source(peer, secure),
                    dst: peer,
                };
                let len = lowpan::compress(info, &link, &self.mesh_local_prefix, payload, &mut buffer)?;
                self.enqueue_frame(peer, secure, &buffer[..len])
            }
            Route::Mesh(destination) => {
                let next_hop = self.next_hop(destination).ok_or(Error::NoRoute)?;
                let peer = Address::Short(next_hop);
                let (link, offset) = if next_hop == destination {
                    let link = LinkAddresses {
                        src: self.mac_source(peer, secure),
                        dst: peer,
                    };
                    (link, 0)
                } else {
                    let mesh = MeshHeader {
                        hops_left: MAX_HOPS,
                        originator: self.mle.rloc16,
                        final_destination: destination,
                    };
                    let offset = mesh.emit(&mut buffer)?;
                    let link = LinkAddresses {
                        src: Address::Short(self.mle.rloc16),
                        dst: Address::Short(destination),
                    };
                    (link, offset)
                };
                let len = lowpan::compress(
                    info,
                    &link,
                    &self.mesh_local_prefix,
                    payload,
                    &mut buffer[offset..],
                )?;
                trace!(
                    "tx: {} via {:04x} to {:04x}",
                    info.dst, next_hop, destination
                );
                self.enqueue_frame(peer, secure, &buffer[..offset + len])
            }
        }
    }

    fn deliver_local(&mut self, info: &UdpInfo, payload: &[u8]) {
        match info.dst_port {
            TMF_PORT => self.handle_tmf(info, payload),
            MLE_PORT => {}
            _ => {
                if let Some(receiver) = self.udp_receiver {
                    receiver(info, payload);
                }
            }
        }
    }

    /// MAC source address of a frame to `peer`: the extended address for
    /// unsecured frames and extended peers, otherwise the short address
    /// when we have one.
    pub(crate) fn mac_source(&self, peer: Address, secure: bool) -> Address {
        self.mac
            .src_address(!secure || matches!(peer, Address::Extended(_)))
    }

    /// Queue a MAC payload. Frames to sleepy children wait for their next
    /// data poll.
    pub(crate) fn enqueue_frame(&mut self, peer: Address, secure: bool, bytes: &[u8]) -> Result<()> {
        let info = MessageInfo {
            priority: Priority::Normal,
            link_security: secure,
            peer,
        };
        let mut message = self.pool.allocate(info)?;
        if let Err(e) = self.pool.append(&mut message, bytes) {
            self.pool.free(message);
            return Err(e);
        }

        let sleepy_child = if self.mle.role.is_router_or_leader() {
            let child = match peer {
                Address::Short(rloc16) => self.children.find_by_rloc16_mut(rloc16),
                Address::Extended(ext) => self.children.find_by_ext_mut(&ext),
                Address::Absent => None,
            };
            child.filter(|c| c.neighbor.is_valid() && !c.is_rx_on_when_idle())
        } else {
            None
        };

        let result = match sleepy_child {
            Some(child) => {
                trace!("tx: frame for sleepy child {:04x} held", child.rloc16());
                child.indirect.push_back(message)
            }
            None => {
                let result = self.send_queue.push_back(message);
                if result.is_ok() {
                    self.post_send_messages();
                }
                result
            }
        };
        if let Err(message) = result {
            self.pool.free(message);
            return Err(Error::NoBufs);
        }
        Ok(())
    }

    /// Transmit every queued frame.
    pub(crate) fn send_messages(&mut self) {
        let mut payload = [0u8; MAX_FRAME_LEN];
        while let Some(message) = self.send_queue.pop_front() {
            let len = self.pool.read(&message, 0, &mut payload);
            let info = message.info;
            self.pool.free(message);
            if let Err(e) = self.transmit_data(info.peer, info.link_security, false, &payload[..len]) {
                debug!("tx: frame to {:?} failed: {}", info.peer, e);
            }
        }
    }

    /// Build, secure and transmit a data frame.
    pub(crate) fn transmit_data(
        &mut self,
        peer: Address,
        secure: bool,
        frame_pending: bool,
        payload: &[u8],
    ) -> Result<()> {
        let src = self.mac_source(peer, secure);
        let mut builder = FrameBuilder::new_data(payload)
            .set_sequence_number(self.mac.next_sequence())
            .set_dst_pan_id(self.mac.pan_id)
            .set_dst_address(peer)
            .set_src_address(src)
            .set_ack_request(!peer.is_broadcast())
            .set_frame_pending(frame_pending);
        if secure {
            let key_index = key_manager::key_index(self.keys.key_sequence());
            let frame_counter = self.keys.next_mac_frame_counter();
            builder = builder.set_security(
                SecurityLevel::EncMic32,
                KeyIdentifier::Index(key_index),
                frame_counter,
            );
        }
        let repr = match builder.finalize() {
            Ok(repr) => repr,
            Err(_) => {
                // the only check a data frame we build can fail is its size
                self.mac.counters.tx_err_too_long += 1;
                return Err(Error::NoBufs);
            }
        };
        self.transmit_repr(&repr, secure)
    }

    fn transmit_repr(&mut self, repr: &FrameRepr<'_>, secure: bool) -> Result<()> {
        let len = repr.buffer_len();
        if len > MAX_FRAME_LEN {
            self.mac.counters.tx_err_too_long += 1;
            return Err(Error::NoBufs);
        }
        let mut buffer = [0u8; MAX_FRAME_LEN];
        repr.emit(&mut Frame::new_unchecked(&mut buffer[..len]));
        if secure {
            let key = self.keys.current_keys().mac;
            security::secure_frame(&mut buffer[..len], &key, &self.mac.ext_address)?;
        }

        let frame = Frame::new_unchecked(&buffer[..len]);
        let dst = frame.addressing().dst_address().unwrap_or(Address::Absent);
        let ack_request = frame.frame_control().ack_request();

        let counters = &mut self.mac.counters;
        counters.tx_total += 1;
        if dst.is_broadcast() || dst == Address::Absent {
            counters.tx_broadcast += 1;
        } else {
            counters.tx_unicast += 1;
        }
        if ack_request {
            counters.tx_ack_requested += 1;
        }

        match self.radio.transmit(&buffer[..len]) {
            Ok(()) => {
                if ack_request {
                    self.mac.counters.tx_acked += 1;
                }
                Ok(())
            }
            Err(TxError::CcaFailed) => {
                self.mac.counters.tx_err_cca += 1;
                Err(Error::Busy)
            }
            Err(TxError::AckFailed) => {
                self.mac.counters.tx_err_ack += 1;
                Err(Error::Failed)
            }
        }
    }

    /// Child: ask the parent for a frame it holds for us.
    pub(crate) fn send_data_poll(&mut self) -> Result<()> {
        if self.mle.role != Role::Child {
            return Err(Error::Failed);
        }
        let parent = self.mle.parent.ok_or(Error::Failed)?;
        let key_index = key_manager::key_index(self.keys.key_sequence());
        let frame_counter = self.keys.next_mac_frame_counter();
        let repr = FrameBuilder::new_command(CommandId::DataRequest, &[])
            .set_sequence_number(self.mac.next_sequence())
            .set_dst_pan_id(self.mac.pan_id)
            .set_dst_address(Address::Short(parent.rloc16))
            .set_src_address(self.mac.src_address(false))
            .set_ack_request(true)
            .set_security(
                SecurityLevel::EncMic32,
                KeyIdentifier::Index(key_index),
                frame_counter,
            )
            .finalize()?;
        self.mac.counters.tx_data_poll += 1;
        trace!("tx: data poll to {:04x}", parent.rloc16);
        self.transmit_repr(&repr, true)
    }

    /// Answer a beacon request with a Thread beacon.
    pub(crate) fn send_beacon(&mut self) -> Result<()> {
        let beacon = ThreadBeacon {
            version: crate::mac::beacon::PROTOCOL_VERSION,
            joinable: false,
            network_name: self.network_name,
            extended_pan_id: self.extended_pan_id,
        };
        let mut thread_payload = [0u8; crate::mac::beacon::BEACON_PAYLOAD_LEN];
        let len = beacon.emit(&mut thread_payload)?;

        let mut payload = [0u8; crate::mac::beacon::BEACON_PAYLOAD_LEN + 4];
        let pan_coordinator = self.mle.role == Role::Leader;
        let len = crate::frame::emit_beacon(&mut payload, false, pan_coordinator, &thread_payload[..len])?;

        let repr = FrameBuilder::new_beacon(&payload[..len])
            .set_sequence_number(self.mac.next_sequence())
            .set_src_pan_id(self.mac.pan_id)
            .set_src_address(Address::Extended(self.mac.ext_address))
            .finalize()?;
        self.mac.counters.tx_beacon += 1;
        self.transmit_repr(&repr, false)
    }
}
