//! Incoming path: MAC filtering and security, mesh forwarding and UDP
//! dispatch.

use rand_core::RngCore;

use crate::frame::{Address, CommandId, ExtAddress, Frame, FrameType, MAX_FRAME_LEN};
use crate::mac::{self, security, Admission};
use crate::mle::{Role, MLE_PORT};
use crate::net::lowpan::{self, LinkAddresses, MeshHeader};
use crate::radio::Radio;
use crate::settings::Settings;
use crate::timer::Alarm;
use crate::tmf::TMF_PORT;
use crate::topology::{self, is_router_rloc16};
use crate::{Error, Result};

use super::{ChangedFlags, Instance};

/// Header fields of a received frame.
struct RxHeader {
    frame_type: FrameType,
    secured: bool,
    frame_pending: bool,
    dst_pan_id: Option<u16>,
    dst: Address,
    src: Address,
    command: Option<CommandId>,
    header_len: usize,
    mic_len: usize,
}

impl RxHeader {
    fn parse(buffer: &[u8]) -> Result<Self> {
        let frame = Frame::new(buffer)?;
        let fc = frame.frame_control();
        let addressing = frame.addressing();
        let header = Self {
            frame_type: fc.frame_type(),
            secured: fc.security_enabled(),
            frame_pending: fc.frame_pending(),
            dst_pan_id: addressing.dst_pan_id(),
            dst: addressing.dst_address().unwrap_or(Address::Absent),
            src: addressing.src_address().unwrap_or(Address::Absent),
            command: frame.command_id(),
            header_len: frame.header_len(),
            mic_len: frame.mic_len(),
        };
        if header.header_len + header.mic_len > buffer.len() {
            return Err(Error::Parse);
        }
        Ok(header)
    }
}

impl<R: Radio, A: Alarm, S: Settings, G: RngCore> Instance<R, A, S, G> {
    /// Process a received frame (FCS excluded). Secured frames are
    /// decrypted in place.
    pub(crate) fn handle_frame(&mut self, buffer: &mut [u8], rssi: i8, _lqi: u8) {
        if self.mle.role == Role::Disabled {
            return;
        }
        self.mac.counters.rx_total += 1;
        if let Err(e) = self.receive_frame(buffer, rssi) {
            trace!("rx: frame dropped: {}", e);
        }
    }

    fn receive_frame(&mut self, buffer: &mut [u8], rssi: i8) -> Result<()> {
        let header = match RxHeader::parse(buffer) {
            Ok(header) => header,
            Err(e) => {
                self.mac.counters.rx_err_parse += 1;
                return Err(e);
            }
        };

        match header.frame_type {
            FrameType::MacCommand if header.command == Some(CommandId::BeaconRequest) => {
                self.mac.counters.rx_beacon_request += 1;
                return self.send_beacon();
            }
            FrameType::Data | FrameType::MacCommand => {}
            _ => {
                self.mac.counters.rx_other += 1;
                return Ok(());
            }
        }

        if !self.mac.accepts_destination(header.dst_pan_id, header.dst) {
            self.mac.counters.rx_dest_mismatch += 1;
            return Err(Error::Drop);
        }

        let ext = match header.src {
            Address::Extended(ext) => Some(ext),
            Address::Short(short) => self.neighbor_ext_by_rloc16(short),
            Address::Absent => None,
        };
        let rssi = match self.mac.allow_list.admit(ext.as_ref()) {
            Admission::Reject => {
                self.mac.counters.rx_filtered += 1;
                return Err(Error::Drop);
            }
            Admission::Accept(Some(fixed)) => fixed,
            Admission::Accept(None) => rssi,
        };
        let link_margin = mac::link_margin(rssi);

        if header.secured {
            self.unsecure(buffer, ext, link_margin)?;
        }

        if header.frame_type == FrameType::MacCommand {
            if header.command == Some(CommandId::DataRequest) && header.secured {
                self.mac.counters.rx_data_poll += 1;
                if let Some(ext) = ext {
                    return self.handle_data_poll(&ext);
                }
            }
            self.mac.counters.rx_other += 1;
            return Ok(());
        }

        if header.dst.is_broadcast() {
            self.mac.counters.rx_broadcast += 1;
        } else {
            self.mac.counters.rx_unicast += 1;
        }

        let end = buffer.len() - header.mic_len;
        let payload = &mut buffer[header.header_len..end];
        let (link, offset) = match MeshHeader::parse(payload)? {
            Some(mesh) if mesh.final_destination != self.mle.rloc16 => {
                return self.forward_mesh(&mesh, header.secured, &payload[MeshHeader::LEN..]);
            }
            Some(mesh) => (
                LinkAddresses {
                    src: Address::Short(mesh.originator),
                    dst: Address::Short(mesh.final_destination),
                },
                MeshHeader::LEN,
            ),
            None => (
                LinkAddresses {
                    src: header.src,
                    dst: header.dst,
                },
                0,
            ),
        };

        let datagram = &mut payload[offset..];
        let (mut info, udp_offset) = lowpan::decompress(datagram, &link, &self.mesh_local_prefix)?;
        info.link_security = header.secured;
        if !self.netif.accepts(&info.dst) {
            self.mac.counters.rx_dest_mismatch += 1;
            return Err(Error::Drop);
        }

        let udp_payload = &mut datagram[udp_offset..];
        match info.dst_port {
            MLE_PORT => {
                let ext = ext.ok_or(Error::Drop)?;
                self.handle_mle(&info, udp_payload, ext, link_margin);
            }
            // everything else requires link security
            _ if !info.link_security => return Err(Error::Security),
            TMF_PORT => self.handle_tmf(&info, udp_payload),
            _ => {
                if let Some(receiver) = self.udp_receiver {
                    receiver(&info, udp_payload);
                }
            }
        }

        // the parent holds more frames for us
        if header.frame_pending
            && self.mle.role == Role::Child
            && ext.is_some_and(|e| self.is_parent(&e))
        {
            self.send_data_poll()?;
        }
        Ok(())
    }

    /// Authenticate and decrypt a secured frame from `ext`.
    fn unsecure(&mut self, buffer: &mut [u8], ext: Option<ExtAddress>, link_margin: u8) -> Result<()> {
        let Some(ext) = ext else {
            // secured frames are only accepted from known neighbors
            self.mac.counters.rx_err_security += 1;
            return Err(Error::Security);
        };
        let info = security::security_info(buffer)?;
        let key_sequence = match info
            .key_index
            .and_then(|index| self.keys.key_sequence_for_index(index))
        {
            Some(key_sequence) if self.keys.is_acceptable(key_sequence) => key_sequence,
            _ => {
                self.mac.counters.rx_err_security += 1;
                return Err(Error::Security);
            }
        };

        let check = self
            .valid_neighbor_mut(&ext)
            .map(|n| n.check_link_frame_counter(key_sequence, info.frame_counter));
        match check {
            None => {
                self.mac.counters.rx_err_security += 1;
                return Err(Error::Security);
            }
            Some(Err(e)) => {
                self.mac.counters.rx_duplicated += 1;
                return Err(e);
            }
            Some(Ok(())) => {}
        }

        let key = self.keys.keys(key_sequence)?.mac;
        if security::unsecure_frame(buffer, &key, &ext).is_err() {
            self.mac.counters.rx_err_security += 1;
            return Err(Error::Security);
        }

        let now = self.now();
        if let Some(neighbor) = self.valid_neighbor_mut(&ext) {
            neighbor.commit_link_frame_counter(key_sequence, info.frame_counter);
            neighbor.last_heard = now;
            neighbor.update_link_margin(link_margin);
        }
        if key_sequence > self.keys.key_sequence() {
            info!("mac: key sequence {} from {}", key_sequence, ext);
            self.keys.set_key_sequence(key_sequence)?;
            self.notify(ChangedFlags::KEY_SEQUENCE);
        }
        Ok(())
    }

    /// Relay a mesh-addressed frame one hop closer to its destination.
    fn forward_mesh(&mut self, mesh: &MeshHeader, secured: bool, rest: &[u8]) -> Result<()> {
        if !secured {
            return Err(Error::Security);
        }
        if !self.mle.role.is_router_or_leader() || mesh.hops_left == 0 {
            return Err(Error::Drop);
        }
        let next_hop = self.next_hop(mesh.final_destination).ok_or(Error::NoRoute)?;

        let mut buffer = [0u8; MAX_FRAME_LEN];
        let forwarded = MeshHeader {
            hops_left: mesh.hops_left - 1,
            ..*mesh
        };
        let offset = forwarded.emit(&mut buffer)?;
        let end = offset + rest.len();
        if end > buffer.len() {
            return Err(Error::NoBufs);
        }
        buffer[offset..end].copy_from_slice(rest);

        trace!(
            "rx: forwarding {:04x} -> {:04x} via {:04x}",
            mesh.originator, mesh.final_destination, next_hop
        );
        self.mac.counters.forwarded += 1;
        self.enqueue_frame(Address::Short(next_hop), true, &buffer[..end])
    }

    /// Parent: a sleepy child polled, hand it one held frame.
    fn handle_data_poll(&mut self, ext: &ExtAddress) -> Result<()> {
        let now = self.now();
        let Some(child) = self
            .children
            .find_by_ext_mut(ext)
            .filter(|c| c.neighbor.is_valid())
        else {
            return Err(Error::Drop);
        };
        child.neighbor.last_heard = now;
        let Some(message) = child.indirect.pop_front() else {
            return Ok(());
        };
        let more = !child.indirect.is_empty();

        let mut payload = [0u8; MAX_FRAME_LEN];
        let len = self.pool.read(&message, 0, &mut payload);
        let info = message.info;
        self.pool.free(message);
        self.transmit_data(info.peer, info.link_security, more, &payload[..len])
    }

    /// Extended address of the neighbor using `rloc16`.
    fn neighbor_ext_by_rloc16(&self, rloc16: u16) -> Option<ExtAddress> {
        if let Some(parent) = self.mle.parent.filter(|p| p.rloc16 == rloc16) {
            return Some(parent.ext_address);
        }
        if let Some(child) = self.children.find_by_rloc16(rloc16) {
            return Some(child.neighbor.ext_address);
        }
        if !is_router_rloc16(rloc16) {
            return None;
        }
        self.routers
            .get(topology::router_id_from_rloc16(rloc16))
            .filter(|r| r.neighbor.is_valid())
            .map(|r| r.neighbor.ext_address)
    }
}
