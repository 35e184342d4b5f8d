//! Thread Management Framework: CoAP requests between nodes of a partition
//! on UDP port [`TMF_PORT`].

use core::net::Ipv6Addr;

use rand_core::RngCore;

use crate::instance::Instance;
use crate::net::ip6::{self, UdpInfo, LEADER_ALOC16};
use crate::radio::Radio;
use crate::settings::Settings;
use crate::timer::Alarm;
use crate::{Error, Result};

pub mod address;
pub mod coap;

use coap::{CoapMessage, Code, Type};

pub const TMF_PORT: u16 = 19789;

/// Largest TMF message this node builds.
const TMF_BUFFER_LEN: usize = 112;

pub(crate) mod tlv_type {
    pub const EXT_MAC_ADDRESS: u8 = 1;
    pub const RLOC16: u8 = 2;
    pub const STATUS: u8 = 4;
    pub const ROUTER_MASK: u8 = 7;
    pub const NETWORK_DATA: u8 = 10;
}

/// URI paths of the requests handled here.
pub mod uri {
    pub const ADDRESS_SOLICIT: &str = "a/as";
    pub const ADDRESS_RELEASE: &str = "a/ar";
    pub const SERVER_DATA: &str = "a/sd";
}

impl<R: Radio, A: Alarm, S: Settings, G: RngCore> Instance<R, A, S, G> {
    pub(crate) fn handle_tmf(&mut self, info: &UdpInfo, payload: &[u8]) {
        let message = match CoapMessage::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                debug!("tmf: malformed message from {}: {}", info.src, e);
                return;
            }
        };

        let result = if message.code.is_request() {
            self.handle_tmf_request(info, &message)
        } else if message.typ == Type::Acknowledgment || message.typ == Type::NonConfirmable {
            self.handle_address_solicit_response(&message)
        } else {
            Err(Error::Drop)
        };
        if let Err(e) = result {
            debug!("tmf: message from {} dropped: {}", info.src, e);
        }
    }

    fn handle_tmf_request(&mut self, info: &UdpInfo, request: &CoapMessage<'_>) -> Result<()> {
        trace!("tmf: request {:?} from {}", request.uri_path(), info.src);
        match request.uri_path() {
            p if p == uri::ADDRESS_SOLICIT.as_bytes() => self.handle_address_solicit(request, info),
            p if p == uri::ADDRESS_RELEASE.as_bytes() => self.handle_address_release(request, info),
            p if p == uri::SERVER_DATA.as_bytes() => self.handle_server_data(request, info),
            _ => {
                if request.typ == Type::Confirmable {
                    let reply = CoapMessage::response(request, Code::NOT_FOUND, &[]);
                    self.send_tmf(info.src, &reply)?;
                }
                Err(Error::Drop)
            }
        }
    }

    /// Send a TMF message from our RLOC. Requests a leader addresses to its
    /// own ALOC are handled locally.
    pub(crate) fn send_tmf(&mut self, dst: Ipv6Addr, message: &CoapMessage<'_>) -> Result<()> {
        let src = ip6::locator(&self.mesh_local_prefix, self.mle.rloc16);
        let info = UdpInfo {
            src,
            dst,
            src_port: TMF_PORT,
            dst_port: TMF_PORT,
            hop_limit: 64,
            link_security: true,
        };

        let mut buffer = [0u8; TMF_BUFFER_LEN];
        let len = message.emit(&mut buffer)?;

        let leader_aloc = ip6::locator(&self.mesh_local_prefix, LEADER_ALOC16);
        if self.netif.accepts(&dst) && (dst == src || dst == leader_aloc) {
            self.handle_tmf(&info, &buffer[..len]);
            return Ok(());
        }
        self.send_datagram(&info, &buffer[..len])
    }
}
