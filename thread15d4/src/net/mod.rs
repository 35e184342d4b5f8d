//! IPv6 over the mesh: addressing helpers, header compression and the
//! network interface.

pub mod ip6;
pub mod lowpan;
pub mod netif;

pub use ip6::{Prefix, UdpInfo};
pub use netif::{AddressOrigin, Netif, NetifAddress};
