//! Thread Network Data: on-mesh prefixes served by border routers, external
//! routes and 6LoWPAN contexts, with a stable subset.
//!
//! The data is kept in its wire form. Every mutation rebuilds the TLVs into
//! a fresh buffer and only replaces the current data when the rebuild
//! succeeded, so a failed operation leaves the data untouched.

pub mod leader;
pub mod tlv;

use core::net::Ipv6Addr;

use heapless::Vec;

use crate::config::MAX_NETWORK_DATA_BYTES;
use crate::net::Prefix;
use crate::{Error, Result};

pub use leader::Leader;
pub use tlv::{
    BorderRouterEntry, BorderRouterFlags, ContextEntry, HasRouteEntry, NetworkDataTlv,
    NetworkDataTlvs, PrefixTlv, RoutePreference,
};

use tlv::{tlv_type, BORDER_ROUTER_ENTRY_LEN, HAS_ROUTE_ENTRY_LEN};

/// An on-mesh prefix served by a border router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorderRouterConfig {
    pub prefix: Prefix,
    pub preference: RoutePreference,
    pub flags: BorderRouterFlags,
    pub stable: bool,
    pub rloc16: u16,
}

/// An external route offered by a border router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalRouteConfig {
    pub prefix: Prefix,
    pub preference: RoutePreference,
    pub stable: bool,
    pub rloc16: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    BorderRouter(BorderRouterEntry),
    HasRoute(HasRouteEntry),
}

impl Entry {
    fn rloc16(&self) -> u16 {
        match self {
            Entry::BorderRouter(e) => e.rloc16,
            Entry::HasRoute(e) => e.rloc16,
        }
    }

    fn typ(&self) -> u8 {
        match self {
            Entry::BorderRouter(_) => tlv_type::BORDER_ROUTER,
            Entry::HasRoute(_) => tlv_type::HAS_ROUTE,
        }
    }
}

struct Builder {
    out: Vec<u8, MAX_NETWORK_DATA_BYTES>,
}

impl Builder {
    fn new() -> Self {
        Self { out: Vec::new() }
    }

    fn raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.extend_from_slice(bytes).map_err(|_| Error::NoBufs)
    }

    /// Start a TLV whose length is filled in by [`end`](Self::end).
    fn begin(&mut self, typ: u8, stable: bool) -> Result<usize> {
        let start = self.out.len();
        self.raw(&[NetworkDataTlv::type_byte(typ, stable), 0])?;
        Ok(start)
    }

    fn end(&mut self, start: usize) {
        // at most MAX_NETWORK_DATA_BYTES - 2, which fits the length byte
        self.out[start + 1] = (self.out.len() - start - 2) as u8;
    }

    fn is_empty_since(&self, start: usize) -> bool {
        self.out.len() == start + 2
    }

    fn set_stable(&mut self, start: usize) {
        self.out[start] |= 1;
    }

    fn truncate(&mut self, start: usize) {
        self.out.truncate(start);
    }

    fn tlv(&mut self, typ: u8, stable: bool, value: &[u8]) -> Result<()> {
        let start = self.begin(typ, stable)?;
        self.raw(value)?;
        self.end(start);
        Ok(())
    }

    fn prefix(&mut self, domain_id: u8, prefix: &Prefix) -> Result<usize> {
        let start = self.begin(tlv_type::PREFIX, false)?;
        self.raw(&[domain_id, prefix.len()])?;
        self.raw(prefix.as_bytes())?;
        Ok(start)
    }

    fn finish(self) -> NetworkData {
        NetworkData { bytes: self.out }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NetworkData {
    bytes: Vec<u8, MAX_NETWORK_DATA_BYTES>,
}

impl NetworkData {
    pub const fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Parse Network Data received from the network.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        tlv::validate(bytes)?;
        Ok(Self {
            bytes: Vec::from_slice(bytes).map_err(|_| Error::Parse)?,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn tlvs(&self) -> NetworkDataTlvs<'_> {
        NetworkDataTlvs::new(&self.bytes)
    }

    pub fn prefixes(&self) -> impl Iterator<Item = PrefixTlv<'_>> {
        self.tlvs()
            .filter(|t| t.typ == tlv_type::PREFIX)
            .filter_map(|t| PrefixTlv::parse(t.value).ok())
    }

    fn find_prefix(&self, prefix: &Prefix) -> Option<PrefixTlv<'_>> {
        self.prefixes().find(|p| p.prefix == *prefix)
    }

    pub fn border_routers(&self) -> impl Iterator<Item = BorderRouterConfig> + '_ {
        self.prefixes().flat_map(|p| {
            p.border_routers().map(move |(e, stable)| BorderRouterConfig {
                prefix: p.prefix,
                preference: e.preference,
                flags: e.flags,
                stable,
                rloc16: e.rloc16,
            })
        })
    }

    pub fn external_routes(&self) -> impl Iterator<Item = ExternalRouteConfig> + '_ {
        self.prefixes().flat_map(|p| {
            p.has_routes().map(move |(e, stable)| ExternalRouteConfig {
                prefix: p.prefix,
                preference: e.preference,
                stable,
                rloc16: e.rloc16,
            })
        })
    }

    pub fn contexts(&self) -> impl Iterator<Item = (Prefix, ContextEntry)> + '_ {
        self.prefixes()
            .filter_map(|p| p.context().map(|c| (p.prefix, c)))
    }

    /// The stable subset: Prefix TLVs keep their stable sub-TLVs and are
    /// dropped when none remain; other TLVs are kept when stable.
    pub fn stable(&self) -> Result<NetworkData> {
        let mut b = Builder::new();
        for tlv in self.tlvs() {
            if tlv.typ != tlv_type::PREFIX {
                if tlv.stable {
                    b.tlv(tlv.typ, true, tlv.value)?;
                }
                continue;
            }
            let prefix = PrefixTlv::parse(tlv.value)?;
            let start = b.prefix(prefix.domain_id, &prefix.prefix)?;
            for sub in prefix.sub_tlvs().filter(|s| s.stable) {
                b.tlv(sub.typ, true, sub.value)?;
            }
            if b.is_empty_since(start + 2 + prefix.prefix.as_bytes().len()) {
                b.truncate(start);
            } else {
                b.set_stable(start);
                b.end(start);
            }
        }
        Ok(b.finish())
    }

    /// Rebuild keeping the Border Router and Has Route entries `keep`
    /// accepts. Emptied sub-TLVs are dropped. With `collapse`, a Prefix TLV
    /// left without any entry is dropped along with its context.
    fn retain_entries(
        &self,
        collapse: bool,
        mut keep: impl FnMut(&Prefix, &Entry) -> bool,
    ) -> Result<NetworkData> {
        let mut b = Builder::new();
        for tlv in self.tlvs() {
            if tlv.typ != tlv_type::PREFIX {
                b.tlv(tlv.typ, tlv.stable, tlv.value)?;
                continue;
            }
            let prefix = PrefixTlv::parse(tlv.value)?;

            let start = b.prefix(prefix.domain_id, &prefix.prefix)?;
            let (mut routes, mut others, mut stable) = (false, false, false);
            for sub in prefix.sub_tlvs() {
                let entry_len = match sub.typ {
                    tlv_type::BORDER_ROUTER => BORDER_ROUTER_ENTRY_LEN,
                    tlv_type::HAS_ROUTE => HAS_ROUTE_ENTRY_LEN,
                    _ => {
                        b.tlv(sub.typ, sub.stable, sub.value)?;
                        others = true;
                        stable |= sub.stable;
                        continue;
                    }
                };

                let sub_start = b.begin(sub.typ, sub.stable)?;
                for raw in sub.value.chunks_exact(entry_len) {
                    let entry = if sub.typ == tlv_type::BORDER_ROUTER {
                        Entry::BorderRouter(BorderRouterEntry::parse(raw)?)
                    } else {
                        Entry::HasRoute(HasRouteEntry::parse(raw)?)
                    };
                    if keep(&prefix.prefix, &entry) {
                        b.raw(raw)?;
                    }
                }
                if b.is_empty_since(sub_start) {
                    b.truncate(sub_start);
                } else {
                    b.end(sub_start);
                    routes = true;
                    stable |= sub.stable;
                }
            }

            if routes || (others && !collapse) {
                if stable {
                    b.set_stable(start);
                }
                b.end(start);
            } else {
                b.truncate(start);
            }
        }
        Ok(b.finish())
    }

    /// Rebuild with a sub-TLV added under `prefix`, creating the Prefix TLV
    /// when needed. With `merge`, the value is appended to an existing
    /// sub-TLV of the same type and stability; otherwise any sub-TLV of the
    /// same type is replaced.
    fn with_sub_tlv(
        &self,
        prefix: &Prefix,
        typ: u8,
        stable: bool,
        value: &[u8],
        merge: bool,
    ) -> Result<NetworkData> {
        let mut b = Builder::new();
        let mut done = false;

        for tlv in self.tlvs() {
            let parsed = match tlv.typ {
                tlv_type::PREFIX => PrefixTlv::parse(tlv.value).ok(),
                _ => None,
            };
            let Some(existing) = parsed.filter(|p| p.prefix == *prefix && !done) else {
                b.tlv(tlv.typ, tlv.stable, tlv.value)?;
                continue;
            };

            let start = b.prefix(existing.domain_id, prefix)?;
            let mut any_stable = stable;
            for sub in existing.sub_tlvs() {
                // sub-TLVs are kept ordered by type
                if !done && sub.typ > typ {
                    b.tlv(typ, stable, value)?;
                    done = true;
                }
                if sub.typ == typ && merge && sub.stable == stable && !done {
                    let sub_start = b.begin(typ, stable)?;
                    b.raw(sub.value)?;
                    b.raw(value)?;
                    b.end(sub_start);
                    done = true;
                } else if sub.typ == typ && !merge {
                    continue;
                } else {
                    b.tlv(sub.typ, sub.stable, sub.value)?;
                }
                any_stable |= sub.stable;
            }
            if !done {
                b.tlv(typ, stable, value)?;
                done = true;
            }
            if any_stable {
                b.set_stable(start);
            }
            b.end(start);
        }

        if !done {
            let start = b.prefix(0, prefix)?;
            b.tlv(typ, stable, value)?;
            if stable {
                b.set_stable(start);
            }
            b.end(start);
        }
        Ok(b.finish())
    }

    fn add_entry(&mut self, prefix: &Prefix, entry: Entry, stable: bool) -> Result<()> {
        if prefix.is_empty() {
            return Err(Error::InvalidArgs);
        }
        // an entry per router, prefix and type
        let cleaned = self.retain_entries(false, |p, e| {
            !(p == prefix && e.typ() == entry.typ() && e.rloc16() == entry.rloc16())
        })?;
        let updated = match entry {
            Entry::BorderRouter(e) => {
                cleaned.with_sub_tlv(prefix, tlv_type::BORDER_ROUTER, stable, &e.emit(), true)?
            }
            Entry::HasRoute(e) => {
                cleaned.with_sub_tlv(prefix, tlv_type::HAS_ROUTE, stable, &e.emit(), true)?
            }
        };
        *self = updated;
        Ok(())
    }

    /// Add an on-mesh prefix, reusing the Prefix TLV of the same prefix.
    pub fn add_border_router(&mut self, config: &BorderRouterConfig) -> Result<()> {
        let entry = BorderRouterEntry {
            rloc16: config.rloc16,
            preference: config.preference,
            flags: config.flags,
        };
        self.add_entry(&config.prefix, Entry::BorderRouter(entry), config.stable)
    }

    pub fn add_has_route(&mut self, config: &ExternalRouteConfig) -> Result<()> {
        let entry = HasRouteEntry {
            rloc16: config.rloc16,
            preference: config.preference,
        };
        self.add_entry(&config.prefix, Entry::HasRoute(entry), config.stable)
    }

    fn remove_entries(&mut self, prefix: &Prefix, typ: u8) -> Result<()> {
        let mut removed = false;
        let updated = self.retain_entries(true, |p, e| {
            let matches = p == prefix && e.typ() == typ;
            removed |= matches;
            !matches
        })?;
        if !removed {
            return Err(Error::NoAddress);
        }
        *self = updated;
        Ok(())
    }

    pub fn remove_border_router(&mut self, prefix: &Prefix) -> Result<()> {
        self.remove_entries(prefix, tlv_type::BORDER_ROUTER)
    }

    pub fn remove_has_route(&mut self, prefix: &Prefix) -> Result<()> {
        self.remove_entries(prefix, tlv_type::HAS_ROUTE)
    }

    /// Remove the Prefix TLV of `prefix` and everything under it.
    pub fn remove(&mut self, prefix: &Prefix) -> Result<()> {
        if self.find_prefix(prefix).is_none() {
            return Err(Error::NoAddress);
        }
        let mut b = Builder::new();
        for tlv in self.tlvs() {
            let is_target = tlv.typ == tlv_type::PREFIX
                && PrefixTlv::parse(tlv.value).is_ok_and(|p| p.prefix == *prefix);
            if !is_target {
                b.tlv(tlv.typ, tlv.stable, tlv.value)?;
            }
        }
        *self = b.finish();
        Ok(())
    }

    /// Remove every entry registered by `rloc16`. Returns `true` when
    /// something was removed.
    pub fn remove_rloc(&mut self, rloc16: u16) -> bool {
        let mut removed = false;
        let Ok(updated) = self.retain_entries(true, |_, e| {
            let matches = e.rloc16() == rloc16;
            removed |= matches;
            !matches
        }) else {
            return false;
        };
        if removed {
            *self = updated;
        }
        removed
    }

    /// Drop Prefix TLVs without any entry.
    pub(crate) fn collapse(&mut self) -> Result<()> {
        *self = self.retain_entries(true, |_, _| true)?;
        Ok(())
    }

    /// Assign a 6LoWPAN context to an existing prefix.
    pub fn set_context(&mut self, prefix: &Prefix, context: &ContextEntry, stable: bool) -> Result<()> {
        if self.find_prefix(prefix).is_none() {
            return Err(Error::NoAddress);
        }
        *self = self.with_sub_tlv(prefix, tlv_type::CONTEXT, stable, &context.emit(), false)?;
        Ok(())
    }

    /// The border router to send traffic for `destination` to: the
    /// external route with the longest matching prefix, then the highest
    /// preference, then the lowest `cost`. Border routers offering a
    /// default route serve destinations no external route covers.
    pub fn route_lookup(&self, destination: &Ipv6Addr, cost: impl Fn(u16) -> u8) -> Option<u16> {
        let mut best = None;
        for p in self.prefixes().filter(|p| p.prefix.contains(destination)) {
            for (route, _) in p.has_routes() {
                let candidate = (p.prefix.len(), route.preference, cost(route.rloc16), route.rloc16);
                pick(&mut best, candidate);
            }
        }
        if best.is_none() {
            for br in self.border_routers() {
                if br.flags.contains(BorderRouterFlags::DEFAULT_ROUTE) {
                    pick(&mut best, (0, br.preference, cost(br.rloc16), br.rloc16));
                }
            }
        }
        best.map(|(_, _, _, rloc16)| rloc16)
    }
}

type RouteCandidate = (u8, RoutePreference, u8, u16);

fn pick(best: &mut Option<RouteCandidate>, candidate: RouteCandidate) {
    let (len, preference, cost, _) = candidate;
    let better = match *best {
        None => true,
        Some((l, p, c, _)) => (len, preference) > (l, p) || ((len, preference) == (l, p) && cost < c),
    };
    if better {
        *best = Some(candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix(s: &str, len: u8) -> Prefix {
        Prefix::from_address(&s.parse().unwrap(), len).unwrap()
    }

    fn border_router(p: &str, rloc16: u16, stable: bool) -> BorderRouterConfig {
        BorderRouterConfig {
            prefix: prefix(p, 64),
            preference: RoutePreference::Medium,
            flags: BorderRouterFlags::ON_MESH | BorderRouterFlags::SLAAC,
            stable,
            rloc16,
        }
    }

    fn route(p: &str, len: u8, rloc16: u16, preference: RoutePreference) -> ExternalRouteConfig {
        ExternalRouteConfig {
            prefix: prefix(p, len),
            preference,
            stable: true,
            rloc16,
        }
    }

    #[test]
    fn add_reuses_prefix() {
        let mut data = NetworkData::new();
        data.add_border_router(&border_router("fd00:1::", 0x0400, true)).unwrap();
        assert_eq!(
            data.as_bytes(),
            &[
                0x03, 16, 0, 64, 0xfd, 0, 0, 1, 0, 0, 0, 0, // prefix
                0x05, 4, 0x04, 0x00, 0x11, 0x00, // border router
            ]
        );

        data.add_border_router(&border_router("fd00:1::", 0x0800, true)).unwrap();
        data.add_has_route(&route("fd00:1::", 64, 0x0800, RoutePreference::High)).unwrap();
        assert_eq!(data.prefixes().count(), 1);
        assert_eq!(data.border_routers().count(), 2);
        assert_eq!(data.external_routes().count(), 1);

        // re-adding replaces the router's entry
        let mut update = border_router("fd00:1::", 0x0400, true);
        update.preference = RoutePreference::Low;
        data.add_border_router(&update).unwrap();
        let entries: std::vec::Vec<_> = data.border_routers().collect();
        assert_eq!(entries.len(), 2);
        assert!(entries.contains(&update));
    }

    #[test]
    fn remove_collapses_prefixes() {
        let mut data = NetworkData::new();
        data.add_border_router(&border_router("fd00:1::", 0x0400, true)).unwrap();
        data.add_has_route(&route("2001:db8::", 32, 0x0400, RoutePreference::Medium)).unwrap();
        data.add_has_route(&route("2001:db8::", 32, 0x0800, RoutePreference::Medium)).unwrap();

        data.remove_border_router(&prefix("fd00:1::", 64)).unwrap();
        assert_eq!(data.prefixes().count(), 1);
        assert_eq!(
            data.remove_border_router(&prefix("fd00:1::", 64)),
            Err(Error::NoAddress)
        );

        assert!(data.remove_rloc(0x0400));
        assert!(!data.remove_rloc(0x0400));
        assert_eq!(data.external_routes().count(), 1);

        data.remove(&prefix("2001:db8::", 32)).unwrap();
        assert!(data.is_empty());
        assert_eq!(data.remove(&prefix("2001:db8::", 32)), Err(Error::NoAddress));
    }

    #[test]
    fn stable_projection() {
        let mut data = NetworkData::new();
        data.add_border_router(&border_router("fd00:1::", 0x0400, true)).unwrap();
        data.add_border_router(&border_router("fd00:1::", 0x0800, false)).unwrap();
        data.add_border_router(&border_router("fd00:2::", 0x0400, false)).unwrap();

        let stable = data.stable().unwrap();
        assert_eq!(stable.prefixes().count(), 1);
        let entries: std::vec::Vec<_> = stable.border_routers().collect();
        assert_eq!(entries, [border_router("fd00:1::", 0x0400, true)]);

        // projecting twice changes nothing
        assert_eq!(stable.stable().unwrap(), stable);
        // and the projection parses back
        assert_eq!(NetworkData::from_bytes(stable.as_bytes()).unwrap(), stable);
    }

    #[test]
    fn malformed_prefix_is_an_error() {
        // a Prefix TLV too short for its prefix length
        let bytes = [0x03, 3, 0, 64, 0xfd];
        assert_eq!(NetworkData::from_bytes(&bytes), Err(Error::Parse));

        let data = NetworkData {
            bytes: Vec::from_slice(&bytes).unwrap(),
        };
        assert_eq!(data.stable(), Err(Error::Parse));
        assert_eq!(data.prefixes().count(), 0);
    }

    #[test]
    fn contexts() {
        let mut data = NetworkData::new();
        let p = prefix("fd00:1::", 64);
        let context = ContextEntry {
            context_id: 1,
            compress: true,
            context_length: 64,
        };
        assert_eq!(data.set_context(&p, &context, true), Err(Error::NoAddress));

        data.add_border_router(&border_router("fd00:1::", 0x0400, false)).unwrap();
        data.set_context(&p, &context, true).unwrap();
        data.set_context(&p, &context, true).unwrap();
        assert_eq!(data.contexts().count(), 1);

        // the context keeps the prefix in the stable subset
        assert_eq!(data.stable().unwrap().contexts().next(), Some((p, context)));

        // until the last entry is removed
        assert!(data.remove_rloc(0x0400));
        assert!(data.is_empty());
    }

    #[test]
    fn out_of_room() {
        let mut data = NetworkData::new();
        let mut added = 0u16;
        loop {
            let config = ExternalRouteConfig {
                prefix: Prefix::new(&(0x2001_0000u32 + added as u32).to_be_bytes(), 32).unwrap(),
                preference: RoutePreference::Medium,
                stable: false,
                rloc16: 0x0400,
            };
            match data.add_has_route(&config) {
                Ok(()) => added += 1,
                Err(e) => {
                    assert_eq!(e, Error::NoBufs);
                    break;
                }
            }
        }
        let before = data.clone();
        assert!(data
            .add_border_router(&border_router("fd00:1::", 0x0400, true))
            .is_err());
        assert_eq!(data, before);
        assert_eq!(data.len(), added as usize * 13);
    }

    #[test]
    fn lookup() {
        let mut data = NetworkData::new();
        data.add_has_route(&route("2001:db8::", 32, 0x0400, RoutePreference::Medium)).unwrap();
        data.add_has_route(&route("2001:db8:1::", 48, 0x0800, RoutePreference::Low)).unwrap();
        data.add_has_route(&route("2001:db8::", 32, 0x0c00, RoutePreference::Medium)).unwrap();

        let cost = |rloc16: u16| if rloc16 == 0x0c00 { 1 } else { 3 };
        let lookup = |s: &str| data.route_lookup(&s.parse().unwrap(), cost);
        assert_eq!(lookup("2001:db8:1::1"), Some(0x0800));
        assert_eq!(lookup("2001:db8:2::1"), Some(0x0c00));
        assert_eq!(lookup("2002::1"), None);

        let mut default = border_router("fd00:1::", 0x1000, true);
        default.flags |= BorderRouterFlags::DEFAULT_ROUTE;
        data.add_border_router(&default).unwrap();
        assert_eq!(data.route_lookup(&"2002::1".parse().unwrap(), cost), Some(0x1000));
    }
}
