//! The Leader's copy of the Network Data.
//!
//! Routers register their server data with the Leader, which merges it into
//! the partition-wide Network Data, assigns 6LoWPAN contexts to on-mesh
//! prefixes and versions the result.

use crate::config::CONTEXT_ID_REUSE_DELAY;
use crate::net::Prefix;
use crate::time::{Duration, Instant};
use crate::Result;

use super::{BorderRouterConfig, BorderRouterFlags, ContextEntry, ExternalRouteConfig, NetworkData};

const MIN_CONTEXT_ID: u8 = 1;
const MAX_CONTEXT_ID: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextState {
    Free,
    InUse,
    Released(Instant),
}

#[derive(Debug, Clone, Copy)]
struct Contexts([ContextState; MAX_CONTEXT_ID as usize + 1]);

impl Contexts {
    fn new() -> Self {
        Self([ContextState::Free; MAX_CONTEXT_ID as usize + 1])
    }

    fn allocate(&mut self, now: Instant) -> Option<u8> {
        let delay = Duration::from_secs(CONTEXT_ID_REUSE_DELAY as i64);
        let id = (MIN_CONTEXT_ID..=MAX_CONTEXT_ID).find(|&id| match self.0[id as usize] {
            ContextState::Free => true,
            ContextState::InUse => false,
            ContextState::Released(at) => now.saturating_since(at) >= delay,
        })?;
        self.0[id as usize] = ContextState::InUse;
        Some(id)
    }

    /// Release the IDs no prefix of `data` uses anymore and claim the ones
    /// it does.
    fn sync(&mut self, data: &NetworkData, now: Instant) {
        let mut used = [false; MAX_CONTEXT_ID as usize + 1];
        for (_, context) in data.contexts() {
            used[context.context_id as usize] = true;
        }
        for (state, used) in self.0.iter_mut().zip(used) {
            match (*state, used) {
                (ContextState::InUse, false) => *state = ContextState::Released(now),
                (_, true) => *state = ContextState::InUse,
                _ => {}
            }
        }
    }
}

pub struct Leader {
    data: NetworkData,
    version: u8,
    stable_version: u8,
    contexts: Contexts,
}

impl Default for Leader {
    fn default() -> Self {
        Self::new()
    }
}

impl Leader {
    pub fn new() -> Self {
        Self {
            data: NetworkData::new(),
            version: 0,
            stable_version: 0,
            contexts: Contexts::new(),
        }
    }

    /// Start a new partition's Network Data with the given versions.
    pub fn reset(&mut self, version: u8, stable_version: u8) {
        self.data.clear();
        self.version = version;
        self.stable_version = stable_version;
        self.contexts = Contexts::new();
    }

    pub fn network_data(&self) -> &NetworkData {
        &self.data
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn stable_version(&self) -> u8 {
        self.stable_version
    }

    /// Replace everything `rloc16` registered with the entries of `server`.
    /// Returns `true` when the Network Data changed.
    pub fn register_server_data(
        &mut self,
        rloc16: u16,
        server: &NetworkData,
        now: Instant,
    ) -> Result<bool> {
        let mut data = self.data.retain_entries(false, |_, e| e.rloc16() != rloc16)?;
        for config in server.border_routers() {
            data.add_border_router(&BorderRouterConfig { rloc16, ..config })?;
        }
        for config in server.external_routes() {
            data.add_has_route(&ExternalRouteConfig { rloc16, ..config })?;
        }
        data.collapse()?;
        self.apply(data, now)
    }

    /// Remove the entries registered by `rloc16`, used when its router ID
    /// is released.
    pub fn remove_rloc(&mut self, rloc16: u16, now: Instant) -> bool {
        let mut data = self.data.clone();
        if !data.remove_rloc(rloc16) {
            return false;
        }
        self.apply(data, now).unwrap_or(false)
    }

    fn apply(&mut self, mut data: NetworkData, now: Instant) -> Result<bool> {
        let mut contexts = self.contexts;
        contexts.sync(&data, now);
        assign_contexts(&mut data, &mut contexts, now)?;

        self.contexts = contexts;
        if data == self.data {
            return Ok(false);
        }

        let stable_changed = data.stable()? != self.data.stable()?;
        self.data = data;
        self.version = self.version.wrapping_add(1);
        if stable_changed {
            self.stable_version = self.stable_version.wrapping_add(1);
        }
        debug!(
            "network data version {} stable {}",
            self.version, self.stable_version
        );
        Ok(true)
    }
}

fn assign_contexts(data: &mut NetworkData, contexts: &mut Contexts, now: Instant) -> Result<()> {
    let mut pending: heapless::Vec<(Prefix, bool), { MAX_CONTEXT_ID as usize }> = heapless::Vec::new();
    for prefix in data.prefixes().filter(|p| p.context().is_none()) {
        let mut on_mesh = prefix
            .border_routers()
            .filter(|(e, _)| e.flags.contains(BorderRouterFlags::ON_MESH))
            .peekable();
        if on_mesh.peek().is_none() {
            continue;
        }
        let stable = on_mesh.any(|(_, stable)| stable);
        if pending.push((prefix.prefix, stable)).is_err() {
            break;
        }
    }

    for (prefix, stable) in pending {
        let Some(context_id) = contexts.allocate(now) else {
            warn!("no free context for an on-mesh prefix");
            break;
        };
        let context = ContextEntry {
            context_id,
            compress: true,
            context_length: prefix.len(),
        };
        data.set_context(&prefix, &context, stable)?;
    }
    Ok(())
}
