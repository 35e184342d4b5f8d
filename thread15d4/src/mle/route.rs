//! Distance-vector routing over Route64 TLVs.

use heapless::Vec;

use crate::config::MAX_ROUTE_COST;
use crate::topology::{RouterTable, INVALID_ROUTER_ID};

use super::tlv::{Route64, RouteEntry};

fn encode_cost(cost: u8) -> u8 {
    if cost >= MAX_ROUTE_COST {
        0
    } else {
        cost
    }
}

fn decode_cost(cost: u8) -> u8 {
    if cost == 0 {
        MAX_ROUTE_COST
    } else {
        cost
    }
}

/// Build the Route64 TLV advertised by router `own_id`.
pub fn build_route64(table: &RouterTable, own_id: u8) -> Route64 {
    let mut entries = Vec::new();
    for id in table.allocated_ids() {
        let entry = match table.get(id) {
            Some(_) if id == own_id => RouteEntry {
                router_id: id,
                link_quality_out: 0,
                link_quality_in: 0,
                cost: 1,
            },
            Some(router) if router.neighbor.is_valid() => RouteEntry {
                router_id: id,
                link_quality_out: router.link_quality_out,
                link_quality_in: router.neighbor.link_quality_in(),
                cost: encode_cost(table.route_cost(id)),
            },
            _ => RouteEntry {
                router_id: id,
                link_quality_out: 0,
                link_quality_in: 0,
                cost: encode_cost(table.route_cost(id)),
            },
        };
        // cannot overflow: one entry per Router ID
        let _ = entries.push(entry);
    }

    Route64 {
        id_sequence: table.id_sequence(),
        mask: table.mask(),
        entries,
    }
}

/// Fold the Route64 TLV advertised by neighbor `from` into the table.
/// Returns `true` when a next hop or cost changed.
pub fn apply_route64(table: &mut RouterTable, own_id: u8, from: u8, route: &Route64) -> bool {
    let mut changed = false;

    for entry in route.entries.iter() {
        let id = entry.router_id;

        if id == own_id {
            // the neighbor's view of frames it receives from us
            if let Some(neighbor) = table.get_mut(from) {
                neighbor.link_quality_out = entry.link_quality_in;
            }
            continue;
        }
        if id == from {
            continue;
        }

        let advertised = decode_cost(entry.cost);
        let via = advertised.saturating_add(table.link_cost(from));
        let current = table.route_cost(id);

        let Some(router) = table.get_mut(id) else {
            continue;
        };

        if router.next_hop == from {
            if router.cost != advertised {
                router.cost = advertised;
                if advertised >= MAX_ROUTE_COST {
                    router.next_hop = INVALID_ROUTER_ID;
                }
                changed = true;
            }
        } else if via < current && via < MAX_ROUTE_COST {
            router.next_hop = from;
            router.cost = advertised;
            changed = true;
        }
    }

    changed
}
