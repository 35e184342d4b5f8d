//! Compile-time configuration.
//!
//! The values below are generated by the build script and can be overridden
//! with `THREAD15D4_<NAME>` environment variables at build time.

include!(concat!(env!("OUT_DIR"), "/config.rs"));

/// Highest Router ID.
pub const MAX_ROUTER_ID: u8 = 62;

/// Route cost meaning "unreachable".
pub const MAX_ROUTE_COST: u8 = 16;

/// Parent Request timeout when only routers are asked.
pub const PARENT_REQUEST_ROUTER_TIMEOUT: Duration = Duration::from_ms(750);

/// Parent Request timeout when routers and REEDs are asked.
pub const PARENT_REQUEST_REED_TIMEOUT: Duration = Duration::from_ms(1250);

/// Time to wait for a Child ID Response.
pub const CHILD_ID_RESPONSE_TIMEOUT: Duration = Duration::from_ms(1250);

/// Period of the router state update timer.
pub const STATE_UPDATE_PERIOD: Duration = Duration::from_secs(1);

/// Maximum number of Link Request retransmissions.
pub const MAX_LINK_REQUEST_ATTEMPTS: u8 = 3;

/// Unanswered Child Update Requests before a child reattaches.
pub const MAX_CHILD_UPDATE_ATTEMPTS: u8 = 3;

/// Time to wait for an Address Solicit response.
pub const ADDRESS_SOLICIT_TIMEOUT: Duration = Duration::from_secs(3);

/// Refused or unanswered Address Solicits double the router selection
/// delay up to this many times.
pub const MAX_SOLICIT_BACKOFF_EXPONENT: u8 = 3;

/// Attach backoff starting value.
pub const ATTACH_BACKOFF_MIN: Duration = Duration::from_secs(1);

/// Routers without a valid link are kept this long before being dropped
/// from the local router table (non-leaders).
pub const MAX_NEIGHBOR_AGE: Duration = Duration::from_secs(100);

/// Maximum number of IPv6 addresses registered per child.
pub const MAX_CHILD_ADDRESSES: usize = 6;

/// Frames queued per sleepy child.
pub const MAX_INDIRECT_FRAMES: usize = 4;

/// Capacity of the allow-list.
pub const ALLOW_LIST_SIZE: usize = 32;
