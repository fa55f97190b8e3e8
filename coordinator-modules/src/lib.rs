//! Runtime pieces around the `coordinator` core: an in-process consensus
//! store for local clusters and tests, and the HTTP API of a server.

#[macro_use]
extern crate log;

pub mod api;
mod store;

pub use api::{router, LeaderInfo, MemberInfo, MemberList, STORE_REQUEST_TIMEOUT};
pub use store::{MemoryStore, MemoryStoreClient};
