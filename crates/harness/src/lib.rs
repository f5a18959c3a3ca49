pub mod client;
pub mod fixtures;
pub mod rig;

pub use client::TestClient;
pub use fixtures::{CountingStore, StaticAuth, StoreResolver, init_tracing};
pub use rig::TestRig;
