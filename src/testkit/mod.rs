//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`clock`]: `ManualClock`, virtual time for gates and polling.
//! - [`cloud`]: `FakeCloud`, an in-memory cloud account with failure injection.
//! - [`chain`]: `FakeChain`, validator sets and deployments in memory.
//! - [`fleet`]: `FakeFleet`, simulated hosts answering the remote port.
//! - [`store`]: `MemoryStore` and `MemoryVault`.
//! - [`domain`]: Builders for hosts, specs and plans, plus `RecordingNotifier`.
//! - [`rig`]: A `Wizard` wired to all of the above.

pub mod chain;
pub mod clock;
pub mod cloud;
pub mod domain;
pub mod fleet;
pub mod rig;
pub mod store;
