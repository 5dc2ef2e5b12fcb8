//! Outbound ports (driven side): interfaces implemented by outbound adapters.
//!
//! These contracts describe the collaborators the orchestrator drives: cloud
//! providers, remote hosts, the chain, persisted state, time and
//! notifications.

pub mod chain;
pub mod clock;
pub mod cloud;
pub mod notifier;
pub mod remote;
pub mod store;
