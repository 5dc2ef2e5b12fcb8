//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! ```text
//!                    ┌─────────────────────────┐
//!   CLI ──inbound──▶ │      Application        │ ──outbound──▶ cloud / ssh / chain / store
//!                    └─────────────────────────┘
//! ```

pub mod inbound;
pub mod outbound;
