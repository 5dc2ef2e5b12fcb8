//! Infrastructure layer.
//!
//! Provides technical concerns that support the application without containing
//! business logic: configuration loading, wiring adapters into services, and
//! the operator surface the CLI talks to.
//!
//! # Submodules
//!
//! - [`bootstrap`] - Composition root for runtime wiring
//! - [`config`] - Configuration loading and validation
//! - [`operator`] - CLI operator interface

pub mod bootstrap;
pub mod config;
pub mod operator;
