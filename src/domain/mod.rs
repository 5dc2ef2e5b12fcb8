//! Cloud- and transport-agnostic domain model.

pub mod cluster;
pub mod error;
pub mod gate;
pub mod host;
pub mod id;
pub mod keys;
pub mod report;
pub mod result;
pub mod security;
pub mod stage;
pub mod subnet;
pub mod validator;
