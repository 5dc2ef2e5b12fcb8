//! Cloud provider adapters.

pub mod aws;
pub mod cli;
pub mod credentials;
pub mod gcp;
pub mod keyfile;
