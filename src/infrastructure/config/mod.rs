//! Infrastructure configuration modules.

pub mod chain;
pub mod cloud;
pub mod gate;
pub mod host;
pub mod logging;
pub mod settings;
