//! Intermediate Representation (IR) for Forge-Bind
//!
//! This module provides the description model (interfaces, members,
//! extension flags) and the type registry the generator consults.

pub mod flags;
pub mod types;
pub mod interface;
pub mod module;
pub mod inventory;

pub use flags::*;
pub use types::*;
pub use interface::*;
pub use module::*;
pub use inventory::*;
