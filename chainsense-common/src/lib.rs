//! Common functionality shared among the chainsense crates.
//!
//! Most users will have no reason to depend on this crate directly, as it is re-exported by
//! `chainsense-node`.
#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs, missing_copy_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod atomic_cell;
pub use atomic_cell::AtomicCell;
pub mod commands;
pub mod constants;
pub mod event;
pub mod level;
pub mod role;
pub mod traits;

pub use commands::{CommandCode, CommandError, HostRequest};
pub use event::{EventError, TransitionEvent};
pub use level::Level;
pub use role::{PeripheralKind, RoleConfig};
