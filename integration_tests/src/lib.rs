pub mod sim_chain;
pub mod utils;

pub mod prelude {
    pub use super::sim_chain::{InjectedFault, SimChain};
    pub use super::utils::{run_for, run_until, run_with_host, RecordingLine, SimHost};
    pub use chainsense_common::{
        constants::{values::STATUS_IDLE, EVENT_QUEUE_SIZE, MAX_NODES},
        CommandCode, Level, PeripheralKind, RoleConfig, TransitionEvent,
    };
    pub use chainsense_node::{
        BridgeState, Controller, EngineState, EventQueue, EventStore, HostMbox,
    };
}

