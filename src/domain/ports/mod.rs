//! Port definitions for external collaborators.

pub mod instance_manager;

pub use instance_manager::{
    InstanceManager, InstanceState, InstanceSummary, MessageAck, SendOptions,
};
