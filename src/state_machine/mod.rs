// State machine module for sequence entities
//
// Every runnable node (item, container, trigger) owns one status cell and drives
// it through the transitions defined here.

pub mod entity_state_machine;
pub mod errors;
pub mod events;
pub mod states;

// Re-export main types for convenient access
pub use entity_state_machine::EntityStateMachine;
pub use errors::{StateMachineError, StateMachineResult};
pub use events::EntityEvent;
pub use states::EntityStatus;
