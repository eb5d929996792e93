//! Process-local adapters for the bus and billing ports.

pub mod in_memory_billing;
pub mod in_memory_bus;
