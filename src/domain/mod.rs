//! Domain layer: integration event payloads, payment value objects and the
//! ports through which the orchestrator reaches the bus and billing.

pub mod events;
pub mod payment;
pub mod ports;
pub mod response;
