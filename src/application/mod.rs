//! Application layer containing the message-driven orchestration.
//!
//! This module defines the `TransactionOrchestrator`, which binds bus topics to
//! billing operations, and the `ExecutionScope` each handled message runs in.

pub mod orchestrator;
pub mod scope;
