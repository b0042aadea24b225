//! Single-step execution

pub mod invoker;

pub use invoker::{InvocationOutcome, StepInvoker};
