//! Scenario-based tests for bridge-steps

mod helpers;

mod cli_flow;
mod concurrency;
mod end_to_end;
