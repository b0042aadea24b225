//! Built-in step modules
//!
//! These double as the modules the `bridge` binary can load and as fixtures
//! for the integration tests.

pub mod alerting;
pub mod etl;
pub mod example;
pub mod webhooks;

use crate::discovery::ModuleCatalog;

/// Every built-in module, addressed as `demos::<name>`
pub fn catalog() -> ModuleCatalog {
    ModuleCatalog::new()
        .with_fn("demos::example", example::register)
        .with_fn("demos::etl", etl::register)
        .with_fn("demos::webhooks", webhooks::register)
        .with_fn("demos::alerting", alerting::register)
}
