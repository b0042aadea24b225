//! Test utility functions for bridge-steps

use bridge_steps::core::context::{Catalog, DiscoveryContext};
use bridge_steps::{demos, discover, BridgeError, StepInvoker};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Discover the given built-in modules
pub fn demo_catalog(modules: &[&str]) -> Catalog {
    discover(&demos::catalog(), modules).expect("demo modules should load")
}

/// Invoker over the given built-in modules
pub fn demo_invoker(modules: &[&str]) -> StepInvoker {
    StepInvoker::new(Arc::new(demo_catalog(modules)))
}

/// Run `declare` against a fresh context and finish it
pub fn finish_with<F>(declare: F) -> Result<Catalog, BridgeError>
where
    F: FnOnce(&mut DiscoveryContext) -> Result<(), BridgeError>,
{
    let mut ctx = DiscoveryContext::new();
    declare(&mut ctx)?;
    ctx.finish()
}

/// Project directory under the system temp dir, removed on drop
pub struct TempProject(PathBuf);

impl TempProject {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Deref for TempProject {
    type Target = Path;

    fn deref(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempProject {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// Fresh, empty project directory
pub fn temp_project() -> TempProject {
    let dir = std::env::temp_dir().join(format!("bridge-scenario-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    TempProject(dir)
}

/// Project directory with a `bridge.yaml` holding `config`
pub fn project_with_config(config: &str) -> TempProject {
    let dir = temp_project();
    std::fs::write(dir.join("bridge.yaml"), config).expect("bridge.yaml should be writable");
    dir
}

/// Assert the error is a `BridgeError` of the given kind
pub fn assert_kind(err: &BridgeError, kind: &str) {
    assert_eq!(err.kind(), kind, "unexpected error: {}", err);
}
