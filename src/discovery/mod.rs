//! Module discovery
//!
//! A step module is a named unit that registers steps and at most one
//! pipeline into a [`DiscoveryContext`]. The [`ModuleCatalog`] maps module
//! paths to modules; [`discover`] loads a list of paths into a fresh context
//! and freezes the result.

use crate::core::{
    context::{Catalog, DiscoveryContext},
    error::{BridgeError, Result},
};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

/// A loadable unit of step definitions
pub trait StepModule: Send + Sync {
    /// Path the module is addressed by, e.g. `demos::etl`
    fn path(&self) -> &str;

    /// Register this module's steps and pipeline
    fn load(&self, ctx: &mut DiscoveryContext) -> Result<()>;
}

/// Loader function for [`FnModule`]
pub type ModuleLoader = fn(&mut DiscoveryContext) -> Result<()>;

/// A module backed by a plain function
pub struct FnModule {
    path: String,
    loader: ModuleLoader,
}

impl FnModule {
    pub fn new(path: impl Into<String>, loader: ModuleLoader) -> Self {
        Self {
            path: path.into(),
            loader,
        }
    }
}

impl StepModule for FnModule {
    fn path(&self) -> &str {
        &self.path
    }

    fn load(&self, ctx: &mut DiscoveryContext) -> Result<()> {
        (self.loader)(ctx)
    }
}

/// Every module the binary knows how to load
#[derive(Default)]
pub struct ModuleCatalog {
    modules: Vec<Box<dyn StepModule>>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, module: impl StepModule + 'static) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    pub fn with_fn(self, path: impl Into<String>, loader: ModuleLoader) -> Self {
        self.with_module(FnModule::new(path, loader))
    }

    pub fn get(&self, path: &str) -> Option<&dyn StepModule> {
        self.modules
            .iter()
            .find(|m| m.path() == path)
            .map(|m| m.as_ref())
    }

    pub fn paths(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.path()).collect()
    }
}

impl fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleCatalog")
            .field("modules", &self.paths())
            .finish()
    }
}

/// Load one module into `ctx`.
///
/// Unknown paths fail with `ModuleImportError`. Definition errors raised
/// while the module registers are passed through unchanged.
pub fn load_module(ctx: &mut DiscoveryContext, catalog: &ModuleCatalog, path: &str) -> Result<()> {
    let module = catalog
        .get(path)
        .ok_or_else(|| BridgeError::ModuleImportError {
            module: path.to_string(),
            reason: format!("no such module (known: {})", catalog.paths().join(", ")),
        })?;

    debug!("Loading module '{}'", path);
    ctx.enter_module(path);
    let result = module.load(ctx);
    ctx.leave_module();
    result
}

/// Run a full discovery pass over `paths`, in order. Repeated paths load once.
pub fn discover<S: AsRef<str>>(catalog: &ModuleCatalog, paths: &[S]) -> Result<Catalog> {
    let mut ctx = DiscoveryContext::new();
    let mut loaded = HashSet::new();

    for path in paths {
        let path = path.as_ref();
        if !loaded.insert(path) {
            debug!("Module '{}' already loaded, skipping", path);
            continue;
        }
        load_module(&mut ctx, catalog, path)?;
    }

    info!("Loaded {} module(s)", loaded.len());
    ctx.finish()
}
