//! Stable identifiers for steps and pipelines
//!
//! A caller may pin an identifier so that renaming a step or pipeline keeps
//! its identity downstream. Otherwise one is derived from the name with
//! UUIDv5 under a fixed namespace, so the same name always maps to the same id.

use crate::core::error::{BridgeError, Result};
use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

/// Namespace for derived identifiers. Changing it changes every derived id.
pub const STABLE_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93d7_5b80_a1e4_0c2d_7f5b_3e91);

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*$").expect("valid name pattern"));

/// What kind of entity an identifier belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Step,
    Pipeline,
}

impl EntityKind {
    fn label(self) -> &'static str {
        match self {
            EntityKind::Step => "step",
            EntityKind::Pipeline => "pipeline",
        }
    }

    pub(crate) fn subject(self, name: &str) -> String {
        format!("{} '{}'", self.label(), name)
    }
}

/// Derive the identifier used when none was supplied
pub fn derive_stable_id(kind: EntityKind, name: &str) -> Uuid {
    Uuid::new_v5(
        &STABLE_ID_NAMESPACE,
        format!("{}:{}", kind.label(), name).as_bytes(),
    )
}

/// Use the supplied identifier if present, otherwise derive one
pub fn resolve_stable_id(kind: EntityKind, name: &str, supplied: Option<&str>) -> Result<Uuid> {
    match supplied {
        Some(raw) => Uuid::parse_str(raw.trim()).map_err(|e| BridgeError::InvalidOption {
            subject: kind.subject(name),
            reason: format!("stable id '{}' is not a UUID: {}", raw, e),
        }),
        None => Ok(derive_stable_id(kind, name)),
    }
}

/// Names are identifiers: a letter or underscore, then letters, digits, `_` or `-`
pub fn validate_name(kind: EntityKind, name: &str) -> Result<()> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(BridgeError::InvalidOption {
            subject: kind.subject(name),
            reason: "names must start with a letter or '_' and contain only letters, digits, '_' or '-'"
                .to_string(),
        })
    }
}
