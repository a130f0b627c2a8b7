//! Static RPC method permission catalog.
//!
//! A method not listed here defaults to [`PermissionLevel::Admin`] —
//! default-deny for anything new rather than accidentally granting it a
//! weaker level.

use std::collections::HashMap;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionLevel {
    Read,
    Execute,
    Admin,
}

static CATALOG: LazyLock<HashMap<&'static str, PermissionLevel>> = LazyLock::new(|| {
    HashMap::from([
        ("system.info", PermissionLevel::Read),
        ("system.exec", PermissionLevel::Admin),
        ("docker.containers.list", PermissionLevel::Read),
        ("docker.containers.start", PermissionLevel::Execute),
        ("docker.containers.stop", PermissionLevel::Execute),
        ("docker.containers.remove", PermissionLevel::Admin),
    ])
});

pub fn method_permission(method: &str) -> PermissionLevel {
    CATALOG
        .get(method)
        .copied()
        .unwrap_or(PermissionLevel::Admin)
}
