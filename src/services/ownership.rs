//! Owner-reference management.
//!
//! Forward edges (tenant controls every child object) drive provisioning and
//! cascade cleanup of children. The backward edge (tenant owned by its
//! boundary) makes the store collect the tenant record when the boundary is
//! deleted out-of-band.

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Namespace, ObjectKind, ObjectMeta, OwnerReference, Tenant};

/// Build the controller reference a tenant puts on its children.
pub fn controller_reference(owner: &Tenant) -> DomainResult<OwnerReference> {
    let uid = owner
        .metadata
        .uid
        .clone()
        .ok_or_else(|| DomainError::OwnerWithoutUid(owner.name().to_string()))?;

    Ok(OwnerReference {
        api_version: Tenant::API_VERSION.to_string(),
        kind: Tenant::KIND.to_string(),
        name: owner.name().to_string(),
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

/// Make `owner` the controller of the object described by `meta`.
///
/// Refreshes an existing reference to the same owner in place; refuses to
/// steal an object controlled by someone else.
pub fn set_controller_reference<K: ObjectKind>(owner: &Tenant, meta: &mut ObjectMeta) -> DomainResult<()> {
    let wanted = controller_reference(owner)?;

    if let Some(existing) = meta.controller_reference() {
        let same_owner = existing.kind == wanted.kind && existing.name == wanted.name;
        if !same_owner {
            return Err(DomainError::AlreadyOwned {
                kind: K::KIND,
                key: meta.key().to_string(),
                owner: format!("{} {}", existing.kind, existing.name),
            });
        }
    }

    match meta
        .owner_references
        .iter_mut()
        .find(|r| r.kind == wanted.kind && r.name == wanted.name)
    {
        Some(existing) => *existing = wanted,
        None => meta.owner_references.push(wanted),
    }
    Ok(())
}

/// Ensure the tenant carries a back-reference to its boundary's current uid.
///
/// Returns `true` when the tenant's owner references were changed and the
/// tenant must be persisted.
pub fn link_ownership(tenant: &mut Tenant, boundary: &Namespace) -> DomainResult<bool> {
    let uid = boundary
        .metadata
        .uid
        .clone()
        .ok_or_else(|| DomainError::OwnerWithoutUid(boundary.metadata.name.clone()))?;

    let refs = &mut tenant.metadata.owner_references;
    if let Some(existing) = refs
        .iter_mut()
        .find(|r| r.kind == Namespace::KIND && r.name == boundary.metadata.name)
    {
        if existing.uid == uid {
            return Ok(false);
        }
        existing.uid = uid;
        return Ok(true);
    }

    refs.push(OwnerReference {
        api_version: Namespace::API_VERSION.to_string(),
        kind: Namespace::KIND.to_string(),
        name: boundary.metadata.name.clone(),
        uid,
        controller: None,
        block_owner_deletion: None,
    });
    Ok(true)
}
