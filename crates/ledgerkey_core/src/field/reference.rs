//! Reference key components and owner resolution.

use crate::error::ResolutionError;
use crate::field::scalar::ScalarValue;
use parking_lot::RwLock;
use std::any::Any;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An entity that other keys can reference.
pub trait Owner: fmt::Debug + Send + Sync + 'static {
    /// Family tag of the owner (e.g. `"Cluster"`).
    fn type_tag(&self) -> &'static str;

    /// Scalar id other keys use to name this owner.
    fn owner_id(&self) -> ScalarValue;

    /// Downcasting hook for callers that know the concrete owner type.
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a resolved owner.
///
/// The owner belongs to its own store; a reference only borrows it.
pub type OwnerHandle = Arc<dyn Owner>;

/// Maps a scalar reference id to its owning entity.
///
/// Resolution is a pure lookup: calling it twice with the same arguments
/// yields the same answer as long as the owner's store is unchanged.
pub trait KeyResolver: Send + Sync {
    /// Looks up the owner of family `target` with id `id`.
    fn resolve(&self, target: &str, id: &ScalarValue) -> Option<OwnerHandle>;
}

impl<T: KeyResolver + ?Sized> KeyResolver for Arc<T> {
    fn resolve(&self, target: &str, id: &ScalarValue) -> Option<OwnerHandle> {
        (**self).resolve(target, id)
    }
}

/// A key component that names another entity by id.
///
/// Holds the target family and scalar id, plus the owner handle once
/// resolved. Equality, ordering and hashing look only at `(target, id)`, so
/// a resolved and an unresolved reference to the same owner are equal.
#[derive(Clone)]
pub struct ReferenceKeyField {
    target: &'static str,
    id: ScalarValue,
    owner: Option<OwnerHandle>,
}

impl ReferenceKeyField {
    /// A reference awaiting resolution.
    #[must_use]
    pub fn unresolved(target: &'static str, id: impl Into<ScalarValue>) -> Self {
        Self {
            target,
            id: id.into(),
            owner: None,
        }
    }

    /// A reference to an already-resolved owner.
    #[must_use]
    pub fn resolved(owner: OwnerHandle) -> Self {
        Self {
            target: owner.type_tag(),
            id: owner.owner_id(),
            owner: Some(owner),
        }
    }

    /// Target family tag.
    #[must_use]
    pub const fn target(&self) -> &'static str {
        self.target
    }

    /// Scalar id of the referenced owner.
    #[must_use]
    pub const fn id(&self) -> &ScalarValue {
        &self.id
    }

    /// The owner handle, if resolved.
    #[must_use]
    pub fn owner(&self) -> Option<&OwnerHandle> {
        self.owner.as_ref()
    }

    /// Whether an owner handle is attached.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.owner.is_some()
    }

    /// Returns the owner handle, resolving through `resolver` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::NotFound`] if the resolver has no owner for
    /// this id.
    pub fn resolve(&self, resolver: &dyn KeyResolver) -> Result<OwnerHandle, ResolutionError> {
        if let Some(owner) = &self.owner {
            return Ok(Arc::clone(owner));
        }
        resolver
            .resolve(self.target, &self.id)
            .ok_or_else(|| ResolutionError::not_found(self.target, &self.id))
    }

    /// Resolves and attaches the owner handle. A no-op when already resolved.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::NotFound`] if the owner cannot be found.
    pub fn resolve_in_place(&mut self, resolver: &dyn KeyResolver) -> Result<(), ResolutionError> {
        if self.owner.is_none() {
            self.owner = Some(self.resolve(resolver)?);
        }
        Ok(())
    }

    /// A copy without the owner handle.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self::unresolved(self.target, self.id.clone())
    }
}

impl PartialEq for ReferenceKeyField {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target && self.id == other.id
    }
}

impl Eq for ReferenceKeyField {}

impl PartialOrd for ReferenceKeyField {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReferenceKeyField {
    fn cmp(&self, other: &Self) -> Ordering {
        self.target
            .cmp(other.target)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl Hash for ReferenceKeyField {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.target.hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for ReferenceKeyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceKeyField")
            .field("target", &self.target)
            .field("id", &self.id)
            .field("resolved", &self.owner.is_some())
            .finish()
    }
}

impl fmt::Display for ReferenceKeyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// A minimal owner: a family tag and an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRecord {
    type_tag: &'static str,
    id: ScalarValue,
}

impl OwnerRecord {
    /// Creates an owner.
    #[must_use]
    pub fn new(type_tag: &'static str, id: impl Into<ScalarValue>) -> Self {
        Self {
            type_tag,
            id: id.into(),
        }
    }

    /// Creates a shared handle to a new owner.
    #[must_use]
    pub fn handle(type_tag: &'static str, id: impl Into<ScalarValue>) -> OwnerHandle {
        Arc::new(Self::new(type_tag, id))
    }
}

impl Owner for OwnerRecord {
    fn type_tag(&self) -> &'static str {
        self.type_tag
    }

    fn owner_id(&self) -> ScalarValue {
        self.id.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Registry-backed resolver.
///
/// Owners are registered explicitly; there is no global registry.
#[derive(Default)]
pub struct MapResolver {
    owners: RwLock<HashMap<(String, ScalarValue), OwnerHandle>>,
}

impl MapResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an owner, replacing any owner with the same tag and id.
    pub fn register(&self, owner: OwnerHandle) {
        let key = (owner.type_tag().to_string(), owner.owner_id());
        self.owners.write().insert(key, owner);
    }

    /// Removes an owner. Returns whether it was registered.
    pub fn remove(&self, target: &str, id: &ScalarValue) -> bool {
        self.owners
            .write()
            .remove(&(target.to_string(), id.clone()))
            .is_some()
    }

    /// Number of registered owners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.read().len()
    }

    /// Whether no owners are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.read().is_empty()
    }
}

impl KeyResolver for MapResolver {
    fn resolve(&self, target: &str, id: &ScalarValue) -> Option<OwnerHandle> {
        self.owners
            .read()
            .get(&(target.to_string(), id.clone()))
            .cloned()
    }
}

impl fmt::Debug for MapResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapResolver")
            .field("owners", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> MapResolver {
        let resolver = MapResolver::new();
        resolver.register(OwnerRecord::handle("Cluster", "clusterA"));
        resolver
    }

    #[test]
    fn resolves_registered_owner() {
        let reference = ReferenceKeyField::unresolved("Cluster", "clusterA");
        let owner = reference.resolve(&resolver()).unwrap();
        assert_eq!(owner.type_tag(), "Cluster");
        assert_eq!(owner.owner_id(), ScalarValue::from("clusterA"));
    }

    #[test]
    fn missing_owner_is_not_found() {
        let reference = ReferenceKeyField::unresolved("Cluster", "nope");
        let err = reference.resolve(&resolver()).unwrap_err();
        assert!(matches!(err, ResolutionError::NotFound { .. }));
    }

    #[test]
    fn resolve_in_place_is_idempotent() {
        let resolver = resolver();
        let mut reference = ReferenceKeyField::unresolved("Cluster", "clusterA");
        reference.resolve_in_place(&resolver).unwrap();
        assert!(reference.is_resolved());

        // A resolved reference no longer consults the resolver.
        resolver.remove("Cluster", &ScalarValue::from("clusterA"));
        reference.resolve_in_place(&resolver).unwrap();
        assert!(reference.resolve(&resolver).is_ok());
    }

    #[test]
    fn equality_ignores_resolution_state() {
        let unresolved = ReferenceKeyField::unresolved("Cluster", "clusterA");
        let resolved = ReferenceKeyField::resolved(OwnerRecord::handle("Cluster", "clusterA"));
        assert_eq!(unresolved, resolved);
        assert_eq!(resolved.detached(), unresolved);
        assert!(!resolved.detached().is_resolved());
    }

    #[test]
    fn ordering_is_by_target_then_id() {
        let a = ReferenceKeyField::unresolved("Cluster", "a");
        let b = ReferenceKeyField::unresolved("Cluster", "b");
        let t = ReferenceKeyField::unresolved("Tenant", "a");
        assert!(a < b);
        assert!(b < t);
    }

    #[test]
    fn owner_downcasts() {
        let handle = OwnerRecord::handle("Cluster", 7i64);
        let record = handle.as_any().downcast_ref::<OwnerRecord>().unwrap();
        assert_eq!(record, &OwnerRecord::new("Cluster", 7i64));
    }
}
