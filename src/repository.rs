use alloc::{sync::Arc, vec::Vec};

use crate::{
    any::{hash_one, TypeInfo},
    errors::RegistryErrorKind,
    key::TypeKey,
    registration::Registration,
    tree::{ConcurrentTree, Tree},
};

type NameTree = Tree<Arc<Registration>>;

/// The concurrent registration store: three tree-of-trees tables keyed by
/// contract type hash, whose values are persistent name-keyed trees of
/// registrations. Readers traverse immutable snapshots; a lookup by
/// (type, name) is never lost to a concurrent insert elsewhere.
pub(crate) struct RegistrationRepository {
    services: ConcurrentTree<NameTree>,
    generic_definitions: ConcurrentTree<NameTree>,
    decorators: ConcurrentTree<NameTree>,
}

impl Default for RegistrationRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrationRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            services: ConcurrentTree::new(),
            generic_definitions: ConcurrentTree::new(),
            decorators: ConcurrentTree::new(),
        }
    }

    /// Name key of a registration inside its contract's subtree. Unnamed
    /// registrations (and everything in unique-identifiers mode) key by their
    /// sequence so duplicates coexist and resolve in registration order.
    fn name_key(registration: &Registration, unique: bool) -> u64 {
        match registration.name {
            Some(name) if !unique => hash_one(name),
            _ => hash_one(registration.sequence),
        }
    }

    /// Adds a registration. A named collision under the same contract keeps
    /// the earlier registration; replacement is [`Self::add_or_replace`]'s
    /// job.
    pub(crate) fn add(&self, registration: Arc<Registration>, unique: bool) -> Result<(), RegistryErrorKind> {
        Self::insert(&self.services, registration, unique, false)
    }

    /// Adds a registration, atomically discarding every prior registration
    /// under the contract key.
    pub(crate) fn add_or_replace(&self, registration: Arc<Registration>, unique: bool) -> Result<(), RegistryErrorKind> {
        Self::insert(&self.services, registration, unique, true)
    }

    pub(crate) fn add_generic_definition(&self, registration: Arc<Registration>, unique: bool) -> Result<(), RegistryErrorKind> {
        Self::insert(&self.generic_definitions, registration, unique, false)
    }

    pub(crate) fn add_or_replace_generic_definition(&self, registration: Arc<Registration>, unique: bool) -> Result<(), RegistryErrorKind> {
        Self::insert(&self.generic_definitions, registration, unique, true)
    }

    /// Decorators always coexist; they are applied in registration order.
    pub(crate) fn add_decorator(&self, registration: Arc<Registration>) -> Result<(), RegistryErrorKind> {
        Self::insert(&self.decorators, registration, true, false)
    }

    fn insert(table: &ConcurrentTree<NameTree>, registration: Arc<Registration>, unique: bool, replace: bool) -> Result<(), RegistryErrorKind> {
        let type_key = registration.contract.key_hash();
        let name_key = Self::name_key(&registration, unique);
        let single = Tree::new().with_upserted(name_key, registration.clone(), &|_old, new| new.clone());

        if replace {
            table.update(type_key, single, &|_old, new| new.clone())
        } else {
            table.update(type_key, single, &|old, _new| {
                old.with_upserted(name_key, registration.clone(), &|old_reg, _new_reg| old_reg.clone())
            })
        }
    }

    /// Candidates for a request: the concrete-type table first; on miss, a
    /// constructed-generic request falls back to its open definition.
    /// Returned in registration order.
    #[must_use]
    pub(crate) fn get_candidates(&self, key: &TypeKey) -> Vec<Arc<Registration>> {
        let mut found: Vec<Arc<Registration>> = self
            .services
            .get(key.type_hash())
            .map(|tree| tree.iter().cloned().collect())
            .unwrap_or_default();

        if found.is_empty() {
            if let Some(definition_hash) = key.definition_hash() {
                if let Some(tree) = self.generic_definitions.get(definition_hash) {
                    found = tree.iter().cloned().collect();
                }
            }
        }

        found.sort_by_key(|registration| registration.sequence);
        found
    }

    /// Whether anything could serve the request, including the open-generic
    /// fallback. Used by constructor selection.
    #[must_use]
    pub(crate) fn contains_key(&self, key: &TypeKey) -> bool {
        !self.get_candidates(key).is_empty()
    }

    #[must_use]
    pub(crate) fn contains(&self, type_info: &TypeInfo, name: Option<&str>) -> bool {
        let Some(tree) = self.services.get(type_info.key_hash()) else {
            return false;
        };
        match name {
            Some(name) => tree.iter().any(|registration| registration.name == Some(name)),
            None => !tree.is_empty(),
        }
    }

    /// Decorators declared for a contract, in registration order.
    #[must_use]
    pub(crate) fn get_decorators(&self, type_info: &TypeInfo) -> Vec<Arc<Registration>> {
        let mut found: Vec<Arc<Registration>> = self
            .decorators
            .get(type_info.key_hash())
            .map(|tree| tree.iter().cloned().collect())
            .unwrap_or_default();
        found.sort_by_key(|registration| registration.sequence);
        found
    }

    /// Every stored registration (services, then generic definitions), in
    /// registration order.
    #[must_use]
    pub(crate) fn all_registrations(&self) -> Vec<Arc<Registration>> {
        let mut found = Vec::new();
        for tree in self.services.snapshot().iter() {
            found.extend(tree.iter().cloned());
        }
        for tree in self.generic_definitions.snapshot().iter() {
            found.extend(tree.iter().cloned());
        }
        found.sort_by_key(|registration| registration.sequence);
        found
    }
}

#[cfg(test)]
mod tests {
    use super::RegistrationRepository;
    use crate::{any::TypeInfo, key::TypeKey, registration::Registration};
    use alloc::sync::Arc;

    struct Contract;

    fn registration(sequence: u64, name: Option<&'static str>) -> Arc<Registration> {
        let mut registration = Registration::instance(Contract);
        if let Some(name) = name {
            registration = registration.with_name(name);
        }
        registration.sequence = sequence;
        Arc::new(registration)
    }

    #[test]
    fn test_unnamed_registrations_coexist_in_order() {
        let repository = RegistrationRepository::new();
        repository.add(registration(2, None), false).unwrap();
        repository.add(registration(1, None), false).unwrap();

        let candidates = repository.get_candidates(&TypeKey::of::<Contract>());
        assert_eq!(candidates.len(), 2);
        assert!(candidates.windows(2).all(|pair| pair[0].sequence < pair[1].sequence));
    }

    #[test]
    fn test_named_add_keeps_first() {
        let repository = RegistrationRepository::new();
        repository.add(registration(1, Some("a")), false).unwrap();
        repository.add(registration(2, Some("a")), false).unwrap();

        let candidates = repository.get_candidates(&TypeKey::of::<Contract>());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].sequence, 1);
    }

    #[test]
    fn test_unique_mode_keeps_named_duplicates() {
        let repository = RegistrationRepository::new();
        repository.add(registration(1, Some("a")), true).unwrap();
        repository.add(registration(2, Some("a")), true).unwrap();

        assert_eq!(repository.get_candidates(&TypeKey::of::<Contract>()).len(), 2);
    }

    #[test]
    fn test_add_or_replace_discards_prior() {
        let repository = RegistrationRepository::new();
        repository.add(registration(1, None), false).unwrap();
        repository.add(registration(2, Some("a")), false).unwrap();
        repository.add_or_replace(registration(3, None), false).unwrap();

        let candidates = repository.get_candidates(&TypeKey::of::<Contract>());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].sequence, 3);
    }

    #[test]
    fn test_contains() {
        let repository = RegistrationRepository::new();
        repository.add(registration(1, Some("a")), false).unwrap();

        assert!(repository.contains(&TypeInfo::of::<Contract>(), None));
        assert!(repository.contains(&TypeInfo::of::<Contract>(), Some("a")));
        assert!(!repository.contains(&TypeInfo::of::<Contract>(), Some("b")));
        assert!(!repository.contains(&TypeInfo::of::<u8>(), None));
    }
}
