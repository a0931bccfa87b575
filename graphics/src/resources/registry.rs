//! Name-indexed registry of one resource class.

use std::collections::HashMap;

use ironframe_core::handle::{Handle, HandleMap};

use crate::error::ResourceError;

/// Owns resources of one class behind generation-checked handles, with an
/// optional unique name per resource.
///
/// Every name in the index refers to a live entry: [`remove`](Self::remove)
/// erases the name together with the entry.
pub struct ResourceRegistry<T> {
    kind: &'static str,
    entries: HandleMap<T>,
    names: HashMap<String, Handle<T>>,
    names_by_handle: HashMap<Handle<T>, String>,
}

impl<T> ResourceRegistry<T> {
    /// Creates an empty registry. `kind` names the resource class in errors.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: HandleMap::new(),
            names: HashMap::new(),
            names_by_handle: HashMap::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Returns an error if `name` is already bound. Empty names are never taken.
    pub fn check_name(&self, name: Option<&str>) -> Result<(), ResourceError> {
        match name {
            Some(name) if !name.is_empty() && self.names.contains_key(name) => {
                Err(ResourceError::AlreadyExists {
                    kind: self.kind,
                    name: name.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Stores `resource` and binds `name` to it if given.
    ///
    /// Fails without touching the registry if the name is taken. The
    /// resource is dropped in that case, so only the manager adds entries,
    /// after [`check_name`](Self::check_name) and before creating GPU objects.
    pub(crate) fn add(&mut self, resource: T, name: Option<&str>) -> Result<Handle<T>, ResourceError> {
        self.check_name(name)?;

        let handle = self.entries.insert(resource);
        if let Some(name) = name.filter(|name| !name.is_empty()) {
            self.names.insert(name.to_string(), handle);
            self.names_by_handle.insert(handle, name.to_string());
        }
        Ok(handle)
    }

    /// Removes the entry and its name binding.
    pub fn remove(&mut self, handle: Handle<T>) -> Result<T, ResourceError> {
        let resource = self
            .entries
            .remove(handle)
            .ok_or_else(|| ResourceError::NotFound {
                kind: self.kind,
                id: handle.to_string(),
            })?;
        if let Some(name) = self.names_by_handle.remove(&handle) {
            self.names.remove(&name);
        }
        Ok(resource)
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.entries.get(handle)
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.entries.get_mut(handle)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&T> {
        let handle = self.get_id(name)?;
        self.entries.get(handle)
    }

    /// Handle bound to `name`.
    pub fn get_id(&self, name: &str) -> Option<Handle<T>> {
        let handle = *self.names.get(name)?;
        debug_assert!(
            self.entries.contains(handle),
            "{} name '{}' points at a dead handle {}",
            self.kind,
            name,
            handle
        );
        self.entries.contains(handle).then_some(handle)
    }

    /// Name bound to `handle`, if any.
    pub fn name_of(&self, handle: Handle<T>) -> Option<&str> {
        self.names_by_handle.get(&handle).map(String::as_str)
    }

    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.entries.contains(handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.entries.iter()
    }

    /// Removes every entry and name.
    pub fn drain(&mut self) -> Vec<T> {
        self.names.clear();
        self.names_by_handle.clear();
        self.entries.drain()
    }
}

impl<T> std::fmt::Debug for ResourceRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("kind", &self.kind)
            .field("len", &self.entries.len())
            .field("named", &self.names.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn registry() -> ResourceRegistry<&'static str> {
        ResourceRegistry::new("buffer")
    }

    #[test]
    fn add_and_lookup() {
        let mut reg = registry();
        let a = reg.add("a", Some("first")).unwrap();
        let b = reg.add("b", None).unwrap();

        assert_eq!(reg.get(a), Some(&"a"));
        assert_eq!(reg.get(b), Some(&"b"));
        assert_eq!(reg.get_by_name("first"), Some(&"a"));
        assert_eq!(reg.get_id("first"), Some(a));
        assert_eq!(reg.name_of(a), Some("first"));
        assert_eq!(reg.name_of(b), None);
    }

    #[test]
    fn handles_unique() {
        let mut reg = registry();
        let handles: Vec<_> = (0..64).map(|_| reg.add("x", None).unwrap()).collect();
        let unique: HashSet<_> = handles.iter().collect();
        assert_eq!(unique.len(), 64);
    }

    #[test]
    fn duplicate_name_rejected_without_mutation() {
        let mut reg = registry();
        let first = reg.add("first", Some("shared")).unwrap();

        let err = reg.add("second", Some("shared")).unwrap_err();
        assert_eq!(
            err,
            ResourceError::AlreadyExists {
                kind: "buffer",
                name: "shared".into()
            }
        );
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get_id("shared"), Some(first));
        assert_eq!(reg.get(first), Some(&"first"));
    }

    #[test]
    fn empty_name_is_anonymous() {
        let mut reg = registry();
        reg.add("a", Some("")).unwrap();
        reg.add("b", Some("")).unwrap();
        assert_eq!(reg.len(), 2);
        assert!(reg.get_id("").is_none());
    }

    #[test]
    fn remove_erases_name() {
        let mut reg = registry();
        let handle = reg.add("a", Some("scene")).unwrap();
        assert_eq!(reg.remove(handle), Ok("a"));

        assert!(reg.get_by_name("scene").is_none());
        assert!(reg.get_id("scene").is_none());
        // The name is free again.
        let again = reg.add("b", Some("scene")).unwrap();
        assert_ne!(again, handle);
        assert_eq!(reg.get_by_name("scene"), Some(&"b"));
    }

    #[test]
    fn remove_unknown_is_not_found() {
        let mut reg = registry();
        let handle = reg.add("a", None).unwrap();
        reg.remove(handle).unwrap();
        assert!(matches!(
            reg.remove(handle),
            Err(ResourceError::NotFound { kind: "buffer", .. })
        ));
    }

    #[test]
    fn drain_clears_everything() {
        let mut reg = registry();
        reg.add("a", Some("a")).unwrap();
        reg.add("b", None).unwrap();
        assert_eq!(reg.drain().len(), 2);
        assert!(reg.is_empty());
        assert!(reg.get_id("a").is_none());
    }
}
