//! Host-visible resource handles.
//!
//! A [`Resource`] wraps one native value (PCM buffer, texture node, ...) plus a validity
//! flag. Destroying it releases the native value exactly once; every later destroy is a
//! no-op and every later access fails with [`NoxError::InvalidResource`].
//!
//! A [`HandleTable`] is the arena guests index into with `u32` ids. Each entry tracks two
//! kinds of ownership:
//! - the guest's own handle (`host_held`), dropped via `release_host` (the GC path), and
//! - keep-alive references taken by other host objects (`refs`), e.g. a voice playing a
//!   sample or a child image aliasing its parent.
//!
//! The entry itself only disappears once both are gone. At that point the table hands the
//! resource back to its owner, which runs the same idempotent destroy as an explicit
//! request would. Ids start at 1 and are never reused, so a stale id cannot alias a newer
//! resource.

use std::collections::BTreeMap;

use crate::error::{NoxError, ResourceKind, Result};

#[derive(Debug)]
pub struct Resource<T> {
    kind: ResourceKind,
    native: Option<T>,
    destroyed: bool,
}

impl<T> Resource<T> {
    /// An empty handle; [`Resource::attach`] gives it something to own.
    pub fn allocate(kind: ResourceKind) -> Self {
        Self {
            kind,
            native: None,
            destroyed: false,
        }
    }

    pub fn attach(&mut self, native: T) -> Result<()> {
        if self.destroyed {
            return Err(NoxError::InvalidArgument(format!(
                "cannot attach to a destroyed {} handle",
                self.kind
            )));
        }
        self.native = Some(native);
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        !self.destroyed && self.native.is_some()
    }

    pub fn native(&self) -> Option<&T> {
        self.native.as_ref()
    }

    /// Take the native value out, leaving the handle permanently invalid.
    ///
    /// Returns `None` on every call after the first.
    pub fn destroy(&mut self) -> Option<T> {
        self.destroyed = true;
        self.native.take()
    }
}

#[derive(Debug)]
struct Entry<T> {
    resource: Resource<T>,
    host_held: bool,
    refs: u32,
}

impl<T> Entry<T> {
    fn collectable(&self) -> bool {
        !self.host_held && self.refs == 0
    }
}

#[derive(Debug)]
pub struct HandleTable<T> {
    kind: ResourceKind,
    entries: BTreeMap<u32, Entry<T>>,
    next_id: u32,
}

impl<T> HandleTable<T> {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Register a freshly created native value and hand its id to the guest.
    pub fn insert(&mut self, native: T) -> Result<u32> {
        let id = self.next_id;
        self.next_id = id
            .checked_add(1)
            .ok_or_else(|| NoxError::InvalidArgument(format!("{} id space exhausted", self.kind)))?;
        let mut resource = Resource::allocate(self.kind);
        resource.attach(native)?;
        self.entries.insert(
            id,
            Entry {
                resource,
                host_held: true,
                refs: 0,
            },
        );
        Ok(id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the guest may still use `id`.
    pub fn is_valid(&self, id: u32) -> bool {
        self.entries
            .get(&id)
            .is_some_and(|e| e.host_held && e.resource.is_valid())
    }

    /// Borrow the native value on behalf of the guest.
    ///
    /// Fails if the id is unknown, already destroyed, or released by the guest.
    pub fn check(&self, id: u32) -> Result<&T> {
        self.entries
            .get(&id)
            .filter(|e| e.host_held)
            .and_then(|e| e.resource.native())
            .ok_or_else(|| NoxError::invalid(self.kind, id))
    }

    /// Borrow the native value for host-internal use; ignores the guest's handle.
    pub fn get(&self, id: u32) -> Option<&T> {
        self.entries.get(&id).and_then(|e| e.resource.native())
    }

    /// Destroy the resource behind `id`, returning its native value the first time.
    ///
    /// Unknown or guest-released ids are an error; repeated destroys return `Ok(None)`.
    pub fn destroy(&mut self, id: u32) -> Result<Option<T>> {
        let kind = self.kind;
        let entry = self
            .entries
            .get_mut(&id)
            .filter(|e| e.host_held)
            .ok_or_else(|| NoxError::invalid(kind, id))?;
        Ok(entry.resource.destroy())
    }

    /// Take a keep-alive reference. Only live resources can be referenced.
    pub fn retain(&mut self, id: u32) -> Result<()> {
        let kind = self.kind;
        match self.entries.get_mut(&id) {
            Some(e) if e.resource.is_valid() => {
                e.refs += 1;
                Ok(())
            }
            _ => Err(NoxError::invalid(kind, id)),
        }
    }

    /// Drop a keep-alive reference.
    ///
    /// Returns the resource if this was the last thing keeping the entry alive; the
    /// caller must finalize it.
    pub fn release(&mut self, id: u32) -> Option<Resource<T>> {
        let entry = self.entries.get_mut(&id)?;
        debug_assert!(entry.refs > 0, "release without matching retain");
        entry.refs = entry.refs.saturating_sub(1);
        self.collect(id)
    }

    /// The guest dropped its handle.
    ///
    /// Same return contract as [`HandleTable::release`]. Releasing twice is a no-op.
    pub fn release_host(&mut self, id: u32) -> Option<Resource<T>> {
        let entry = self.entries.get_mut(&id)?;
        if !entry.host_held {
            return None;
        }
        entry.host_held = false;
        self.collect(id)
    }

    /// Number of keep-alive references currently held on `id`.
    pub fn refs(&self, id: u32) -> Option<u32> {
        self.entries.get(&id).map(|e| e.refs)
    }

    /// Remove every entry regardless of references (runtime shutdown).
    pub fn drain(&mut self) -> Vec<(u32, Resource<T>)> {
        std::mem::take(&mut self.entries)
            .into_iter()
            .map(|(id, e)| (id, e.resource))
            .collect()
    }

    fn collect(&mut self, id: u32) -> Option<Resource<T>> {
        if self.entries.get(&id)?.collectable() {
            self.entries.remove(&id).map(|e| e.resource)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> HandleTable<&'static str> {
        HandleTable::new(ResourceKind::Sample)
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut res = Resource::allocate(ResourceKind::Image);
        assert!(!res.is_valid(), "nothing attached yet");
        res.attach(7u32).unwrap();
        assert!(res.is_valid());

        assert_eq!(res.destroy(), Some(7));
        assert_eq!(res.destroy(), None);
        assert!(!res.is_valid());
        assert!(res.attach(8).is_err());
    }

    #[test]
    fn check_fails_after_destroy() {
        let mut t = table();
        let id = t.insert("pcm").unwrap();
        assert_eq!(*t.check(id).unwrap(), "pcm");

        assert_eq!(t.destroy(id).unwrap(), Some("pcm"));
        assert_eq!(t.destroy(id).unwrap(), None);
        assert!(matches!(
            t.check(id),
            Err(NoxError::InvalidResource {
                kind: ResourceKind::Sample,
                ..
            })
        ));
        // The entry stays until the guest lets go of it.
        assert!(t.contains(id));
        assert!(!t.is_valid(id));
    }

    #[test]
    fn unknown_ids_are_invalid() {
        let mut t = table();
        assert!(t.check(0).is_err());
        assert!(t.destroy(42).is_err());
        assert!(t.retain(42).is_err());
        assert!(t.release(42).is_none());
        assert!(t.release_host(42).is_none());
    }

    #[test]
    fn ids_are_never_reused() {
        let mut t = table();
        let a = t.insert("a").unwrap();
        assert!(t.release_host(a).is_some());
        let b = t.insert("b").unwrap();
        assert_ne!(a, b);
        assert!(t.check(a).is_err());
    }

    #[test]
    fn references_defer_collection() {
        let mut t = table();
        let id = t.insert("pcm").unwrap();
        t.retain(id).unwrap();
        t.retain(id).unwrap();

        assert!(t.release_host(id).is_none());
        assert!(t.release_host(id).is_none(), "double release is a no-op");
        assert!(t.release(id).is_none());

        let collected = t.release(id).expect("last reference collects");
        assert!(collected.is_valid(), "finalizer still has to run");
        assert!(!t.contains(id));
    }

    #[test]
    fn released_handles_are_invisible_to_the_guest() {
        let mut t = table();
        let id = t.insert("pcm").unwrap();
        t.retain(id).unwrap();
        assert!(t.release_host(id).is_none());

        assert!(t.check(id).is_err());
        assert!(t.destroy(id).is_err());
        assert!(!t.is_valid(id));
        assert_eq!(t.get(id), Some(&"pcm"));
    }

    #[test]
    fn destroyed_resources_cannot_be_retained() {
        let mut t = table();
        let id = t.insert("pcm").unwrap();
        t.destroy(id).unwrap();
        assert!(t.retain(id).is_err());
    }

    #[test]
    fn drain_empties_the_table() {
        let mut t = table();
        let a = t.insert("a").unwrap();
        let b = t.insert("b").unwrap();
        t.retain(b).unwrap();
        let drained: Vec<u32> = t.drain().into_iter().map(|(id, _)| id).collect();
        assert_eq!(drained, vec![a, b]);
        assert!(t.is_empty());
    }
}
