use std::hash::{Hash, Hasher};

/// Opaque reference to an object that lives in the remote process.
///
/// Handles are never dereferenced locally and two handles may alias the same
/// remote object. Equality and hashing consider the `id` only.
#[derive(Clone, Copy, Debug)]
pub struct Handle {
    pub id: u64,
    pub kind: i32,
}

impl Handle {
    /// "No object". The remote still expects a kind alongside it.
    pub const NULL: Self = Self { id: 0, kind: 0 };

    pub const fn new(id: u64, kind: i32) -> Self {
        Self { id, kind }
    }

    pub const fn is_null(&self) -> bool {
        self.id == 0
    }

    pub const fn is_valid(&self) -> bool {
        !self.is_null()
    }

    /// Zeroes the id after the remote object has been deleted.
    pub fn invalidate(&mut self) {
        self.id = 0;
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::NULL
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Handle {}

impl Hash for Handle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}:{}", self.id, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::Handle;

    #[test]
    fn equality_ignores_kind() {
        assert_eq!(Handle::new(42, 2), Handle::new(42, 7));
        assert_ne!(Handle::new(42, 2), Handle::new(43, 2));

        let set: HashSet<Handle> = [Handle::new(9, 1), Handle::new(9, 5)].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn invalidate_keeps_kind() {
        let mut handle = Handle::new(0xDEAD, 2);
        assert!(handle.is_valid());
        handle.invalidate();
        assert!(handle.is_null());
        assert_eq!(handle.kind, 2);
        assert_eq!(handle, Handle::NULL);
    }
}
