use std::collections::HashSet;

/// Registry of item ids that have already been processed.
pub trait SeenStore: Send {
    fn contains(&self, id: &str) -> bool;
    /// Records `id`; returns `false` if it was already present.
    fn add(&mut self, id: String) -> bool;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-lifetime seen set; starts empty on every launch.
#[derive(Debug, Default)]
pub struct MemorySeenStore {
    ids: HashSet<String>,
}

impl MemorySeenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SeenStore for MemorySeenStore {
    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn add(&mut self, id: String) -> bool {
        self.ids.insert(id)
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}
