use std::collections::HashMap;

use framegraph_types::FrameId;

/// Bijection between frame names and frame ids.
///
/// A registry is part of every graph version, so lookups are snapshot
/// reads and changes travel through the same commit path as every other
/// write (each touched name is a conflict key).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NameRegistry {
    by_name: HashMap<String, FrameId>,
    by_frame: HashMap<FrameId, String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<FrameId> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, frame: FrameId) -> Option<&str> {
        self.by_frame.get(&frame).map(String::as_str)
    }

    /// Whether `name` is free for `frame` (unbound, or bound to `frame`).
    pub fn is_available(&self, name: &str, frame: FrameId) -> bool {
        self.lookup(name).map_or(true, |owner| owner == frame)
    }

    /// Bind `name` to `frame`, dropping any previous name of `frame`.
    /// Returns the previous name. The caller checks availability first.
    pub(crate) fn bind(&mut self, name: &str, frame: FrameId) -> Option<String> {
        let previous = self.unbind_frame(frame);
        self.by_name.insert(name.to_string(), frame);
        self.by_frame.insert(frame, name.to_string());
        previous
    }

    /// Remove the name of `frame`, returning it.
    pub(crate) fn unbind_frame(&mut self, frame: FrameId) -> Option<String> {
        let name = self.by_frame.remove(&frame)?;
        self.by_name.remove(&name);
        Some(name)
    }

    /// Make the binding of `name` equal to `binding`, as found in another
    /// registry. Used when a committed transaction's names are installed
    /// on top of a newer head.
    pub(crate) fn adopt(&mut self, name: &str, binding: Option<FrameId>) {
        if let Some(owner) = self.by_name.remove(name) {
            self.by_frame.remove(&owner);
        }
        if let Some(frame) = binding {
            if let Some(old) = self.by_frame.remove(&frame) {
                self.by_name.remove(&old);
            }
            self.by_name.insert(name.to_string(), frame);
            self.by_frame.insert(frame, name.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_replaces_previous_name() {
        let mut reg = NameRegistry::new();
        assert_eq!(reg.bind("world", FrameId(1)), None);
        assert_eq!(reg.bind("map", FrameId(1)), Some("world".into()));
        assert_eq!(reg.lookup("world"), None);
        assert_eq!(reg.lookup("map"), Some(FrameId(1)));
        assert_eq!(reg.name_of(FrameId(1)), Some("map"));
    }

    #[test]
    fn availability() {
        let mut reg = NameRegistry::new();
        reg.bind("world", FrameId(1));
        assert!(reg.is_available("world", FrameId(1)));
        assert!(!reg.is_available("world", FrameId(2)));
        assert!(reg.is_available("base", FrameId(2)));
    }

    #[test]
    fn adopt_moves_binding() {
        let mut reg = NameRegistry::new();
        reg.bind("a", FrameId(1));
        reg.bind("b", FrameId(2));

        reg.adopt("a", Some(FrameId(2)));
        assert_eq!(reg.lookup("a"), Some(FrameId(2)));
        assert_eq!(reg.lookup("b"), None);
        assert_eq!(reg.name_of(FrameId(1)), None);

        reg.adopt("a", None);
        assert!(reg.is_empty());
    }
}
