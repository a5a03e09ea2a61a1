use std::collections::HashMap;

use crate::error::{Error, Result};

/// A name-keyed table that is filled once at startup and only read afterwards.
///
/// Registration of a name that is already present is rejected.
#[derive(Debug)]
pub struct Registry<V> {
    kind: &'static str,
    entries: HashMap<String, V>,
}

impl<V> Registry<V> {
    #[must_use]
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, value: V) -> Result<()> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(Error::Config(format!(
                "{} '{name}' is already registered",
                self.kind
            )));
        }
        self.entries.insert(name, value);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&V> {
        self.entries.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let mut registry = Registry::new("driver");
        registry.register("memory", 1).unwrap();
        registry.register("redis", 2).unwrap();

        assert_eq!(registry.get("memory"), Some(&1));
        assert_eq!(registry.get("redis"), Some(&2));
        assert!(registry.get("disk").is_none());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = Registry::new("driver");
        registry.register("memory", 1).unwrap();

        let err = registry.register("memory", 2).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(registry.get("memory"), Some(&1));
    }
}
