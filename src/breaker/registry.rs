//! Named circuit breaker storage
//!
//! A breaker is only useful when every call site hitting the same
//! dependency shares it; the registry is the lookup point for that
//! sharing. Populate it at process startup, then hand out clones of the
//! stored handles.

use crate::breaker::Breaker;
use crate::error::{CallguardError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Stores circuit breakers by name
#[derive(Default)]
pub struct Registry {
    breakers: HashMap<String, Arc<Breaker>>,
}

impl Registry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate the breaker with the name. Registering a name twice
    /// fails.
    pub fn register(&mut self, name: impl Into<String>, breaker: Arc<Breaker>) -> Result<()> {
        let name = name.into();
        if self.breakers.contains_key(&name) {
            return Err(CallguardError::DuplicateBreaker { name });
        }
        self.breakers.insert(name, breaker);
        Ok(())
    }

    /// Look up a breaker by name
    pub fn get(&self, name: &str) -> Option<Arc<Breaker>> {
        self.breakers.get(name).cloned()
    }

    /// Number of registered breakers
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
