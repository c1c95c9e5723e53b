//! Element class registry.
//!
//! Maps class names used in router descriptions to constructors.

use crate::router::element::Element;
use crate::router::elements;
use std::collections::BTreeMap;

/// Builds a fresh, unconfigured element.
pub type ElementFactory = fn() -> Box<dyn Element>;

#[derive(Debug, Clone, Default)]
pub struct ElementRegistry {
    factories: BTreeMap<String, ElementFactory>,
}

impl ElementRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in element class.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        elements::register_builtins(&mut registry);
        registry
    }

    /// Register `factory` under `class`, replacing any earlier entry.
    pub fn register(&mut self, class: impl Into<String>, factory: ElementFactory) {
        let class = class.into();
        if self.factories.insert(class.clone(), factory).is_some() {
            tracing::debug!("Element class {} re-registered", class);
        }
    }

    pub fn create(&self, class: &str) -> Option<Box<dyn Element>> {
        self.factories.get(class).map(|factory| factory())
    }

    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }

    /// Registered class names, sorted.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
