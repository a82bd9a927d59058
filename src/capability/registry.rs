// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model-prefix registry.

use std::sync::Arc;

use super::builtin;
use super::descriptor::CapabilityDescriptor;

/// Read-only catalog mapping model-code prefixes to descriptors.
///
/// Lookup is a case-insensitive longest-prefix match. A model matching no
/// prefix resolves to the shared unsupported sentinel, so the caller always
/// gets a descriptor back.
///
/// # Examples
///
/// ```
/// use dreo_lib::capability::{CapabilityRegistry, DeviceClass};
///
/// let registry = CapabilityRegistry::builtin();
///
/// assert_eq!(registry.lookup("DR-HTF001S").class(), DeviceClass::TowerFan);
/// assert_eq!(registry.lookup("dr-hac005s").class(), DeviceClass::AirConditioner);
/// assert!(!registry.lookup("XX-UNKNOWN").is_supported());
/// ```
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    // Sorted by descending prefix length so the first match is the longest.
    entries: Vec<(String, Arc<CapabilityDescriptor>)>,
    unsupported: Arc<CapabilityDescriptor>,
}

impl CapabilityRegistry {
    /// Returns a builder with no entries.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Returns the registry populated with the built-in product lines.
    #[must_use]
    pub fn builtin() -> Self {
        RegistryBuilder::with_builtin().build()
    }

    /// Resolves a model code to its descriptor.
    #[must_use]
    pub fn lookup(&self, model: &str) -> Arc<CapabilityDescriptor> {
        self.find(model)
            .map_or_else(|| Arc::clone(&self.unsupported), Arc::clone)
    }

    /// Resolves a model code, returning `None` instead of the sentinel.
    #[must_use]
    pub fn find(&self, model: &str) -> Option<&Arc<CapabilityDescriptor>> {
        let model = model.trim().to_ascii_uppercase();
        self.entries
            .iter()
            .find(|(prefix, _)| model.starts_with(prefix.as_str()))
            .map(|(_, descriptor)| descriptor)
    }

    /// Returns the number of registered prefixes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no prefix is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the registered prefixes, longest first.
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(prefix, _)| prefix.as_str())
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Builder for [`CapabilityRegistry`].
///
/// Adding a product line is a single [`register`](Self::register) call.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: Vec<(String, Arc<CapabilityDescriptor>)>,
}

impl RegistryBuilder {
    /// Creates a builder pre-populated with the built-in table.
    #[must_use]
    pub fn with_builtin() -> Self {
        builtin::table()
            .into_iter()
            .fold(Self::default(), |builder, (prefix, descriptor)| {
                builder.register(prefix, Arc::new(descriptor))
            })
    }

    /// Registers a descriptor for a model prefix, replacing any existing
    /// entry with the same prefix.
    #[must_use]
    pub fn register(
        mut self,
        prefix: impl AsRef<str>,
        descriptor: Arc<CapabilityDescriptor>,
    ) -> Self {
        let prefix = prefix.as_ref().trim().to_ascii_uppercase();
        self.entries.retain(|(existing, _)| *existing != prefix);
        self.entries.push((prefix, descriptor));
        self
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(mut self) -> CapabilityRegistry {
        self.entries
            .sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        CapabilityRegistry {
            entries: self.entries,
            unsupported: Arc::new(CapabilityDescriptor::unsupported()),
        }
    }
}
