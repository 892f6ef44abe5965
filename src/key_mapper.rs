// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Source-to-destination key rewriting.

use serde::{Deserialize, Serialize};

/// Prefix substitution rule.
///
/// `dest_prefix` may equal `source_prefix` (identity), be empty (mirror to
/// the root of the destination), or be anything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixMapping {
    pub source_prefix: String,
    pub dest_prefix: String,
}

impl PrefixMapping {
    /// Mapping that keeps keys unchanged.
    pub fn identity(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            source_prefix: prefix.clone(),
            dest_prefix: prefix,
        }
    }

    pub fn new(source_prefix: impl Into<String>, dest_prefix: impl Into<String>) -> Self {
        Self {
            source_prefix: source_prefix.into(),
            dest_prefix: dest_prefix.into(),
        }
    }

    /// Resolve the mapping from the user-facing prefix settings.
    ///
    /// An unset destination defaults to the source prefix unless
    /// `no_dest_prefix` asks for the root of the destination.
    pub fn resolve(source_prefix: &str, dest_prefix: Option<&str>, no_dest_prefix: bool) -> Self {
        let dest = match dest_prefix {
            Some(dest) if !dest.is_empty() => dest.to_string(),
            _ if no_dest_prefix => String::new(),
            _ => source_prefix.to_string(),
        };
        Self::new(source_prefix, dest)
    }

    pub fn is_identity(&self) -> bool {
        self.source_prefix == self.dest_prefix
    }
}

/// Rewrites source keys into destination keys.
#[derive(Debug, Clone)]
pub struct KeyMapper {
    mapping: PrefixMapping,
}

impl KeyMapper {
    pub fn new(mapping: PrefixMapping) -> Self {
        Self { mapping }
    }

    /// Replace the first occurrence of the source prefix with the
    /// destination prefix.
    ///
    /// Keys delivered by the change source always start with the source
    /// prefix, so the first occurrence is the leading one.
    pub fn map(&self, key: &str) -> String {
        if self.mapping.is_identity() {
            return key.to_string();
        }
        key.replacen(&self.mapping.source_prefix, &self.mapping.dest_prefix, 1)
    }

    pub fn mapping(&self) -> &PrefixMapping {
        &self.mapping
    }
}
