// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Save-skip filters.
//!
//! A filter is a set of `field → expected value | pattern` predicates. When
//! every predicate holds for an entity snapshot, the entity is saved to the
//! system of record but never written to the search index (drafts, soft
//! deletes, ...).

use std::collections::HashMap;

use regex::Regex;
use serde_json::{Map, Value};

use crate::config::FilterPredicate;
use crate::storage::traits::SearchError;

#[derive(Debug, Clone)]
enum Predicate {
    Equals(Value),
    Matches(Regex),
}

impl Predicate {
    fn holds(&self, value: &Value) -> bool {
        match self {
            Predicate::Equals(expected) => expected == value,
            Predicate::Matches(re) => match value {
                Value::String(s) => re.is_match(s),
                Value::Number(_) | Value::Bool(_) => re.is_match(&value.to_string()),
                _ => false,
            },
        }
    }
}

/// A compiled save-skip filter for one entity type.
#[derive(Debug, Clone)]
pub struct SaveFilter {
    predicates: Vec<(String, Predicate)>,
}

impl SaveFilter {
    /// Compile the configured predicates. Fails on an invalid regex.
    pub fn compile(predicates: &HashMap<String, FilterPredicate>) -> Result<Self, SearchError> {
        let mut compiled = Vec::with_capacity(predicates.len());
        for (field, predicate) in predicates {
            let predicate = match predicate {
                FilterPredicate::Value(v) => Predicate::Equals(v.clone()),
                FilterPredicate::Pattern { pattern } => {
                    let re = Regex::new(pattern).map_err(|e| {
                        SearchError::Validation(format!(
                            "Invalid save filter pattern for '{}': {}",
                            field, e
                        ))
                    })?;
                    Predicate::Matches(re)
                }
            };
            compiled.push((field.clone(), predicate));
        }
        compiled.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Self { predicates: compiled })
    }

    /// Whether the snapshot matches every predicate. An empty filter matches nothing.
    pub fn matches(&self, snapshot: &Map<String, Value>) -> bool {
        !self.predicates.is_empty()
            && self
                .predicates
                .iter()
                .all(|(field, p)| snapshot.get(field).is_some_and(|v| p.holds(v)))
    }
}
