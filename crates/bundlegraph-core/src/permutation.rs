//! Permutations of variable fields and their stable checksums.
//!
//! A [`Permutation`] assigns one value to every variable field and carries
//! the session's fixed values alongside. Its checksum is computed from the
//! canonical JSON of the sorted `(field, value)` map, hashed with SHA-256
//! and truncated to [`CHECKSUM_LEN`] hex characters.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::field::{FieldDomains, FieldRegistry, FieldValue};

/// Number of hex characters kept from the SHA-256 digest.
pub const CHECKSUM_LEN: usize = 8;

/// One concrete field assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permutation {
    values: BTreeMap<String, FieldValue>,
    checksum: String,
}

impl Permutation {
    pub fn new(values: BTreeMap<String, FieldValue>) -> Self {
        let checksum = compute_checksum(&values);
        Self { values, checksum }
    }

    /// The permutation with no assignments at all.
    pub fn empty() -> Self {
        Self::new(BTreeMap::new())
    }

    /// Value assigned to `field`, if any.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    /// `true` when `field` is assigned a truthy value.
    pub fn is_set(&self, field: &str) -> bool {
        self.values.get(field).is_some_and(FieldValue::is_truthy)
    }

    pub fn values(&self) -> &BTreeMap<String, FieldValue> {
        &self.values
    }

    /// Canonical key the checksum is computed from.
    pub fn key(&self) -> String {
        canonical_key(&self.values)
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }
}

impl fmt::Display for Permutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .values
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        write!(f, "{} [{}]", self.checksum, pairs.join(", "))
    }
}

fn canonical_key(values: &BTreeMap<String, FieldValue>) -> String {
    // BTreeMap keys serialize in sorted order; plain values cannot fail.
    serde_json::to_string(values).unwrap_or_default()
}

fn compute_checksum(values: &BTreeMap<String, FieldValue>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_key(values).as_bytes());
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(CHECKSUM_LEN);
    hex
}

/// Permutation carrying only the session's fixed values.
pub fn fixed_permutation(registry: &FieldRegistry, domains: &FieldDomains) -> Result<Permutation> {
    Ok(Permutation::new(registry.fixed_values(domains)?))
}

/// Cartesian product over every variable field's domain.
///
/// Fields are iterated in project declaration order and values in domain
/// declaration order, with the last field varying fastest. With no variable
/// fields exactly one permutation (the fixed values) is produced.
pub fn enumerate(registry: &FieldRegistry, domains: &FieldDomains) -> Result<Vec<Permutation>> {
    let fixed = registry.fixed_values(domains)?;
    let variable = registry.variable_fields(domains)?;

    let mut assignments: Vec<BTreeMap<String, FieldValue>> = vec![fixed];
    for decl in variable {
        let domain = decl.domain();
        let mut next = Vec::with_capacity(assignments.len() * domain.len());
        for partial in &assignments {
            for value in &domain {
                let mut extended = partial.clone();
                extended.insert(decl.name.clone(), value.clone());
                next.push(extended);
            }
        }
        assignments = next;
    }

    Ok(assignments.into_iter().map(Permutation::new).collect())
}
