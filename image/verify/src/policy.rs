/*++

Licensed under the Apache-2.0 license.

File Name:

    policy.rs

Abstract:

    Validator capabilities and the per-artifact policy selecting them.

--*/

use aegis_error::{AegisError, AegisResult};
use alloc::string::String;
use alloc::vec::Vec;

/// Longest artifact name accepted in policies and trust anchors
pub const MAX_ARTIFACT_NAME_LEN: usize = 64;

/// Check applied to an artifact or a configuration value
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Validator {
    /// Artifact digest must match a known-hash trust anchor
    HashCheck,

    /// Artifact must carry a signature chaining to a trusted root
    SignatureCheck,

    /// Value (the artifact size for artifacts) must lie in `min..=max`
    RangeCheck { min: u64, max: u64 },
}

impl Validator {
    pub const fn range(min: u64, max: u64) -> Self {
        Validator::RangeCheck { min, max }
    }

    /// Returns true for hash and signature checks, which establish authenticity
    pub fn is_authenticating(&self) -> bool {
        matches!(self, Validator::HashCheck | Validator::SignatureCheck)
    }

    /// Returns true if this is a range check admitting `value`
    pub fn admits(&self, value: u64) -> bool {
        match self {
            Validator::RangeCheck { min, max } => (*min..=*max).contains(&value),
            _ => false,
        }
    }
}

pub(crate) fn validate_artifact_name(name: &str) -> AegisResult<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_ARTIFACT_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if valid {
        Ok(())
    } else {
        Err(AegisError::IMAGE_VERIFIER_INVALID_ARTIFACT_NAME)
    }
}

/// Validators applied to one named artifact
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ArtifactPolicy {
    name: String,
    validators: Vec<Validator>,
}

impl ArtifactPolicy {
    /// Create a policy
    ///
    /// # Arguments
    ///
    /// * `name` - Artifact name, matched against `hash.<name>` trust anchors
    /// * `validators` - Checks to apply. Every range check must pass and at
    ///   least one hash or signature check must pass.
    pub fn new(name: &str, validators: &[Validator]) -> AegisResult<Self> {
        validate_artifact_name(name)?;
        Ok(Self {
            name: String::from(name),
            validators: validators.to_vec(),
        })
    }

    /// Policy accepting the artifact on a known-hash match only
    pub fn known_hash(name: &str) -> AegisResult<Self> {
        Self::new(name, &[Validator::HashCheck])
    }

    /// Policy accepting the artifact on a valid signature only
    pub fn signed(name: &str) -> AegisResult<Self> {
        Self::new(name, &[Validator::SignatureCheck])
    }

    /// Add a size bound to the policy
    pub fn with_size_range(mut self, min: u64, max: u64) -> Self {
        self.validators.push(Validator::range(min, max));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }
}
