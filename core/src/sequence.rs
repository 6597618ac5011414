//! Amino-acid sequence normalization, validation and fingerprinting

use std::collections::BTreeSet;

use crate::errors::AgentError;

/// The 20 canonical residues accepted by the folding backends
pub const AMINO_ACIDS: &str = "ACDEFGHIKLMNPQRSTVWY";

/// Default backend residue limit
pub const DEFAULT_MAX_SEQUENCE_LENGTH: usize = 400;

/// Normalize a raw sequence: drop all whitespace, uppercase
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Stable content fingerprint of the normalized sequence (BLAKE3, hex)
///
/// Normalization happens here, so `"mktv"` and `" MKTV\n"` share a fingerprint.
pub fn fingerprint(raw: &str) -> String {
    blake3::hash(normalize(raw).as_bytes()).to_hex().to_string()
}

/// First 8 hex characters of the fingerprint, for log correlation
pub fn short_fingerprint(fingerprint: &str) -> &str {
    &fingerprint[..fingerprint.len().min(8)]
}

/// Validate an already-normalized sequence
pub fn validate(sequence: &str, max_length: usize) -> Result<(), AgentError> {
    if sequence.is_empty() {
        return Err(AgentError::Validation("Sequence cannot be empty".to_string()));
    }

    let length = sequence.chars().count();
    if length > max_length {
        return Err(AgentError::Validation(format!(
            "Sequence length {} exceeds limit of {} residues",
            length, max_length
        )));
    }

    let invalid: BTreeSet<char> = sequence
        .chars()
        .filter(|c| !AMINO_ACIDS.contains(*c))
        .collect();
    if !invalid.is_empty() {
        let listed: String = invalid.into_iter().collect();
        return Err(AgentError::Validation(format!(
            "Invalid amino acid characters: {}",
            listed
        )));
    }

    Ok(())
}
