//! PDB parsing and structural metrics
//!
//! The default [`ArtifactAnalyzer`] reads fixed-column ATOM/HETATM records.
//! Lines that cannot be parsed are skipped and counted rather than failing
//! the whole structure.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::artifact::{PredictionArtifact, ProviderTier};
use crate::errors::AgentError;
use crate::provider::ArtifactAnalyzer;

/// One coordinate record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomRecord {
    pub serial: u32,
    pub name: String,
    pub residue_name: String,
    pub chain: String,
    pub residue_seq: i32,
    pub position: [f64; 3],
    pub b_factor: f64,
}

/// Result of parsing a prediction artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedStructure {
    pub total_atoms: usize,
    pub total_residues: usize,
    pub chains: Vec<String>,
    pub mean_b_factor: f64,
    pub skipped_lines: usize,
    /// Alpha-carbon trace in residue order
    #[serde(skip_serializing, default)]
    pub ca_trace: Vec<[f64; 3]>,
}

/// Structural and quality metrics for one prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub total_atoms: usize,
    pub total_residues: usize,
    pub sequence_length: usize,
    pub prediction_method: String,
    pub tier: ProviderTier,
    pub confidence: f64,
    pub mean_plddt: f64,
    pub radius_of_gyration: Option<f64>,
    pub mean_ca_distance: Option<f64>,
    /// Parsed residues over sequence length
    pub residue_coverage: f64,
}

/// Parse a single fixed-column ATOM/HETATM line
pub fn parse_atom_line(line: &str) -> Option<AtomRecord> {
    if !(line.starts_with("ATOM") || line.starts_with("HETATM")) {
        return None;
    }
    let field = |start: usize, end: usize| line.get(start..end.min(line.len())).map(str::trim);

    let serial = field(6, 11)?.parse().ok()?;
    let name = field(12, 16)?.to_string();
    let residue_name = field(17, 20)?.to_string();
    let chain = field(21, 22).unwrap_or_default().to_string();
    let residue_seq = field(22, 26)?.parse().ok()?;
    let x = field(30, 38)?.parse().ok()?;
    let y = field(38, 46)?.parse().ok()?;
    let z = field(46, 54)?.parse().ok()?;
    let b_factor = field(60, 66)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0);

    Some(AtomRecord {
        serial,
        name,
        residue_name,
        chain,
        residue_seq,
        position: [x, y, z],
        b_factor,
    })
}

/// Format one ATOM record in fixed PDB columns
pub fn format_atom_line(atom: &AtomRecord, element: &str) -> String {
    format!(
        "ATOM  {:>5} {:<4} {:>3} {:1}{:>4}    {:>8.3}{:>8.3}{:>8.3}{:>6.2}{:>6.2}          {:>2}",
        atom.serial,
        pad_atom_name(&atom.name),
        atom.residue_name,
        atom.chain,
        atom.residue_seq,
        atom.position[0],
        atom.position[1],
        atom.position[2],
        1.0,
        atom.b_factor,
        element
    )
}

// Atom names shorter than four characters start in column 14.
fn pad_atom_name(name: &str) -> String {
    if name.len() < 4 {
        format!(" {}", name)
    } else {
        name.to_string()
    }
}

/// Three-letter residue code for a one-letter amino acid
pub fn residue_code(aa: char) -> &'static str {
    match aa {
        'A' => "ALA",
        'C' => "CYS",
        'D' => "ASP",
        'E' => "GLU",
        'F' => "PHE",
        'G' => "GLY",
        'H' => "HIS",
        'I' => "ILE",
        'K' => "LYS",
        'L' => "LEU",
        'M' => "MET",
        'N' => "ASN",
        'P' => "PRO",
        'Q' => "GLN",
        'R' => "ARG",
        'S' => "SER",
        'T' => "THR",
        'V' => "VAL",
        'W' => "TRP",
        'Y' => "TYR",
        _ => "UNK",
    }
}

/// Per-residue B-factors of the alpha carbons, in residue order
pub fn ca_b_factors(pdb: &str) -> Vec<f64> {
    pdb.lines()
        .filter_map(parse_atom_line)
        .filter(|atom| atom.name == "CA")
        .map(|atom| atom.b_factor)
        .collect()
}

/// Default analyzer over PDB text
#[derive(Debug, Clone, Copy, Default)]
pub struct PdbAnalyzer;

impl ArtifactAnalyzer for PdbAnalyzer {
    fn parse(&self, artifact: &PredictionArtifact) -> Result<ParsedStructure, AgentError> {
        if artifact.pdb.trim().is_empty() {
            return Err(AgentError::Analysis(
                "No structure data available for parsing".to_string(),
            ));
        }

        let mut atoms = Vec::new();
        let mut skipped_lines = 0;
        for line in artifact.pdb.lines() {
            if !(line.starts_with("ATOM") || line.starts_with("HETATM")) {
                continue;
            }
            match parse_atom_line(line) {
                Some(atom) => atoms.push(atom),
                None => skipped_lines += 1,
            }
        }

        if atoms.is_empty() {
            return Err(AgentError::Analysis(format!(
                "No parsable ATOM records ({} malformed lines)",
                skipped_lines
            )));
        }

        let residues: BTreeSet<(&str, i32)> = atoms
            .iter()
            .map(|atom| (atom.chain.as_str(), atom.residue_seq))
            .collect();
        let chains: BTreeSet<&str> = atoms.iter().map(|atom| atom.chain.as_str()).collect();
        let mean_b_factor =
            atoms.iter().map(|atom| atom.b_factor).sum::<f64>() / atoms.len() as f64;
        let ca_trace = atoms
            .iter()
            .filter(|atom| atom.name == "CA")
            .map(|atom| atom.position)
            .collect();

        Ok(ParsedStructure {
            total_atoms: atoms.len(),
            total_residues: residues.len(),
            chains: chains.into_iter().map(str::to_string).collect(),
            mean_b_factor,
            skipped_lines,
            ca_trace,
        })
    }

    fn metrics(
        &self,
        parsed: &ParsedStructure,
        artifact: &PredictionArtifact,
        sequence: &str,
    ) -> Result<MetricSet, AgentError> {
        let sequence_length = sequence.chars().count();
        if sequence_length == 0 {
            return Err(AgentError::Analysis(
                "Cannot compute metrics for an empty sequence".to_string(),
            ));
        }

        Ok(MetricSet {
            total_atoms: parsed.total_atoms,
            total_residues: parsed.total_residues,
            sequence_length,
            prediction_method: artifact.method.clone(),
            tier: artifact.tier,
            confidence: artifact.confidence,
            mean_plddt: artifact.mean_plddt(),
            radius_of_gyration: radius_of_gyration(&parsed.ca_trace),
            mean_ca_distance: mean_consecutive_distance(&parsed.ca_trace),
            residue_coverage: parsed.total_residues as f64 / sequence_length as f64,
        })
    }
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

fn radius_of_gyration(points: &[[f64; 3]]) -> Option<f64> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let mut centroid = [0.0; 3];
    for p in points {
        for axis in 0..3 {
            centroid[axis] += p[axis] / n;
        }
    }
    let sum_sq: f64 = points.iter().map(|p| distance(p, &centroid).powi(2)).sum();
    Some((sum_sq / n).sqrt())
}

fn mean_consecutive_distance(points: &[[f64; 3]]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let total: f64 = points.windows(2).map(|w| distance(&w[0], &w[1])).sum();
    Some(total / (points.len() - 1) as f64)
}
