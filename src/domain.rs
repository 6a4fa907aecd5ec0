use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

/// Four character PDB accession. Stored upper case for display; loads use
/// [`PdbId::load_key`], so ids that differ only by case share a load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PdbId(String);

impl PdbId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn load_key(&self) -> String {
        self.0.to_lowercase()
    }

    /// Middle two characters, used by the divided directory layout.
    pub fn middle(&self) -> String {
        self.load_key()[1..3].to_string()
    }
}

impl fmt::Display for PdbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PdbId {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let is_valid =
            normalized.len() == 4 && normalized.chars().all(|ch| ch.is_ascii_alphanumeric());
        if !is_valid {
            return Err(KiraError::InvalidPdbId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// How hetero groups are merged back into a domain after range extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LigandPolicy {
    /// Every ligand of a chain that is present in the domain.
    #[default]
    Loose,
    /// Only ligands whose residue position lies inside one of the domain ranges.
    Strict,
}

impl LigandPolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            LigandPolicy::Strict
        } else {
            LigandPolicy::Loose
        }
    }
}

impl fmt::Display for LigandPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LigandPolicy::Loose => write!(f, "loose"),
            LigandPolicy::Strict => write!(f, "strict"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ParseDetail {
    #[default]
    Full,
    /// Cα atoms only for amino acids; other groups keep all atoms.
    CaOnly,
    /// Header records only, no coordinates.
    HeaderOnly,
}

/// Options handed to the structure provider on every load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsingOptions {
    pub pdb_dir: camino::Utf8PathBuf,
    pub split: bool,
    pub auto_fetch: bool,
    pub fetch_obsolete: bool,
    pub fetch_current: bool,
    pub detail: ParseDetail,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_pdb_id_valid() {
        let id: PdbId = "4hhb".parse().unwrap();
        assert_eq!(id.as_str(), "4HHB");
        assert_eq!(id.load_key(), "4hhb");
        assert_eq!(id.middle(), "hh");
    }

    #[test]
    fn parse_pdb_id_invalid() {
        let err = "4hh".parse::<PdbId>().unwrap_err();
        assert_matches!(err, KiraError::InvalidPdbId(_));
        let err = "4h.b".parse::<PdbId>().unwrap_err();
        assert_matches!(err, KiraError::InvalidPdbId(_));
    }

    #[test]
    fn ligand_policy_from_flag() {
        assert_eq!(LigandPolicy::from_strict(true), LigandPolicy::Strict);
        assert_eq!(LigandPolicy::from_strict(false), LigandPolicy::Loose);
        assert_eq!(LigandPolicy::default(), LigandPolicy::Loose);
    }
}
