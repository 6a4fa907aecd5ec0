use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::KiraError;

/// Author residue number: sequence number plus optional insertion code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ResidueNumber {
    pub seq: i32,
    pub insertion: Option<char>,
}

impl ResidueNumber {
    pub fn new(seq: i32, insertion: Option<char>) -> Self {
        Self { seq, insertion }
    }
}

impl fmt::Display for ResidueNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.insertion {
            Some(code) => write!(f, "{}{}", self.seq, code),
            None => write!(f, "{}", self.seq),
        }
    }
}

impl FromStr for ResidueNumber {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (digits, insertion) = match trimmed.chars().last() {
            Some(last) if last.is_ascii_alphabetic() => {
                (&trimmed[..trimmed.len() - 1], Some(last))
            }
            _ => (trimmed, None),
        };
        let unsigned = digits.strip_prefix(['+', '-']).unwrap_or(digits);
        if unsigned.is_empty() || !unsigned.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(KiraError::MalformedRange(value.to_string()));
        }
        let seq = digits
            .trim_start_matches('+')
            .parse::<i32>()
            .map_err(|_| KiraError::MalformedRange(value.to_string()))?;
        Ok(Self { seq, insertion })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    AminoAcid,
    Nucleotide,
    Hetatm,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Atom {
    pub serial: u32,
    pub name: String,
    pub element: String,
    pub coords: [f64; 3],
    pub occupancy: f64,
    pub b_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub name: String,
    pub number: ResidueNumber,
    pub kind: GroupKind,
    pub atoms: Vec<Atom>,
}

impl Group {
    pub fn new(name: &str, number: ResidueNumber, kind: GroupKind) -> Self {
        Self {
            name: name.to_string(),
            number,
            kind,
            atoms: Vec::new(),
        }
    }

    pub fn is_polymer(&self) -> bool {
        matches!(self.kind, GroupKind::AminoAcid | GroupKind::Nucleotide)
    }

    /// Non-polymer group: cofactors, ions, solvent.
    pub fn is_ligand(&self) -> bool {
        !self.is_polymer()
    }

    pub fn is_water(&self) -> bool {
        matches!(self.name.as_str(), "HOH" | "DOD" | "WAT")
    }

    pub fn atom(&self, name: &str) -> Option<&Atom> {
        self.atoms.iter().find(|atom| atom.name == name)
    }

    /// Same residue: name, number and kind. Atom coordinates are not compared.
    pub fn same_residue(&self, other: &Group) -> bool {
        self.name == other.name && self.number == other.number && self.kind == other.kind
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chain {
    pub id: String,
    groups: Vec<Group>,
}

impl Chain {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            groups: Vec::new(),
        }
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn add_group(&mut self, group: Group) {
        self.groups.push(group);
    }

    pub fn last_group_mut(&mut self) -> Option<&mut Group> {
        self.groups.last_mut()
    }

    pub fn contains_group(&self, group: &Group) -> bool {
        self.groups.iter().any(|existing| existing.same_residue(group))
    }

    pub fn ligands(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter().filter(|group| group.is_ligand())
    }

    pub fn ligand_count(&self) -> usize {
        self.ligands().count()
    }

    pub fn polymer_count(&self) -> usize {
        self.groups.iter().filter(|group| group.is_polymer()).count()
    }

    pub fn position_of(&self, number: &ResidueNumber) -> Option<usize> {
        self.groups.iter().position(|group| &group.number == number)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Model {
    chains: Vec<Chain>,
}

impl Model {
    pub fn new(chains: Vec<Chain>) -> Self {
        Self { chains }
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn chain(&self, id: &str) -> Option<&Chain> {
        self.chains.iter().find(|chain| chain.id == id)
    }

    pub fn chain_mut(&mut self, id: &str) -> Option<&mut Chain> {
        self.chains.iter_mut().find(|chain| chain.id == id)
    }

    /// Returns the chain with this id, appending an empty one when missing.
    pub fn chain_or_insert(&mut self, id: &str) -> &mut Chain {
        let index = match self.chains.iter().position(|chain| chain.id == id) {
            Some(index) => index,
            None => {
                self.chains.push(Chain::new(id));
                self.chains.len() - 1
            }
        };
        &mut self.chains[index]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Header {
    pub id_code: Option<String>,
    pub classification: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Structure {
    pub name: String,
    pub pdb_code: String,
    pub header: Header,
    models: Vec<Model>,
}

impl Structure {
    pub fn new(pdb_code: &str) -> Self {
        Self {
            name: pdb_code.to_string(),
            pdb_code: pdb_code.to_string(),
            header: Header::default(),
            models: Vec::new(),
        }
    }

    pub fn with_models(pdb_code: &str, models: Vec<Model>) -> Self {
        Self {
            models,
            ..Self::new(pdb_code)
        }
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn add_model(&mut self, model: Model) {
        self.models.push(model);
    }

    /// Chains of the first model. Empty when the structure has no models.
    pub fn chains(&self) -> &[Chain] {
        self.models.first().map(Model::chains).unwrap_or(&[])
    }

    pub fn chain(&self, id: &str) -> Option<&Chain> {
        self.models.first().and_then(|model| model.chain(id))
    }

    pub fn chain_mut(&mut self, id: &str) -> Option<&mut Chain> {
        self.models.first_mut().and_then(|model| model.chain_mut(id))
    }

    pub fn has_chain(&self, id: &str) -> bool {
        self.chain(id).is_some()
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.chains().iter().flat_map(|chain| chain.groups().iter())
    }

    pub fn atom_count(&self) -> usize {
        self.groups().map(|group| group.atoms.len()).sum()
    }

    /// Cα atoms of amino acids in the first model, in chain order.
    pub fn ca_atoms(&self) -> Vec<Atom> {
        self.groups()
            .filter(|group| group.kind == GroupKind::AminoAcid)
            .filter_map(|group| group.atom("CA").cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_residue_numbers() {
        assert_eq!("12".parse::<ResidueNumber>().unwrap(), ResidueNumber::new(12, None));
        assert_eq!(
            "-3A".parse::<ResidueNumber>().unwrap(),
            ResidueNumber::new(-3, Some('A'))
        );
        assert_eq!("+7".parse::<ResidueNumber>().unwrap(), ResidueNumber::new(7, None));
        assert_eq!(ResidueNumber::new(100, Some('B')).to_string(), "100B");
    }

    #[test]
    fn reject_bad_residue_numbers() {
        assert_matches!("".parse::<ResidueNumber>(), Err(KiraError::MalformedRange(_)));
        assert_matches!("A".parse::<ResidueNumber>(), Err(KiraError::MalformedRange(_)));
        assert_matches!("1-2".parse::<ResidueNumber>(), Err(KiraError::MalformedRange(_)));
    }

    #[test]
    fn chain_or_insert_keeps_order() {
        let mut model = Model::default();
        model.chain_or_insert("B");
        model.chain_or_insert("A");
        model.chain_or_insert("B");
        let ids: Vec<_> = model.chains().iter().map(|chain| chain.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A"]);
    }
}
