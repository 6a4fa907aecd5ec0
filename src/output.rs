use std::io::{self, Write};

use serde::Serialize;

use crate::name::StructureName;
use crate::structure::{Chain, Structure};

#[derive(Debug, Clone, Serialize)]
pub struct ChainSummary {
    pub id: String,
    pub groups: usize,
    pub polymers: usize,
    pub ligands: usize,
    pub waters: usize,
}

impl ChainSummary {
    pub fn from_chain(chain: &Chain) -> Self {
        Self {
            id: chain.id.clone(),
            groups: chain.groups().len(),
            polymers: chain.polymer_count(),
            ligands: chain.ligand_count(),
            waters: chain.groups().iter().filter(|group| group.is_water()).count(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StructureSummary {
    pub request: String,
    pub name: String,
    pub pdb_code: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub models: usize,
    pub atoms: usize,
    pub chains: Vec<ChainSummary>,
    pub resolved_at: String,
}

impl StructureSummary {
    pub fn new(request: &str, structure: &Structure) -> Self {
        Self {
            request: request.to_string(),
            name: structure.name.clone(),
            pdb_code: structure.pdb_code.clone(),
            title: structure.header.title.clone(),
            description: structure.header.description.clone(),
            models: structure.model_count(),
            atoms: structure.atom_count(),
            chains: structure.chains().iter().map(ChainSummary::from_chain).collect(),
            resolved_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveResult {
    pub request: String,
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<StructureSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifyResult {
    pub request: String,
    pub kind: &'static str,
    pub name: StructureName,
    pub matching_rules: Vec<&'static str>,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_resolve(result: &ResolveResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_classify(result: &ClassifyResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
