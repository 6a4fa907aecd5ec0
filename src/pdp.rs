use std::collections::BTreeMap;
use std::fs;
use std::sync::{Arc, Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::domain::LigandPolicy;
use crate::domains::DomainDefinition;
use crate::error::KiraError;
use crate::name::PDP_DOMAIN_IDENTIFIER;
use crate::reader::Flushable;
use crate::structure::Structure;
use crate::substructure;

/// Loading context handed to PDP providers so they go through the shared loader.
pub trait StructureSource: Send + Sync {
    fn load_full(&self, code: &str) -> Result<Arc<Structure>, KiraError>;
    fn ligand_policy(&self) -> LigandPolicy;
}

pub trait PdpProvider: Send + Sync {
    fn domain(&self, name: &str, source: &dyn StructureSource) -> Result<Structure, KiraError>;

    fn flushable(&self) -> Option<&dyn Flushable> {
        None
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PdpFile {
    #[serde(default)]
    domains: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default)]
struct PdpState {
    domains: BTreeMap<String, Vec<String>>,
    dirty: bool,
}

/// PDP domain table kept as JSON: `{"domains": {"PDP:1cukAa": ["A_1-48"]}}`.
/// Definitions registered at runtime are written back on flush.
#[derive(Debug)]
pub struct PdpTable {
    path: Option<Utf8PathBuf>,
    state: Mutex<PdpState>,
}

impl PdpTable {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(PdpState::default()),
        }
    }

    /// Opens the table at `path`; a missing file starts an empty table there.
    pub fn open(path: &Utf8Path) -> Result<Self, KiraError> {
        let domains = if path.as_std_path().is_file() {
            let content = fs::read_to_string(path.as_std_path()).map_err(|err| {
                KiraError::DatabaseRead {
                    path: path.as_std_path().to_path_buf(),
                    message: err.to_string(),
                }
            })?;
            let file: PdpFile = serde_json::from_str(&content).map_err(|err| {
                KiraError::DatabaseRead {
                    path: path.as_std_path().to_path_buf(),
                    message: err.to_string(),
                }
            })?;
            file.domains
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            state: Mutex::new(PdpState {
                domains,
                dirty: false,
            }),
        })
    }

    pub fn insert(&self, name: &str, ranges: Vec<String>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.domains.insert(name.to_string(), ranges);
        state.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .domains
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ranges(&self, name: &str) -> Option<Vec<String>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .domains
            .get(name)
            .cloned()
    }
}

impl PdpProvider for PdpTable {
    fn domain(&self, name: &str, source: &dyn StructureSource) -> Result<Structure, KiraError> {
        let ranges = self
            .ranges(name)
            .ok_or_else(|| KiraError::DomainNotFound(name.to_string()))?;
        let pdb_id = pdp_accession(name)?;
        let full = source.load_full(&pdb_id)?;
        let definition = DomainDefinition {
            id: name.to_string(),
            pdb_id,
            ranges,
            classification_id: None,
            superfamily_id: None,
        };
        substructure::assemble_domain(&full, &definition, source.ligand_policy(), None)
    }

    fn flushable(&self) -> Option<&dyn Flushable> {
        Some(self)
    }
}

impl Flushable for PdpTable {
    fn flush(&self) -> Result<(), KiraError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.dirty {
            return Ok(());
        }
        let file = PdpFile {
            domains: state.domains.clone(),
        };
        let content = serde_json::to_vec_pretty(&file)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        write_atomic(path, &content)?;
        state.dirty = false;
        tracing::info!(path = %path, domains = file.domains.len(), "flushed PDP domain table");
        Ok(())
    }
}

fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), KiraError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix("pdp")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    std::io::Write::write_all(temp.as_file_mut(), content)
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    Ok(())
}

/// `PDP:1cukAa` → `1cuk`.
fn pdp_accession(name: &str) -> Result<String, KiraError> {
    name.strip_prefix(PDP_DOMAIN_IDENTIFIER)
        .and_then(|rest| rest.get(..4))
        .map(str::to_lowercase)
        .ok_or_else(|| KiraError::DomainNotFound(name.to_string()))
}
