use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("can't interpret names shorter than 4 characters: {0:?}")]
    TooShort(String),

    #[error("name does not match any known structure naming scheme: {0}")]
    UnresolvedName(String),

    #[error("invalid PDB id: {0}")]
    InvalidPdbId(String),

    #[error("invalid chain index in {0}")]
    InvalidChainIndex(String),

    #[error("invalid biological assembly index in {0}")]
    InvalidAssemblyIndex(String),

    #[error("invalid structure URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("{message} while parsing {accession}")]
    Load { accession: String, message: String },

    #[error("failed to parse structure data: {0}")]
    Parse(String),

    #[error("unable to resolve domain: {0}")]
    DomainNotFound(String),

    #[error("malformed residue range: {0}")]
    MalformedRange(String),

    #[error("chain {chain} not found in {pdb}")]
    ChainNotFound { pdb: String, chain: String },

    #[error("residue {residue} not found in chain {chain}")]
    ResidueNotFound { chain: String, residue: String },

    #[error("structure file not available locally and auto fetch is disabled: {0}")]
    NotAvailableLocally(String),

    #[error("RCSB request failed: {0}")]
    RcsbHttp(String),

    #[error("RCSB returned status {status}: {message}")]
    RcsbStatus { status: u16, message: String },

    #[error("failed to read {path}: {message}")]
    DatabaseRead { path: PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("no {0} configured")]
    MissingCollaborator(&'static str),

    #[error("{source} while resolving {name}")]
    Resolve {
        name: String,
        #[source]
        source: Box<KiraError>,
    },
}

impl KiraError {
    /// Prepends the request string, unless the error already carries it.
    pub fn while_resolving(self, name: &str) -> Self {
        match self {
            KiraError::Resolve { .. } | KiraError::TooShort(_) | KiraError::UnresolvedName(_) => {
                self
            }
            other => KiraError::Resolve {
                name: name.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through request context.
    pub fn root(&self) -> &KiraError {
        match self {
            KiraError::Resolve { source, .. } => source.root(),
            other => other,
        }
    }
}
