use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{LigandPolicy, ParseDetail, ParsingOptions};
use crate::error::KiraError;

pub const CONFIG_FILE: &str = "kira-sc.json";
pub const PDB_DIR_ENV: &str = "PDB_DIR";
pub const PDB_CACHE_DIR_ENV: &str = "PDB_CACHE_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub pdb_dir: Utf8PathBuf,
    /// Where collaborator caches live; falls back to `pdb_dir`.
    pub cache_dir: Option<Utf8PathBuf>,
    /// Use the `divided/<middle two chars>/` mirror layout.
    pub split: bool,
    pub auto_fetch: bool,
    pub fetch_obsolete: bool,
    pub fetch_current: bool,
    pub strict_scop: bool,
    pub strict_ligands: bool,
    /// Turn URL, PDP and assembly failures into an empty result instead of an error.
    pub legacy_lenient: bool,
    pub parse_detail: ParseDetail,
    pub scop_dir: Option<Utf8PathBuf>,
    pub cath_file: Option<Utf8PathBuf>,
    pub pdp_file: Option<Utf8PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            pdb_dir: default_pdb_dir(),
            cache_dir: None,
            split: false,
            auto_fetch: true,
            fetch_obsolete: false,
            fetch_current: false,
            strict_scop: true,
            strict_ligands: false,
            legacy_lenient: false,
            parse_detail: ParseDetail::Full,
            scop_dir: None,
            cath_file: None,
            pdp_file: None,
        }
    }
}

impl ResolverConfig {
    pub fn cache_dir(&self) -> Utf8PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| self.pdb_dir.clone())
    }

    pub fn ligand_policy(&self) -> LigandPolicy {
        LigandPolicy::from_strict(self.strict_ligands)
    }

    pub fn parsing_options(&self) -> ParsingOptions {
        ParsingOptions {
            pdb_dir: self.pdb_dir.clone(),
            split: self.split,
            auto_fetch: self.auto_fetch,
            fetch_obsolete: self.fetch_obsolete,
            fetch_current: self.fetch_current,
            detail: self.parse_detail,
        }
    }

    /// PDP table location: `pdp_file`, or `pdp-domains.json` under the cache dir.
    pub fn pdp_path(&self) -> Utf8PathBuf {
        self.pdp_file
            .clone()
            .unwrap_or_else(|| self.cache_dir().join("pdp-domains.json"))
    }
}

pub fn default_pdb_dir() -> Utf8PathBuf {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(
                dirs.home_dir()
                    .join(".cache")
                    .join("kira-structure-cache")
                    .join("pdb"),
            )
            .ok()
        })
        .unwrap_or_else(|| Utf8PathBuf::from("pdb"))
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `kira-sc.json` from the working directory when it exists,
    /// then applies `PDB_DIR` / `PDB_CACHE_DIR` from the environment.
    pub fn resolve(path: Option<&str>) -> Result<ResolverConfig, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            ResolverConfig::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
            Self::parse(&content)?
        };

        Ok(Self::apply_env(config, |key| std::env::var(key).ok()))
    }

    pub fn parse(content: &str) -> Result<ResolverConfig, KiraError> {
        serde_json::from_str(content).map_err(|err| KiraError::ConfigParse(err.to_string()))
    }

    pub fn apply_env<F>(mut config: ResolverConfig, lookup: F) -> ResolverConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(PDB_DIR_ENV).filter(|value| !value.is_empty()) {
            tracing::debug!(pdb_dir = %dir, "using {PDB_DIR_ENV}");
            config.pdb_dir = Utf8PathBuf::from(dir);
        }
        if let Some(dir) = lookup(PDB_CACHE_DIR_ENV).filter(|value| !value.is_empty()) {
            config.cache_dir = Some(Utf8PathBuf::from(dir));
        }
        config
    }
}
