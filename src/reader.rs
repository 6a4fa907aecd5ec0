use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::Url;
use tempfile::Builder;

use crate::domain::{ParsingOptions, PdbId};
use crate::error::KiraError;
use crate::pdb;
use crate::rcsb::{RcsbClient, is_not_found};
use crate::structure::Structure;

/// Collaborators that keep their own caches and can write them out on shutdown.
pub trait Flushable {
    fn flush(&self) -> Result<(), KiraError>;
}

/// Raw structure source: turns an accession, URL or assembly id into a full structure.
pub trait StructureProvider: Send + Sync {
    /// `code` is the lower-case accession.
    fn parse_accession(&self, code: &str, options: &ParsingOptions)
    -> Result<Structure, KiraError>;
    fn parse_url(&self, url: &Url, options: &ParsingOptions) -> Result<Structure, KiraError>;
    /// Index 0 is the asymmetric unit.
    fn fetch_assembly(
        &self,
        code: &str,
        index: u32,
        options: &ParsingOptions,
    ) -> Result<Structure, KiraError>;

    fn flushable(&self) -> Option<&dyn Flushable> {
        None
    }
}

/// Reads PDB files from a local mirror, downloading missing entries into it.
#[derive(Clone)]
pub struct PdbFileReader<C: RcsbClient> {
    client: C,
}

impl<C: RcsbClient> PdbFileReader<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn entry_path(dir: &Utf8Path, id: &PdbId, split: bool) -> Utf8PathBuf {
        let key = id.load_key();
        if split {
            dir.join("data/structures/divided/pdb")
                .join(id.middle())
                .join(format!("pdb{key}.ent.gz"))
        } else {
            dir.join(format!("pdb{key}.ent.gz"))
        }
    }

    pub fn obsolete_path(dir: &Utf8Path, id: &PdbId, split: bool) -> Utf8PathBuf {
        let key = id.load_key();
        if split {
            dir.join("data/structures/obsolete/pdb")
                .join(id.middle())
                .join(format!("pdb{key}.ent.gz"))
        } else {
            dir.join("obsolete").join(format!("pdb{key}.ent.gz"))
        }
    }

    pub fn assembly_path(dir: &Utf8Path, id: &PdbId, index: u32, split: bool) -> Utf8PathBuf {
        let key = id.load_key();
        if split {
            dir.join("data/biounit/coordinates/divided")
                .join(id.middle())
                .join(format!("{key}.pdb{index}.gz"))
        } else {
            dir.join(format!("{key}.pdb{index}.gz"))
        }
    }

    /// Existing local file for `id`, checking the common spellings used by mirrors.
    pub fn find_local(dir: &Utf8Path, id: &PdbId, split: bool) -> Option<Utf8PathBuf> {
        let key = id.load_key();
        let mut candidates = vec![Self::entry_path(dir, id, split)];
        candidates.extend([
            dir.join(format!("pdb{key}.ent")),
            dir.join(format!("{key}.pdb")),
            dir.join(format!("{key}.pdb.gz")),
            dir.join(format!("{}.pdb", id.as_str())),
            dir.join(format!("{}.pdb.gz", id.as_str())),
        ]);
        candidates
            .into_iter()
            .find(|path| path.as_std_path().is_file())
    }

    fn read_file(path: &Utf8Path, code: &str, options: &ParsingOptions) -> Result<Structure, KiraError> {
        tracing::debug!(path = %path, "reading structure file");
        let bytes = fs::read(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("read {path}: {err}")))?;
        pdb::parse_bytes(&bytes, code, options.detail)
    }

    /// Downloads into a temp file next to `target` and renames it into place.
    fn fetch_to<F>(target: &Utf8Path, download: F) -> Result<(), KiraError>
    where
        F: FnOnce(&mut dyn std::io::Write) -> Result<(), KiraError>,
    {
        let parent = target
            .parent()
            .ok_or_else(|| KiraError::Filesystem(format!("no parent directory for {target}")))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix("kira-sc")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        download(temp.as_file_mut())?;
        temp.persist(target.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }

    fn load_obsolete(&self, id: &PdbId, options: &ParsingOptions) -> Result<Structure, KiraError> {
        let target = Self::obsolete_path(&options.pdb_dir, id, options.split);
        if !target.as_std_path().is_file() {
            tracing::info!(pdb = %id, "fetching obsolete entry");
            Self::fetch_to(&target, |out| self.client.download_obsolete(id, out))?;
        }
        Self::read_file(&target, &id.load_key(), options)
    }

    fn load_current(&self, id: &PdbId, options: &ParsingOptions) -> Result<Structure, KiraError> {
        let replacement = self
            .client
            .replaced_by(id)?
            .into_iter()
            .next()
            .ok_or_else(|| KiraError::NotAvailableLocally(id.load_key()))?;
        tracing::info!(obsolete = %id, current = %replacement, "fetching superseding entry");
        let current = ParsingOptions {
            fetch_current: false,
            ..options.clone()
        };
        self.parse_accession(&replacement.load_key(), &current)
    }
}

impl<C: RcsbClient> StructureProvider for PdbFileReader<C> {
    fn parse_accession(
        &self,
        code: &str,
        options: &ParsingOptions,
    ) -> Result<Structure, KiraError> {
        let id: PdbId = code.parse()?;
        if let Some(path) = Self::find_local(&options.pdb_dir, &id, options.split) {
            return Self::read_file(&path, code, options);
        }
        if options.fetch_obsolete {
            let obsolete = Self::obsolete_path(&options.pdb_dir, &id, options.split);
            if obsolete.as_std_path().is_file() {
                return Self::read_file(&obsolete, code, options);
            }
        }
        if !options.auto_fetch {
            return Err(KiraError::NotAvailableLocally(code.to_string()));
        }

        let target = Self::entry_path(&options.pdb_dir, &id, options.split);
        tracing::info!(pdb = %id, path = %target, "fetching entry");
        match Self::fetch_to(&target, |out| self.client.download_entry(&id, out)) {
            Ok(()) => Self::read_file(&target, code, options),
            Err(err) if is_not_found(&err) && options.fetch_obsolete => {
                self.load_obsolete(&id, options)
            }
            Err(err) if is_not_found(&err) && options.fetch_current => {
                self.load_current(&id, options)
            }
            Err(err) => Err(err),
        }
    }

    fn parse_url(&self, url: &Url, options: &ParsingOptions) -> Result<Structure, KiraError> {
        let code = code_from_url(url);
        match url.scheme() {
            "file" => {
                let path = url.to_file_path().map_err(|_| KiraError::InvalidUrl {
                    url: url.to_string(),
                    message: "not a local file path".to_string(),
                })?;
                let path = Utf8PathBuf::from_path_buf(path).map_err(|_| {
                    KiraError::Filesystem("non-utf8 file path in URL".to_string())
                })?;
                Self::read_file(&path, &code, options)
            }
            "http" | "https" => {
                tracing::info!(url = %url, "fetching structure from URL");
                let bytes = self.client.fetch_url(url.as_str())?;
                pdb::parse_bytes(&bytes, &code, options.detail)
            }
            scheme => Err(KiraError::InvalidUrl {
                url: url.to_string(),
                message: format!("unsupported scheme {scheme}"),
            }),
        }
    }

    fn fetch_assembly(
        &self,
        code: &str,
        index: u32,
        options: &ParsingOptions,
    ) -> Result<Structure, KiraError> {
        if index == 0 {
            return self.parse_accession(code, options);
        }
        let id: PdbId = code.parse()?;
        let target = Self::assembly_path(&options.pdb_dir, &id, index, options.split);
        if !target.as_std_path().is_file() {
            if !options.auto_fetch {
                return Err(KiraError::NotAvailableLocally(format!("{code}.pdb{index}")));
            }
            tracing::info!(pdb = %id, index, "fetching biological assembly");
            Self::fetch_to(&target, |out| self.client.download_assembly(&id, index, out))?;
        }
        Self::read_file(&target, code, options)
    }
}

/// Best guess at the accession from the last path segment, e.g. `pdb1abc.ent.gz`.
pub fn code_from_url(url: &Url) -> String {
    let file_name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    let stem = file_name.split('.').next().unwrap_or_default();
    let stem = match stem.strip_prefix("pdb") {
        Some(rest) if rest.len() == 4 => rest,
        _ => stem,
    };
    stem.to_lowercase()
}
