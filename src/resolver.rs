use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::cath::{CathDatabase, CathInstallation};
use crate::config::ResolverConfig;
use crate::domain::{LigandPolicy, ParseDetail};
use crate::domains::{self, DomainDefinition};
use crate::error::KiraError;
use crate::loader::AccessionLoader;
use crate::name::{self, CathId, ScopId, StructureName};
use crate::pdp::{PdpProvider, PdpTable, StructureSource};
use crate::range::ResidueRange;
use crate::rcsb::RcsbHttpClient;
use crate::reader::{Flushable, PdbFileReader, StructureProvider};
use crate::scop::{ScopDatabase, ScopInstallation};
use crate::structure::{Atom, Structure};
use crate::substructure;
use crate::tools;

/// Entry point: turns a structure name into a structure.
///
/// Safe to share between threads; concurrent requests for one accession are served
/// by a single load.
pub struct Resolver<P: StructureProvider> {
    loader: AccessionLoader<P>,
    config: ResolverConfig,
    scop: Option<Box<dyn ScopDatabase>>,
    cath: Option<Box<dyn CathDatabase>>,
    pdp: Option<Box<dyn PdpProvider>>,
}

impl Resolver<PdbFileReader<RcsbHttpClient>> {
    /// Resolver backed by the local mirror and RCSB, with whichever domain databases
    /// the config points at.
    pub fn open(config: ResolverConfig) -> Result<Self, KiraError> {
        let reader = PdbFileReader::new(RcsbHttpClient::new()?);
        let mut resolver = Resolver::new(reader, config);
        if let Some(dir) = resolver.config.scop_dir.clone() {
            resolver.set_scop(Box::new(ScopInstallation::open(&dir)?));
        }
        if let Some(file) = resolver.config.cath_file.clone() {
            resolver.set_cath(Box::new(CathInstallation::open(&file)?));
        }
        let pdp = PdpTable::open(&resolver.config.pdp_path())?;
        resolver.set_pdp(Box::new(pdp));
        Ok(resolver)
    }
}

impl<P: StructureProvider> Resolver<P> {
    pub fn new(provider: P, config: ResolverConfig) -> Self {
        Self {
            loader: AccessionLoader::new(provider),
            config,
            scop: None,
            cath: None,
            pdp: None,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn loader(&self) -> &AccessionLoader<P> {
        &self.loader
    }

    pub fn set_scop(&mut self, scop: Box<dyn ScopDatabase>) {
        self.scop = Some(scop);
    }

    pub fn set_cath(&mut self, cath: Box<dyn CathDatabase>) {
        self.cath = Some(cath);
    }

    pub fn set_pdp(&mut self, pdp: Box<dyn PdpProvider>) {
        self.pdp = Some(pdp);
    }

    pub fn set_pdb_dir(&mut self, dir: Utf8PathBuf) {
        self.config.pdb_dir = dir;
    }

    pub fn set_split(&mut self, split: bool) {
        self.config.split = split;
    }

    pub fn set_auto_fetch(&mut self, auto_fetch: bool) {
        self.config.auto_fetch = auto_fetch;
    }

    pub fn set_fetch_obsolete(&mut self, fetch_obsolete: bool) {
        self.config.fetch_obsolete = fetch_obsolete;
    }

    pub fn set_fetch_current(&mut self, fetch_current: bool) {
        self.config.fetch_current = fetch_current;
    }

    pub fn set_strict_scop(&mut self, strict: bool) {
        self.config.strict_scop = strict;
    }

    pub fn set_strict_ligands(&mut self, strict: bool) {
        self.config.strict_ligands = strict;
    }

    pub fn set_legacy_lenient(&mut self, lenient: bool) {
        self.config.legacy_lenient = lenient;
    }

    pub fn set_parse_detail(&mut self, detail: ParseDetail) {
        self.config.parse_detail = detail;
    }

    pub fn classify(&self, name: &str) -> Result<StructureName, KiraError> {
        name::classify(name)
    }

    /// Resolves `request` exactly as given. Names that match no naming scheme give
    /// `Ok(None)`, as do lenient SCOP lookups that find nothing to fall back to.
    pub fn resolve(&self, request: &str) -> Result<Option<Structure>, KiraError> {
        let parsed = match name::classify(request) {
            Ok(parsed) => parsed,
            Err(KiraError::UnresolvedName(_)) => {
                tracing::debug!(name = request, "name matches no naming scheme");
                return Ok(None);
            }
            Err(err @ (KiraError::InvalidUrl { .. } | KiraError::InvalidAssemblyIndex(_)))
                if self.config.legacy_lenient =>
            {
                tracing::warn!(name = request, error = %err, "returning no structure");
                return Ok(None);
            }
            Err(err) => return Err(err.while_resolving(request)),
        };
        tracing::debug!(name = request, kind = parsed.kind(), "resolving structure");
        self.resolve_parsed(request, &parsed)
            .map_err(|err| err.while_resolving(request))
    }

    fn resolve_parsed(
        &self,
        request: &str,
        parsed: &StructureName,
    ) -> Result<Option<Structure>, KiraError> {
        match parsed {
            StructureName::PlainAccession { pdb } => {
                let full = self.load(pdb.as_str())?;
                Ok(Some(renamed(tools::first_model(&full), request)))
            }
            StructureName::AccessionChain { pdb, chain } => {
                let full = self.load(pdb.as_str())?;
                Ok(Some(renamed(tools::reduce_to_chain(&full, chain)?, request)))
            }
            StructureName::AccessionChainIndex { pdb, index } => {
                let full = self.load(pdb.as_str())?;
                Ok(Some(renamed(tools::reduce_to_chain_index(&full, *index)?, request)))
            }
            StructureName::AccessionRange { pdb, ranges } => {
                let full = self.load(pdb.as_str())?;
                Ok(Some(renamed(tools::sub_ranges(&full, ranges)?, request)))
            }
            StructureName::ClassificationDomain(scop) => self
                .scop_domain(scop)
                .map(|structure| structure.map(|structure| renamed(structure, request))),
            StructureName::TopologyDomain(cath) => {
                Ok(Some(renamed(self.cath_domain(cath)?, request)))
            }
            StructureName::BiologicalAssembly { pdb, index } => {
                self.legacy_branch(request, "biological assembly", || {
                    self.loader.provider().fetch_assembly(
                        &pdb.load_key(),
                        *index,
                        &self.config.parsing_options(),
                    )
                })
            }
            StructureName::PdpDomain { name } => self.legacy_branch(request, "PDP domain", || {
                let pdp = self
                    .pdp
                    .as_deref()
                    .ok_or(KiraError::MissingCollaborator("PDP provider"))?;
                pdp.domain(name, self)
            }),
            StructureName::StructureUrl { url, chain } => {
                self.legacy_branch(request, "structure URL", || {
                    let full = self
                        .loader
                        .provider()
                        .parse_url(url, &self.config.parsing_options())?;
                    match chain {
                        Some(chain) => tools::reduce_to_chain(&full, chain),
                        None => Ok(tools::first_model(&full)),
                    }
                })
            }
        }
    }

    /// Runs a branch whose failures are swallowed under `legacy_lenient`.
    fn legacy_branch<F>(
        &self,
        request: &str,
        branch: &'static str,
        run: F,
    ) -> Result<Option<Structure>, KiraError>
    where
        F: FnOnce() -> Result<Structure, KiraError>,
    {
        match run() {
            Ok(structure) => Ok(Some(structure)),
            Err(err) if self.config.legacy_lenient => {
                tracing::warn!(name = request, branch, error = %err, "returning no structure");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn load(&self, code: &str) -> Result<Arc<Structure>, KiraError> {
        self.loader.load(code, &self.config.parsing_options())
    }

    fn scop_db(&self) -> Result<&dyn ScopDatabase, KiraError> {
        self.scop
            .as_deref()
            .ok_or(KiraError::MissingCollaborator("SCOP database"))
    }

    fn scop_domain(&self, scop: &ScopId) -> Result<Option<Structure>, KiraError> {
        let db = self.scop_db()?;
        if let Some(domain) = domains::resolve_scop(db, scop, self.config.strict_scop)? {
            return self.structure_for_domain(&domain).map(Some);
        }

        tracing::warn!(scop_id = %scop.id, "no matching SCOP domain, using the entry instead");
        let full = self.load(&scop.pdb)?;
        if scop.chain_is_wildcard() {
            return Ok(Some(tools::first_model(&full)));
        }
        let chain = scop.chain.to_string();
        let chain = if full.has_chain(&chain) {
            chain
        } else {
            chain.to_uppercase()
        };
        tools::reduce_to_chain(&full, &chain).map(Some)
    }

    fn cath_domain(&self, cath: &CathId) -> Result<Structure, KiraError> {
        let db = self
            .cath
            .as_deref()
            .ok_or(KiraError::MissingCollaborator("CATH database"))?;
        let domain = domains::resolve_cath(db, cath)?
            .ok_or_else(|| KiraError::DomainNotFound(cath.id.clone()))?;
        let full = self.load(&domain.pdb_id)?;
        let ranges = ResidueRange::parse_multiple(&domain.range_expression())?;
        let mut part = tools::extract_ranges(&full, &ranges)?;
        substructure::add_ligands(&mut part, &full, &ranges, LigandPolicy::Loose);
        part.header.description = Some(domain.id);
        Ok(part)
    }

    /// Assembles a domain from its definition, with the superfamily description in
    /// the header when a SCOP database knows it.
    pub fn structure_for_domain(&self, domain: &DomainDefinition) -> Result<Structure, KiraError> {
        let full = self.load(&domain.pdb_id)?;
        let description = match (&self.scop, domain.superfamily_id) {
            (Some(scop), Some(sunid)) => scop
                .description_by_sunid(sunid)?
                .map(|description| description.description),
            _ => None,
        };
        substructure::assemble_domain(
            &full,
            domain,
            self.config.ligand_policy(),
            description.as_deref(),
        )
    }

    pub fn structure_for_scop_id(&self, scop_id: &str) -> Result<Option<Structure>, KiraError> {
        let id = ScopId::parse(scop_id)
            .ok_or_else(|| KiraError::UnresolvedName(scop_id.to_string()))?;
        match domains::resolve_scop(self.scop_db()?, &id, self.config.strict_scop)? {
            Some(domain) => self.structure_for_domain(&domain).map(Some),
            None => Ok(None),
        }
    }

    /// Cα atoms of the structure `name` resolves to.
    pub fn ca_atoms(&self, name: &str) -> Result<Option<Vec<Atom>>, KiraError> {
        Ok(self.resolve(name)?.map(|structure| structure.ca_atoms()))
    }

    /// Biological assembly `index` (1-based) of `code`. With `fallback`, a missing
    /// assembly yields the asymmetric unit instead.
    pub fn biological_assembly(
        &self,
        code: &str,
        index: u32,
        fallback: bool,
    ) -> Result<Structure, KiraError> {
        if index == 0 {
            return Err(KiraError::InvalidAssemblyIndex(format!("{code}:{index}")));
        }
        let key = code.trim().to_lowercase();
        match self
            .loader
            .provider()
            .fetch_assembly(&key, index, &self.config.parsing_options())
        {
            Ok(structure) => Ok(structure),
            Err(err) if fallback => {
                tracing::warn!(pdb = %key, index, error = %err, "assembly unavailable, using asymmetric unit");
                let full = self.load(&key)?;
                Ok(tools::first_model(&full))
            }
            Err(err) => Err(err),
        }
    }

    pub fn biological_unit(&self, code: &str) -> Result<Structure, KiraError> {
        self.biological_assembly(code, 1, true)
    }

    /// Resolves `request`, then flushes every cache. A resolve error takes precedence
    /// over a flush error.
    pub fn resolve_and_flush(&self, request: &str) -> Result<Option<Structure>, KiraError> {
        let resolved = self.resolve(request);
        let flushed = self.notify_shutdown();
        let structure = resolved?;
        flushed?;
        Ok(structure)
    }

    /// Flushes every collaborator that keeps a cache. All are attempted; the first
    /// failure is returned.
    pub fn notify_shutdown(&self) -> Result<(), KiraError> {
        let flushables: Vec<(&str, &dyn Flushable)> = [
            ("structure provider", self.loader.provider().flushable()),
            ("SCOP database", self.scop.as_deref().and_then(|scop| scop.flushable())),
            ("CATH database", self.cath.as_deref().and_then(|cath| cath.flushable())),
            ("PDP provider", self.pdp.as_deref().and_then(|pdp| pdp.flushable())),
        ]
        .into_iter()
        .filter_map(|(label, flushable)| flushable.map(|flushable| (label, flushable)))
        .collect();

        let mut first_error = None;
        for (label, flushable) in flushables {
            tracing::debug!(collaborator = label, "flushing cache");
            if let Err(err) = flushable.flush() {
                tracing::warn!(collaborator = label, error = %err, "flush failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl<P: StructureProvider> StructureSource for Resolver<P> {
    fn load_full(&self, code: &str) -> Result<Arc<Structure>, KiraError> {
        self.load(code)
    }

    fn ligand_policy(&self) -> LigandPolicy {
        self.config.ligand_policy()
    }
}

fn renamed(mut structure: Structure, request: &str) -> Structure {
    structure.name = request.to_string();
    structure
}
