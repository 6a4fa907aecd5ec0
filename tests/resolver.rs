use std::fs;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use reqwest::Url;

use kira_structure_cache::cath::CathInstallation;
use kira_structure_cache::config::ResolverConfig;
use kira_structure_cache::domain::{ParseDetail, ParsingOptions};
use kira_structure_cache::error::KiraError;
use kira_structure_cache::pdb;
use kira_structure_cache::pdp::{PdpProvider, PdpTable, StructureSource};
use kira_structure_cache::range::{covering_ranges, to_expression};
use kira_structure_cache::reader::{Flushable, StructureProvider};
use kira_structure_cache::resolver::Resolver;
use kira_structure_cache::scop::{ScopDatabase, ScopDescription, ScopDomain, ScopInstallation};
use kira_structure_cache::structure::Structure;

fn fixtures() -> Utf8PathBuf {
    Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture_structure(code: &str, detail: ParseDetail) -> Result<Structure, KiraError> {
    let bytes = fs::read(fixtures().join("1abc.pdb").as_std_path())
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    pdb::parse_bytes(&bytes, code, detail)
}

/// Serves the `1abc` fixture for every accession it knows and records each request.
#[derive(Default)]
struct FixtureProvider {
    accessions: Mutex<Vec<String>>,
    assemblies: Mutex<Vec<(String, u32)>>,
    missing_assemblies: bool,
}

impl StructureProvider for FixtureProvider {
    fn parse_accession(&self, code: &str, options: &ParsingOptions) -> Result<Structure, KiraError> {
        self.accessions.lock().unwrap().push(code.to_string());
        if code != "1abc" {
            return Err(KiraError::NotAvailableLocally(code.to_string()));
        }
        fixture_structure(code, options.detail)
    }

    fn parse_url(&self, url: &Url, options: &ParsingOptions) -> Result<Structure, KiraError> {
        let path = url
            .to_file_path()
            .map_err(|_| KiraError::Filesystem("not a file URL".to_string()))?;
        let bytes = fs::read(path).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        pdb::parse_bytes(&bytes, "1abc", options.detail)
    }

    fn fetch_assembly(
        &self,
        code: &str,
        index: u32,
        options: &ParsingOptions,
    ) -> Result<Structure, KiraError> {
        self.assemblies.lock().unwrap().push((code.to_string(), index));
        if self.missing_assemblies {
            return Err(KiraError::RcsbStatus {
                status: 404,
                message: "not found".to_string(),
            });
        }
        fixture_structure(code, options.detail)
    }
}

fn config() -> ResolverConfig {
    ResolverConfig {
        pdb_dir: fixtures(),
        auto_fetch: false,
        ..ResolverConfig::default()
    }
}

fn resolver() -> Resolver<FixtureProvider> {
    let mut resolver = Resolver::new(FixtureProvider::default(), config());
    let scop = ScopInstallation::open(&fixtures().join("scop")).unwrap();
    resolver.set_scop(Box::new(scop));
    let cath = CathInstallation::open(&fixtures().join("cath-domain-boundaries.txt")).unwrap();
    resolver.set_cath(Box::new(cath));
    resolver
}

fn polymer_residues(structure: &Structure) -> Vec<(String, String)> {
    structure
        .groups()
        .filter(|group| group.is_polymer())
        .map(|group| (group.name.clone(), group.number.to_string()))
        .collect()
}

#[test]
fn plain_accession_is_first_model() {
    let resolver = resolver();
    let structure = resolver.resolve("1abc").unwrap().unwrap();
    assert_eq!(structure.name, "1abc");
    assert_eq!(structure.model_count(), 1);
    assert_eq!(structure.chains().len(), 2);
}

#[test]
fn chain_and_chain_index() {
    let resolver = resolver();
    let by_id = resolver.resolve("1ABC.B").unwrap().unwrap();
    assert_eq!(by_id.name, "1ABC.B");
    assert_eq!(by_id.chains().len(), 1);
    assert_eq!(by_id.chain("B").unwrap().ligand_count(), 1);

    let by_index = resolver.resolve("1abc:1").unwrap().unwrap();
    assert!(by_index.has_chain("B"));
    assert!(!by_index.has_chain("A"));

    let err = resolver.resolve("1abc.Z").unwrap_err();
    assert_matches!(err.root(), KiraError::ChainNotFound { .. });
    assert!(err.to_string().contains("while resolving 1abc.Z"));
}

#[test]
fn accession_is_case_insensitive() {
    let resolver = resolver();
    resolver.resolve("1ABC").unwrap().unwrap();
    resolver.resolve("1abc").unwrap().unwrap();
    let accessions = resolver.loader().provider().accessions.lock().unwrap().clone();
    assert_eq!(accessions, vec!["1abc".to_string(), "1abc".to_string()]);
}

#[test]
fn residue_range_selects_groups() {
    let resolver = resolver();
    let structure = resolver.resolve("1abc.A_1-2").unwrap().unwrap();
    let chain = structure.chain("A").unwrap();
    assert_eq!(chain.polymer_count(), 2);
    assert_eq!(chain.ligand_count(), 0);

    let err = resolver.resolve("1abc.A_1-99").unwrap_err();
    assert_matches!(err.root(), KiraError::ResidueNotFound { .. });
}

#[test]
fn scop_domain_carries_classification() {
    let resolver = resolver();
    let domain = resolver.resolve("d1abca1").unwrap().unwrap();
    assert_eq!(domain.name, "d1abca1");
    assert_eq!(domain.pdb_code, "d1abca1");
    assert_eq!(
        domain.header.description.as_deref(),
        Some("a.1.1.1 | Globin-like")
    );
    let chain = domain.chain("A").unwrap();
    assert_eq!(chain.polymer_count(), 2);
    assert_eq!(chain.ligand_count(), 2);
}

#[test]
fn strict_ligands_keep_fewer_groups() {
    let mut resolver = resolver();
    let loose = resolver.resolve("d1abca1").unwrap().unwrap();
    resolver.set_strict_ligands(true);
    let strict = resolver.resolve("d1abca1").unwrap().unwrap();

    let loose = loose.chain("A").unwrap().ligand_count();
    let strict = strict.chain("A").unwrap().ligand_count();
    assert_eq!(loose, 2);
    assert_eq!(strict, 0);
    assert!(strict <= loose);
}

#[test]
fn domain_ranges_round_trip() {
    let resolver = resolver();
    let full = resolver.resolve("1abc").unwrap().unwrap();
    for name in ["d1abca1", "d1abca2", "d1abcb_", "1abcA01"] {
        let domain = resolver.resolve(name).unwrap().unwrap();
        let expression = to_expression(&covering_ranges(&domain, &full));
        let rebuilt = resolver
            .resolve(&format!("1abc.{expression}"))
            .unwrap()
            .unwrap();
        assert_eq!(polymer_residues(&rebuilt), polymer_residues(&domain), "{name}");
    }
}

#[test]
fn strict_scop_rejects_unknown_domain() {
    let resolver = resolver();
    let err = resolver.resolve("d1abcb1").unwrap_err();
    assert_matches!(err.root(), KiraError::DomainNotFound(_));
}

/// SCOP table with a chain-specific domain and a whole-entry domain.
struct TwoDomainScop;

impl ScopDatabase for TwoDomainScop {
    fn domain_by_scop_id(&self, _scop_id: &str) -> Result<Option<ScopDomain>, KiraError> {
        Ok(None)
    }

    fn domains_for_pdb(&self, pdb_id: &str) -> Result<Vec<ScopDomain>, KiraError> {
        if pdb_id != "1abc" {
            return Ok(Vec::new());
        }
        Ok(vec![
            ScopDomain {
                scop_id: "d1abca1".to_string(),
                pdb_id: "1abc".to_string(),
                ranges: vec!["A:1-2".to_string()],
                classification_id: "a.1.1.1".to_string(),
                sunid: 1,
                superfamily_id: None,
            },
            ScopDomain {
                scop_id: "d1abc__".to_string(),
                pdb_id: "1abc".to_string(),
                ranges: vec!["_".to_string()],
                classification_id: "b.1.1.1".to_string(),
                sunid: 2,
                superfamily_id: None,
            },
        ])
    }

    fn description_by_sunid(&self, _sunid: u32) -> Result<Option<ScopDescription>, KiraError> {
        Ok(None)
    }
}

#[test]
fn lenient_scop_picks_wildcard_candidate() {
    let mut resolver = resolver();
    resolver.set_scop(Box::new(TwoDomainScop));
    resolver.set_strict_scop(false);

    let structure = resolver.resolve("d1abcb_").unwrap().unwrap();
    assert_eq!(structure.name, "d1abcb_");
    assert!(structure.has_chain("A"));
    assert!(structure.has_chain("B"));
    assert_eq!(structure.header.classification.as_deref(), Some("b.1.1.1"));
}

/// SCOP table that only knows chain A of the fixture.
struct ChainAScop;

impl ScopDatabase for ChainAScop {
    fn domain_by_scop_id(&self, _scop_id: &str) -> Result<Option<ScopDomain>, KiraError> {
        Ok(None)
    }

    fn domains_for_pdb(&self, _pdb_id: &str) -> Result<Vec<ScopDomain>, KiraError> {
        Ok(vec![ScopDomain {
            scop_id: "d1abca1".to_string(),
            pdb_id: "1abc".to_string(),
            ranges: vec!["A:1-2".to_string()],
            classification_id: "a.1.1.1".to_string(),
            sunid: 1,
            superfamily_id: None,
        }])
    }

    fn description_by_sunid(&self, _sunid: u32) -> Result<Option<ScopDescription>, KiraError> {
        Ok(None)
    }
}

#[test]
fn lenient_scop_falls_back_to_chain() {
    let mut resolver = resolver();
    resolver.set_scop(Box::new(ChainAScop));
    resolver.set_strict_scop(false);

    let structure = resolver.resolve("d1abcb1").unwrap().unwrap();
    assert_eq!(structure.name, "d1abcb1");
    assert!(structure.has_chain("B"));
    assert!(!structure.has_chain("A"));

    let whole = resolver.resolve("d1abc_1").unwrap().unwrap();
    assert_eq!(whole.chain("A").unwrap().polymer_count(), 2);
}

#[test]
fn cath_domain_always_adds_chain_ligands() {
    let mut resolver = resolver();
    let loose = resolver.resolve("1abcA01").unwrap().unwrap();
    assert_eq!(loose.name, "1abcA01");
    assert_eq!(loose.chain("A").unwrap().polymer_count(), 2);
    assert_eq!(loose.chain("A").unwrap().ligand_count(), 2);

    resolver.set_strict_ligands(true);
    let strict = resolver.resolve("1abcA01").unwrap().unwrap();
    assert_eq!(strict.chain("A").unwrap().polymer_count(), 2);
    assert_eq!(strict.chain("A").unwrap().ligand_count(), 2);

    let err = resolver.resolve("1abcA09").unwrap_err();
    assert_matches!(err.root(), KiraError::DomainNotFound(_));
}

#[test]
fn missing_domain_database_is_reported() {
    let resolver = Resolver::new(FixtureProvider::default(), config());
    let err = resolver.resolve("1abcA01").unwrap_err();
    assert_matches!(err.root(), KiraError::MissingCollaborator(_));
}

#[test]
fn biological_assembly_indices() {
    let resolver = resolver();
    resolver.resolve("BIO:1abc").unwrap().unwrap();
    resolver.resolve("BIO:1ABC:2").unwrap().unwrap();
    resolver.resolve("BIO:1abc:0").unwrap().unwrap();
    let assemblies = resolver.loader().provider().assemblies.lock().unwrap().clone();
    assert_eq!(
        assemblies,
        vec![
            ("1abc".to_string(), 1),
            ("1abc".to_string(), 2),
            ("1abc".to_string(), 0),
        ]
    );
}

#[test]
fn biological_unit_falls_back_to_asymmetric_unit() {
    let provider = FixtureProvider {
        missing_assemblies: true,
        ..FixtureProvider::default()
    };
    let resolver = Resolver::new(provider, config());

    let unit = resolver.biological_unit("1ABC").unwrap();
    assert_eq!(unit.chains().len(), 2);
    assert_matches!(
        resolver.biological_assembly("1abc", 2, false),
        Err(KiraError::RcsbStatus { status: 404, .. })
    );
    assert_matches!(
        resolver.biological_assembly("1abc", 0, true),
        Err(KiraError::InvalidAssemblyIndex(_))
    );
}

#[test]
fn legacy_lenient_swallows_branch_failures() {
    let provider = FixtureProvider {
        missing_assemblies: true,
        ..FixtureProvider::default()
    };
    let mut resolver = Resolver::new(provider, config());
    assert!(resolver.resolve("BIO:1abc:2").is_err());
    assert!(resolver.resolve("PDP:1abcAa").is_err());
    let err = resolver.resolve("http://[broken").unwrap_err();
    assert_matches!(err.root(), KiraError::InvalidUrl { .. });
    let err = resolver.resolve("BIO:1fah:x").unwrap_err();
    assert_matches!(err.root(), KiraError::InvalidAssemblyIndex(_));

    resolver.set_legacy_lenient(true);
    assert!(resolver.resolve("BIO:1abc:2").unwrap().is_none());
    assert!(resolver.resolve("PDP:1abcAa").unwrap().is_none());
    assert!(resolver.resolve("http://[broken").unwrap().is_none());
    assert!(resolver.resolve("BIO:1fah:x").unwrap().is_none());
}

#[test]
fn classification_errors_name_the_request() {
    let resolver = resolver();
    let err = resolver.resolve("4h!b.A_1-10").unwrap_err();
    assert_matches!(err.root(), KiraError::InvalidPdbId(_));
    assert!(err.to_string().contains("while resolving 4h!b.A_1-10"));

    let err = resolver.resolve("1abc:x").unwrap_err();
    assert_matches!(err.root(), KiraError::InvalidChainIndex(_));
    assert!(err.to_string().contains("1abc:x"));
}

#[test]
fn request_is_not_trimmed() {
    let resolver = resolver();
    assert!(resolver.resolve(" 1abc").unwrap().is_none());
    assert!(resolver.loader().provider().accessions.lock().unwrap().is_empty());
}

#[test]
fn pdp_domain_goes_through_loader() {
    let mut resolver = resolver();
    let table = PdpTable::in_memory();
    table.insert("PDP:1abcAa", vec!["A_1-3".to_string()]);
    resolver.set_pdp(Box::new(table));

    let domain = resolver.resolve("PDP:1abcAa").unwrap().unwrap();
    assert_eq!(domain.name, "PDP:1abcAa");
    assert_eq!(domain.chain("A").unwrap().polymer_count(), 3);
    assert_eq!(
        *resolver.loader().provider().accessions.lock().unwrap(),
        vec!["1abc".to_string()]
    );
}

#[test]
fn url_with_chain_selector() {
    let resolver = resolver();
    let url = Url::from_file_path(fixtures().join("1abc.pdb").as_std_path()).unwrap();
    let name = format!("{url}?chainId=B");
    let structure = resolver.resolve(&name).unwrap().unwrap();
    assert_eq!(structure.chains().len(), 1);
    assert!(structure.has_chain("B"));

    let whole = resolver.resolve(url.as_str()).unwrap().unwrap();
    assert_eq!(whole.chains().len(), 2);
}

#[test]
fn unresolved_and_short_names() {
    let resolver = resolver();
    assert!(resolver.resolve("1abcXYZ").unwrap().is_none());
    assert_matches!(resolver.resolve("ab"), Err(KiraError::TooShort(_)));
    assert_matches!(resolver.resolve(""), Err(KiraError::TooShort(_)));
}

#[test]
fn load_failures_name_the_accession() {
    let resolver = resolver();
    let err = resolver.resolve("9xyz").unwrap_err();
    assert_matches!(err.root(), KiraError::Load { accession, .. } if accession == "9xyz");
    assert!(resolver.loader().in_flight().keys().is_empty());
}

#[test]
fn ca_atoms_of_chain() {
    let resolver = resolver();
    let atoms = resolver.ca_atoms("1abc.A").unwrap().unwrap();
    assert_eq!(atoms.len(), 3);
    assert!(resolver.ca_atoms("1abcXYZ").unwrap().is_none());
}

#[test]
fn structure_for_scop_id_uses_database() {
    let resolver = resolver();
    let domain = resolver.structure_for_scop_id("d1abcb_").unwrap().unwrap();
    assert!(domain.has_chain("B"));
    assert_eq!(
        domain.header.description.as_deref(),
        Some("b.1.1.1 | Immunoglobulin")
    );
}

#[test]
fn shutdown_flushes_pdp_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().join("pdp.json")).unwrap();
    let table = PdpTable::open(&path).unwrap();
    table.insert("PDP:1abcAa", vec!["A_1-3".to_string()]);

    let mut resolver = resolver();
    resolver.set_pdp(Box::new(table));
    resolver.notify_shutdown().unwrap();

    let content = fs::read_to_string(path.as_std_path()).unwrap();
    assert!(content.contains("PDP:1abcAa"));
}

/// PDP provider whose cache can never be written.
struct UnflushablePdp;

impl PdpProvider for UnflushablePdp {
    fn domain(&self, name: &str, _source: &dyn StructureSource) -> Result<Structure, KiraError> {
        Err(KiraError::DomainNotFound(name.to_string()))
    }

    fn flushable(&self) -> Option<&dyn Flushable> {
        Some(self)
    }
}

impl Flushable for UnflushablePdp {
    fn flush(&self) -> Result<(), KiraError> {
        Err(KiraError::Filesystem("read-only cache".to_string()))
    }
}

#[test]
fn resolve_error_wins_over_flush_error() {
    let mut resolver = resolver();
    resolver.set_pdp(Box::new(UnflushablePdp));

    let err = resolver.resolve_and_flush("1abc.Z").unwrap_err();
    assert_matches!(err.root(), KiraError::ChainNotFound { .. });

    let err = resolver.resolve_and_flush("1abc").unwrap_err();
    assert_matches!(err, KiraError::Filesystem(_));
}
