//! Structure naming grammar.
//!
//! ```text
//! name     := pdbID                       1TIM
//!           | pdbID '.' chainID           4HHB.C
//!           | pdbID ':' chainIndex        4HHB:0
//!           | pdbID '.' range             4GCR.A_1-83
//!           | scopID                      d2bq6a1
//!           | cathID                      1cukA01
//!           | 'PDP:' pdpID                PDP:1cukAa
//!           | 'BIO:' pdbID (':' index)?   BIO:1FAH:2
//!           | url                         file:///tmp/1abc.pdb?chainId=A
//! ```
//!
//! Classification is pure: it never touches the network, the file system or a
//! domain database.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use serde::Serialize;

use crate::domain::PdbId;
use crate::error::KiraError;

pub const BIOL_ASSEMBLY_IDENTIFIER: &str = "BIO:";
pub const PDP_DOMAIN_IDENTIFIER: &str = "PDP:";
pub const CHAIN_NR_SYMBOL: char = ':';
pub const CHAIN_SPLIT_SYMBOL: char = '.';
pub const UNDERSCORE: char = '_';

static SCOP_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^d(....)(.)(.)$").expect("scop regex is valid"));

static CATH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9][a-zA-Z0-9]{3})([a-zA-Z0-9])([0-9]{2})$").expect("cath regex is valid")
});

/// SCOP domain id split into its parts, e.g. `d1gbga_` → (`1gbg`, `a`, `_`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopId {
    pub id: String,
    pub pdb: String,
    pub chain: char,
    pub domain: char,
}

impl ScopId {
    pub fn parse(value: &str) -> Option<Self> {
        let captures = SCOP_REGEX.captures(value)?;
        Some(Self {
            id: value.to_string(),
            pdb: captures[1].to_string(),
            chain: captures[2].chars().next()?,
            domain: captures[3].chars().next()?,
        })
    }

    pub fn chain_is_wildcard(&self) -> bool {
        matches!(self.chain, '_' | '.')
    }

    pub fn domain_is_wildcard(&self) -> bool {
        self.domain == '_'
    }
}

/// CATH domain id, e.g. `1cukA01` → (`1cuk`, `A`, 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CathId {
    pub id: String,
    pub pdb: PdbId,
    pub chain: String,
    pub domain: u8,
}

impl CathId {
    pub fn parse(value: &str) -> Option<Self> {
        let captures = CATH_REGEX.captures(value)?;
        Some(Self {
            id: value.to_string(),
            pdb: captures[1].parse().ok()?,
            chain: captures[2].to_string(),
            domain: captures[3].parse().ok()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructureName {
    PlainAccession {
        pdb: PdbId,
    },
    AccessionChain {
        pdb: PdbId,
        chain: String,
    },
    AccessionChainIndex {
        pdb: PdbId,
        index: usize,
    },
    AccessionRange {
        pdb: PdbId,
        ranges: String,
    },
    ClassificationDomain(ScopId),
    TopologyDomain(CathId),
    BiologicalAssembly {
        pdb: PdbId,
        index: u32,
    },
    PdpDomain {
        name: String,
    },
    StructureUrl {
        #[serde(serialize_with = "serialize_url")]
        url: Url,
        chain: Option<String>,
    },
}

fn serialize_url<S: serde::Serializer>(url: &Url, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(url.as_str())
}

impl StructureName {
    pub fn kind(&self) -> &'static str {
        match self {
            StructureName::PlainAccession { .. } => "plain_accession",
            StructureName::AccessionChain { .. } => "accession_chain",
            StructureName::AccessionChainIndex { .. } => "accession_chain_index",
            StructureName::AccessionRange { .. } => "accession_range",
            StructureName::ClassificationDomain(_) => "classification_domain",
            StructureName::TopologyDomain(_) => "topology_domain",
            StructureName::BiologicalAssembly { .. } => "biological_assembly",
            StructureName::PdpDomain { .. } => "pdp_domain",
            StructureName::StructureUrl { .. } => "structure_url",
        }
    }

    /// The accession the name refers to, when it can be read off the name alone.
    pub fn pdb_id(&self) -> Option<&str> {
        match self {
            StructureName::PlainAccession { pdb }
            | StructureName::AccessionChain { pdb, .. }
            | StructureName::AccessionChainIndex { pdb, .. }
            | StructureName::AccessionRange { pdb, .. }
            | StructureName::BiologicalAssembly { pdb, .. } => Some(pdb.as_str()),
            StructureName::TopologyDomain(cath) => Some(cath.pdb.as_str()),
            StructureName::ClassificationDomain(scop) => Some(scop.pdb.as_str()),
            StructureName::PdpDomain { .. } | StructureName::StructureUrl { .. } => None,
        }
    }
}

impl fmt::Display for StructureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructureName::PlainAccession { pdb } => write!(f, "{pdb}"),
            StructureName::AccessionChain { pdb, chain } => write!(f, "{pdb}.{chain}"),
            StructureName::AccessionChainIndex { pdb, index } => write!(f, "{pdb}:{index}"),
            StructureName::AccessionRange { pdb, ranges } => write!(f, "{pdb}.{ranges}"),
            StructureName::ClassificationDomain(scop) => write!(f, "{}", scop.id),
            StructureName::TopologyDomain(cath) => write!(f, "{}", cath.id),
            StructureName::BiologicalAssembly { pdb, index } => {
                write!(f, "{BIOL_ASSEMBLY_IDENTIFIER}{pdb}:{index}")
            }
            StructureName::PdpDomain { name } => write!(f, "{name}"),
            StructureName::StructureUrl { url, .. } => write!(f, "{url}"),
        }
    }
}

type Rule = fn(&str) -> Option<Result<StructureName, KiraError>>;

/// Ordered rule table; the first rule that claims a name decides its variant.
const RULES: &[(&str, Rule)] = &[
    ("too_short", too_short),
    ("plain_accession", plain_accession),
    ("topology_domain", topology_domain),
    ("classification_domain", classification_domain),
    ("accession_chain", accession_chain),
    ("structure_url", structure_url),
    ("pdp_domain", pdp_domain),
    ("biological_assembly", biological_assembly),
    ("accession_range", accession_range),
];

pub fn classify(name: &str) -> Result<StructureName, KiraError> {
    for (rule, apply) in RULES {
        if let Some(result) = apply(name) {
            tracing::debug!(name, rule, "classified structure name");
            return result;
        }
    }
    Err(KiraError::UnresolvedName(name.to_string()))
}

/// Every rule that would claim `name`, in precedence order.
pub fn matching_rules(name: &str) -> Vec<&'static str> {
    RULES
        .iter()
        .filter(|(_, apply)| apply(name).is_some())
        .map(|(rule, _)| *rule)
        .collect()
}

fn is_url(name: &str) -> bool {
    name.starts_with("file:/") || name.starts_with("http:/")
}

fn char_len(name: &str) -> usize {
    name.chars().count()
}

fn too_short(name: &str) -> Option<Result<StructureName, KiraError>> {
    (char_len(name) < 4).then(|| Err(KiraError::TooShort(name.to_string())))
}

fn plain_accession(name: &str) -> Option<Result<StructureName, KiraError>> {
    (char_len(name) == 4).then(|| name.parse().map(|pdb| StructureName::PlainAccession { pdb }))
}

fn topology_domain(name: &str) -> Option<Result<StructureName, KiraError>> {
    CathId::parse(name).map(|cath| Ok(StructureName::TopologyDomain(cath)))
}

fn classification_domain(name: &str) -> Option<Result<StructureName, KiraError>> {
    ScopId::parse(name).map(|scop| Ok(StructureName::ClassificationDomain(scop)))
}

fn accession_chain(name: &str) -> Option<Result<StructureName, KiraError>> {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() != 6 || !name.is_ascii() {
        return None;
    }
    let separator = chars[4];
    if separator != CHAIN_SPLIT_SYMBOL && separator != CHAIN_NR_SYMBOL {
        return None;
    }
    let pdb = match name[..4].parse::<PdbId>() {
        Ok(pdb) => pdb,
        Err(err) => return Some(Err(err)),
    };
    if separator == CHAIN_SPLIT_SYMBOL {
        return Some(Ok(StructureName::AccessionChain {
            pdb,
            chain: chars[5].to_string(),
        }));
    }
    Some(
        chars[5]
            .to_digit(10)
            .map(|index| StructureName::AccessionChainIndex {
                pdb,
                index: index as usize,
            })
            .ok_or_else(|| KiraError::InvalidChainIndex(name.to_string())),
    )
}

fn structure_url(name: &str) -> Option<Result<StructureName, KiraError>> {
    if !is_url(name) {
        return None;
    }
    Some(parse_structure_url(name))
}

fn parse_structure_url(name: &str) -> Result<StructureName, KiraError> {
    let mut url = Url::parse(name).map_err(|err| KiraError::InvalidUrl {
        url: name.to_string(),
        message: err.to_string(),
    })?;
    let chain = url
        .query()
        .and_then(|query| query.strip_prefix("chainId="))
        .map(str::to_string);
    if chain.is_some() {
        // the chain selector is ours, not part of the resource location
        url.set_query(None);
    }
    Ok(StructureName::StructureUrl { url, chain })
}

fn pdp_domain(name: &str) -> Option<Result<StructureName, KiraError>> {
    name.starts_with(PDP_DOMAIN_IDENTIFIER).then(|| {
        Ok(StructureName::PdpDomain {
            name: name.to_string(),
        })
    })
}

fn biological_assembly(name: &str) -> Option<Result<StructureName, KiraError>> {
    let rest = name.strip_prefix(BIOL_ASSEMBLY_IDENTIFIER)?;
    Some(parse_assembly(name, rest))
}

fn parse_assembly(name: &str, rest: &str) -> Result<StructureName, KiraError> {
    let (code, index) = match rest.split_once(CHAIN_NR_SYMBOL) {
        Some((code, index)) => {
            let index = index
                .trim()
                .parse::<u32>()
                .map_err(|_| KiraError::InvalidAssemblyIndex(name.to_string()))?;
            (code, index)
        }
        None => (rest, 1),
    };
    Ok(StructureName::BiologicalAssembly {
        pdb: code.parse()?,
        index,
    })
}

fn accession_range(name: &str) -> Option<Result<StructureName, KiraError>> {
    let applies = char_len(name) > 6
        && name.is_ascii()
        && !name.starts_with(PDP_DOMAIN_IDENTIFIER)
        && (name.contains(CHAIN_NR_SYMBOL) || name.contains(UNDERSCORE))
        && !is_url(name);
    if !applies {
        return None;
    }
    Some(name[..4].parse().map(|pdb| StructureName::AccessionRange {
        pdb,
        ranges: name[5..].to_string(),
    }))
}
