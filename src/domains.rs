//! Domain definitions from the classification databases.

use serde::Serialize;

use crate::cath::CathDatabase;
use crate::error::KiraError;
use crate::name::{CathId, ScopId};
use crate::scop::{ScopDatabase, ScopDomain};

/// A named set of residue ranges within one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainDefinition {
    pub id: String,
    pub pdb_id: String,
    pub ranges: Vec<String>,
    pub classification_id: Option<String>,
    pub superfamily_id: Option<u32>,
}

impl DomainDefinition {
    pub fn range_expression(&self) -> String {
        self.ranges.join(",")
    }
}

impl From<ScopDomain> for DomainDefinition {
    fn from(domain: ScopDomain) -> Self {
        Self {
            id: domain.scop_id,
            pdb_id: domain.pdb_id,
            ranges: domain.ranges,
            classification_id: Some(domain.classification_id),
            superfamily_id: domain.superfamily_id,
        }
    }
}

/// Looks up a SCOP domain.
///
/// Strict lookups only accept the exact id. Lenient lookups fall back to the domains
/// of the same entry and take the first one whose chain and domain letters agree
/// with the request, where `_` (and `.` for chains) matches anything on either side.
pub fn resolve_scop(
    db: &dyn ScopDatabase,
    id: &ScopId,
    strict: bool,
) -> Result<Option<DomainDefinition>, KiraError> {
    if let Some(domain) = db.domain_by_scop_id(&id.id)? {
        return Ok(Some(domain.into()));
    }
    if strict {
        return Err(KiraError::DomainNotFound(id.id.clone()));
    }

    let candidates: Vec<ScopDomain> = db
        .domains_for_pdb(&id.pdb)?
        .into_iter()
        .filter(|domain| {
            ScopId::parse(&domain.scop_id).is_some_and(|candidate| wildcard_match(id, &candidate))
        })
        .collect();
    let mut candidates = candidates.into_iter();
    let Some(best) = candidates.next() else {
        tracing::debug!(scop_id = %id.id, "no SCOP domain matches");
        return Ok(None);
    };
    let others: Vec<String> = candidates.map(|domain| domain.scop_id).collect();
    if others.is_empty() {
        tracing::warn!(requested = %id.id, using = %best.scop_id, "trying domain");
    } else {
        tracing::warn!(
            requested = %id.id,
            using = %best.scop_id,
            other_candidates = %others.join(", "),
            "trying domain; other candidates ignored"
        );
    }
    Ok(Some(best.into()))
}

fn wildcard_match(requested: &ScopId, candidate: &ScopId) -> bool {
    let chain = requested.chain == candidate.chain
        || requested.chain_is_wildcard()
        || candidate.chain_is_wildcard();
    let domain = requested.domain == candidate.domain
        || requested.domain_is_wildcard()
        || candidate.domain_is_wildcard();
    chain && domain
}

/// Looks up a CATH domain and renders its segments as `A_1-48,A_146-165`.
pub fn resolve_cath(
    db: &dyn CathDatabase,
    id: &CathId,
) -> Result<Option<DomainDefinition>, KiraError> {
    let Some(domain) = db.domain_by_cath_id(&id.id)? else {
        return Ok(None);
    };
    let ranges = domain
        .segments
        .iter()
        .map(|segment| format!("{}_{}-{}", domain.chain, segment.start, segment.stop))
        .collect();
    Ok(Some(DomainDefinition {
        id: domain.domain_name,
        pdb_id: domain.pdb_id,
        ranges,
        classification_id: None,
        superfamily_id: None,
    }))
}
