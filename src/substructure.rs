use crate::domain::LigandPolicy;
use crate::domains::DomainDefinition;
use crate::error::KiraError;
use crate::range::{ResiduePositionIndex, ResidueRange};
use crate::structure::Structure;
use crate::tools;

/// Carves `domain` out of `full` and brings along the ligands of every chain it
/// touches, filtered by `policy`.
pub fn assemble_domain(
    full: &Structure,
    domain: &DomainDefinition,
    policy: LigandPolicy,
    description: Option<&str>,
) -> Result<Structure, KiraError> {
    let ranges = ResidueRange::parse_multiple(&domain.range_expression())?;
    let mut part = tools::extract_ranges(full, &ranges)?;
    let added = add_ligands(&mut part, full, &ranges, policy);
    tracing::debug!(domain = %domain.id, ligands = added, %policy, "assembled domain");

    part.name = domain.id.clone();
    part.pdb_code = domain.id.clone();
    part.header.classification = domain.classification_id.clone();
    part.header.description = domain_header(domain.classification_id.as_deref(), description);
    Ok(part)
}

fn domain_header(classification: Option<&str>, description: Option<&str>) -> Option<String> {
    match (classification, description) {
        (Some(classification), Some(description)) => {
            Some(format!("{classification} | {description}"))
        }
        (Some(classification), None) => Some(classification.to_string()),
        (None, description) => description.map(str::to_string),
    }
}

/// Copies ligands from the matching chains of `full` into `part`. Under the strict
/// policy a ligand is kept only when its position falls inside one of `ranges`.
/// Groups already present are skipped. Returns the number of groups added.
pub fn add_ligands(
    part: &mut Structure,
    full: &Structure,
    ranges: &[ResidueRange],
    policy: LigandPolicy,
) -> usize {
    let index = match policy {
        LigandPolicy::Strict => Some(ResiduePositionIndex::new(full)),
        LigandPolicy::Loose => None,
    };
    let chain_ids: Vec<String> = part.chains().iter().map(|chain| chain.id.clone()).collect();
    let mut added = 0;
    for chain_id in chain_ids {
        let Some(source) = full.chain(&chain_id) else {
            continue;
        };
        let Some(target) = part.chain_mut(&chain_id) else {
            continue;
        };
        for ligand in source.ligands() {
            if let Some(index) = &index {
                let inside = ranges
                    .iter()
                    .any(|range| range.contains(&chain_id, &ligand.number, index));
                if !inside {
                    continue;
                }
            }
            if !target.contains_group(ligand) {
                target.add_group(ligand.clone());
                added += 1;
            }
        }
    }
    added
}
