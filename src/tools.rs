use crate::error::KiraError;
use crate::range::{ALL_CHAINS, ResidueRange};
use crate::structure::{Chain, Model, ResidueNumber, Structure};

/// Copy of `full` restricted to its first model.
pub fn first_model(full: &Structure) -> Structure {
    let models = full.models().first().cloned().into_iter().collect();
    derived(full, models)
}

pub fn reduce_to_chain(full: &Structure, chain_id: &str) -> Result<Structure, KiraError> {
    let chain = full.chain(chain_id).ok_or_else(|| KiraError::ChainNotFound {
        pdb: full.pdb_code.clone(),
        chain: chain_id.to_string(),
    })?;
    Ok(derived(full, vec![Model::new(vec![chain.clone()])]))
}

pub fn reduce_to_chain_index(full: &Structure, index: usize) -> Result<Structure, KiraError> {
    let chain = full
        .chains()
        .get(index)
        .ok_or_else(|| KiraError::ChainNotFound {
            pdb: full.pdb_code.clone(),
            chain: format!("#{index}"),
        })?;
    Ok(derived(full, vec![Model::new(vec![chain.clone()])]))
}

pub fn sub_ranges(full: &Structure, expression: &str) -> Result<Structure, KiraError> {
    let ranges = ResidueRange::parse_multiple(expression)?;
    extract_ranges(full, &ranges)
}

/// Builds a new single-model structure from `ranges`. Ranges on the same chain are
/// merged into one chain in the order given; bounds are inclusive positions.
pub fn extract_ranges(full: &Structure, ranges: &[ResidueRange]) -> Result<Structure, KiraError> {
    let mut model = Model::default();
    for range in ranges {
        let chains: Vec<&Chain> = if range.chain == ALL_CHAINS {
            full.chains().iter().collect()
        } else {
            let chain = full.chain(&range.chain).ok_or_else(|| KiraError::ChainNotFound {
                pdb: full.pdb_code.clone(),
                chain: range.chain.clone(),
            })?;
            vec![chain]
        };

        for chain in chains {
            let (first, last) = bounds(chain, range)?;
            let target = model.chain_or_insert(&chain.id);
            for group in &chain.groups()[first..=last] {
                if !target.contains_group(group) {
                    target.add_group(group.clone());
                }
            }
        }
    }
    Ok(derived(full, vec![model]))
}

fn bounds(chain: &Chain, range: &ResidueRange) -> Result<(usize, usize), KiraError> {
    if chain.is_empty() {
        return Err(KiraError::MalformedRange(format!(
            "chain {} has no groups",
            chain.id
        )));
    }
    let (Some(start), Some(end)) = (&range.start, &range.end) else {
        return Ok((0, chain.groups().len() - 1));
    };
    let locate = |number: &ResidueNumber| {
        chain
            .position_of(number)
            .ok_or_else(|| KiraError::ResidueNotFound {
                chain: chain.id.clone(),
                residue: number.to_string(),
            })
    };
    let first = locate(start)?;
    let last = locate(end)?;
    if first > last {
        return Err(KiraError::MalformedRange(range.to_string()));
    }
    Ok((first, last))
}

fn derived(full: &Structure, models: Vec<Model>) -> Structure {
    let mut structure = Structure::with_models(&full.pdb_code, models);
    structure.name = full.name.clone();
    structure.header = full.header.clone();
    structure
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::structure::{Group, GroupKind};

    fn sample() -> Structure {
        let mut a = Chain::new("A");
        for seq in 1..=5 {
            a.add_group(Group::new("ALA", ResidueNumber::new(seq, None), GroupKind::AminoAcid));
        }
        a.add_group(Group::new("HEM", ResidueNumber::new(100, None), GroupKind::Hetatm));
        let mut b = Chain::new("B");
        for seq in 1..=3 {
            b.add_group(Group::new("GLY", ResidueNumber::new(seq, None), GroupKind::AminoAcid));
        }
        let first = Model::new(vec![a, b]);
        let second = first.clone();
        Structure::with_models("1ABC", vec![first, second])
    }

    #[test]
    fn first_model_drops_other_models() {
        let reduced = first_model(&sample());
        assert_eq!(reduced.model_count(), 1);
        assert_eq!(reduced.chains().len(), 2);
    }

    #[test]
    fn chain_by_id_and_index() {
        let full = sample();
        let chain = reduce_to_chain(&full, "B").unwrap();
        assert_eq!(chain.chains().len(), 1);
        assert_eq!(chain.chains()[0].id, "B");

        let by_index = reduce_to_chain_index(&full, 0).unwrap();
        assert_eq!(by_index.chains()[0].id, "A");

        assert_matches!(
            reduce_to_chain(&full, "Z"),
            Err(KiraError::ChainNotFound { .. })
        );
        assert_matches!(
            reduce_to_chain_index(&full, 7),
            Err(KiraError::ChainNotFound { .. })
        );
    }

    #[test]
    fn sub_ranges_merge_same_chain() {
        let full = sample();
        let part = sub_ranges(&full, "A_1-2,A_4-5,B").unwrap();
        assert_eq!(part.chains().len(), 2);
        assert_eq!(part.chain("A").unwrap().polymer_count(), 4);
        assert_eq!(part.chain("A").unwrap().ligand_count(), 0);
        assert_eq!(part.chain("B").unwrap().groups().len(), 3);
    }

    #[test]
    fn sub_ranges_report_missing_residues() {
        let full = sample();
        assert_matches!(
            sub_ranges(&full, "A_1-50"),
            Err(KiraError::ResidueNotFound { .. })
        );
        assert_matches!(
            sub_ranges(&full, "A_4-2"),
            Err(KiraError::MalformedRange(_))
        );
    }
}
