//! Residue range expressions such as `A_1-83,B` or `(A:-5-12B)`.
//!
//! Range bounds are compared by position in the parent structure, not numerically,
//! so insertion codes and out-of-order numbering behave the way they appear in the
//! deposited file.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::KiraError;
use crate::structure::{ResidueNumber, Structure};

static RANGE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*([a-zA-Z0-9]+|_)(?:[_:](?:([-+]?[0-9]+[A-Za-z]?)\s*-\s*([-+]?[0-9]+[A-Za-z]?))?)?\s*$",
    )
    .expect("range regex is valid")
});

/// Chain selector used by `_`, which stands for every chain of the entry.
pub const ALL_CHAINS: &str = "_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResidueRange {
    pub chain: String,
    pub start: Option<ResidueNumber>,
    pub end: Option<ResidueNumber>,
}

impl ResidueRange {
    pub fn whole_chain(chain: &str) -> Self {
        Self {
            chain: chain.to_string(),
            start: None,
            end: None,
        }
    }

    pub fn new(chain: &str, start: ResidueNumber, end: ResidueNumber) -> Self {
        Self {
            chain: chain.to_string(),
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn is_whole_chain(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn matches_chain(&self, chain: &str) -> bool {
        self.chain == ALL_CHAINS || self.chain == chain
    }

    /// Parses a comma separated expression, optionally wrapped in parentheses.
    pub fn parse_multiple(expression: &str) -> Result<Vec<ResidueRange>, KiraError> {
        let trimmed = expression.trim();
        let inner = trimmed
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(trimmed);
        if inner.trim().is_empty() {
            return Err(KiraError::MalformedRange(expression.to_string()));
        }
        inner.split(',').map(str::parse).collect()
    }

    /// Whether `number` in `chain` lies inside this range, using positions from `index`.
    /// Bounds missing from the index never match.
    pub fn contains(&self, chain: &str, number: &ResidueNumber, index: &ResiduePositionIndex) -> bool {
        if !self.matches_chain(chain) {
            return false;
        }
        let Some(position) = index.position(chain, number) else {
            return false;
        };
        match (&self.start, &self.end) {
            (Some(start), Some(end)) => {
                match (index.position(chain, start), index.position(chain, end)) {
                    (Some(first), Some(last)) => first <= position && position <= last,
                    _ => false,
                }
            }
            _ => true,
        }
    }
}

impl FromStr for ResidueRange {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let captures = RANGE_REGEX
            .captures(value)
            .ok_or_else(|| KiraError::MalformedRange(value.to_string()))?;
        let chain = captures[1].to_string();
        match (captures.get(2), captures.get(3)) {
            (Some(start), Some(end)) => Ok(Self {
                chain,
                start: Some(start.as_str().parse()?),
                end: Some(end.as_str().parse()?),
            }),
            _ => Ok(Self::whole_chain(&chain)),
        }
    }
}

impl fmt::Display for ResidueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.start, &self.end) {
            (Some(start), Some(end)) => write!(f, "{}_{}-{}", self.chain, start, end),
            _ => write!(f, "{}", self.chain),
        }
    }
}

/// Joins ranges back into the textual `A_1-10,B` form.
pub fn to_expression(ranges: &[ResidueRange]) -> String {
    ranges
        .iter()
        .map(ResidueRange::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Position of every group of the first model, in file order.
#[derive(Debug, Clone, Default)]
pub struct ResiduePositionIndex {
    positions: HashMap<(String, ResidueNumber), usize>,
}

impl ResiduePositionIndex {
    pub fn new(structure: &Structure) -> Self {
        let mut positions = HashMap::new();
        let groups = structure
            .chains()
            .iter()
            .flat_map(|chain| chain.groups().iter().map(move |group| (chain, group)));
        for (position, (chain, group)) in groups.enumerate() {
            positions
                .entry((chain.id.clone(), group.number))
                .or_insert(position);
        }
        Self { positions }
    }

    pub fn position(&self, chain: &str, number: &ResidueNumber) -> Option<usize> {
        self.positions.get(&(chain.to_string(), *number)).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Describes the polymer coverage of `part` as contiguous runs of `full`.
pub fn covering_ranges(part: &Structure, full: &Structure) -> Vec<ResidueRange> {
    let index = ResiduePositionIndex::new(full);
    let mut ranges = Vec::new();
    for chain in part.chains() {
        let mut positioned: Vec<(usize, ResidueNumber)> = chain
            .groups()
            .iter()
            .filter(|group| group.is_polymer())
            .filter_map(|group| {
                index
                    .position(&chain.id, &group.number)
                    .map(|position| (position, group.number))
            })
            .collect();
        positioned.sort_by_key(|(position, _)| *position);

        let mut run: Option<(usize, ResidueNumber, usize, ResidueNumber)> = None;
        for (position, number) in positioned {
            run = match run {
                Some((first, start, last, _)) if position == last + 1 => {
                    Some((first, start, position, number))
                }
                Some((_, start, _, end)) => {
                    ranges.push(ResidueRange::new(&chain.id, start, end));
                    Some((position, number, position, number))
                }
                None => Some((position, number, position, number)),
            };
        }
        if let Some((_, start, _, end)) = run {
            ranges.push(ResidueRange::new(&chain.id, start, end));
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_single_ranges() {
        let range: ResidueRange = "A_1-83".parse().unwrap();
        assert_eq!(range.chain, "A");
        assert_eq!(range.start, Some(ResidueNumber::new(1, None)));
        assert_eq!(range.end, Some(ResidueNumber::new(83, None)));

        let range: ResidueRange = "B:-5-12A".parse().unwrap();
        assert_eq!(range.start, Some(ResidueNumber::new(-5, None)));
        assert_eq!(range.end, Some(ResidueNumber::new(12, Some('A'))));

        let range: ResidueRange = "C".parse().unwrap();
        assert!(range.is_whole_chain());
        let range: ResidueRange = "C:".parse().unwrap();
        assert!(range.is_whole_chain());
    }

    #[test]
    fn parse_multiple_with_parentheses() {
        let ranges = ResidueRange::parse_multiple("(A_1-10, B)").unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(to_expression(&ranges), "A_1-10,B");
    }

    #[test]
    fn reject_malformed() {
        assert_matches!(
            ResidueRange::parse_multiple("A_1-"),
            Err(KiraError::MalformedRange(_))
        );
        assert_matches!(
            ResidueRange::parse_multiple(""),
            Err(KiraError::MalformedRange(_))
        );
        assert_matches!("A_x-3".parse::<ResidueRange>(), Err(KiraError::MalformedRange(_)));
    }

    #[test]
    fn all_chain_selector() {
        let range: ResidueRange = "_".parse().unwrap();
        assert!(range.matches_chain("A"));
        assert!(range.matches_chain("Z"));
    }
}
