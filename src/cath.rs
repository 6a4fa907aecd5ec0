use std::collections::HashMap;
use std::fs;

use camino::Utf8Path;
use serde::Serialize;

use crate::error::KiraError;
use crate::name::CathId;
use crate::reader::Flushable;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CathSegment {
    pub start: String,
    pub stop: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CathDomain {
    pub domain_name: String,
    pub pdb_id: String,
    pub chain: String,
    pub segments: Vec<CathSegment>,
}

pub trait CathDatabase: Send + Sync {
    fn domain_by_cath_id(&self, cath_id: &str) -> Result<Option<CathDomain>, KiraError>;

    fn flushable(&self) -> Option<&dyn Flushable> {
        None
    }
}

/// CATH domain boundaries (`cath-domain-boundaries-seqreschopping.txt`), one domain per
/// line: `1cukA01<TAB>1-48,146-165`.
#[derive(Debug, Clone, Default)]
pub struct CathInstallation {
    domains: HashMap<String, CathDomain>,
}

impl CathInstallation {
    pub fn open(path: &Utf8Path) -> Result<Self, KiraError> {
        let text = fs::read_to_string(path.as_std_path()).map_err(|err| KiraError::DatabaseRead {
            path: path.as_std_path().to_path_buf(),
            message: err.to_string(),
        })?;
        Self::from_str(&text)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Result<Self, KiraError> {
        let mut domains = HashMap::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let domain = parse_boundaries_line(line)
                .ok_or_else(|| KiraError::Parse(format!("CATH line {}: {line}", index + 1)))?;
            domains.insert(domain.domain_name.clone(), domain);
        }
        Ok(Self { domains })
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

impl CathDatabase for CathInstallation {
    fn domain_by_cath_id(&self, cath_id: &str) -> Result<Option<CathDomain>, KiraError> {
        Ok(self.domains.get(cath_id).cloned())
    }
}

fn parse_boundaries_line(line: &str) -> Option<CathDomain> {
    let (name, segments) = line.split_once(char::is_whitespace)?;
    let id = CathId::parse(name)?;
    let segments = segments
        .trim()
        .split(',')
        .map(parse_segment)
        .collect::<Option<Vec<_>>>()?;
    Some(CathDomain {
        domain_name: id.id,
        pdb_id: id.pdb.load_key(),
        chain: id.chain,
        segments,
    })
}

/// `12-48`, `-5-48` or `10A-20`; the separator is the first `-` after a digit.
fn parse_segment(segment: &str) -> Option<CathSegment> {
    let segment = segment.trim();
    let split = segment
        .char_indices()
        .skip(1)
        .find(|&(index, ch)| ch == '-' && segment[..index].ends_with(|c: char| c.is_ascii_alphanumeric()))
        .map(|(index, _)| index)?;
    let (start, stop) = (&segment[..split], &segment[split + 1..]);
    if start.is_empty() || stop.is_empty() {
        return None;
    }
    Some(CathSegment {
        start: start.to_string(),
        stop: stop.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_boundaries() {
        let cath = CathInstallation::from_str("1cukA01\t1-48,146-165\n1cukA02\t-5-12A\n").unwrap();
        assert_eq!(cath.len(), 2);
        let domain = cath.domain_by_cath_id("1cukA01").unwrap().unwrap();
        assert_eq!(domain.pdb_id, "1cuk");
        assert_eq!(domain.chain, "A");
        assert_eq!(
            domain.segments,
            vec![
                CathSegment { start: "1".into(), stop: "48".into() },
                CathSegment { start: "146".into(), stop: "165".into() },
            ]
        );
        let negative = cath.domain_by_cath_id("1cukA02").unwrap().unwrap();
        assert_eq!(negative.segments[0].start, "-5");
        assert_eq!(negative.segments[0].stop, "12A");
    }

    #[test]
    fn reject_bad_lines() {
        assert!(CathInstallation::from_str("1cukA01\n").is_err());
        assert!(CathInstallation::from_str("nonsense\t1-2\n").is_err());
    }
}
