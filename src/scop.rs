use std::collections::HashMap;
use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::error::KiraError;
use crate::range::ALL_CHAINS;
use crate::reader::Flushable;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopDomain {
    pub scop_id: String,
    pub pdb_id: String,
    /// Range expressions such as `A:1-83`, or `_` for the whole entry.
    pub ranges: Vec<String>,
    pub classification_id: String,
    pub sunid: u32,
    pub superfamily_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopDescription {
    pub sunid: u32,
    pub category: String,
    pub classification_id: String,
    pub name: String,
    pub description: String,
}

pub trait ScopDatabase: Send + Sync {
    fn domain_by_scop_id(&self, scop_id: &str) -> Result<Option<ScopDomain>, KiraError>;
    /// Every domain of an entry, in database order.
    fn domains_for_pdb(&self, pdb_id: &str) -> Result<Vec<ScopDomain>, KiraError>;
    fn description_by_sunid(&self, sunid: u32) -> Result<Option<ScopDescription>, KiraError>;

    fn flushable(&self) -> Option<&dyn Flushable> {
        None
    }
}

/// SCOP/SCOPe parseable files (`dir.cla.*`, `dir.des.*`) held in memory.
#[derive(Debug, Clone, Default)]
pub struct ScopInstallation {
    domains: Vec<ScopDomain>,
    by_id: HashMap<String, usize>,
    by_pdb: HashMap<String, Vec<usize>>,
    descriptions: HashMap<u32, ScopDescription>,
}

impl ScopInstallation {
    /// Loads the first `dir.cla.*` and `dir.des.*` files found in `dir`.
    pub fn open(dir: &Utf8Path) -> Result<Self, KiraError> {
        let cla = find_file(dir, "dir.cla.")?;
        let des = find_file(dir, "dir.des.")?;
        Self::from_files(&cla, &des)
    }

    pub fn from_files(cla: &Utf8Path, des: &Utf8Path) -> Result<Self, KiraError> {
        let cla_text = read(cla.as_std_path())?;
        let des_text = read(des.as_std_path())?;
        Self::from_strs(&cla_text, &des_text)
    }

    pub fn from_strs(cla: &str, des: &str) -> Result<Self, KiraError> {
        let mut installation = Self::default();
        for (index, line) in data_lines(cla) {
            let domain = parse_cla_line(line)
                .ok_or_else(|| KiraError::Parse(format!("SCOP cla line {}: {line}", index + 1)))?;
            installation.insert(domain);
        }
        for (index, line) in data_lines(des) {
            let description = parse_des_line(line)
                .ok_or_else(|| KiraError::Parse(format!("SCOP des line {}: {line}", index + 1)))?;
            installation
                .descriptions
                .insert(description.sunid, description);
        }
        tracing::debug!(domains = installation.domains.len(), "loaded SCOP classification");
        Ok(installation)
    }

    fn insert(&mut self, domain: ScopDomain) {
        let position = self.domains.len();
        self.by_id.insert(domain.scop_id.clone(), position);
        self.by_pdb
            .entry(domain.pdb_id.to_lowercase())
            .or_default()
            .push(position);
        self.domains.push(domain);
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

impl ScopDatabase for ScopInstallation {
    fn domain_by_scop_id(&self, scop_id: &str) -> Result<Option<ScopDomain>, KiraError> {
        Ok(self
            .by_id
            .get(scop_id)
            .map(|&index| self.domains[index].clone()))
    }

    fn domains_for_pdb(&self, pdb_id: &str) -> Result<Vec<ScopDomain>, KiraError> {
        Ok(self
            .by_pdb
            .get(&pdb_id.to_lowercase())
            .map(|indices| indices.iter().map(|&index| self.domains[index].clone()).collect())
            .unwrap_or_default())
    }

    fn description_by_sunid(&self, sunid: u32) -> Result<Option<ScopDescription>, KiraError> {
        Ok(self.descriptions.get(&sunid).cloned())
    }
}

fn read(path: &Path) -> Result<String, KiraError> {
    fs::read_to_string(path).map_err(|err| KiraError::DatabaseRead {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn find_file(dir: &Utf8Path, prefix: &str) -> Result<Utf8PathBuf, KiraError> {
    let entries = dir.read_dir_utf8().map_err(|err| KiraError::DatabaseRead {
        path: dir.as_std_path().to_path_buf(),
        message: err.to_string(),
    })?;
    let mut matches: Vec<Utf8PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().starts_with(prefix))
        .map(|entry| entry.path().to_path_buf())
        .collect();
    matches.sort();
    matches.pop().ok_or_else(|| KiraError::DatabaseRead {
        path: dir.as_std_path().to_path_buf(),
        message: format!("no {prefix}* file"),
    })
}

fn data_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.starts_with('#'))
}

/// `d1dlwa_  1dlw  A:  a.1.1.1  14982  cl=46456,cf=46457,sf=46458,...`
fn parse_cla_line(line: &str) -> Option<ScopDomain> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 5 {
        return None;
    }
    let ranges = fields[2]
        .split(',')
        .map(|range| match range.trim() {
            "-" => ALL_CHAINS.to_string(),
            other => other.to_string(),
        })
        .collect();
    let superfamily_id = fields
        .get(5)
        .into_iter()
        .flat_map(|hierarchy| hierarchy.split(','))
        .find_map(|entry| entry.strip_prefix("sf="))
        .and_then(|value| value.parse().ok());
    Some(ScopDomain {
        scop_id: fields[0].to_string(),
        pdb_id: fields[1].to_string(),
        ranges,
        classification_id: fields[3].to_string(),
        sunid: fields[4].trim().parse().ok()?,
        superfamily_id,
    })
}

/// `46456  cl  a  -  All alpha proteins`
fn parse_des_line(line: &str) -> Option<ScopDescription> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 5 {
        return None;
    }
    Some(ScopDescription {
        sunid: fields[0].trim().parse().ok()?,
        category: fields[1].to_string(),
        classification_id: fields[2].to_string(),
        name: fields[3].to_string(),
        description: fields[4..].join("\t"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLA: &str = "# SCOP cla\n\
d1dlwa_\t1dlw\tA:\ta.1.1.1\t14982\tcl=46456,cf=46457,sf=46458,fa=46459,dm=46460,sp=46461,px=14982\n\
d2bq6a1\t2bq6\tA:1-83\tb.1.1.1\t128000\tcl=48724,cf=48725,sf=48726,fa=48727,dm=48728,sp=48729,px=128000\n\
d1abc__\t1abc\t-\tc.1.1.1\t7\tcl=1,cf=2,sf=3,fa=4,dm=5,sp=6,px=7\n";

    const DES: &str = "46458\tsf\ta.1.1\t-\tGlobin-like\n48726\tsf\tb.1.1\t-\tImmunoglobulin\n";

    #[test]
    fn parse_installation() {
        let scop = ScopInstallation::from_strs(CLA, DES).unwrap();
        assert_eq!(scop.len(), 3);

        let domain = scop.domain_by_scop_id("d2bq6a1").unwrap().unwrap();
        assert_eq!(domain.ranges, vec!["A:1-83".to_string()]);
        assert_eq!(domain.superfamily_id, Some(48726));

        let whole = scop.domain_by_scop_id("d1abc__").unwrap().unwrap();
        assert_eq!(whole.ranges, vec!["_".to_string()]);

        let description = scop.description_by_sunid(46458).unwrap().unwrap();
        assert_eq!(description.description, "Globin-like");

        assert_eq!(scop.domains_for_pdb("1DLW").unwrap().len(), 1);
        assert!(scop.domains_for_pdb("9xyz").unwrap().is_empty());
    }

    #[test]
    fn reject_truncated_lines() {
        assert!(ScopInstallation::from_strs("d1dlwa_\t1dlw\n", "").is_err());
    }
}
