use std::io::{BufRead, BufReader};

use flate2::read::GzDecoder;

use crate::domain::ParseDetail;
use crate::error::KiraError;
use crate::structure::{Atom, Group, GroupKind, Model, ResidueNumber, Structure};

const NUCLEOTIDES: &[&str] = &[
    "A", "C", "G", "U", "I", "T", "DA", "DC", "DG", "DT", "DU", "DI",
];

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

enum PdbRecord {
    Header,
    Title,
    Model,
    EndModel,
    Atom,
    Hetatm,
    End,
    Other,
}

fn get_pdb_record(line: &str) -> PdbRecord {
    if line.starts_with("HEADER") {
        PdbRecord::Header
    } else if line.starts_with("TITLE") {
        PdbRecord::Title
    } else if line.starts_with("MODEL") {
        PdbRecord::Model
    } else if line.starts_with("ENDMDL") {
        PdbRecord::EndModel
    } else if line.starts_with("ATOM") {
        PdbRecord::Atom
    } else if line.starts_with("HETATM") {
        PdbRecord::Hetatm
    } else if line.starts_with("END") {
        PdbRecord::End
    } else {
        PdbRecord::Other
    }
}

/// Column slice using 1-based inclusive PDB columns; short lines yield "".
fn columns(line: &str, first: usize, last: usize) -> &str {
    let end = last.min(line.len());
    line.get(first - 1..end).unwrap_or("")
}

/// Parses plain or gzip-compressed PDB text.
pub fn parse_bytes(bytes: &[u8], pdb_code: &str, detail: ParseDetail) -> Result<Structure, KiraError> {
    if bytes.starts_with(&GZIP_MAGIC) {
        parse_pdb(BufReader::new(GzDecoder::new(bytes)), pdb_code, detail)
    } else {
        parse_pdb(BufReader::new(bytes), pdb_code, detail)
    }
}

pub fn parse_pdb<R: BufRead>(reader: R, pdb_code: &str, detail: ParseDetail) -> Result<Structure, KiraError> {
    let mut structure = Structure::new(pdb_code);
    let mut title = String::new();
    let mut model: Option<Model> = None;

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|err| KiraError::Parse(err.to_string()))?;
        match get_pdb_record(&line) {
            PdbRecord::Header => {
                let classification = columns(&line, 11, 50).trim();
                if !classification.is_empty() {
                    structure.header.classification = Some(classification.to_string());
                }
                let id_code = columns(&line, 63, 66).trim();
                if !id_code.is_empty() {
                    structure.header.id_code = Some(id_code.to_string());
                }
            }
            PdbRecord::Title => {
                if !title.is_empty() {
                    title.push(' ');
                }
                title.push_str(columns(&line, 11, 80).trim());
            }
            PdbRecord::Model => {
                if let Some(done) = model.take() {
                    structure.add_model(done);
                }
                model = Some(Model::default());
            }
            PdbRecord::EndModel => {
                if let Some(done) = model.take() {
                    structure.add_model(done);
                }
            }
            PdbRecord::Atom | PdbRecord::Hetatm => {
                if detail == ParseDetail::HeaderOnly {
                    continue;
                }
                let hetero = line.starts_with("HETATM");
                let current = model.get_or_insert_with(Model::default);
                read_atom(current, &line, hetero, detail)
                    .map_err(|message| KiraError::Parse(format!("line {}: {message}", index + 1)))?;
            }
            PdbRecord::End => break,
            PdbRecord::Other => {}
        }
    }
    if let Some(done) = model.take() {
        structure.add_model(done);
    }
    if !title.is_empty() {
        structure.header.title = Some(title);
    }
    Ok(structure)
}

fn group_kind(res_name: &str, hetero: bool) -> GroupKind {
    if NUCLEOTIDES.contains(&res_name) {
        GroupKind::Nucleotide
    } else if !hetero || res_name == "MSE" {
        GroupKind::AminoAcid
    } else {
        GroupKind::Hetatm
    }
}

fn read_atom(model: &mut Model, line: &str, hetero: bool, detail: ParseDetail) -> Result<(), String> {
    let alt_loc = columns(line, 17, 17);
    if !(alt_loc.is_empty() || alt_loc == " " || alt_loc == "A") {
        return Ok(());
    }

    let name = columns(line, 13, 16).trim().to_string();
    let res_name = columns(line, 18, 20).trim().to_string();
    let kind = group_kind(&res_name, hetero);
    if detail == ParseDetail::CaOnly && kind == GroupKind::AminoAcid && name != "CA" {
        return Ok(());
    }

    let chain_id = match columns(line, 22, 22).trim() {
        "" => " ".to_string(),
        id => id.to_string(),
    };
    let seq = columns(line, 23, 26)
        .trim()
        .parse::<i32>()
        .map_err(|_| format!("invalid residue number {:?}", columns(line, 23, 26)))?;
    let insertion = columns(line, 27, 27).chars().next().filter(|ch| !ch.is_whitespace());
    let number = ResidueNumber::new(seq, insertion);

    let coordinate = |first, last| {
        columns(line, first, last)
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("invalid coordinate {:?}", columns(line, first, last)))
    };
    let optional = |first, last, default| {
        columns(line, first, last).trim().parse::<f64>().unwrap_or(default)
    };
    let serial = columns(line, 7, 11).trim().parse::<u32>().unwrap_or(0);
    let element = match columns(line, 77, 78).trim() {
        "" => name.chars().find(|ch| ch.is_ascii_alphabetic()).map(String::from).unwrap_or_default(),
        element => element.to_string(),
    };
    let atom = Atom {
        serial,
        name,
        element,
        coords: [coordinate(31, 38)?, coordinate(39, 46)?, coordinate(47, 54)?],
        occupancy: optional(55, 60, 1.0),
        b_factor: optional(61, 66, 0.0),
    };

    let chain = model.chain_or_insert(&chain_id);
    let starts_new_group = chain
        .groups()
        .last()
        .is_none_or(|last| last.number != number || last.name != res_name);
    if starts_new_group {
        chain.add_group(Group::new(&res_name, number, kind));
    }
    if let Some(group) = chain.last_group_mut() {
        group.atoms.push(atom);
    }
    Ok(())
}
