pub mod cath;
pub mod config;
pub mod domain;
pub mod domains;
pub mod error;
pub mod loader;
pub mod name;
pub mod output;
pub mod pdb;
pub mod pdp;
pub mod range;
pub mod rcsb;
pub mod reader;
pub mod resolver;
pub mod scop;
pub mod structure;
pub mod substructure;
pub mod tools;
