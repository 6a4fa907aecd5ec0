use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kira_structure_cache::config::{ConfigLoader, ResolverConfig};
use kira_structure_cache::domain::ParseDetail;
use kira_structure_cache::error::KiraError;
use kira_structure_cache::name;
use kira_structure_cache::output::{ClassifyResult, JsonOutput, ResolveResult, StructureSummary};
use kira_structure_cache::resolver::Resolver;

#[derive(Parser)]
#[command(name = "kira-sc")]
#[command(about = "Resolve structure names (PDB ids, chains, ranges, SCOP/CATH/PDP domains) into structures")]
#[command(version, author)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Overrides {
    #[arg(long, global = true, help = "Path to kira-sc.json")]
    config: Option<String>,
    #[arg(long, global = true)]
    pdb_dir: Option<Utf8PathBuf>,
    #[arg(long, global = true, help = "Use the divided mirror layout")]
    split: bool,
    #[arg(long, global = true, help = "Never download missing files")]
    no_auto_fetch: bool,
    #[arg(long, global = true)]
    fetch_obsolete: bool,
    #[arg(long, global = true)]
    fetch_current: bool,
    #[arg(long, global = true, help = "Guess SCOP domains when the exact id is unknown")]
    lenient_scop: bool,
    #[arg(long, global = true)]
    strict_ligands: bool,
    #[arg(long, global = true, help = "Report URL, PDP and assembly failures as not found")]
    legacy_lenient: bool,
    #[arg(long, global = true, value_enum)]
    detail: Option<ParseDetail>,
    #[arg(long, global = true)]
    scop_dir: Option<Utf8PathBuf>,
    #[arg(long, global = true)]
    cath_file: Option<Utf8PathBuf>,
    #[arg(long, global = true)]
    pdp_file: Option<Utf8PathBuf>,
}

impl Overrides {
    fn apply(self, mut config: ResolverConfig) -> ResolverConfig {
        if let Some(dir) = self.pdb_dir {
            config.pdb_dir = dir;
        }
        config.split |= self.split;
        config.auto_fetch &= !self.no_auto_fetch;
        config.fetch_obsolete |= self.fetch_obsolete;
        config.fetch_current |= self.fetch_current;
        config.strict_scop &= !self.lenient_scop;
        config.strict_ligands |= self.strict_ligands;
        config.legacy_lenient |= self.legacy_lenient;
        if let Some(detail) = self.detail {
            config.parse_detail = detail;
        }
        config.scop_dir = self.scop_dir.or(config.scop_dir);
        config.cath_file = self.cath_file.or(config.cath_file);
        config.pdp_file = self.pdp_file.or(config.pdp_file);
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Resolve a structure name and print a summary")]
    Resolve(NameArgs),
    #[command(about = "Show how a structure name is interpreted")]
    Classify(NameArgs),
}

#[derive(Args)]
struct NameArgs {
    name: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error.root() {
        KiraError::TooShort(_)
        | KiraError::UnresolvedName(_)
        | KiraError::InvalidPdbId(_)
        | KiraError::InvalidChainIndex(_)
        | KiraError::InvalidAssemblyIndex(_)
        | KiraError::InvalidUrl { .. }
        | KiraError::MalformedRange(_) => 2,
        KiraError::DomainNotFound(_)
        | KiraError::ChainNotFound { .. }
        | KiraError::ResidueNotFound { .. }
        | KiraError::NotAvailableLocally(_) => 4,
        KiraError::RcsbHttp(_) | KiraError::RcsbStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Classify(args) => {
            let parsed = name::classify(&args.name)?;
            let result = ClassifyResult {
                request: args.name.clone(),
                kind: parsed.kind(),
                matching_rules: name::matching_rules(&args.name),
                name: parsed,
            };
            JsonOutput::print_classify(&result)
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
            Ok(())
        }
        Commands::Resolve(args) => {
            let config = ConfigLoader::resolve(cli.overrides.config.as_deref())?;
            let config = cli.overrides.apply(config);
            let resolver = Resolver::open(config)?;
            let structure = resolver.resolve_and_flush(&args.name)?;
            let result = ResolveResult {
                request: args.name.clone(),
                found: structure.is_some(),
                structure: structure
                    .as_ref()
                    .map(|structure| StructureSummary::new(&args.name, structure)),
            };
            JsonOutput::print_resolve(&result)
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
            Ok(())
        }
    }
}
