use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{error, info};
use pegrna_designer::{
    DesignParameters, DesignRequest, Oracles, OutputTable, design_batch, design_pegrnas,
    designed::{DesignedPegRna, features_for_designed},
    fasta_windows::read_window_pairs_file,
    rna_structure::{RnaFold, rnafold_executable},
    table::{COLUMNS, NUCLEASE_SCORE_COLUMN},
    thermo::NearestNeighborTm,
};
use serde::Serialize;
use std::{fs, path::PathBuf};

#[derive(Parser, Debug)]
#[command(version, about = "Design prime-editing guide RNAs and extract their features")]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Design every pegRNA for one edit request
    Design {
        /// Request JSON, or @file.json
        #[arg(long)]
        request: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Design a JSON array of requests in parallel
    Batch {
        /// Array of request JSON, or @file.json
        #[arg(long)]
        requests: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Design requests read from wild-type/edited FASTA record pairs
    Fasta {
        #[arg(long)]
        windows: PathBuf,
        /// Design parameters JSON, or @file.json
        #[arg(long)]
        params: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Features for an already designed pegRNA
    Designed {
        /// pegRNA JSON, or @file.json
        #[arg(long)]
        pegrna: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Print the output column names
    Columns,
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    #[arg(long, value_enum, default_value_t = Format::Csv)]
    format: Format,
    /// Write to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
    /// RNAfold executable (defaults to $PEGRNA_RNAFOLD_BIN or RNAfold)
    #[arg(long)]
    rnafold: Option<String>,
    /// Melting temperature conditions JSON, or @file.json
    #[arg(long)]
    tm: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Csv,
    Json,
}

fn load_json_arg(value: &str) -> Result<String> {
    if let Some(path) = value.strip_prefix('@') {
        fs::read_to_string(path).with_context(|| format!("Could not read JSON file '{path}'"))
    } else {
        Ok(value.to_string())
    }
}

fn parse_json_arg<T: serde::de::DeserializeOwned>(value: &str, what: &str) -> Result<T> {
    let text = load_json_arg(value)?;
    serde_json::from_str(&text).with_context(|| format!("Could not parse {what} JSON"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Could not serialize JSON output")?;
    println!("{text}");
    Ok(())
}

struct Collaborators {
    tm: NearestNeighborTm,
    fold: RnaFold,
}

impl OutputArgs {
    fn collaborators(&self) -> Result<Collaborators> {
        let tm = match &self.tm {
            Some(value) => parse_json_arg(value, "Tm conditions")?,
            None => NearestNeighborTm::default(),
        };
        let executable = self.rnafold.clone().unwrap_or_else(rnafold_executable);
        info!("Folding with '{executable}'");
        Ok(Collaborators {
            tm,
            fold: RnaFold::new(&executable),
        })
    }

    fn emit(&self, table: &OutputTable) -> Result<()> {
        let text = match self.format {
            Format::Csv => table.to_csv_string()?,
            Format::Json => format!("{}\n", table.to_json_string()?),
        };
        match &self.output {
            Some(path) => {
                fs::write(path, text)
                    .with_context(|| format!("Could not write '{}'", path.display()))?;
                info!("Wrote {} rows to {}", table.len(), path.display());
            }
            None => print!("{text}"),
        }
        Ok(())
    }
}

/// Designs every request, writes the successful tables together and fails
/// if any request failed.
fn run_requests(requests: Vec<DesignRequest>, output: &OutputArgs) -> Result<()> {
    let c = output.collaborators()?;
    let oracles = Oracles::new(&c.tm, &c.fold);
    let mut tables = vec![];
    let mut failures = 0;
    for (request, result) in requests.iter().zip(design_batch(&requests, &oracles)) {
        match result {
            Ok(table) => tables.push(table),
            Err(e) => {
                error!("{}: {e}", request.spec.id);
                failures += 1;
            }
        }
    }
    output.emit(&OutputTable::concat(tables))?;
    if failures > 0 {
        return Err(anyhow!("{failures} of {} requests failed", requests.len()));
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Design { request, output } => {
            let request: DesignRequest = parse_json_arg(&request, "request")?;
            let c = output.collaborators()?;
            let table = design_pegrnas(&request.spec, &request.parameters, &Oracles::new(&c.tm, &c.fold))?;
            output.emit(&table)
        }
        Command::Batch { requests, output } => {
            let requests: Vec<DesignRequest> = parse_json_arg(&requests, "requests")?;
            run_requests(requests, &output)
        }
        Command::Fasta {
            windows,
            params,
            output,
        } => {
            let params: DesignParameters = match params {
                Some(value) => parse_json_arg(&value, "parameters")?,
                None => DesignParameters::default(),
            };
            let path = windows.to_string_lossy();
            let requests = read_window_pairs_file(&path, &params)
                .with_context(|| format!("Could not read windows from '{path}'"))?;
            info!("Read {} edit windows from {path}", requests.len());
            run_requests(requests, &output)
        }
        Command::Designed { pegrna, output } => {
            let pegrna: DesignedPegRna = parse_json_arg(&pegrna, "pegRNA")?;
            let c = output.collaborators()?;
            let row = features_for_designed(&pegrna, &Oracles::new(&c.tm, &c.fold))?;
            output.emit(&OutputTable::new(vec![row]))
        }
        Command::Columns => {
            let mut columns = COLUMNS.to_vec();
            columns.push(NUCLEASE_SCORE_COLUMN);
            print_json(&columns)
        }
    }
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    if let Err(e) = run(Args::parse()) {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}
