/***
SIMPROF: simulation of ribosome profiling experiments
    Copyright (C) 2025 Andrew T. Martens

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License, version 3,
    as published by the Free Software Foundation.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.

e-mail: simplton@logical.bio
 ***/

/* main.rs: command-line interface */

use polars::prelude::{ParquetReader, ParquetWriter, SerReader};

use threadpool::ThreadPool;

use std::collections::HashMap;
use std::fs::{create_dir_all, File, write, remove_file};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use clap::{Parser, Subcommand, ArgAction};

use arrow2::datatypes::{Schema, Field, DataType};
use arrow2::array::*;
use arrow2::chunk::Chunk;
use arrow2::io::parquet::write::{
    CompressionOptions, WriteOptions, FileWriter, Version, Encoding,
    RowGroupIterator
};

use anyhow::{Context, Result, bail};

use std::sync::mpsc::channel;
use std::sync::Arc;
use std::env;

mod codons;
mod dataframe_operations;
mod errors;
mod events;
mod experiment;
mod message;
mod occupancy;
mod rates;
mod ribosome;
mod util;

use experiment::{ExperimentConfig, Method, SimulatedCounts};
use rates::Perturbation;

/* Simple struct for receiving results from a thread */
pub struct GeneMessage {
    gene: String,
    counts: Result<SimulatedCounts, errors::SimulationError>,
}

#[derive(Parser)]
#[command(
    name = "simprof",
    version = "1.0.0",
    author = "Andrew T. Martens <andrew_martens@hms.harvard.edu>",
    about = "SIMPROF -- SIMulating ribosome PROFiling",
    disable_help_subcommand = true,
    disable_version_flag = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(
	about = "Generate synthetic per-codon ribosome footprint counts for \
		 each gene, matching the depth of real counts"
    )]
    Simulate {
	#[arg(
	    short = 'c',
	    long = "cds",
	    help = "FASTA of coding sequences, start through stop codon",
	    required = true
	)]
	cds_path: String,

	#[arg(
	    short = 'k',
	    long = "counts",
	    help = "Real counts TSV: gene, codon position, count",
	    required = true
	)]
	counts_path: String,

	#[arg(
	    short = 'r',
	    long = "rates",
	    help = "Codon mean dwell times TSV: codon, mean",
	    required = true
	)]
	rates_path: String,

	#[arg(
	    short = 'R',
	    long = "perturbed-rates",
	    help = "Second codon mean dwell time table, for change_all"
	)]
	perturbed_rates_path: Option<String>,

	#[arg(
	    short = 'e',
	    long = "te",
	    help = "Translational efficiencies TSV: gene, TE. Defaults to 1."
	)]
	te_path: Option<String>,

	#[arg(
	    short = 'i',
	    long = "initiation-numerator",
	    help = "Initiation mean for a gene is this divided by its TE",
	    required = true
	)]
	initiation_numerator: f64,

	#[arg(
	    short = 'd',
	    long = "drug-mean",
	    help = "Mean time for drug to arrest a ribosome; also the \
		    harvest delay after a perturbation",
	    required = true
	)]
	drug_mean: f64,

	#[arg(
	    short = 'p',
	    long = "perturbation",
	    help = "reciprocal, shuffle, uniform, change_one[:CODON] or \
		    change_all. Without one, drug runoff is simulated."
	)]
	perturbation: Option<String>,

	#[arg(
	    short = 'm',
	    long = "method",
	    value_enum,
	    default_value_t = Method::Mechanistic,
	    help = "Simulate traffic, or distribute counts analytically"
	)]
	method: Method,

	#[arg(
	    short = 's',
	    long = "seed",
	    help = "Random seed. Drawn at random (and logged) if absent."
	)]
	seed: Option<u64>,

	#[arg(
	    short = 'M',
	    long = "max-events",
	    default_value_t = message::DEFAULT_MAX_EVENTS,
	    help = "Abort a message that processes more events than this"
	)]
	max_events: u64,

	#[arg(
	    short = 'T',
	    long = "num-threads",
	    default_value_t = 1,
	    help = "Maximum number of threads"
	)]
	num_threads: usize,

	#[arg(
	    short = 'o',
	    long = "out-dir",
	    help = "Directory to write to",
	    required = false
	)]
	out_dir: Option<String>,

	#[arg(
	    short = 'l',
	    long = "log-file",
	    help = "Log to this file instead of stderr"
	)]
	log_file: Option<String>,

	#[arg(short, long, action = ArgAction::Count)]
	verbosity: u8,
    },

    #[command(
	about = "Averaged per-position densities and per-gene totals of \
		 simulated counts"
    )]
    Statistics {
	#[arg(
	    short = 'i',
	    long = "counts",
	    default_value = "simulated_codon_counts.pq",
	    help = "Simulated counts file (parquet)",
	)]
	counts_path: String,

	#[arg(
	    short = 'o',
	    long = "out-dir",
	    help = "Output directory",
	    required = false
	)]
	out_dir: Option<String>,

	#[arg(short, long, action = ArgAction::Count)]
	verbosity: u8,
    },
}

/*
   Boilerplate function that starts the program and immediately calls run(),
   and takes care of error handling.
*/
fn main() -> Result<()> {
    if let Err(e) = run() {
	eprintln!("Error: {:?}", e);
	std::process::exit(1);
    }
    Ok(())
}

/*
   Process command-line arguments & invoke the corresponding subroutine.
*/
fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
	Commands::Simulate {
	    cds_path, counts_path, rates_path, perturbed_rates_path, te_path,
	    initiation_numerator, drug_mean, perturbation, method, seed,
	    max_events, num_threads, out_dir, log_file, verbosity
	} => {
	    setup_logger(verbosity, log_file.as_deref())?;

	    let config = build_config(
		initiation_numerator,
		drug_mean,
		perturbation,
		perturbed_rates_path,
		method,
		max_events
	    )?;

	    run_simulation(
		cds_path,
		counts_path,
		rates_path,
		te_path,
		config,
		seed,
		num_threads,
		out_dir
	    )
	}

	Commands::Statistics { counts_path, out_dir, verbosity } => {
	    setup_logger(verbosity, None)?;
	    run_statistics(counts_path, out_dir)
	}
    }
}

fn setup_logger(verbosity: u8, log_file: Option<&str>) -> Result<()> {
    let level = match verbosity {
	0 => log::LevelFilter::Info,
	1 => log::LevelFilter::Debug,
	_ => log::LevelFilter::Trace,
    };

    match log_file {
	Some(path) => simple_logging::log_to_file(path, level)
	    .with_context(|| format!("Unable to open log file '{}'", path))?,
	None => simple_logging::log_to_stderr(level),
    }

    Ok(())
}

/* Everything that can be rejected is rejected here, before any gene is
   simulated. */
fn build_config(
    initiation_numerator: f64,
    drug_mean: f64,
    perturbation: Option<String>,
    perturbed_rates_path: Option<String>,
    method: Method,
    max_events: u64
) -> Result<ExperimentConfig> {
    let perturbed_rates = match perturbed_rates_path {
	Some(path) => Some(util::read_rate_table(&path)?),
	None => None,
    };

    let perturbation = match perturbation {
	Some(name) => Some(Perturbation::parse(&name, perturbed_rates)?),
	None => {
	    if perturbed_rates.is_some() {
		log::warn!("perturbed rates given without a perturbation; ignoring them");
	    }
	    None
	}
    };

    if let Some(p) = &perturbation {
	if method == Method::Analytical {
	    log::warn!("perturbation '{}' has no effect on the analytical method", p.name());
	}
    }

    let config = ExperimentConfig {
	initiation_mean_numerator: initiation_numerator,
	drug_mean,
	perturbation,
	method,
	max_events,
    };
    config.validate()?;

    Ok(config)
}

// Does a directory exist? Is it writeable?
fn ensure_writable_dir<P: AsRef<Path>>(path: P, temp_filename : &str) -> Result<()> {
    let path = path.as_ref();

    if path.exists() {
	if !path.is_dir() {
	    bail!("Path exists but is not a directory: {}", path.display());
	}

	// Check writability by trying to create a temp file
	let test_path = path.join(temp_filename);
	write(&test_path, b"test").context("Directory exists but is not writable")?;
	remove_file(&test_path).ok(); // Cleanup, ignore error
    } else {
	create_dir_all(path)
	    .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    }

    Ok(())
}

fn resolve_out_dir(out_dir: Option<String>) -> Result<PathBuf> {
    match out_dir {
	Some(out_dir) => Ok(PathBuf::from(out_dir)),
	None => env::current_dir().context("Failed to get current directory"),
    }
}

fn run_statistics(
    counts_path : String,
    out_dir : Option<String>
) -> Result<()> {
    let out_path = resolve_out_dir(out_dir)?;
    ensure_writable_dir(&out_path, "mean_densities.pq")?;

    let r = File::open(&counts_path)
	.with_context(|| format!("Failed to open '{}'", counts_path))?;
    let counts_df = ParquetReader::new(r).finish()?;

    log::info!("Mean densities");
    let mut densities = dataframe_operations::calculate_mean_densities(&counts_df)?;
    let of = File::create(out_path.join("mean_densities.pq"))?;
    ParquetWriter::new(of).finish(&mut densities)?;

    log::info!("Gene totals");
    let mut totals = dataframe_operations::calculate_gene_totals(&counts_df)?;
    let of = File::create(out_path.join("gene_totals.pq"))?;
    ParquetWriter::new(of).finish(&mut totals)?;

    log::info!("Codon enrichments");
    let mut enrichments = dataframe_operations::calculate_codon_enrichments(&counts_df)?;
    let of = File::create(out_path.join("codon_enrichments.pq"))?;
    ParquetWriter::new(of).finish(&mut enrichments)?;

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_simulation(
    cds_path : String,
    counts_path : String,
    rates_path : String,
    te_path : Option<String>,
    config : ExperimentConfig,
    seed : Option<u64>,
    num_threads : usize,
    out_dir : Option<String>
) -> Result<()> {
    let rates = util::read_rate_table(&rates_path)?;

    let sequences = util::read_cds_fasta(&cds_path)?;
    let counts = util::read_counts_tsv(&counts_path)?;
    let genes = util::build_genes(sequences, counts)?;

    let tes: Option<HashMap<String, f64>> = match te_path {
	Some(path) => Some(util::read_te_tsv(&path)?),
	None => None,
    };

    let out_path = resolve_out_dir(out_dir)?;
    ensure_writable_dir(&out_path, "simulated_codon_counts.pq")?;

    let seed = seed.unwrap_or_else(|| rand::rng().random());
    log::info!(
	"Simulating {} genes ({:?}, perturbation: {}) with seed {}",
	genes.len(),
	config.method,
	config.perturbation.as_ref().map(|p| p.name()).unwrap_or("none"),
	seed
    );

    /* This channel is used to transfer information in & out of the
       threadpool. */
    let (tx_gene, rx_gene) = channel();

    let pool = ThreadPool::new(num_threads);

    let rates = Arc::new(rates);
    let config = Arc::new(config);
    let num_genes = genes.len();

    for (index, gene) in genes.into_iter().enumerate() {
	let te = match &tes {
	    None => 1.0,
	    Some(tes) => match tes.get(&gene.name) {
		Some(&te) => te,
		None => {
		    log::warn!("no TE for {}; using 1", gene.name);
		    1.0
		}
	    },
	};

	let tx_gene = tx_gene.clone();
	let rates = Arc::clone(&rates);
	let config = Arc::clone(&config);

	pool.execute(move || {
	    // Every gene gets its own stream, so results don't depend on
	    // which thread picks it up.
	    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
	    let counts = experiment::run_gene(&gene, te, &rates, &config, &mut rng);

	    let return_message = GeneMessage {
		gene: gene.name,
		counts,
	    };

	    tx_gene
		.send(return_message)
		.expect("Message channel should be open");
	});
    }

    drop(tx_gene);

    /* Process each message: a finished gene */
    let mut terminal = term::stdout();
    let mut results: Vec<SimulatedCounts> = Vec::with_capacity(num_genes);
    let mut failed: Vec<String> = Vec::new();

    for (done, message) in rx_gene.iter().enumerate() {
	match message.counts {
	    Ok(counts) => results.push(counts),
	    Err(e) => {
		log::error!("{} failed: {}", message.gene, e);
		failed.push(message.gene);
	    }
	}

	if let Some(terminal) = terminal.as_mut() {
	    terminal.carriage_return().context("Failed carriage return")?;
	    terminal.delete_line().context("Failed delete line")?;
	    write!(terminal, "{} / {} genes", done + 1, num_genes)?;
	    terminal.flush().context("Failed to flush stdout")?;
	}
    }

    if let Some(terminal) = terminal.as_mut() {
	writeln!(terminal)?;
    }

    results.sort_by(|a, b| a.gene.cmp(&b.gene));
    write_simulated_counts(&out_path, &results)?;
    write_message_summary(&out_path, &results)?;

    if !failed.is_empty() {
	failed.sort();
	bail!(
	    "{} of {} genes failed: {}",
	    failed.len(),
	    num_genes,
	    failed.join(", ")
	);
    }

    Ok(())
}

/* Parquet file creation for simulated counts: one row per gene & codon. */
fn write_simulated_counts(
    out_path: &Path,
    results: &[SimulatedCounts]
) -> Result<()> {
    let num_columns = 4;
    let mut schema_vec: Vec<Field> = Vec::with_capacity(num_columns);
    schema_vec.push(Field::new("gene", DataType::Utf8, false));
    schema_vec.push(Field::new("pos", DataType::UInt32, false));
    schema_vec.push(Field::new("codon", DataType::Utf8, false));
    schema_vec.push(Field::new("count", DataType::UInt64, false));

    let schema = Schema::from(schema_vec);

    let options = WriteOptions {
	write_statistics: true,
	compression: CompressionOptions::Snappy,
	version: Version::V2,
	data_pagesize_limit: None,
    };

    let out_file = BufWriter::new(File::create(
	out_path.join("simulated_codon_counts.pq"),
    )?);

    let mut writer = FileWriter::try_new(out_file, schema.clone(), options)?;

    let encodings_vec = vec![
	vec![Encoding::Plain], // gene
	vec![Encoding::Plain], // pos
	vec![Encoding::Plain], // codon
	vec![Encoding::Plain], // count
    ];

    for result in results {
	let length = result.counts.len();

	let mut arrays: Vec<Arc<dyn Array>> = Vec::with_capacity(num_columns);
	arrays.push(
	    Utf8Array::<i32>::from_iter_values(
		std::iter::repeat(result.gene.as_str()).take(length)
	    ).arced()
	);
	arrays.push(
	    PrimitiveArray::from_vec((0..length as u32).collect::<Vec<u32>>()).arced()
	);
	arrays.push(
	    Utf8Array::<i32>::from_iter_values(
		result.codons.iter().map(|codon| codon.to_string())
	    ).arced()
	);
	arrays.push(PrimitiveArray::from_vec(result.counts.clone()).arced());

	let chunk = Chunk::try_new(arrays)?;

	let row_groups = RowGroupIterator::try_new(
	    vec![Ok(chunk)].into_iter(),
	    &schema,
	    options,
	    encodings_vec.clone(),
	)?;

	for group in row_groups {
	    writer.write(group?)?;
	}
    }

    // Close the parquet file
    let _ = writer.end(None)?;

    Ok(())
}

/* How many messages each gene took to reach its target. */
fn write_message_summary(
    out_path: &Path,
    results: &[SimulatedCounts]
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
	.delimiter(b'\t')
	.from_path(out_path.join("messages.tsv"))?;

    writer.write_record(["gene", "target", "simulated", "messages"])?;
    for result in results {
	writer.write_record([
	    result.gene.clone(),
	    result.target.to_string(),
	    result.total().to_string(),
	    result.num_messages.to_string(),
	])?;
    }
    writer.flush()?;

    Ok(())
}
