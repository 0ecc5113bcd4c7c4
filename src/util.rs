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

/* util.rs: readers for the simulation inputs. Each reader comes in a
path-taking flavour and a generic one over `Read`, which the tests use. */

use anyhow::{Context, Result, bail};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use csv::ReaderBuilder;
use bio::io::fasta::Reader;

use crate::codons::{Codon, codons_from_nucleotides};
use crate::experiment::Gene;
use crate::rates::RateTable;

fn tsv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
	.delimiter(b'\t')
	.comment(Some(b'#'))
	.has_headers(false)
	.flexible(true)
	.from_reader(reader)
}

fn open<P: AsRef<Path>>(path: P) -> Result<BufReader<File>> {
    let path = path.as_ref();
    let file = File::open(path)
	.with_context(|| format!("Failed to open '{}'", path.display()))?;
    Ok(BufReader::new(file))
}

/// Coding sequences keyed by FASTA record id, in file order. Each sequence
/// should run from the start codon through the stop codon.
pub fn parse_cds_fasta<R: Read>(reader: R) -> Result<Vec<(String, Vec<Codon>)>> {
    let fasta_reader = Reader::new(BufReader::new(reader));
    let mut genes = Vec::new();

    for record in fasta_reader.records() {
	let record = record.context("Error while reading a FASTA record")?;
	let codons = codons_from_nucleotides(record.seq())
	    .with_context(|| format!("Bad coding sequence for {}", record.id()))?;

	if !codons.last().map(|c| c.is_stop()).unwrap_or(false) {
	    log::warn!("{} does not end with a stop codon", record.id());
	}
	genes.push((record.id().to_string(), codons));
    }

    if genes.is_empty() {
	bail!("FASTA file contained no records");
    }
    Ok(genes)
}

pub fn read_cds_fasta<P: AsRef<Path>>(path: P) -> Result<Vec<(String, Vec<Codon>)>> {
    parse_cds_fasta(open(path)?)
}

/* Real counts: gene, 0-based codon position (start codon = 0), count. One
triple per line; positions not listed count as zero. */
pub fn parse_counts_tsv<R: Read>(reader: R) -> Result<HashMap<String, Vec<(usize, f64)>>> {
    let mut counts: HashMap<String, Vec<(usize, f64)>> = HashMap::new();

    for (line, result) in tsv_reader(reader).records().enumerate() {
	let record = result?;
	if record.len() != 3 {
	    bail!("expected 3 fields on counts line {}, found {}", line + 1, record.len());
	}
	let position: usize = record[1].trim().parse()
	    .with_context(|| format!("invalid position on counts line {}", line + 1))?;
	let count: f64 = record[2].trim().parse()
	    .with_context(|| format!("invalid count on counts line {}", line + 1))?;

	counts
	    .entry(record[0].trim().to_string())
	    .or_default()
	    .push((position, count));
    }

    Ok(counts)
}

pub fn read_counts_tsv<P: AsRef<Path>>(path: P) -> Result<HashMap<String, Vec<(usize, f64)>>> {
    parse_counts_tsv(open(path)?)
}

/* Mean dwell time per codon: codon, mean. Stop codons may be left out. */
pub fn parse_rate_table<R: Read>(reader: R) -> Result<RateTable> {
    let mut entries = Vec::new();
    for (line, result) in tsv_reader(reader).records().enumerate() {
	let record = result?;
	if record.len() != 2 {
	    bail!("expected 2 fields on rates line {}, found {}", line + 1, record.len());
	}
	let codon: Codon = record[0].parse()
	    .with_context(|| format!("invalid codon on rates line {}", line + 1))?;
	let mean: f64 = record[1].trim().parse()
	    .with_context(|| format!("invalid mean on rates line {}", line + 1))?;
	entries.push((codon, mean));
    }

    Ok(RateTable::from_non_stop_means(entries)?)
}

pub fn read_rate_table<P: AsRef<Path>>(path: P) -> Result<RateTable> {
    let path = path.as_ref();
    parse_rate_table(open(path)?)
	.with_context(|| format!("Failed to load rate table '{}'", path.display()))
}

/* Translational efficiency per gene: gene, TE. */
pub fn parse_te_tsv<R: Read>(reader: R) -> Result<HashMap<String, f64>> {
    let mut tes = HashMap::new();
    for (line, result) in tsv_reader(reader).records().enumerate() {
	let record = result?;
	if record.len() != 2 {
	    bail!("expected 2 fields on TE line {}, found {}", line + 1, record.len());
	}
	let te: f64 = record[1].trim().parse()
	    .with_context(|| format!("invalid TE on line {}", line + 1))?;
	tes.insert(record[0].trim().to_string(), te);
    }
    Ok(tes)
}

pub fn read_te_tsv<P: AsRef<Path>>(path: P) -> Result<HashMap<String, f64>> {
    parse_te_tsv(open(path)?)
}

/// Pair each coding sequence with its real counts. Genes without counts get
/// all zeros; counts for genes missing from the FASTA are dropped with a
/// warning. Returned sorted by gene name.
pub fn build_genes(
    sequences: Vec<(String, Vec<Codon>)>,
    mut counts: HashMap<String, Vec<(usize, f64)>>,
) -> Result<Vec<Gene>> {
    let mut genes: BTreeMap<String, Gene> = BTreeMap::new();

    for (name, codons) in sequences {
	if genes.contains_key(&name) {
	    bail!("gene {} appears twice in the coding sequences", name);
	}

	let mut real_counts = vec![0.0; codons.len()];
	for (position, count) in counts.remove(&name).unwrap_or_default() {
	    if position >= codons.len() {
		bail!(
		    "count at position {} lies outside {} ({} codons)",
		    position, name, codons.len()
		);
	    }
	    real_counts[position] += count;
	}

	let gene = Gene::new(name.clone(), codons, real_counts)?;
	genes.insert(name, gene);
    }

    for name in counts.keys() {
	log::warn!("counts given for {} but it has no coding sequence", name);
    }

    Ok(genes.into_values().collect())
}
