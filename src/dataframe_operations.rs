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

/* dataframe_operations.rs: summary statistics on simulated counts using
Polars dataframes. Input columns: "gene", "pos", "codon", "count". */

use polars::prelude::*;
use polars::datatypes::DataType::Float64;

/// Per-position density averaged over genes. Each gene's counts are first
/// divided by that gene's mean count; genes with no counts at all are left
/// out rather than contributing NaN.
pub fn calculate_mean_densities(
    df_counts: &DataFrame
) -> PolarsResult<DataFrame> {
    let sort_opts = SortMultipleOptions::default()
	.with_maintain_order(false)
	.with_multithreaded(true)
	.with_nulls_last(true);

    let result = df_counts
	.clone()
	.lazy()
	.with_column(col("count").cast(Float64))
	.with_column(
	    col("count")
		.mean()
		.over([col("gene")])
		.alias("gene mean")
	)
	.filter(col("gene mean").gt(lit(0.0)))
	.with_column(
	    (col("count") / col("gene mean")).alias("density")
	)
	.group_by(["pos"])
	.agg([
	    col("density").mean().alias("mean density"),
	    col("gene").count().alias("genes"),
	])
	.sort(["pos"], sort_opts)
	.collect()?;

    Ok(result)
}

/// Mean enrichment of each codon: the count at every position holding that
/// codon, divided by its gene's mean count, averaged over all such
/// positions. Genes with no counts are left out.
pub fn calculate_codon_enrichments(
    df_counts: &DataFrame
) -> PolarsResult<DataFrame> {
    let sort_opts = SortMultipleOptions::default()
	.with_maintain_order(false)
	.with_multithreaded(true)
	.with_nulls_last(true);

    let result = df_counts
	.clone()
	.lazy()
	.with_column(col("count").cast(Float64))
	.with_column(
	    col("count")
		.mean()
		.over([col("gene")])
		.alias("gene mean")
	)
	.filter(col("gene mean").gt(lit(0.0)))
	.with_column(
	    (col("count") / col("gene mean")).alias("enrichment")
	)
	.group_by(["codon"])
	.agg([
	    col("enrichment").mean().alias("mean enrichment"),
	    col("pos").count().alias("positions"),
	])
	.sort(["codon"], sort_opts)
	.collect()?;

    Ok(result)
}

/// Total count and length of each gene.
pub fn calculate_gene_totals(
    df_counts: &DataFrame
) -> PolarsResult<DataFrame> {
    let sort_opts = SortMultipleOptions::default()
	.with_maintain_order(false)
	.with_multithreaded(true)
	.with_nulls_last(true);

    let result = df_counts
	.clone()
	.lazy()
	.group_by(["gene"])
	.agg([
	    col("count").sum().alias("total"),
	    col("pos").count().alias("length"),
	])
	.sort(["gene"], sort_opts)
	.collect()?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts() -> DataFrame {
	df!(
	    "gene" => ["a", "a", "b", "b", "c", "c"],
	    "pos" => [0u32, 1, 0, 1, 0, 1],
	    "codon" => ["AAA", "CGA", "AAA", "CGA", "CGA", "AAA"],
	    "count" => [1u64, 3, 0, 0, 2, 2]
	)
	.unwrap()
    }

    #[test]
    fn test_mean_densities() {
	let result = calculate_mean_densities(&counts()).unwrap();
	assert_eq!(result.height(), 2);

	let densities = result
	    .column("mean density")
	    .unwrap()
	    .as_materialized_series()
	    .f64()
	    .unwrap()
	    .clone();
	// a: 0.5, 1.5; c: 1.0, 1.0; b has no counts
	assert!((densities.get(0).unwrap() - 0.75).abs() < 1e-12);
	assert!((densities.get(1).unwrap() - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_gene_totals() {
	let result = calculate_gene_totals(&counts()).unwrap();
	assert_eq!(result.height(), 3);

	let totals = result
	    .column("total")
	    .unwrap()
	    .as_materialized_series()
	    .u64()
	    .unwrap()
	    .clone();
	assert_eq!(totals.get(0), Some(4));
	assert_eq!(totals.get(1), Some(0));
	assert_eq!(totals.get(2), Some(4));
    }

    #[test]
    fn test_codon_enrichments() {
	let result = calculate_codon_enrichments(&counts()).unwrap();
	assert_eq!(result.height(), 2);

	let codons = result
	    .column("codon")
	    .unwrap()
	    .as_materialized_series()
	    .str()
	    .unwrap()
	    .clone();
	assert_eq!(codons.get(0), Some("AAA"));
	assert_eq!(codons.get(1), Some("CGA"));

	let enrichments = result
	    .column("mean enrichment")
	    .unwrap()
	    .as_materialized_series()
	    .f64()
	    .unwrap()
	    .clone();
	// AAA: a pos 0 (0.5), c pos 1 (1.0); CGA: a pos 1 (1.5), c pos 0 (1.0)
	assert!((enrichments.get(0).unwrap() - 0.75).abs() < 1e-12);
	assert!((enrichments.get(1).unwrap() - 1.25).abs() < 1e-12);

	let positions = result
	    .column("positions")
	    .unwrap()
	    .as_materialized_series()
	    .u32()
	    .unwrap()
	    .clone();
	assert_eq!(positions.get(0), Some(2));
	assert_eq!(positions.get(1), Some(2));
    }
}
