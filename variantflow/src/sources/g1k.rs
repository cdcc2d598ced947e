//! 1000 Genomes phase 3, GRCh37.

use super::{concat, liftover, publish, sort, staged, BRCA1_HG19_REGION, BRCA2_HG19_REGION};
use crate::errors::PipelineValidationError;
use crate::pipeline::descriptor::{CommandTemplate, FetchSpec, OutputSpec, StageDescriptor};
use crate::pipeline::GraphBuilder;

const RELEASE_BASE: &str = "https://ftp.1000genomes.ebi.ac.uk/vol1/ftp/release/20130502";

/// Copy stages of this source.
pub const FINAL_STAGES: &[&str] = &["g1k_copy"];

fn genotypes(chr: &str) -> String {
    format!("ALL.{chr}.phase3_shapeit2_mvncall_integrated_v5a.20130502.genotypes.vcf.gz")
}

/// `tabix -h` of one region, written to the single output.
pub(crate) fn tabix(name: &str, upstream: &str, input: &str, region: &str, output: String) -> StageDescriptor {
    StageDescriptor::run(
        name,
        vec![CommandTemplate::new("tabix")
            .args(["-h", input, region])
            .stdout_to("{output}")],
    )
    .requires(upstream)
    .with_output(output)
    .describe(format!("Extract region {region}"))
}

/// Declares the 1000 Genomes stages.
pub fn declare(builder: &mut GraphBuilder) -> Result<(), PipelineValidationError> {
    let mut fetches = Vec::new();
    let mut outputs = Vec::new();
    for chr in ["chr13", "chr17"] {
        let file = genotypes(chr);
        let index = format!("{file}.tbi");
        fetches.push(FetchSpec::new(format!("{RELEASE_BASE}/{file}")).into_output(chr));
        fetches.push(FetchSpec::new(format!("{RELEASE_BASE}/{index}")).into_output(format!("{chr}_index")));
        outputs.push((chr.to_string(), staged("G1K", &file)));
        outputs.push((format!("{chr}_index"), staged("G1K", &index)));
    }
    builder.declare(
        StageDescriptor::download("g1k_download", fetches)
            .with_outputs(OutputSpec::named(outputs))
            .describe("Download chr13/chr17 genotypes with their indexes"),
    )?;

    builder.declare(tabix(
        "g1k_chr13_brca2",
        "g1k_download",
        "{input.chr13}",
        BRCA2_HG19_REGION,
        staged("G1K", "chr13_brca2_1000g_GRCh37.vcf"),
    ))?;
    builder.declare(tabix(
        "g1k_chr17_brca1",
        "g1k_download",
        "{input.chr17}",
        BRCA1_HG19_REGION,
        staged("G1K", "chr17_brca1_1000g_GRCh37.vcf"),
    ))?;
    builder.declare(concat(
        "g1k_concat",
        &[("chr13", "g1k_chr13_brca2"), ("chr17", "g1k_chr17_brca1")],
        staged("G1K", "brca12_1000g_GRCh37.vcf"),
    ))?;
    builder.declare(liftover("g1k_liftover", "g1k_concat", staged("G1K", "1000G_brca.hg38.vcf")))?;
    builder.declare(sort("g1k_sort", "g1k_liftover", staged("G1K", "1000G_brca.sorted.hg38.vcf")))?;
    builder.declare(publish("g1k_copy", "g1k_sort", "1000G_brca.sorted.hg38.vcf"))
}
