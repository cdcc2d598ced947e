//! Extracted LOVD instance hosted at Huntsman.

use super::{concat, liftover, method_dir, publish, sort, staged};
use crate::errors::PipelineValidationError;
use crate::pipeline::descriptor::{CommandTemplate, OutputSpec, StageDescriptor};
use crate::pipeline::GraphBuilder;

/// exLOVD host scraped by the extractor.
pub const EXLOVD_HOST: &str = "http://hci-exlovd.hci.utah.edu/";

/// Copy stages of this source.
pub const FINAL_STAGES: &[&str] = &["exlovd_copy"];

/// LOVD export to hg19 VCF. Unconvertible variants go to `error_file` under the artifacts dir.
pub(crate) fn lovd_to_vcf(
    program: CommandTemplate,
    input: &str,
    annotation: &str,
    error_file: &str,
    source: &str,
) -> CommandTemplate {
    program
        .args([
            "-i".to_string(),
            input.to_string(),
            "-o".to_string(),
            "{output}".to_string(),
            "-a".to_string(),
            annotation.to_string(),
            "-r".to_string(),
            "{resources_dir}/refseq_annotation.hg19.gp".to_string(),
            "-g".to_string(),
            "{resources_dir}/hg19.fa".to_string(),
            "-e".to_string(),
            format!("{{artifacts_dir}}/{error_file}"),
            "-s".to_string(),
            source.to_string(),
        ])
        .cwd(method_dir("lovd"))
}

fn gene_to_vcf(name: &str, gene: &str) -> StageDescriptor {
    let upper = gene.to_uppercase();
    StageDescriptor::run(
        name,
        vec![lovd_to_vcf(
            CommandTemplate::new("./lovd2vcf.py"),
            &format!("{{input.{gene}}}"),
            "exLOVDAnnotation",
            &format!("exLOVD_{upper}_error_variants.txt"),
            "exLOVD",
        )],
    )
    .requires("exlovd_extract")
    .with_output(staged("exLOVD", &format!("exLOVD_{gene}.hg19.vcf")))
}

/// Declares the exLOVD stages.
pub fn declare(builder: &mut GraphBuilder) -> Result<(), PipelineValidationError> {
    builder.declare(
        StageDescriptor::run(
            "exlovd_extract",
            vec![CommandTemplate::new("extract_data.py")
                .args(["-u", EXLOVD_HOST, "-l", "BRCA1", "BRCA2", "-o", "{file_parent_dir}/exLOVD"])
                .cwd(method_dir("lovd"))],
        )
        .with_outputs(OutputSpec::named([
            ("brca1", staged("exLOVD", "BRCA1.txt")),
            ("brca2", staged("exLOVD", "BRCA2.txt")),
        ]))
        .describe("Scrape BRCA1/BRCA2 submissions"),
    )?;

    builder.declare(gene_to_vcf("exlovd_brca1_vcf", "brca1"))?;
    builder.declare(gene_to_vcf("exlovd_brca2_vcf", "brca2"))?;
    builder.declare(concat(
        "exlovd_concat",
        &[("brca1", "exlovd_brca1_vcf"), ("brca2", "exlovd_brca2_vcf")],
        staged("exLOVD", "exLOVD_brca12.hg19.vcf"),
    ))?;
    builder.declare(liftover(
        "exlovd_liftover",
        "exlovd_concat",
        staged("exLOVD", "exLOVD_brca12.hg38.vcf"),
    ))?;
    builder.declare(sort(
        "exlovd_sort",
        "exlovd_liftover",
        staged("exLOVD", "exLOVD_brca12.sorted.hg38.vcf"),
    ))?;
    builder.declare(publish("exlovd_copy", "exlovd_sort", "exLOVD_brca12.sorted.hg38.vcf"))
}
