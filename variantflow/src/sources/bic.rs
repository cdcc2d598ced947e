//! Breast Cancer Information Core. Downloads need member credentials.

use super::{concat, liftover, method_dir, publish, sort, staged};
use crate::errors::PipelineValidationError;
use crate::pipeline::descriptor::{CommandTemplate, FetchSpec, OutputSpec, StageDescriptor};
use crate::pipeline::GraphBuilder;

const QUERY_BASE: &str =
    "https://research.nhgri.nih.gov/projects/bic/Member/cgi-bin/bic_query_result.cgi";

/// Copy stages of this source.
pub const FINAL_STAGES: &[&str] = &["bic_copy"];

fn query_url(gene: &str) -> String {
    format!("{QUERY_BASE}/{gene}_data.txt?table={gene}_exons&download=1&submit=Download")
}

fn to_vcf(name: &str, gene: &str, brca: &str) -> StageDescriptor {
    StageDescriptor::run(
        name,
        vec![CommandTemplate::new("./bic2vcf")
            .args([
                "-i".to_string(),
                format!("{{input.{gene}}}"),
                "-o".to_string(),
                "{output}".to_string(),
                "-b".to_string(),
                brca.to_string(),
                "-g".to_string(),
                "{resources_dir}/hg19.fa".to_string(),
                "-r".to_string(),
                "{resources_dir}/refseq_annotation.hg19.gp".to_string(),
                "-a".to_string(),
                "{methods_dir}/bic/bicAnnotation".to_string(),
            ])
            .cwd(method_dir("bic"))],
    )
    .requires("bic_download")
    .with_output(staged("BIC", &format!("bic_{gene}.hg19.vcf")))
}

/// Declares the BIC stages.
pub fn declare(builder: &mut GraphBuilder) -> Result<(), PipelineValidationError> {
    builder.declare(
        StageDescriptor::download(
            "bic_download",
            vec![
                FetchSpec::new(query_url("brca1")).into_output("brca1").authenticated(),
                FetchSpec::new(query_url("brca2")).into_output("brca2").authenticated(),
            ],
        )
        .with_outputs(OutputSpec::named([
            ("brca1", staged("BIC", "brca1_data.txt")),
            ("brca2", staged("BIC", "brca2_data.txt")),
        ]))
        .describe("Download BIC exon tables"),
    )?;

    builder.declare(to_vcf("bic_brca1_vcf", "brca1", "1"))?;
    builder.declare(to_vcf("bic_brca2_vcf", "brca2", "2"))?;
    builder.declare(concat(
        "bic_concat",
        &[("brca1", "bic_brca1_vcf"), ("brca2", "bic_brca2_vcf")],
        staged("BIC", "bic_brca12.hg19.vcf"),
    ))?;
    builder.declare(liftover("bic_liftover", "bic_concat", staged("BIC", "bic_brca12.hg38.vcf")))?;
    builder.declare(sort("bic_sort", "bic_liftover", staged("BIC", "bic_brca12.sorted.hg38.vcf")))?;
    builder.declare(publish("bic_copy", "bic_sort", "bic_brca12.sorted.hg38.vcf"))
}
