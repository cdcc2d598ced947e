//! Exome Sequencing Project, already lifted over to GRCh38.

use super::{concat, method_dir, publish, sort, staged};
use crate::core::StageKind;
use crate::errors::PipelineValidationError;
use crate::pipeline::descriptor::{
    CommandTemplate, FetchSpec, OutputSpec, StageAction, StageDescriptor,
};
use crate::pipeline::GraphBuilder;

/// ESP bulk VCF archive.
pub const ESP_URL: &str = "http://evs.gs.washington.edu/evs_bulk_data/ESP6500SI-V2-SSA137.GRCh38-liftover.snps_indels.vcf.tar.gz";

/// BRCA1 on hg38.
pub const BRCA1_HG38: (&str, &str) = ("43044295", "43125483");
/// BRCA2 on hg38.
pub const BRCA2_HG38: (&str, &str) = ("32315473", "32400266");

/// Copy stages of this source.
pub const FINAL_STAGES: &[&str] = &["esp_copy"];

fn chromosome_file(chr: &str) -> String {
    staged(
        "ESP",
        &format!("ESP6500SI-V2-SSA137.GRCh38-liftover.{chr}.snps_indels.vcf"),
    )
}

fn extract_region(name: &str, chr: &str, (start, end): (&str, &str), output: &str) -> StageDescriptor {
    let input = format!("{{input.{chr}}}");
    StageDescriptor::run(
        name,
        vec![CommandTemplate::python("espExtract.py")
            .args([
                input.as_str(),
                "--start",
                start,
                "--end",
                end,
                "--full",
                "1",
                "-o",
                "{output}",
            ])
            .cwd(method_dir("esp"))],
    )
    .requires("esp_extract")
    .with_output(staged("ESP", output))
}

/// Declares the ESP stages.
pub fn declare(builder: &mut GraphBuilder) -> Result<(), PipelineValidationError> {
    builder.declare(
        StageDescriptor::download("esp_download", vec![FetchSpec::new(ESP_URL)]).with_output(
            staged("ESP", "ESP6500SI-V2-SSA137.GRCh38-liftover.snps_indels.vcf.tar.gz"),
        ),
    )?;

    builder.declare(
        StageDescriptor::new(
            "esp_extract",
            StageKind::Transform,
            StageAction::ExtractArchive {
                archive: "{input}".to_string(),
                into: "{file_parent_dir}/ESP".to_string(),
            },
        )
        .requires("esp_download")
        .with_outputs(OutputSpec::named([
            ("chr13", chromosome_file("chr13")),
            ("chr17", chromosome_file("chr17")),
        ]))
        .describe("Unpack per-chromosome VCFs"),
    )?;

    builder.declare(extract_region("esp_brca1", "chr17", BRCA1_HG38, "esp.brca1.vcf"))?;
    builder.declare(extract_region("esp_brca2", "chr13", BRCA2_HG38, "esp.brca2.vcf"))?;
    builder.declare(concat(
        "esp_concat",
        &[("brca1", "esp_brca1"), ("brca2", "esp_brca2")],
        staged("ESP", "esp.brca12.hg38.vcf"),
    ))?;
    builder.declare(sort("esp_sort", "esp_concat", staged("ESP", "esp.brca12.sorted.hg38.vcf")))?;
    builder.declare(publish("esp_copy", "esp_sort", "esp.brca12.sorted.hg38.vcf"))
}
