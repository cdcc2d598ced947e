//! gnomAD static snapshots: v2 on hg19, v3 already on GRCh38.

use super::{method_dir, publish_named, staged};
use crate::errors::PipelineValidationError;
use crate::pipeline::descriptor::{
    CommandTemplate, Dependency, FetchSpec, OutputSpec, StageDescriptor,
};
use crate::pipeline::GraphBuilder;

/// gnomAD v2 snapshot.
pub const GNOMAD_V2_URL: &str =
    "https://brcaexchange.org/backend/downloads/gnomAD_v2_hg19_10_02_2020.tsv";
/// gnomAD v3 snapshot.
pub const GNOMAD_V3_URL: &str =
    "https://brcaexchange.org/backend/downloads/gnomAD_v3_GRCh38_03_10_2021.tsv";

/// Copy stages of this source.
pub const FINAL_STAGES: &[&str] = &["gnomad_v2_copy", "gnomad_v3_copy"];

fn to_vcf(version: &str) -> CommandTemplate {
    CommandTemplate::python("gnomad_to_vcf.py")
        .args([
            "-i".to_string(),
            format!("{{input.{version}}}"),
            "-o".to_string(),
            format!("{{output.{version}}}"),
            "-a".to_string(),
            "gnomADAnnotation".to_string(),
            "-l".to_string(),
            format!("{{artifacts_dir}}/gnomAD{version}_error_variants.log"),
            "-s".to_string(),
            "gnomAD".to_string(),
        ])
        .cwd(method_dir("gnomad"))
}

/// Declares the gnomAD stages.
pub fn declare(builder: &mut GraphBuilder) -> Result<(), PipelineValidationError> {
    builder.declare(
        StageDescriptor::download(
            "gnomad_download",
            vec![
                FetchSpec::new(GNOMAD_V2_URL).into_output("v2"),
                FetchSpec::new(GNOMAD_V3_URL).into_output("v3"),
            ],
        )
        .with_outputs(OutputSpec::named([
            ("v2", staged("gnomAD", "gnomAD_v2_hg19_10_02_2020.tsv")),
            ("v3", staged("gnomAD", "gnomAD_v3_GRCh38_03_10_2021.tsv")),
        ])),
    )?;

    builder.declare(
        StageDescriptor::run("gnomad_to_vcf", vec![to_vcf("v2"), to_vcf("v3")])
            .requires("gnomad_download")
            .with_outputs(OutputSpec::named([
                ("v2", staged("gnomAD", "gnomADv2.hg19.vcf")),
                ("v3", staged("gnomAD", "gnomADv3.hg38.vcf")),
            ])),
    )?;

    builder.declare(
        StageDescriptor::run(
            "gnomad_v2_liftover",
            vec![CommandTemplate::new("CrossMap.py").args([
                "vcf",
                "{resources_dir}/hg19ToHg38.over.chain.gz",
                "{input.v2}",
                "{resources_dir}/hg38.fa",
                "{output}",
            ])],
        )
        .requires("gnomad_to_vcf")
        .with_output(staged("gnomAD", "gnomADv2.hg38.vcf")),
    )?;

    builder.declare(
        StageDescriptor::run(
            "gnomad_sort",
            vec![
                CommandTemplate::new("vcf-sort")
                    .arg("{input.lifted}")
                    .stdout_to("{output.v2}"),
                CommandTemplate::new("vcf-sort")
                    .arg("{input.converted.v3}")
                    .stdout_to("{output.v3}"),
            ],
        )
        .requires_dep(Dependency::named("lifted", "gnomad_v2_liftover"))
        .requires_dep(Dependency::named("converted", "gnomad_to_vcf"))
        .with_outputs(OutputSpec::named([
            ("v2", staged("gnomAD", "gnomADv2.sorted.hg38.vcf")),
            ("v3", staged("gnomAD", "gnomADv3.sorted.hg38.vcf")),
        ])),
    )?;

    builder.declare(publish_named("gnomad_v2_copy", "gnomad_sort", "v2", "gnomADv2.sorted.hg38.vcf"))?;
    builder.declare(publish_named("gnomad_v3_copy", "gnomad_sort", "v3", "gnomADv3.sorted.hg38.vcf"))
}
