//! Shared LOVD export.
//!
//! The export can be staged by hand: setting the `lovd_data_file` extra
//! replaces the download Target, and an existing file there makes the
//! download stage complete.

use super::exlovd::lovd_to_vcf;
use super::{liftover, method_dir, publish, sort, staged};
use crate::errors::PipelineValidationError;
use crate::pipeline::descriptor::{
    CommandTemplate, FetchSpec, OutputSpec, PathTemplate, StageDescriptor,
};
use crate::pipeline::GraphBuilder;

/// Shared LOVD BRCA export.
pub const SHARED_LOVD_URL: &str = "https://databases.lovd.nl/shared/export/BRCA";

/// Extra value that replaces the download Target.
pub const DATA_FILE_PARAM: &str = "lovd_data_file";

/// Copy stages of this source.
pub const FINAL_STAGES: &[&str] = &["shared_lovd_copy"];

fn lovd_script(name: &str, script: &str, upstream: &str, output: &str) -> StageDescriptor {
    StageDescriptor::run(
        name,
        vec![CommandTemplate::python(script)
            .args(["-i", "{input}", "-o", "{output}"])
            .cwd(method_dir("lovd"))],
    )
    .requires(upstream)
    .with_output(staged("LOVD", output))
}

/// Declares the shared LOVD stages.
pub fn declare(builder: &mut GraphBuilder) -> Result<(), PipelineValidationError> {
    builder.declare(
        StageDescriptor::download("shared_lovd_download", vec![FetchSpec::new(SHARED_LOVD_URL)])
            .with_outputs(OutputSpec::Single(
                PathTemplate::new(staged("LOVD", "BRCA.txt")).overridable_by(DATA_FILE_PARAM),
            ))
            .describe("Download the shared LOVD export"),
    )?;

    builder.declare(lovd_script(
        "shared_lovd_normalize",
        "normalizeLOVDSubmissions.py",
        "shared_lovd_download",
        "LOVD_normalized.tsv",
    ))?;
    builder.declare(lovd_script(
        "shared_lovd_combine",
        "combineEquivalentVariantSubmissions.py",
        "shared_lovd_normalize",
        "LOVD_normalized_combined.tsv",
    ))?;

    builder.declare(
        StageDescriptor::run(
            "shared_lovd_vcf",
            vec![lovd_to_vcf(
                CommandTemplate::python("lovd2vcf.py"),
                "{input}",
                "sharedLOVDAnnotation",
                "LOVD_error_variants.txt",
                "LOVD",
            )],
        )
        .requires("shared_lovd_combine")
        .with_output(staged("LOVD", "sharedLOVD_brca12.hg19.vcf")),
    )?;

    builder.declare(liftover(
        "shared_lovd_liftover",
        "shared_lovd_vcf",
        staged("LOVD", "sharedLOVD_brca12.hg38.vcf"),
    ))?;
    builder.declare(sort(
        "shared_lovd_sort",
        "shared_lovd_liftover",
        staged("LOVD", "sharedLOVD_brca12.sorted.hg38.vcf"),
    ))?;
    builder.declare(publish(
        "shared_lovd_copy",
        "shared_lovd_sort",
        "sharedLOVD_brca12.sorted.hg38.vcf",
    ))
}
