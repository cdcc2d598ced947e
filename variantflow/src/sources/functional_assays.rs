//! Curated functional assay results.

use super::{liftover, method_dir, publish, sort, staged};
use crate::errors::PipelineValidationError;
use crate::pipeline::descriptor::{
    CommandTemplate, FetchSpec, OutputSpec, PathTemplate, StageDescriptor,
};
use crate::pipeline::GraphBuilder;

/// Functional assays table.
pub const FUNCTIONAL_ASSAYS_URL: &str =
    "https://brcaexchange.org/backend/downloads/functional_assays.tsv";

/// Extra value that replaces the download Target.
pub const DATA_FILE_PARAM: &str = "functional_assays_file";

/// Copy stages of this source.
pub const FINAL_STAGES: &[&str] = &["functional_assays_copy"];

fn assay_script(name: &str, script: &str, upstream: &str, output: &str) -> StageDescriptor {
    StageDescriptor::run(
        name,
        vec![CommandTemplate::python(script)
            .args(["-i", "{input}", "-o", "{output}"])
            .cwd(method_dir("functional_assays"))],
    )
    .requires(upstream)
    .with_output(staged("functional_assays", output))
}

/// Declares the functional assay stages.
pub fn declare(builder: &mut GraphBuilder) -> Result<(), PipelineValidationError> {
    builder.declare(
        StageDescriptor::download(
            "functional_assays_download",
            vec![FetchSpec::new(FUNCTIONAL_ASSAYS_URL)],
        )
        .with_outputs(OutputSpec::Single(
            PathTemplate::new(staged("functional_assays", "functional_assays.tsv"))
                .overridable_by(DATA_FILE_PARAM),
        )),
    )?;

    builder.declare(assay_script(
        "functional_assays_parse",
        "parse_functional_assay_data.py",
        "functional_assays_download",
        "functional_assays_clean.tsv",
    ))?;
    builder.declare(assay_script(
        "functional_assays_vcf",
        "functional_assays_to_vcf.py",
        "functional_assays_parse",
        "functional_assays.hg19.vcf",
    ))?;
    builder.declare(liftover(
        "functional_assays_liftover",
        "functional_assays_vcf",
        staged("functional_assays", "functional_assays.hg38.vcf"),
    ))?;
    builder.declare(sort(
        "functional_assays_sort",
        "functional_assays_liftover",
        staged("functional_assays", "functional_assays.sorted.hg38.vcf"),
    ))?;
    builder.declare(publish(
        "functional_assays_copy",
        "functional_assays_sort",
        "functional_assays.sorted.hg38.vcf",
    ))
}
