//! ENIGMA expert assertions, taken from the ClinVar BRCA extract.

use super::clinvar::BRCA_XML_STAGE;
use super::{method_dir, publish, staged};
use crate::errors::PipelineValidationError;
use crate::pipeline::descriptor::{CommandTemplate, StageDescriptor};
use crate::pipeline::GraphBuilder;

/// Copy stages of this source.
pub const FINAL_STAGES: &[&str] = &["enigma_copy"];

fn clinvar_script(name: &str, script: &str, upstream: &str, output: &str) -> StageDescriptor {
    StageDescriptor::run(
        name,
        vec![CommandTemplate::python(script)
            .args(["{input}", "{output}"])
            .cwd(method_dir("clinvar"))],
    )
    .requires(upstream)
    .with_output(staged("enigma", output))
}

/// Declares the ENIGMA stages. Requires the ClinVar stages.
pub fn declare(builder: &mut GraphBuilder) -> Result<(), PipelineValidationError> {
    builder.declare(
        clinvar_script("enigma_filter", "filter_enigma_data.py", BRCA_XML_STAGE, "enigma_clinvar.xml")
            .describe("Keep ENIGMA submissions"),
    )?;
    builder.declare(clinvar_script(
        "enigma_extract",
        "enigma_from_clinvar.py",
        "enigma_filter",
        "enigma_from_clinvar.tsv",
    ))?;
    builder.declare(publish("enigma_copy", "enigma_extract", "enigma_from_clinvar.tsv"))
}
