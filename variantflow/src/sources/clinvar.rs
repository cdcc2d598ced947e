//! ClinVar: full XML release filtered down to BRCA submissions.

use super::{method_dir, publish, staged};
use crate::errors::PipelineValidationError;
use crate::pipeline::descriptor::{CommandTemplate, FetchSpec, StageDescriptor};
use crate::pipeline::GraphBuilder;

/// Full ClinVar XML release.
pub const CLINVAR_URL: &str =
    "https://ftp.ncbi.nlm.nih.gov/pub/clinvar/xml/ClinVarFullRelease_00-latest.xml.gz";

/// Stage producing the BRCA-only XML; ENIGMA reads it too.
pub const BRCA_XML_STAGE: &str = "clinvar_filter_brca";

/// Copy stages of this source.
pub const FINAL_STAGES: &[&str] = &["clinvar_copy"];

/// Declares the ClinVar stages.
pub fn declare(builder: &mut GraphBuilder) -> Result<(), PipelineValidationError> {
    builder.declare(
        StageDescriptor::download("clinvar_download", vec![FetchSpec::new(CLINVAR_URL)])
            .with_output(staged("ClinVar", "ClinVarFullRelease_00-latest.xml.gz"))
            .describe("Download the full ClinVar XML release"),
    )?;

    builder.declare(
        StageDescriptor::run(
            BRCA_XML_STAGE,
            vec![CommandTemplate::python("filter_clinvar_brca.py")
                .args(["{input}", "{output}"])
                .cwd(method_dir("clinvar"))],
        )
        .requires("clinvar_download")
        .with_output(staged("ClinVar", "ClinVarBrca.xml"))
        .describe("Keep only BRCA1/BRCA2 records"),
    )?;

    builder.declare(
        StageDescriptor::run(
            "clinvar_parse",
            vec![CommandTemplate::python("clinVarParse.py")
                .args(["{input}", "--assembly", "GRCh38"])
                .cwd(method_dir("clinvar"))
                .stdout_to("{output}")],
        )
        .requires(BRCA_XML_STAGE)
        .with_output(staged("ClinVar", "ClinVarBrca.txt"))
        .describe("Flatten the BRCA XML into a table"),
    )?;

    builder.declare(
        StageDescriptor::run(
            "clinvar_to_vcf",
            vec![CommandTemplate::python("convert_tsv_to_vcf.py")
                .args(["-i", "{input}", "-o", "{output}", "-s", "ClinVar"])
                .cwd(method_dir("data_merging"))],
        )
        .requires("clinvar_parse")
        .with_output(staged("ClinVar", "ClinVarBrca.vcf")),
    )?;

    builder.declare(publish("clinvar_copy", "clinvar_to_vcf", "ClinVarBrca.vcf"))
}
