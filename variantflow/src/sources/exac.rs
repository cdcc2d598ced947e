//! ExAC non-TCGA subset.

use super::g1k::tabix;
use super::{concat, liftover, publish, sort, staged, BRCA1_HG19_REGION, BRCA2_HG19_REGION};
use crate::errors::PipelineValidationError;
use crate::pipeline::descriptor::{FetchSpec, OutputSpec, StageDescriptor};
use crate::pipeline::GraphBuilder;

/// ExAC sites VCF.
pub const EXAC_URL: &str =
    "https://ftp.broadinstitute.org/pub/ExAC_release/current/subsets/ExAC_nonTCGA.r0.3.1.sites.vep.vcf.gz";

/// Copy stages of this source.
pub const FINAL_STAGES: &[&str] = &["exac_copy"];

/// Declares the ExAC stages.
pub fn declare(builder: &mut GraphBuilder) -> Result<(), PipelineValidationError> {
    builder.declare(
        StageDescriptor::download(
            "exac_download",
            vec![
                FetchSpec::new(EXAC_URL).into_output("vcf"),
                FetchSpec::new(format!("{EXAC_URL}.tbi")).into_output("index"),
            ],
        )
        .with_outputs(OutputSpec::named([
            ("vcf", staged("exac", "ExAC_nonTCGA.r0.3.1.sites.vep.vcf.gz")),
            ("index", staged("exac", "ExAC_nonTCGA.r0.3.1.sites.vep.vcf.gz.tbi")),
        ])),
    )?;

    builder.declare(tabix(
        "exac_brca1",
        "exac_download",
        "{input.vcf}",
        BRCA1_HG19_REGION,
        staged("exac", "exac.brca1.hg19.vcf"),
    ))?;
    builder.declare(tabix(
        "exac_brca2",
        "exac_download",
        "{input.vcf}",
        BRCA2_HG19_REGION,
        staged("exac", "exac.brca2.hg19.vcf"),
    ))?;
    builder.declare(concat(
        "exac_concat",
        &[("brca1", "exac_brca1"), ("brca2", "exac_brca2")],
        staged("exac", "exac.brca12.hg19.vcf"),
    ))?;
    builder.declare(liftover("exac_liftover", "exac_concat", staged("exac", "exac.brca12.hg38.vcf")))?;
    builder.declare(sort(
        "exac_sort",
        "exac_liftover",
        staged("exac", "exac.brca12.sorted.hg38.vcf"),
    ))?;
    builder.declare(publish("exac_copy", "exac_sort", "exac.brca12.sorted.hg38.vcf"))
}
