//! The standard stage table: every source, the release chain and `run_all`.

use crate::errors::PipelineValidationError;
use crate::pipeline::{GraphBuilder, StageCatalog, StageDescriptor};
use crate::{release, sources};

/// Default root stage.
pub const RUN_ALL: &str = "run_all";

/// Builds the full pipeline.
///
/// `run_all` requires the release archive and every per-source copy stage,
/// so a run can publish source files even when the release chain fails.
pub fn standard_catalog() -> Result<StageCatalog, PipelineValidationError> {
    let mut builder = GraphBuilder::new("variantflow");
    sources::declare_all(&mut builder)?;

    let finals = sources::final_stages();
    release::stages::declare(&mut builder, &finals)?;

    let mut run_all = StageDescriptor::wrapper(RUN_ALL)
        .describe("Build the release and publish every source")
        .requires(release::ARCHIVE_STAGE);
    for stage in finals {
        run_all = run_all.requires(stage);
    }
    builder.declare(run_all)?;

    builder.build()
}
