//! Per-source stage tables.
//!
//! Every source fetches (or extracts) raw submissions into
//! `{file_parent_dir}/<Source>/`, converts them into an hg38 VCF or TSV and
//! ends in copy stages that publish the result into `{output_dir}`. The
//! release chain depends on those copy stages only.

pub mod bic;
pub mod clinvar;
pub mod enigma;
pub mod esp;
pub mod exac;
pub mod exlovd;
pub mod functional_assays;
pub mod g1k;
pub mod gnomad;
pub mod shared_lovd;

use crate::core::StageKind;
use crate::errors::PipelineValidationError;
use crate::pipeline::descriptor::{CommandTemplate, Dependency, StageAction, StageDescriptor};
use crate::pipeline::GraphBuilder;

/// BRCA1 on hg19.
pub const BRCA1_HG19_REGION: &str = "17:41196312-41277500";
/// BRCA2 on hg19.
pub const BRCA2_HG19_REGION: &str = "13:32889617-32973809";

/// Declares a source's stages into a builder.
pub type DeclareFn = fn(&mut GraphBuilder) -> Result<(), PipelineValidationError>;

/// A source: its declaration function and the copy stages it ends in.
#[derive(Debug, Clone, Copy)]
pub struct Source {
    /// Display name.
    pub name: &'static str,
    /// Declares every stage of the source.
    pub declare: DeclareFn,
    /// Stages whose Targets land in `{output_dir}`.
    pub final_stages: &'static [&'static str],
}

/// Every source, in declaration order.
pub const SOURCES: &[Source] = &[
    Source { name: "ClinVar", declare: clinvar::declare, final_stages: clinvar::FINAL_STAGES },
    Source { name: "ESP", declare: esp::declare, final_stages: esp::FINAL_STAGES },
    Source { name: "BIC", declare: bic::declare, final_stages: bic::FINAL_STAGES },
    Source { name: "exLOVD", declare: exlovd::declare, final_stages: exlovd::FINAL_STAGES },
    Source {
        name: "sharedLOVD",
        declare: shared_lovd::declare,
        final_stages: shared_lovd::FINAL_STAGES,
    },
    Source { name: "1000 Genomes", declare: g1k::declare, final_stages: g1k::FINAL_STAGES },
    Source { name: "ExAC", declare: exac::declare, final_stages: exac::FINAL_STAGES },
    Source { name: "ENIGMA", declare: enigma::declare, final_stages: enigma::FINAL_STAGES },
    Source {
        name: "Functional assays",
        declare: functional_assays::declare,
        final_stages: functional_assays::FINAL_STAGES,
    },
    Source { name: "gnomAD", declare: gnomad::declare, final_stages: gnomad::FINAL_STAGES },
];

/// Declares every source.
///
/// ENIGMA reuses the ClinVar BRCA extract, so ClinVar is declared first.
pub fn declare_all(builder: &mut GraphBuilder) -> Result<(), PipelineValidationError> {
    for source in SOURCES {
        tracing::debug!(source = source.name, "Declaring source stages");
        (source.declare)(builder)?;
    }
    Ok(())
}

/// Names of every per-source copy stage.
#[must_use]
pub fn final_stages() -> Vec<&'static str> {
    SOURCES
        .iter()
        .flat_map(|s| s.final_stages.iter().copied())
        .collect()
}

/// `{methods_dir}/<name>`
pub(crate) fn method_dir(name: &str) -> String {
    format!("{{methods_dir}}/{name}")
}

/// `{file_parent_dir}/<dir>/<file>`
pub(crate) fn staged(dir: &str, file: &str) -> String {
    format!("{{file_parent_dir}}/{dir}/{file}")
}

/// `vcf-concat` of the given inputs, in order, into the single output.
pub(crate) fn concat(name: &str, parts: &[(&str, &str)], output: String) -> StageDescriptor {
    let mut command = CommandTemplate::new("vcf-concat").stdout_to("{output}");
    let mut stage = StageDescriptor::run(name, Vec::new()).with_output(output);
    for &(key, upstream) in parts {
        command = command.arg(format!("{{input.{key}}}"));
        stage = stage.requires_dep(Dependency::named(key, upstream));
    }
    stage.action = StageAction::Run(vec![command]);
    stage.describe("Concatenate per-gene VCFs")
}

/// hg19 to hg38 coordinate liftover of the sole input.
pub(crate) fn liftover(name: &str, upstream: &str, output: String) -> StageDescriptor {
    StageDescriptor::run(
        name,
        vec![CommandTemplate::new("CrossMap.py").args([
            "vcf",
            "{resources_dir}/hg19ToHg38.over.chain.gz",
            "{input}",
            "{resources_dir}/hg38.fa",
            "{output}",
        ])],
    )
    .requires(upstream)
    .with_output(output)
    .describe("Lift over from hg19 to hg38")
}

/// `vcf-sort` of the sole input.
pub(crate) fn sort(name: &str, upstream: &str, output: String) -> StageDescriptor {
    StageDescriptor::run(
        name,
        vec![CommandTemplate::new("vcf-sort").arg("{input}").stdout_to("{output}")],
    )
    .requires(upstream)
    .with_output(output)
    .describe("Sort VCF records")
}

/// Publishes the sole input as `{output_dir}/<file>`.
pub(crate) fn publish(name: &str, upstream: &str, file: &str) -> StageDescriptor {
    StageDescriptor::copy(name, format!("{{output_dir}}/{file}"))
        .requires(upstream)
        .describe(format!("Publish {file}"))
}

/// Publishes one named output of `upstream` as `{output_dir}/<file>`.
pub(crate) fn publish_named(name: &str, upstream: &str, output: &str, file: &str) -> StageDescriptor {
    let to = format!("{{output_dir}}/{file}");
    StageDescriptor::new(
        name,
        StageKind::Copy,
        StageAction::Copy {
            from: format!("{{input.{output}}}"),
            to: to.clone(),
        },
    )
    .requires(upstream)
    .with_output(to)
    .describe(format!("Publish {file}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::descriptor::OutputSpec;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn test_all_sources_declare() {
        let mut builder = GraphBuilder::new("sources");
        declare_all(&mut builder).unwrap();
        for stage in final_stages() {
            assert!(builder.contains(stage), "missing {stage}");
        }
    }

    #[test]
    fn test_final_stages_publish_into_output_dir() {
        let mut builder = GraphBuilder::new("sources");
        declare_all(&mut builder).unwrap();
        let catalog = builder.build().unwrap();

        let mut files = HashSet::new();
        for name in final_stages() {
            let stage = catalog.get(name).unwrap();
            assert_eq!(stage.kind, StageKind::Copy);
            let OutputSpec::Single(ref path) = stage.outputs else {
                panic!("{name} should have a single output");
            };
            assert!(path.template.starts_with("{output_dir}/"));
            assert!(files.insert(path.template.clone()), "{name} reuses a file name");
        }
    }

    #[test]
    fn test_concat_orders_inputs() {
        let stage = concat("c", &[("brca1", "a"), ("brca2", "b")], "{file_parent_dir}/x.vcf".into());
        let StageAction::Run(ref commands) = stage.action else {
            panic!("concat should run a command");
        };
        assert_eq!(commands[0].args, vec!["{input.brca1}", "{input.brca2}"]);
        assert_eq!(stage.dependency_names().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
