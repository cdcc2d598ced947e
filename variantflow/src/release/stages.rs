//! The release chain: merge the per-source files, annotate, diff against the
//! previous release, then stamp, checksum and archive the output tree.
//!
//! Every table-rewriting step carries a record-count gate.

use crate::core::StageKind;
use crate::errors::PipelineValidationError;
use crate::pipeline::descriptor::{
    CommandTemplate, DiffSpec, OutputSpec, StageAction, StageDescriptor, ValidationSpec,
};
use crate::pipeline::GraphBuilder;

/// First stage of the chain.
pub const MERGE_STAGE: &str = "merge_vcfs";
/// Last stage of the chain.
pub const ARCHIVE_STAGE: &str = "release_archive";

/// Release stages in declaration order.
pub const RELEASE_STAGES: &[&str] = &[
    MERGE_STAGE,
    "annotate_merged",
    "aggregate",
    "build_aggregated",
    "append_mupit_structure",
    "calculate_priors",
    "filter_blacklisted_priors",
    "find_missing_reports",
    "diff_release",
    "diff_reports",
    "version_metadata",
    "top_level_readme",
    "md5sums",
    ARCHIVE_STAGE,
];

const DATA_MERGING: &str = "{methods_dir}/data_merging";
const UTILITIES: &str = "{methods_dir}/utilities";

fn artifact(file: &str) -> String {
    format!("{{artifacts_dir}}/{file}")
}

fn release(name: &str, command: CommandTemplate, upstream: &str, output: String) -> StageDescriptor {
    StageDescriptor::run(name, vec![command])
        .with_kind(StageKind::Release)
        .requires(upstream)
        .with_output(output)
}

/// A step whose output must hold exactly as many records as its input.
fn gated(name: &str, command: CommandTemplate, upstream: &str, output: &str) -> StageDescriptor {
    release(name, command, upstream, artifact(output))
        .with_validation(ValidationSpec::preserves("{input}", "{output}"))
}

fn diff_outputs(suffix: &str, table: &str, readme: bool) -> OutputSpec {
    let mut entries = vec![
        (table.to_string(), format!("{{release_dir}}/{table}.tsv")),
        ("removed".to_string(), format!("{{diff_dir}}/removed{suffix}.tsv")),
        ("added".to_string(), format!("{{diff_dir}}/added{suffix}.tsv")),
        ("added_data".to_string(), format!("{{diff_dir}}/added_data{suffix}.tsv")),
        ("diff".to_string(), format!("{{diff_dir}}/diff{suffix}.txt")),
        ("diff_json".to_string(), format!("{{diff_dir}}/diff{suffix}.json")),
    ];
    if readme {
        entries.push(("readme".to_string(), "{diff_dir}/README.txt".to_string()));
    }
    OutputSpec::named(entries)
}

fn release_diff(current: &str, table: &str, reports: bool) -> CommandTemplate {
    CommandTemplate::python("releaseDiff.py")
        .args([
            "--v2".to_string(),
            artifact(current),
            "--v1".to_string(),
            "{previous_data}".to_string(),
            "--removed".to_string(),
            "{output.removed}".to_string(),
            "--added".to_string(),
            "{output.added}".to_string(),
            "--added_data".to_string(),
            "{output.added_data}".to_string(),
            "--diff".to_string(),
            "{output.diff}".to_string(),
            "--diff_json".to_string(),
            "{output.diff_json}".to_string(),
            "--output".to_string(),
            format!("{{output.{table}}}"),
            "--artifacts_dir".to_string(),
            "{artifacts_dir}/".to_string(),
            "--diff_dir".to_string(),
            "{diff_dir}/".to_string(),
            "--v1_release_date".to_string(),
            "{previous_release_date}".to_string(),
            "--reports".to_string(),
            if reports { "True" } else { "False" }.to_string(),
        ])
        .cwd(UTILITIES)
}

/// Declares the release chain. `sources` are the per-source copy stages the
/// merge waits for; they must already be declared.
pub fn declare(builder: &mut GraphBuilder, sources: &[&str]) -> Result<(), PipelineValidationError> {
    let mut merge = StageDescriptor::run(
        MERGE_STAGE,
        vec![CommandTemplate::python("variant_merging.py")
            .args([
                "-i",
                "{output_dir}/",
                "-o",
                "{artifacts_dir}/",
                "-p",
                "-r",
                "{resources_dir}/",
                "-a",
                "{artifacts_dir}/",
                "-v",
            ])
            .cwd(DATA_MERGING)],
    )
    .with_kind(StageKind::Release)
    .with_output(artifact("merged.tsv"))
    .describe("Merge every source into one variant table");
    for source in sources {
        merge = merge.requires(*source);
    }
    builder.declare(merge)?;

    builder.declare(
        release(
            "annotate_merged",
            CommandTemplate::python("add_annotation.py")
                .args(["-i", "{input}", "-o", "{output}", "-l", "{artifacts_dir}/add-annotation.log", "-v"])
                .cwd(DATA_MERGING),
            MERGE_STAGE,
            artifact("annotated.tsv"),
        )
        .with_validation(
            ValidationSpec::preserves("{input}", "{output}")
                .with_removed_count_log("{artifacts_dir}/add-annotation.log"),
        ),
    )?;

    builder.declare(gated(
        "aggregate",
        CommandTemplate::python("aggregate_across_columns.py")
            .args(["-i", "{input}", "-o", "{output}"])
            .cwd(DATA_MERGING),
        "annotate_merged",
        "aggregated.tsv",
    ))?;

    builder.declare(gated(
        "build_aggregated",
        CommandTemplate::python("brca_pseudonym_generator.py")
            .args([
                "-i",
                "{input}",
                "-p",
                "-j",
                "{resources_dir}/hg18.fa",
                "-k",
                "{resources_dir}/hg19.fa",
                "-l",
                "{resources_dir}/hg38.fa",
                "-r",
                "{resources_dir}/refseq_annotation.hg18.gp",
                "-s",
                "{resources_dir}/refseq_annotation.hg19.gp",
                "-t",
                "{resources_dir}/refseq_annotation.hg38.gp",
                "-o",
                "{output}",
                "--artifacts_dir",
                "{artifacts_dir}/",
            ])
            .cwd(DATA_MERGING),
        "aggregate",
        "built.tsv",
    ))?;

    builder.declare(gated(
        "append_mupit_structure",
        CommandTemplate::python("getMupitStructure.py")
            .args(["-i", "{input}", "-o", "{output}"])
            .cwd(DATA_MERGING),
        "build_aggregated",
        "built_with_mupit.tsv",
    ))?;

    // The priors container mounts the host-side artifacts directory.
    builder.declare(gated(
        "calculate_priors",
        CommandTemplate::new("bash")
            .args([
                "calcpriors.sh",
                "{priors_references_dir}",
                "{artifacts_dir_host}/",
                "built_with_mupit.tsv",
                "built_with_priors.tsv",
                "{priors_docker_image_name}",
            ])
            .cwd("{methods_dir}/splicing"),
        "append_mupit_structure",
        "built_with_priors.tsv",
    ))?;

    builder.declare(gated(
        "filter_blacklisted_priors",
        CommandTemplate::python("filterBlacklistedVars.py")
            .args([
                "--output",
                "{output}",
                "--blacklisted_vars",
                "blacklisted_vars.txt",
                "filter",
                "{input}",
            ])
            .cwd("{methods_dir}/splicingfilter"),
        "calculate_priors",
        "built_with_priors_clean.tsv",
    ))?;

    builder.declare(release(
        "find_missing_reports",
        CommandTemplate::python("check_for_missing_reports.py")
            .args(["-b", "{input}", "-r", "{artifacts_dir}/", "-a", "{artifacts_dir}/", "-v"])
            .cwd(DATA_MERGING),
        "filter_blacklisted_priors",
        artifact("missing_reports.log"),
    ))?;

    builder.declare(
        StageDescriptor::new(
            "diff_release",
            StageKind::Release,
            StageAction::ReleaseDiff(DiffSpec {
                previous_member: "release/built_with_change_types.tsv".to_string(),
                command: release_diff("built_with_priors_clean.tsv", "built_with_change_types", false),
            }),
        )
        .requires("find_missing_reports")
        .with_outputs(diff_outputs("", "built_with_change_types", true))
        .with_validation(ValidationSpec::preserves(
            artifact("built_with_priors_clean.tsv"),
            "{output.built_with_change_types}",
        ))
        .describe("Diff variants against the previous release"),
    )?;

    // The diff README is shared with diff_release and claimed there.
    builder.declare(
        StageDescriptor::new(
            "diff_reports",
            StageKind::Release,
            StageAction::ReleaseDiff(DiffSpec {
                previous_member: "release/artifacts/reports.tsv".to_string(),
                command: release_diff("reports.tsv", "reports_with_change_types", true),
            }),
        )
        .requires("diff_release")
        .with_outputs(diff_outputs("_reports", "reports_with_change_types", false))
        .with_validation(ValidationSpec::preserves(
            artifact("reports.tsv"),
            "{output.reports_with_change_types}",
        ))
        .describe("Diff submitter reports against the previous release"),
    )?;

    builder.declare(
        StageDescriptor::new("version_metadata", StageKind::Release, StageAction::VersionMetadata)
            .requires("diff_reports")
            .with_output("{metadata_dir}/version.json"),
    )?;

    builder.declare(
        StageDescriptor::new(
            "top_level_readme",
            StageKind::Release,
            StageAction::Copy {
                from: "{methods_dir}/top_level_readme.txt".to_string(),
                to: "{output_dir}/README.txt".to_string(),
            },
        )
        .requires("version_metadata")
        .with_output("{output_dir}/README.txt"),
    )?;

    builder.declare(
        StageDescriptor::new(
            "md5sums",
            StageKind::Release,
            StageAction::Checksums {
                root: "{output_dir}".to_string(),
            },
        )
        .requires("top_level_readme")
        .with_output("{output_dir}/md5sums.txt"),
    )?;

    builder.declare(
        StageDescriptor::new(
            ARCHIVE_STAGE,
            StageKind::Release,
            StageAction::ReleaseArchive {
                root: "{output_dir}".to_string(),
            },
        )
        .requires("md5sums")
        .with_output("{archive_dir}/release-{date_mdy}.tar.gz")
        .describe("Archive the output tree"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn leaf(name: &str) -> StageDescriptor {
        StageDescriptor::run(name, vec![CommandTemplate::new("true")])
            .with_output(format!("{{output_dir}}/{name}.vcf"))
    }

    fn chain() -> crate::pipeline::StageCatalog {
        let mut builder = GraphBuilder::new("release");
        builder.declare(leaf("a_copy")).unwrap();
        builder.declare(leaf("b_copy")).unwrap();
        declare(&mut builder, &["a_copy", "b_copy"]).unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_chain_declares_every_stage() {
        let catalog = chain();
        let declared: Vec<_> = catalog.iter().skip(2).map(|s| s.name.clone()).collect();
        assert_eq!(declared, RELEASE_STAGES);
    }

    #[test]
    fn test_merge_waits_for_sources() {
        let catalog = chain();
        let merge = catalog.get(MERGE_STAGE).unwrap();
        assert_eq!(merge.dependency_names().collect::<Vec<_>>(), vec!["a_copy", "b_copy"]);
    }

    #[test]
    fn test_annotation_gate_reads_removed_count() {
        let catalog = chain();
        let gate = catalog.get("annotate_merged").unwrap().validation.clone().unwrap();
        assert_eq!(
            gate.removed_count_log.as_deref(),
            Some("{artifacts_dir}/add-annotation.log")
        );
    }

    #[test]
    fn test_only_release_diff_claims_readme() {
        let catalog = chain();
        let has_readme = |name: &str| match catalog.get(name).unwrap().outputs {
            OutputSpec::Named(ref entries) => entries.iter().any(|(k, _)| k == "readme"),
            _ => false,
        };
        assert!(has_readme("diff_release"));
        assert!(!has_readme("diff_reports"));
    }
}
