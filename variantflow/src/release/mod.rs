//! Release assembly: the release stage chain and the in-process steps it
//! uses (archives, checksums, version metadata).

pub mod archive;
pub mod checksum;
pub mod metadata;
pub mod stages;

pub use archive::{create_archive, extract_all, extract_member};
pub use checksum::{md5_file, write_md5sums};
pub use metadata::{read_release_date, write_version_metadata, VersionMetadata};
pub use stages::{ARCHIVE_STAGE, MERGE_STAGE, RELEASE_STAGES};
