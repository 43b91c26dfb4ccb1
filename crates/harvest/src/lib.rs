mod batch;
mod error;
mod summary;
pub mod writer;

pub use batch::{
    batch_run_config, load_links, load_schema, run_batch, BatchPaths, LinkEntry, LINKS_FILE,
    SCHEMA_FILE,
};
pub use error::BatchError;
pub use summary::{LinkFailure, LinkFailureKind, RunSummary};
pub use writer::{output_file_name, write_output};
