mod build;
mod clean;
mod common;
mod list;
mod merge;
mod releases;

pub use build::{execute_build_pipeline, finish_build, run_cells, BuildFlags};
pub use clean::execute_clean_pipeline;
pub use common::{filter_cells, select_families, Session};
pub use list::execute_list_pipeline;
pub use merge::execute_merge_pipeline;
pub use releases::{execute_release_check_pipeline, execute_weekly_pipeline};
