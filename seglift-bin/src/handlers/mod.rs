mod handle_plan;
mod handle_root;
mod handle_upload;

pub use handle_plan::handle_plan_command;
pub use handle_root::handle_root_command;
pub use handle_upload::{UploadOverrides, handle_upload_command};
