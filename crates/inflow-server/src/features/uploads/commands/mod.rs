pub mod process;
pub mod upload;

pub use process::{ProcessUploadCommand, ProcessUploadResponse};
pub use upload::{UploadFileCommand, UploadFileError, UploadFileResponse};
