pub mod commands;
pub mod queries;
pub mod routes;

pub use commands::{
    ProcessUploadCommand, ProcessUploadResponse, UploadFileCommand, UploadFileError,
    UploadFileResponse,
};

pub use queries::{UploadStatusError, UploadStatusQuery, UploadStatusResponse};

pub use routes::upload_routes;
