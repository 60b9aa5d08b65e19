pub mod file_handle;
pub mod names;
pub mod service;
pub mod staging;

pub use service::{
    BlockReceipt, Collaborators, CommittedFile, TransferService, UploadStatus, VersionInfo,
};
