pub mod error;
pub mod model;
pub mod modlist;
pub mod policy;

pub use error::AppError;
pub use model::{
    Category, DownloadOutcome, DownloadPhase, MasterEntry, ModReference, PendingDownload,
};
pub use policy::FolderSet;
