pub mod services;

pub use services::{AttachmentManager, CleanupWarning, StoredRef};
