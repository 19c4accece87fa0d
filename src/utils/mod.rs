pub mod error;
pub mod fs_ext;
pub mod string_ext;

pub use error::{ExtractError, ExtractResult};
pub use fs_ext::{atomic_write, fingerprint, fingerprint_file, move_into_dir};
pub use string_ext::{slugify, StringExt};
