//! Core types for the Ferry file-sharing service.
//!
//! Everything here is pure: records and their availability rules, share code
//! generation, download token signing, and blob path naming. Storage and
//! orchestration live in the other crates.

pub mod clock;
pub mod code;
pub mod naming;
pub mod record;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use code::{CODE_ALPHABET, CodeGenerator, DEFAULT_CODE_LENGTH, RandomCodeGenerator, is_well_formed};
pub use naming::{MAX_STEM_CHARS, effective_content_type, guess_content_type, storage_path_for};
pub use record::{DEFAULT_CONTENT_TYPE, FileRecord, expiry_after};
pub use token::{MIN_SECRET_LEN, TokenSecretError, TokenSigner};
