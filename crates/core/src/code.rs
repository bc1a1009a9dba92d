use rand_core::{OsRng, RngCore};

/// Symbols a share code is drawn from (`[A-Za-z0-9]`).
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Default share code length.
pub const DEFAULT_CODE_LENGTH: usize = 8;

/// Source of candidate share codes.
///
/// Candidates are not guaranteed to be unique; the lifecycle engine checks
/// them against the metadata store and asks for another on collision.
pub trait CodeGenerator: Send + Sync {
    /// Produce the next candidate code.
    fn next_code(&self) -> String;
}

/// Uniformly random codes drawn from the OS CSPRNG.
#[derive(Debug, Clone)]
pub struct RandomCodeGenerator {
    length: usize,
}

impl RandomCodeGenerator {
    /// Create a generator producing codes of `length` symbols.
    ///
    /// A zero length is bumped to one.
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
        }
    }

    /// Configured code length.
    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LENGTH)
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn next_code(&self) -> String {
        // Rejection sampling: 248 is the largest multiple of 62 below 256, so
        // bytes at or above it are discarded to keep every symbol equally likely.
        #[allow(clippy::cast_possible_truncation)]
        let limit = (256 / CODE_ALPHABET.len() * CODE_ALPHABET.len()) as u8;

        let mut code = String::with_capacity(self.length);
        let mut buf = [0u8; 32];
        while code.len() < self.length {
            OsRng.fill_bytes(&mut buf);
            for &byte in &buf {
                if byte >= limit {
                    continue;
                }
                code.push(char::from(CODE_ALPHABET[usize::from(byte) % CODE_ALPHABET.len()]));
                if code.len() == self.length {
                    break;
                }
            }
        }
        code
    }
}

/// Returns `true` if `code` has the shape of a share code.
///
/// Used to reject obviously malformed input before touching the store.
pub fn is_well_formed(code: &str) -> bool {
    !code.is_empty() && code.len() <= 64 && code.bytes().all(|b| b.is_ascii_alphanumeric())
}
