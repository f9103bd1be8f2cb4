//! Share code generation and validation.
//!
//! Codes are six ASCII digits drawn uniformly from `100000..=999999`, which
//! gives 900,000 possible codes. Uniqueness among live sessions is enforced by
//! the [`registry`](crate::registry), not here.
//!
//! ## Example
//!
//! ```rust
//! use yshare_core::code::{CodeSource, RandomCodeSource, ShareCode};
//!
//! let source = RandomCodeSource::new();
//! let code = source.next_code();
//! assert_eq!(code.as_str().len(), 6);
//!
//! let parsed = ShareCode::parse(" 123456 ").unwrap();
//! assert_eq!(parsed.as_str(), "123456");
//! ```

use rand::Rng;

use crate::error::{Error, Result};

/// Length of a share code
pub const CODE_LENGTH: usize = 6;

/// Smallest code that can be generated
pub const CODE_MIN: u32 = 100_000;

/// Largest code that can be generated
pub const CODE_MAX: u32 = 999_999;

/// A validated share code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShareCode {
    code: String,
}

impl ShareCode {
    /// Parse and validate a share code from a string.
    ///
    /// Surrounding whitespace is ignored. Leading zeros are accepted even
    /// though the generator never produces them.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is not exactly six ASCII digits.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();

        if trimmed.len() != CODE_LENGTH {
            return Err(Error::InvalidCodeFormat(format!(
                "code must be {} digits, got {}",
                CODE_LENGTH,
                trimmed.len()
            )));
        }

        if let Some(c) = trimmed.chars().find(|c| !c.is_ascii_digit()) {
            return Err(Error::InvalidCodeFormat(format!(
                "invalid character '{c}' in code"
            )));
        }

        Ok(Self {
            code: trimmed.to_string(),
        })
    }

    /// Build a code from a number in the generator range.
    #[must_use]
    pub fn from_number(n: u32) -> Self {
        debug_assert!((CODE_MIN..=CODE_MAX).contains(&n));
        Self {
            code: format!("{n:06}"),
        }
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.code
    }
}

impl std::fmt::Display for ShareCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code)
    }
}

impl std::str::FromStr for ShareCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A source of candidate share codes.
///
/// The registry draws from a source and retries on collision, so a source
/// does not need to know which codes are live.
pub trait CodeSource: Send + Sync {
    /// Draw the next candidate code.
    fn next_code(&self) -> ShareCode;
}

/// Uniform random codes from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodeSource;

impl RandomCodeSource {
    /// Create a new random code source.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CodeSource for RandomCodeSource {
    fn next_code(&self) -> ShareCode {
        let n = rand::thread_rng().gen_range(CODE_MIN..=CODE_MAX);
        ShareCode::from_number(n)
    }
}
