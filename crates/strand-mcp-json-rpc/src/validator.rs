//! Pre-parse format and encoding checks.

use serde::de::IgnoredAny;

use crate::error::ValidationError;

/// 8 MiB, the largest single message a line transport accepts by default.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// How strictly a payload is checked.
///
/// Line-oriented transports use [`Strictness::Strict`]: an embedded line
/// terminator would split the frame, and oversize lines are refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    Strict,
    Lenient,
}

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Enforced in strict mode only.
    pub max_message_size: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MessageValidator {
    config: ValidatorConfig,
}

impl MessageValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.config.max_message_size = max_message_size;
        self
    }

    pub fn max_message_size(&self) -> usize {
        self.config.max_message_size
    }

    /// Checks, in order: non-empty, UTF-8, parseable JSON, then in strict
    /// mode no embedded `\n`/`\r` and the size limit.
    pub fn validate(&self, raw: &[u8], strictness: Strictness) -> Result<(), ValidationError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(ValidationError::Empty);
        }

        let text = std::str::from_utf8(raw)?;
        serde_json::from_str::<IgnoredAny>(text)?;

        if strictness == Strictness::Strict {
            if raw.iter().any(|b| *b == b'\n' || *b == b'\r') {
                return Err(ValidationError::EmbeddedLineTerminator);
            }
            if raw.len() > self.config.max_message_size {
                return Err(ValidationError::TooLarge {
                    size: raw.len(),
                    limit: self.config.max_message_size,
                });
            }
        }
        Ok(())
    }
}
