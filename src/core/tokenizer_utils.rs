/*
 * Token counting behind the `TokenCounterOperations` abstraction. The flattener
 * only needs a count for a block of text; which tokenizer produces it is chosen
 * from settings. `CoreTikTokenCounter` uses the `cl100k_base` encoding from
 * `tiktoken-rs`; `SimpleWhitespaceTokenCounter` is a cheap word count.
 */
use log::error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tiktoken_rs::{CoreBPE, cl100k_base};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizerError {
    EncodingUnavailable(String),
}

impl std::fmt::Display for TokenizerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenizerError::EncodingUnavailable(msg) => {
                write!(f, "Tokenizer encoding unavailable: {msg}")
            }
        }
    }
}

impl std::error::Error for TokenizerError {}

pub type Result<T> = std::result::Result<T, TokenizerError>;

/*
 * Which counter the flattener uses. Serialized lowercase in settings.json.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TokenizerKind {
    #[default]
    #[serde(rename = "cl100k_base")]
    Cl100kBase,
    #[serde(rename = "whitespace")]
    Whitespace,
}

pub trait TokenCounterOperations: Send + Sync {
    fn count_tokens(&self, text: &str) -> Result<usize>;
}

/*
 * Counts tokens with the `cl100k_base` encoding. The encoding is loaded once at
 * construction; if that fails every later count reports the failure instead of
 * silently substituting another tokenizer.
 */
pub struct CoreTikTokenCounter {
    bpe: std::result::Result<CoreBPE, String>,
}

impl CoreTikTokenCounter {
    pub fn new() -> Self {
        let bpe = cl100k_base().map_err(|e| {
            error!("CoreTikTokenCounter: Failed to initialize cl100k_base: {e:?}");
            e.to_string()
        });
        CoreTikTokenCounter { bpe }
    }
}

impl Default for CoreTikTokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounterOperations for CoreTikTokenCounter {
    fn count_tokens(&self, text: &str) -> Result<usize> {
        match &self.bpe {
            Ok(bpe) => Ok(bpe.encode_with_special_tokens(text).len()),
            Err(msg) => Err(TokenizerError::EncodingUnavailable(msg.clone())),
        }
    }
}

pub struct SimpleWhitespaceTokenCounter;

impl SimpleWhitespaceTokenCounter {
    pub fn new() -> Self {
        SimpleWhitespaceTokenCounter
    }
}

impl Default for SimpleWhitespaceTokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounterOperations for SimpleWhitespaceTokenCounter {
    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(text.split_whitespace().count())
    }
}

pub fn create_token_counter(kind: TokenizerKind) -> Arc<dyn TokenCounterOperations> {
    log::debug!("TokenizerUtils: Creating token counter {kind:?}.");
    match kind {
        TokenizerKind::Cl100kBase => Arc::new(CoreTikTokenCounter::new()),
        TokenizerKind::Whitespace => Arc::new(SimpleWhitespaceTokenCounter::new()),
    }
}
