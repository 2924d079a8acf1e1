//! `EchoTranslator`: placeholder backend that tags text instead of translating.
//!
//! Lets the gate, the assembler and the transport be exercised end-to-end
//! without a neural translation model: `"hello"` en→pt becomes
//! `"[por_Latn] hello"`.

use tracing::debug;

use crate::error::Result;
use crate::translate::Translator;

#[derive(Debug, Clone, Copy, Default)]
pub struct EchoTranslator;

impl EchoTranslator {
    pub fn new() -> Self {
        Self
    }
}

impl Translator for EchoTranslator {
    fn translate(&self, text: &str, source_code: &str, target_code: &str) -> Result<String> {
        debug!(source_code, target_code, chars = text.len(), "EchoTranslator::translate");
        Ok(format!("[{target_code}] {text}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_with_target_code() {
        let out = EchoTranslator::new()
            .translate("hello", "eng_Latn", "por_Latn")
            .unwrap();
        assert_eq!(out, "[por_Latn] hello");
    }
}
