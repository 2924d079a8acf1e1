//! Post-hoc text translation and the gate that decides whether to run it.
//!
//! ## Decision table
//!
//! | source code | target code | action |
//! |-------------|-------------|--------|
//! | same code (or both unmapped, same tag) | | identity, `fallback_used = false` |
//! | unmapped    | any         | fallback, translator not called |
//! | any         | unmapped    | fallback, translator not called |
//! | known       | known, different | one translator call |
//!
//! A translator call that fails (error or panic) turns into a fallback
//! outcome carrying the elapsed time. The timeout is advisory: a late result
//! is logged and still used.

pub mod echo;

pub use echo::EchoTranslator;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::Result;

/// Contract for translation backends.
///
/// Codes passed in are translator-internal codes (e.g. `por_Latn`), already
/// mapped from BCP-47 tags. Implementations are shared between workers.
pub trait Translator: Send + Sync + 'static {
    fn translate(&self, text: &str, source_code: &str, target_code: &str) -> Result<String>;
}

/// BCP-47-ish tag → translator-internal language code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageCodeMap {
    codes: HashMap<String, String>,
}

impl LanguageCodeMap {
    pub fn new(codes: HashMap<String, String>) -> Self {
        Self { codes }
    }

    pub fn code_for(&self, tag: &str) -> Option<&str> {
        self.codes.get(tag).map(String::as_str)
    }

    /// Distinct known codes, sorted.
    pub fn known_codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.codes.values().map(String::as_str).collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }
}

impl Default for LanguageCodeMap {
    fn default() -> Self {
        let codes = [
            ("en", "eng_Latn"),
            ("pt", "por_Latn"),
            ("pt-BR", "por_Latn"),
            ("es", "spa_Latn"),
        ]
        .into_iter()
        .map(|(tag, code)| (tag.to_string(), code.to_string()))
        .collect();
        Self { codes }
    }
}

/// Result of one gating decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationOutcome {
    pub translated_text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub duration_ms: u64,
    /// `true` when `translated_text` is the original text because
    /// translation could not or should not run.
    pub fallback_used: bool,
    /// The translator answered, but later than the advisory timeout.
    #[serde(default)]
    pub over_timeout: bool,
}

impl TranslationOutcome {
    fn identity(text: &str, source: &str, target: &str) -> Self {
        Self {
            translated_text: text.to_string(),
            source_lang: source.to_string(),
            target_lang: target.to_string(),
            duration_ms: 0,
            fallback_used: false,
            over_timeout: false,
        }
    }

    fn fallback(text: &str, source: &str, target: &str, duration_ms: u64) -> Self {
        Self {
            fallback_used: true,
            duration_ms,
            ..Self::identity(text, source, target)
        }
    }
}

/// Decides, per transcript, whether and how to translate.
///
/// Holds no mutable state; one gate is shared by every worker.
#[derive(Clone)]
pub struct TranslationGate {
    translator: Arc<dyn Translator>,
    codes: LanguageCodeMap,
}

impl TranslationGate {
    pub fn new(translator: Arc<dyn Translator>, codes: LanguageCodeMap) -> Self {
        Self { translator, codes }
    }

    pub fn codes(&self) -> &LanguageCodeMap {
        &self.codes
    }

    /// Total decision function: always returns an outcome, never an error.
    pub fn decide(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        timeout: Duration,
    ) -> TranslationOutcome {
        let src = self.codes.code_for(source_lang);
        let tgt = self.codes.code_for(target_lang);

        let same_language = match (src, tgt) {
            (Some(a), Some(b)) => a == b,
            (None, None) => source_lang == target_lang,
            _ => false,
        };
        if same_language {
            return TranslationOutcome::identity(text, source_lang, target_lang);
        }

        let Some(src) = src else {
            warn!(source_lang, "unknown source language, skipping translation");
            return TranslationOutcome::fallback(text, source_lang, target_lang, 0);
        };
        let Some(tgt) = tgt else {
            warn!(target_lang, "unknown target language, skipping translation");
            return TranslationOutcome::fallback(text, source_lang, target_lang, 0);
        };

        let start = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| {
            self.translator.translate(text, src, tgt)
        }));
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(translated)) => {
                let over_timeout = duration_ms > timeout.as_millis() as u64;
                if over_timeout {
                    warn!(
                        duration_ms,
                        timeout_ms = timeout.as_millis() as u64,
                        "translation exceeded timeout, using result anyway"
                    );
                }
                TranslationOutcome {
                    translated_text: translated,
                    source_lang: source_lang.to_string(),
                    target_lang: target_lang.to_string(),
                    duration_ms,
                    fallback_used: false,
                    over_timeout,
                }
            }
            Ok(Err(e)) => {
                error!(duration_ms, "translation failed: {e}");
                TranslationOutcome::fallback(text, source_lang, target_lang, duration_ms)
            }
            Err(_) => {
                error!(duration_ms, "translator panicked");
                TranslationOutcome::fallback(text, source_lang, target_lang, duration_ms)
            }
        }
    }

    /// Run one short translation per ordered pair of distinct known codes so
    /// the first real request in any direction does not pay for lazy init.
    pub fn warm_up(&self) {
        let start = Instant::now();
        let codes = self.codes.known_codes();
        let mut pairs = 0usize;
        for src in &codes {
            for tgt in &codes {
                if src == tgt {
                    continue;
                }
                pairs += 1;
                let result = catch_unwind(AssertUnwindSafe(|| {
                    self.translator.translate("Hello world", src, tgt)
                }));
                if !matches!(result, Ok(Ok(_))) {
                    warn!(src, tgt, "translator warm-up pair failed");
                }
            }
        }
        info!(
            pairs,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "translator warm-up complete"
        );
    }
}

impl std::fmt::Debug for TranslationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationGate")
            .field("codes", &self.codes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WhatsError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    /// Counts calls and answers according to `mode`.
    struct Scripted {
        calls: AtomicUsize,
        mode: Mode,
    }

    enum Mode {
        Upper,
        Fail,
        Panic,
        Slow(Duration),
    }

    impl Scripted {
        fn gate(mode: Mode) -> (Arc<Self>, TranslationGate) {
            let t = Arc::new(Self {
                calls: AtomicUsize::new(0),
                mode,
            });
            let gate = TranslationGate::new(t.clone(), LanguageCodeMap::default());
            (t, gate)
        }
    }

    impl Translator for Scripted {
        fn translate(&self, text: &str, _src: &str, _tgt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                Mode::Upper => Ok(text.to_uppercase()),
                Mode::Fail => Err(WhatsError::Translation("model exploded".into())),
                Mode::Panic => panic!("backend bug"),
                Mode::Slow(d) => {
                    thread::sleep(d);
                    Ok(format!("late {text}"))
                }
            }
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(250);

    #[test]
    fn same_code_short_circuits() {
        let (t, gate) = Scripted::gate(Mode::Upper);
        let out = gate.decide("olá mundo", "pt-BR", "pt", TIMEOUT);
        assert_eq!(out.translated_text, "olá mundo");
        assert_eq!(out.duration_ms, 0);
        assert!(!out.fallback_used);
        assert_eq!(t.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn identical_unmapped_tags_short_circuit() {
        let (t, gate) = Scripted::gate(Mode::Upper);
        let out = gate.decide("hej", "sv", "sv", TIMEOUT);
        assert!(!out.fallback_used);
        assert_eq!(out.translated_text, "hej");
        assert_eq!(t.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_target_falls_back_without_calling() {
        let (t, gate) = Scripted::gate(Mode::Upper);
        let out = gate.decide("hello", "en", "xx-unknown", TIMEOUT);
        assert_eq!(out.translated_text, "hello");
        assert!(out.fallback_used);
        assert_eq!(out.duration_ms, 0);
        assert_eq!(t.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_source_falls_back_without_calling() {
        let (t, gate) = Scripted::gate(Mode::Upper);
        let out = gate.decide("hello", "xx", "en", TIMEOUT);
        assert!(out.fallback_used);
        assert_eq!(t.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn known_pair_calls_translator_once() {
        let (t, gate) = Scripted::gate(Mode::Upper);
        let out = gate.decide("hello", "en", "es", TIMEOUT);
        assert_eq!(out.translated_text, "HELLO");
        assert!(!out.fallback_used);
        assert_eq!(out.source_lang, "en");
        assert_eq!(out.target_lang, "es");
        assert_eq!(t.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn translator_error_becomes_fallback() {
        let (t, gate) = Scripted::gate(Mode::Fail);
        let out = gate.decide("hello", "en", "pt", TIMEOUT);
        assert!(out.fallback_used);
        assert_eq!(out.translated_text, "hello");
        assert_eq!(t.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn translator_panic_becomes_fallback() {
        let (_t, gate) = Scripted::gate(Mode::Panic);
        let out = gate.decide("hello", "en", "pt", TIMEOUT);
        assert!(out.fallback_used);
        assert_eq!(out.translated_text, "hello");
    }

    #[test]
    fn late_result_is_still_used() {
        let (_t, gate) = Scripted::gate(Mode::Slow(Duration::from_millis(30)));
        let out = gate.decide("hello", "en", "pt", Duration::from_millis(1));
        assert_eq!(out.translated_text, "late hello");
        assert!(!out.fallback_used);
        assert!(out.over_timeout);
        assert!(out.duration_ms >= 30);
    }

    #[test]
    fn concurrent_decisions_are_independent() {
        let (t, gate) = Scripted::gate(Mode::Upper);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let gate = gate.clone();
                thread::spawn(move || gate.decide(&format!("text {i}"), "en", "es", TIMEOUT))
            })
            .collect();
        for (i, h) in handles.into_iter().enumerate() {
            let out = h.join().unwrap();
            assert_eq!(out.translated_text, format!("TEXT {i}"));
        }
        assert_eq!(t.calls.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn warm_up_covers_every_directed_pair() {
        let (t, gate) = Scripted::gate(Mode::Upper);
        gate.warm_up();
        // eng, por, spa -> 3 * 2 directed pairs
        assert_eq!(t.calls.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn code_table_deserializes_from_plain_object() {
        let map: LanguageCodeMap =
            serde_json::from_str(r#"{"fr": "fra_Latn", "en": "eng_Latn"}"#).unwrap();
        assert_eq!(map.code_for("fr"), Some("fra_Latn"));
        assert_eq!(map.code_for("de"), None);
    }
}
