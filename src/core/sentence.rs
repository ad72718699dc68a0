//! Incremental sentence boundary detection for streamed LLM output.
//!
//! Text arrives from the language model in fragments of arbitrary length. The
//! [`SentenceDetector`] buffers those fragments and hands back complete
//! sentences as soon as a boundary can be confirmed, so that speech synthesis
//! can start long before the full response has been generated.
//!
//! A boundary is a `.`, `!` or `?` (optionally followed by closing quotes or
//! brackets) that is followed by whitespace or sits at the end of the buffer,
//! subject to three exclusions:
//!
//! - a `.` preceded by a digit at the very end of the buffer is deferred until
//!   the next fragment shows whether it is a decimal point (`$29.` + `99`)
//! - a `.` that terminates a known abbreviation (`Dr.`, `etc.`) is ignored
//! - a candidate sentence shorter than the policy minimum is not split off
//!
//! The whole unconfirmed tail is re-scanned on every call, so a lookahead that
//! straddles two fragments is resolved the same way regardless of where the
//! stream happened to be split.
//!
//! # Example
//!
//! ```rust
//! use waav_agent::core::sentence::SentenceDetector;
//!
//! let mut detector = SentenceDetector::new();
//! assert!(detector.add_chunk("Hello Dr. Sm").is_empty());
//! assert_eq!(detector.add_chunk("ith. How are"), vec!["Hello Dr. Smith."]);
//! assert!(detector.has_incomplete());
//! assert_eq!(detector.get_remainder(), " How are");
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Sentences shorter than this (after trimming leading whitespace) are merged
/// into the following sentence instead of being emitted on their own.
pub const DEFAULT_MIN_SENTENCE_CHARS: usize = 3;

/// Built-in abbreviations, lowercase and without the trailing period.
pub const DEFAULT_ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "e.g", "i.e", "inc", "ltd",
    "corp", "approx", "dept", "est", "mt", "ave", "fig", "u.s", "a.m", "p.m",
];

/// A detector-confirmed unit of assistant output.
///
/// `seq` is the position of the sentence within its turn, starting at 0 and
/// contiguous. A sentence is never mutated after it has been produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub seq: u64,
    pub text: String,
}

impl Sentence {
    pub fn new(seq: u64, text: impl Into<String>) -> Self {
        Self {
            seq,
            text: text.into(),
        }
    }
}

/// Tunable segmentation policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentencePolicy {
    abbreviations: HashSet<String>,
    min_sentence_chars: usize,
}

impl Default for SentencePolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MIN_SENTENCE_CHARS,
            DEFAULT_ABBREVIATIONS.iter().copied(),
        )
    }
}

impl SentencePolicy {
    /// Build a policy from a minimum length and an abbreviation list.
    ///
    /// Abbreviations are normalized to lowercase; a trailing period is
    /// accepted and stripped (`"Dr."` and `"dr"` are equivalent).
    pub fn new<I, S>(min_sentence_chars: usize, abbreviations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let abbreviations = abbreviations
            .into_iter()
            .map(|a| a.as_ref().trim().trim_end_matches('.').to_lowercase())
            .filter(|a| !a.is_empty())
            .collect();

        Self {
            abbreviations,
            min_sentence_chars,
        }
    }

    pub fn min_sentence_chars(&self) -> usize {
        self.min_sentence_chars
    }

    pub fn is_abbreviation(&self, token: &str) -> bool {
        !token.is_empty() && self.abbreviations.contains(&token.to_lowercase())
    }
}

/// Stateful, I/O-free sentence segmenter. Create one per turn.
#[derive(Debug, Default)]
pub struct SentenceDetector {
    policy: SentencePolicy,
    /// Text after the last confirmed boundary
    buffer: String,
}

impl SentenceDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: SentencePolicy) -> Self {
        Self {
            policy,
            buffer: String::new(),
        }
    }

    /// Append a fragment and return every sentence it completes, in order.
    ///
    /// Whitespace-only fragments are retained (they may separate words) but
    /// never trigger emission on their own.
    pub fn add_chunk(&mut self, fragment: &str) -> Vec<String> {
        if fragment.is_empty() {
            return Vec::new();
        }

        self.buffer.push_str(fragment);

        if fragment.trim().is_empty() {
            return Vec::new();
        }

        self.scan()
    }

    /// True iff the retained tail contains anything but whitespace.
    pub fn has_incomplete(&self) -> bool {
        !self.buffer.trim().is_empty()
    }

    /// Take the unterminated tail. Called once, at end of stream.
    pub fn get_remainder(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    fn scan(&mut self) -> Vec<String> {
        let chars: Vec<(usize, char)> = self.buffer.char_indices().collect();
        let mut sentences = Vec::new();
        let mut start = 0usize;
        let mut i = 0usize;

        while i < chars.len() {
            let (_, c) = chars[i];
            if !is_terminator(c) {
                i += 1;
                continue;
            }

            // Closing quotes and brackets belong to the sentence they close
            let mut end = i;
            while end + 1 < chars.len() && is_closing(chars[end + 1].1) {
                end += 1;
            }

            let next = chars.get(end + 1).map(|&(_, n)| n);
            if next.is_some_and(|n| !n.is_whitespace()) {
                i += 1;
                continue;
            }

            if c == '.' {
                let prev = i.checked_sub(1).map(|p| chars[p].1);
                if next.is_none() && end == i && prev.is_some_and(|p| p.is_ascii_digit()) {
                    // Could still become "29.99"; wait for the next fragment
                    break;
                }

                let token = preceding_token(&self.buffer[..chars[i].0]);
                if self.policy.is_abbreviation(token) {
                    i += 1;
                    continue;
                }
            }

            let end_byte = chars[end].0 + chars[end].1.len_utf8();
            let candidate = self.buffer[start..end_byte].trim_start();
            if candidate.chars().count() < self.policy.min_sentence_chars {
                i = end + 1;
                continue;
            }

            sentences.push(candidate.to_string());
            start = end_byte;
            i = end + 1;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        sentences
    }
}

#[inline]
fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

#[inline]
fn is_closing(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '\u{201D}' | '\u{2019}')
}

/// The word immediately before a period, without opening punctuation.
fn preceding_token(text: &str) -> &str {
    let word_start = text
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(idx, c)| idx + c.len_utf8())
        .unwrap_or(0);

    text[word_start..].trim_start_matches(['(', '[', '"', '\'', '\u{201C}', '\u{2018}'])
}
