//! Closed enumeration of metered content endpoints.
//!
//! The endpoint space is fixed at compile time: a request path either resolves
//! to one of these variants or it is not metered at all. Ceiling configuration
//! is validated against the full variant list at startup, so an endpoint
//! without a ceiling is a configuration error rather than a runtime fallback.

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::fmt;

/// A content endpoint gated by the auth core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ImageToText,
    PdfToText,
    ImportantWordsV1,
    WordsExplanationV1,
    MoreExplanations,
    RandomParagraph,
    WordsExplanation,
    Simplify,
    ImportantWords,
    Ask,
    Pronunciation,
    VoiceToText,
    Translate,
    Summarise,
    WebSearch,
    WebSearchStream,
}

impl Endpoint {
    pub const ALL: [Endpoint; 16] = [
        Endpoint::ImageToText,
        Endpoint::PdfToText,
        Endpoint::ImportantWordsV1,
        Endpoint::WordsExplanationV1,
        Endpoint::MoreExplanations,
        Endpoint::RandomParagraph,
        Endpoint::WordsExplanation,
        Endpoint::Simplify,
        Endpoint::ImportantWords,
        Endpoint::Ask,
        Endpoint::Pronunciation,
        Endpoint::VoiceToText,
        Endpoint::Translate,
        Endpoint::Summarise,
        Endpoint::WebSearch,
        Endpoint::WebSearchStream,
    ];

    /// Request path this endpoint is mounted at.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::ImageToText => "/api/v1/image-to-text",
            Self::PdfToText => "/api/v1/pdf-to-text",
            Self::ImportantWordsV1 => "/api/v1/important-words-from-text",
            Self::WordsExplanationV1 => "/api/v1/words-explanation",
            Self::MoreExplanations => "/api/v1/get-more-explanations",
            Self::RandomParagraph => "/api/v1/get-random-paragraph",
            Self::WordsExplanation => "/api/v2/words-explanation",
            Self::Simplify => "/api/v2/simplify",
            Self::ImportantWords => "/api/v2/important-words-from-text",
            Self::Ask => "/api/v2/ask",
            Self::Pronunciation => "/api/v2/pronunciation",
            Self::VoiceToText => "/api/v2/voice-to-text",
            Self::Translate => "/api/v2/translate",
            Self::Summarise => "/api/v2/summarise",
            Self::WebSearch => "/api/v2/web-search",
            Self::WebSearchStream => "/api/v2/web-search-stream",
        }
    }

    /// Stable counter key used in the usage ledger and rate-limit keys.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ImageToText => "image_to_text",
            Self::PdfToText => "pdf_to_text",
            Self::ImportantWordsV1 => "important_words_from_text_v1",
            Self::WordsExplanationV1 => "words_explanation_v1",
            Self::MoreExplanations => "get_more_explanations",
            Self::RandomParagraph => "get_random_paragraph",
            Self::WordsExplanation => "words_explanation",
            Self::Simplify => "simplify",
            Self::ImportantWords => "important_words_from_text_v2",
            Self::Ask => "ask",
            Self::Pronunciation => "pronunciation",
            Self::VoiceToText => "voice_to_text",
            Self::Translate => "translate",
            Self::Summarise => "summarise",
            Self::WebSearch => "web_search",
            Self::WebSearchStream => "web_search_stream",
        }
    }

    /// Resolve a request path to a metered endpoint, if it is one.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.path() == path)
    }

    /// Resolve a ledger counter key back to its endpoint.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.name() == name)
    }

    /// Default anonymous-lifetime ceiling for this endpoint.
    ///
    /// File-processing endpoints are the most expensive and get the tightest
    /// default; text-only endpoints are cheaper.
    #[must_use]
    pub const fn default_ceiling(self) -> u32 {
        match self {
            Self::ImageToText | Self::PdfToText | Self::VoiceToText => 3,
            Self::WebSearch | Self::WebSearchStream | Self::Pronunciation => 5,
            _ => 10,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-endpoint anonymous-usage ceilings, complete over [`Endpoint::ALL`].
#[derive(Debug, Clone)]
pub struct Ceilings {
    limits: HashMap<Endpoint, u32>,
}

impl Ceilings {
    /// Build the default ceiling table covering every endpoint.
    #[must_use]
    pub fn defaults() -> Self {
        let limits = Endpoint::ALL
            .iter()
            .map(|&e| (e, e.default_ceiling()))
            .collect();
        Self { limits }
    }

    /// Apply `path=limit` overrides on top of the defaults.
    ///
    /// # Errors
    /// Returns an error if an override names an unknown endpoint path or
    /// carries a malformed limit; unknown endpoints are rejected here, at
    /// startup, instead of being invented at runtime.
    pub fn with_overrides<'a, I>(mut self, overrides: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for entry in overrides {
            let (path, limit) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("invalid ceiling override (expected path=limit): {entry}"))?;
            let endpoint = Endpoint::from_path(path.trim())
                .ok_or_else(|| anyhow!("ceiling override names unknown endpoint: {path}"))?;
            let limit: u32 = limit
                .trim()
                .parse()
                .map_err(|_| anyhow!("invalid ceiling limit for {path}: {limit}"))?;
            self.limits.insert(endpoint, limit);
        }
        Ok(self)
    }

    /// Ceiling for a metered endpoint. Total over the closed enum.
    #[must_use]
    pub fn ceiling(&self, endpoint: Endpoint) -> u32 {
        // Complete by construction: defaults() covers every variant.
        self.limits
            .get(&endpoint)
            .copied()
            .unwrap_or_else(|| endpoint.default_ceiling())
    }

    /// Confirm the table covers every metered endpoint.
    ///
    /// # Errors
    /// Returns an error naming the first uncovered endpoint.
    pub fn validate(&self) -> Result<()> {
        for endpoint in Endpoint::ALL {
            if !self.limits.contains_key(&endpoint) {
                return Err(anyhow!("no ceiling configured for endpoint {endpoint}"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Ceilings, Endpoint};

    #[test]
    fn paths_round_trip() {
        for endpoint in Endpoint::ALL {
            assert_eq!(Endpoint::from_path(endpoint.path()), Some(endpoint));
            assert_eq!(Endpoint::from_name(endpoint.name()), Some(endpoint));
        }
    }

    #[test]
    fn unknown_path_is_not_metered() {
        assert_eq!(Endpoint::from_path("/api/v2/made-up"), None);
        assert_eq!(Endpoint::from_path("/health"), None);
    }

    #[test]
    fn defaults_cover_every_endpoint() {
        let ceilings = Ceilings::defaults();
        assert!(ceilings.validate().is_ok());
        assert_eq!(ceilings.ceiling(Endpoint::ImageToText), 3);
        assert_eq!(ceilings.ceiling(Endpoint::WordsExplanation), 10);
    }

    #[test]
    fn overrides_replace_defaults() {
        let ceilings = Ceilings::defaults()
            .with_overrides(["/api/v2/words-explanation=5"])
            .expect("valid override");
        assert_eq!(ceilings.ceiling(Endpoint::WordsExplanation), 5);
        assert_eq!(ceilings.ceiling(Endpoint::Simplify), 10);
    }

    #[test]
    fn overrides_reject_unknown_endpoint() {
        let result = Ceilings::defaults().with_overrides(["/api/v3/new-thing=5"]);
        assert!(result.is_err());
    }

    #[test]
    fn overrides_reject_malformed_entries() {
        assert!(Ceilings::defaults().with_overrides(["no-equals"]).is_err());
        assert!(
            Ceilings::defaults()
                .with_overrides(["/api/v2/ask=lots"])
                .is_err()
        );
    }
}
