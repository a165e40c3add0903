//! Three-tier token estimation, cheapest-available tier wins: an external
//! tokenizer if the caller wired one in, a hybrid words/punctuation
//! formula otherwise, and a flat `chars / 4` fallback when even that
//! can't be computed (the tier never fails — it degrades).

pub trait ExternalTokenizer {
    fn count_tokens(&self, text: &str) -> Option<u32>;
}

/// `words * 1.3 + punctuation * 0.3`, an approximation that tracks BPE
/// tokenizers closely enough for budget-truncation purposes without
/// depending on one.
fn hybrid_estimate(text: &str) -> u32 {
    let words = text.split_whitespace().count() as f64;
    let punctuation = text.chars().filter(|c| c.is_ascii_punctuation()).count() as f64;
    ((words * 1.3) + (punctuation * 0.3)).ceil() as u32
}

fn char_fallback(text: &str) -> u32 {
    ((text.chars().count() as f64) / 4.0).ceil() as u32
}

pub fn estimate_tokens(text: &str, external: Option<&dyn ExternalTokenizer>) -> u32 {
    if let Some(tokenizer) = external {
        if let Some(n) = tokenizer.count_tokens(text) {
            return n;
        }
    }
    if text.split_whitespace().next().is_some() {
        hybrid_estimate(text)
    } else {
        char_fallback(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysNone;
    impl ExternalTokenizer for AlwaysNone {
        fn count_tokens(&self, _text: &str) -> Option<u32> {
            None
        }
    }

    struct Fixed(u32);
    impl ExternalTokenizer for Fixed {
        fn count_tokens(&self, _text: &str) -> Option<u32> {
            Some(self.0)
        }
    }

    #[test]
    fn external_tokenizer_wins_when_available() {
        let n = estimate_tokens("hello world", Some(&Fixed(7)));
        assert_eq!(n, 7);
    }

    #[test]
    fn falls_back_to_hybrid_when_external_returns_none() {
        let n = estimate_tokens("hello world, how are you?", Some(&AlwaysNone));
        assert!(n > 0);
    }

    #[test]
    fn falls_back_to_char_estimate_for_whitespace_only_text() {
        let n = estimate_tokens("    ", None);
        assert_eq!(n, char_fallback("    "));
    }

    #[test]
    fn hybrid_estimate_scales_with_length() {
        let short = estimate_tokens("one two three", None);
        let long = estimate_tokens("one two three four five six seven eight", None);
        assert!(long > short);
    }
}
