//! Token estimation shared by the chunker, outline and retrieval budgets

use crate::model::TokenCount;
use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

static BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn bpe() -> Option<&'static CoreBPE> {
    BPE.get_or_init(|| tiktoken_rs::cl100k_base().ok()).as_ref()
}

/// Build the BPE tables up front so parallel workers don't race to do it.
pub fn warm_bpe() {
    let _ = bpe();
}

/// Estimate token count using tiktoken-rs
pub fn estimate_tokens(text: &str) -> TokenCount {
    if text.is_empty() {
        return TokenCount::ZERO;
    }
    // cl100k_base (GPT-4/Claude compatible)
    let count = match bpe() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        // Fallback: rough estimate of 4 chars per token
        None => (text.len() / 4).max(1),
    };
    TokenCount::new(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        let text = "Hello, world!";
        let tokens = estimate_tokens(text).get();
        assert!(tokens > 0);
        assert!(tokens < text.len());
    }

    #[test]
    fn empty_text_costs_nothing() {
        assert_eq!(estimate_tokens(""), TokenCount::ZERO);
    }
}
