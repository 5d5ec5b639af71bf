use jieba_rs::Jieba;
use tracing::info;

/// Splits message text into word tokens
pub trait Tokenizer: Send + Sync {
    fn tokenize<'a>(&self, text: &'a str) -> Vec<&'a str>;
}

/// Chinese-aware segmentation backed by jieba's bundled dictionary.
pub struct JiebaTokenizer {
    jieba: Jieba,
}

impl JiebaTokenizer {
    pub fn new() -> Self {
        let jieba = Jieba::new();
        info!("Jieba dictionary loaded");
        Self { jieba }
    }
}

impl Default for JiebaTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for JiebaTokenizer {
    fn tokenize<'a>(&self, text: &'a str) -> Vec<&'a str> {
        // jieba emits the separating whitespace as tokens of its own
        self.jieba
            .cut(text, true)
            .into_iter()
            .filter(|token| !token.trim().is_empty())
            .collect()
    }
}

/// Plain whitespace splitting, for transcripts that are already segmented
#[cfg(test)]
pub struct WhitespaceTokenizer;

#[cfg(test)]
impl Tokenizer for WhitespaceTokenizer {
    fn tokenize<'a>(&self, text: &'a str) -> Vec<&'a str> {
        text.split_whitespace().collect()
    }
}
