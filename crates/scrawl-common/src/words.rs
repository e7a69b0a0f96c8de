use std::fs;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::game::WORD_CHOICES;

/// The candidate words offered to each drawer, loaded once at startup.
///
/// Validation happens at load time: a list too small to offer
/// [`WORD_CHOICES`] distinct words is a configuration error, never a
/// per-round failure.
#[derive(Debug, Clone)]
pub struct WordBank {
    words: Vec<String>,
}

impl WordBank {
    /// Build a bank from an already-loaded list. Blank entries are dropped.
    pub fn new(words: Vec<String>) -> Result<Self, WordBankError> {
        let words: Vec<String> = words
            .into_iter()
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
        if words.len() < WORD_CHOICES {
            return Err(WordBankError::NotEnoughWords {
                found: words.len(),
                needed: WORD_CHOICES,
            });
        }
        Ok(Self { words })
    }

    /// Load from a flat word-list file: one word per line, blank lines and
    /// `#` comments skipped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WordBankError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|source| WordBankError::Io {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        let words = contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(String::from)
            .collect();
        Self::new(words)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Draw `n` distinct words in random order, without replacement.
    /// `n` is capped by the construction-time check, so a full triple is
    /// always available.
    pub fn sample(&self, n: usize, rng: &mut impl Rng) -> Vec<String> {
        self.words.choose_multiple(rng, n).cloned().collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WordBankError {
    #[error("word list has {found} usable words, need at least {needed}")]
    NotEnoughWords { found: usize, needed: usize },
    #[error("failed to read word list {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn bank(words: &[&str]) -> WordBank {
        WordBank::new(words.iter().map(|w| w.to_string()).collect()).unwrap()
    }

    #[test]
    fn test_sample_returns_distinct_words() {
        let bank = bank(&["cat", "dog", "fish", "bird", "horse"]);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let sampled = bank.sample(3, &mut rng);
            assert_eq!(sampled.len(), 3);
            let mut deduped = sampled.clone();
            deduped.sort();
            deduped.dedup();
            assert_eq!(deduped.len(), 3);
        }
    }

    #[test]
    fn test_too_small_list_is_a_construction_error() {
        let err = WordBank::new(vec!["cat".into(), "dog".into()]).unwrap_err();
        assert!(matches!(
            err,
            WordBankError::NotEnoughWords { found: 2, needed: 3 }
        ));
    }

    #[test]
    fn test_blank_entries_do_not_count() {
        let err = WordBank::new(vec!["cat".into(), "  ".into(), "dog".into(), String::new()]);
        assert!(err.is_err());
    }

    #[test]
    fn test_entries_are_trimmed() {
        let bank = bank(&["  cat ", "dog", "fish"]);
        let mut rng = StdRng::seed_from_u64(1);
        let sampled = bank.sample(3, &mut rng);
        assert!(sampled.iter().any(|w| w == "cat"));
    }
}
