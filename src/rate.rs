use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use crate::freq::{chi_squared, frequencies};
use crate::score::{count_recognized_words, Dictionary, WordStats};
use crate::vigenere::{decrypt, Key};

pub const PERCENTAGE_WEIGHT : f64 = 0.7;
pub const WEIGHTED_SCORE_WEIGHT : f64 = 15.0;
pub const CHI_SQUARED_WEIGHT : f64 = 0.2;

/// Characters of decrypted text kept on each candidate.
pub const PREVIEW_CHARS : usize = 200;

#[derive(Clone, Debug, Serialize)]
pub struct ScoredCandidate {
    pub key : Key,
    pub decrypted_preview : String,
    pub word_stats : WordStats,
    pub chi_squared : f64,
    pub composite_score : f64,
}

pub fn composite_score(word_stats : &WordStats, chi_squared : f64) -> f64 {
    word_stats.percentage * PERCENTAGE_WEIGHT
        + word_stats.weighted_score * WEIGHTED_SCORE_WEIGHT
        - chi_squared * CHI_SQUARED_WEIGHT
}

pub fn rate(key : &Key, ciphertext : &str, dictionary : &Dictionary) -> ScoredCandidate {
    let decrypted = decrypt(ciphertext, key);
    let word_stats = count_recognized_words(&decrypted, dictionary);
    let chi = chi_squared(&frequencies(&decrypted));

    ScoredCandidate {
        key: key.clone(),
        decrypted_preview: decrypted.chars().take(PREVIEW_CHARS).collect(),
        word_stats,
        chi_squared: chi,
        composite_score: composite_score(&word_stats, chi),
    }
}

/// Rates every key, best first.
pub fn rate_all<'a, I>(keys : I, ciphertext : &str, dictionary : &Dictionary) -> Vec<ScoredCandidate>
    where I : IntoIterator<Item = &'a Key> {

    let mut rated : Vec<ScoredCandidate> = keys.into_iter()
        .map(|k| rate(k, ciphertext, dictionary))
        .collect();

    rated.sort_by(|a, b| b.cmp(a));

    rated
}

impl PartialEq for ScoredCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.composite_score == other.composite_score
    }
}

impl Eq for ScoredCandidate {}

impl PartialOrd for ScoredCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.composite_score.total_cmp(&other.composite_score)
    }
}

impl Display for ScoredCandidate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Candidate ( Key = {} Score = {:.3} Words = {:.1}% ({}/{}) Chi2 = {:.3} Decrypt = {} )",
            self.key, self.composite_score, self.word_stats.percentage,
            self.word_stats.recognized_count, self.word_stats.total_words,
            self.chi_squared, self.decrypted_preview)
    }
}
