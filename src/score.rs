use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{CrackError, Result};
use crate::vigenere::Key;

/// Words shorter than this are neither stored nor counted.
pub const MIN_WORD_LEN : usize = 2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WordStats {
    pub recognized_count : usize,
    pub total_words : usize,
    pub percentage : f64,
    pub weighted_score : f64,
}

/// Lowercase word to weight. Built once, then only read.
#[derive(Debug, Default)]
pub struct Dictionary {
    words : FnvHashMap<String, f64>,
}

impl Dictionary {
    /// Weights grow with word length and with how early the word sits in the
    /// rank-ordered list: `sqrt(len) * (1 + (n - rank) / n)`.
    pub fn from_ranked_words<I, S>(words : I) -> Self
        where I : IntoIterator<Item = S>, S : AsRef<str> {

        let cleaned : Vec<String> = words.into_iter()
            .filter_map(|w| {
                let w = w.as_ref().trim();
                if w.len() >= MIN_WORD_LEN && w.chars().all(|c| c.is_ascii_alphabetic()) {
                    Some(w.to_ascii_lowercase())
                } else {
                    None
                }
            })
            .collect();

        let n = cleaned.len() as f64;
        let mut map = FnvHashMap::default();

        for (rank, word) in cleaned.into_iter().enumerate() {
            let boost = 1.0 + (n - rank as f64) / n;
            let weight = (word.len() as f64).sqrt() * boost;

            map.entry(word).or_insert(weight);
        }

        Dictionary { words: map }
    }

    pub fn from_weighted<I, S>(words : I) -> Self
        where I : IntoIterator<Item = (S, f64)>, S : AsRef<str> {

        let words = words.into_iter()
            .filter(|(_, w)| *w > 0.0)
            .map(|(s, w)| (s.as_ref().to_ascii_lowercase(), w))
            .collect();

        Dictionary { words }
    }

    /// One word per line, most frequent first. Only the first token of a line is used.
    pub fn load<P: AsRef<Path>>(path : P) -> Result<Self> {
        let lines = read_lines(path.as_ref())?;

        let dict = Dictionary::from_ranked_words(lines.iter()
            .filter_map(|l| l.split_ascii_whitespace().next()));

        tracing::info!("Loaded {} dictionary words from {:?}", dict.len(), path.as_ref());

        Ok(dict)
    }

    pub fn weight(&self, word : &str) -> Option<f64> {
        self.words.get(word).copied()
    }

    pub fn contains(&self, word : &str) -> bool {
        self.words.contains_key(word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

fn read_lines(path : &Path) -> Result<Vec<String>> {
    let io_err = |source| CrackError::Io { path: path.to_path_buf(), source };

    let file = File::open(path).map_err(io_err)?;

    BufReader::new(file)
        .lines()
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(io_err)
}

/// One key per line. Blank lines and `#` comments are skipped.
pub fn load_known_keys<P: AsRef<Path>>(path : P) -> Result<Vec<Key>> {
    let keys = read_lines(path.as_ref())?
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(Key::parse)
        .collect::<Result<Vec<_>>>()?;

    tracing::info!("Loaded {} known keys from {:?}", keys.len(), path.as_ref());

    Ok(keys)
}

pub fn count_recognized_words(text : &str, dictionary : &Dictionary) -> WordStats {
    let mut total_words = 0;
    let mut recognized_count = 0;
    let mut total_weight = 0.0;

    let tokens = text.split(|c: char| !c.is_ascii_alphabetic())
        .filter(|t| t.len() >= MIN_WORD_LEN);

    for token in tokens {
        total_words += 1;

        if let Some(weight) = dictionary.weight(&token.to_ascii_lowercase()) {
            recognized_count += 1;
            total_weight += weight;
        }
    }

    if total_words == 0 {
        return WordStats::default();
    }

    WordStats {
        recognized_count,
        total_words,
        percentage: recognized_count as f64 / total_words as f64 * 100.0,
        weighted_score: total_weight / total_words as f64,
    }
}
