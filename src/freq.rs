use std::cmp::Ordering;

use crate::vigenere::{letters, ALPHABET};

/// Reference English letter frequencies, A through Z.
pub const ENGLISH_FREQUENCIES : [f64; 26] = [
    0.08167, 0.01492, 0.02782, 0.04253, 0.12702, 0.02228, 0.02015,
    0.06094, 0.06966, 0.00153, 0.00772, 0.04025, 0.02406, 0.06749,
    0.07507, 0.01929, 0.00095, 0.05987, 0.06327, 0.09056, 0.02758,
    0.00978, 0.02360, 0.00150, 0.01974, 0.00074,
];

/// Fraction of each letter A-Z in a text. All zero when the text had no letters.
#[derive(Clone, Debug, PartialEq)]
pub struct FrequencyTable {
    pub freqs : [f64; 26],
    pub total : usize,
}

impl FrequencyTable {
    pub fn reference() -> Self {
        FrequencyTable { freqs: ENGLISH_FREQUENCIES, total: 0 }
    }

    pub fn get(&self, letter : char) -> f64 {
        let letter = letter.to_ascii_uppercase();
        if letter.is_ascii_uppercase() {
            self.freqs[(letter as u8 - b'A') as usize]
        } else {
            0.0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Letters ordered from most to least frequent.
    pub fn ranked(&self) -> Vec<(char, f64)> {
        let mut ranked : Vec<(char, f64)> = ALPHABET.chars()
            .zip(self.freqs.iter().copied())
            .collect();

        ranked.sort_by(|p1, p2| p2.1.partial_cmp(&p1.1).unwrap_or(Ordering::Equal));

        ranked
    }
}

impl From<&str> for FrequencyTable {
    fn from(text : &str) -> Self {
        frequencies(text)
    }
}

impl std::fmt::Display for FrequencyTable {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "Freq {{")?;

        let mut count = 0;
        for p in self.ranked() {
            write!(f, "({}, {:.4}) ", p.0, p.1)?;

            count += 1;
            if count == 4 {
                writeln!(f)?;
                count = 0
            }
        }

        if count != 0 {
            writeln!(f)?;
        }

        writeln!(f, "letters = {}", self.total)?;
        writeln!(f, "}}")?;

        Ok(())
    }
}

fn letter_counts(cleaned : &[u8]) -> [usize; 26] {
    let mut counts = [0usize; 26];

    for b in cleaned {
        counts[(b - b'A') as usize] += 1;
    }

    counts
}

pub fn frequencies(text : &str) -> FrequencyTable {
    let cleaned = letters(text);
    let total = cleaned.len();
    let mut freqs = [0.0; 26];

    if total > 0 {
        for (f, n) in freqs.iter_mut().zip(letter_counts(&cleaned).iter()) {
            *f = *n as f64 / total as f64;
        }
    }

    FrequencyTable { freqs, total }
}

/// IC over already cleaned uppercase letters.
pub fn index_of_coincidence_letters(cleaned : &[u8]) -> f64 {
    let n = cleaned.len();
    if n <= 1 {
        return 0.0;
    }

    let sum : usize = letter_counts(cleaned).iter()
        .map(|c| c * c.saturating_sub(1))
        .sum();

    sum as f64 / (n * (n - 1)) as f64
}

pub fn index_of_coincidence(text : &str) -> f64 {
    index_of_coincidence_letters(&letters(text))
}

pub fn chi_squared(table : &FrequencyTable) -> f64 {
    table.freqs.iter()
        .zip(ENGLISH_FREQUENCIES.iter())
        .filter(|(_, expected)| **expected > 0.0)
        .map(|(observed, expected)| (observed - expected).powi(2) / expected)
        .sum()
}
