use std::cmp::Ordering;

use serde::Serialize;

use crate::freq::{chi_squared, frequencies, ENGLISH_FREQUENCIES};
use crate::vigenere::caesar_shift;

/// Shifts kept per key position when building candidate keys.
pub const KEY_SEARCH_SHIFTS : usize = 3;

/// Shifts kept per position in analysis reports.
pub const GENERAL_SHIFTS : usize = 8;

const DISTRIBUTION_WEIGHT : f64 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ShiftScore {
    pub shift : u8,
    pub letter : char,
    pub chi_squared : f64,
    pub distribution : f64,
    pub combined : f64,
}

pub fn score_shift(column : &str, shift : u8) -> ShiftScore {
    let table = frequencies(&caesar_shift(column, shift));
    let chi = chi_squared(&table);

    let distribution : f64 = table.freqs.iter()
        .zip(ENGLISH_FREQUENCIES.iter())
        .map(|(f, r)| f * r * 100.0)
        .sum();

    ShiftScore {
        shift,
        letter: (b'A' + shift) as char,
        chi_squared: chi,
        distribution,
        combined: chi - DISTRIBUTION_WEIGHT * distribution,
    }
}

/// The `top_n` most English-looking shifts for one column, best (lowest combined) first.
pub fn best_shifts(column : &str, top_n : usize) -> Vec<ShiftScore> {
    let mut scores : Vec<ShiftScore> = (0..26u8)
        .map(|s| score_shift(column, s))
        .collect();

    scores.sort_by(|a, b| a.combined.partial_cmp(&b.combined).unwrap_or(Ordering::Equal));
    scores.truncate(top_n);

    scores
}
