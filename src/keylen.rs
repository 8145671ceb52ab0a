use std::cmp::Ordering;

use serde::Serialize;

use crate::freq::index_of_coincidence_letters;
use crate::vigenere::letters;

/// How many key lengths the search goes on to try.
pub const TOP_KEY_LENGTHS : usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct KeyLengthScore {
    pub length : usize,
    pub average_ic : f64,
}

/// Deals the letters out into `len` columns: letter `i` goes to column `i % len`.
pub fn split_columns(cleaned : &[u8], len : usize) -> Vec<Vec<u8>> {
    let mut columns = vec![Vec::with_capacity(cleaned.len() / len.max(1) + 1); len];

    for (i, b) in cleaned.iter().enumerate() {
        columns[i % len].push(*b);
    }

    columns
}

fn average_ic(cleaned : &[u8], len : usize) -> f64 {
    let columns = split_columns(cleaned, len);

    let sum : f64 = columns.iter()
        .map(|c| index_of_coincidence_letters(c))
        .sum();

    sum / len as f64
}

/// Every length in `1..=max_key_length`, best first. Ties keep the shorter length ahead.
pub fn rank_key_lengths(ciphertext : &str, max_key_length : usize) -> Vec<KeyLengthScore> {
    let cleaned = letters(ciphertext);

    let mut scores : Vec<KeyLengthScore> = (1..=max_key_length)
        .map(|length| KeyLengthScore { length, average_ic: average_ic(&cleaned, length) })
        .collect();

    scores.sort_by(|a, b| b.average_ic.partial_cmp(&a.average_ic).unwrap_or(Ordering::Equal));

    for s in &scores {
        tracing::trace!("Key length {} average IC {:.5}", s.length, s.average_ic);
    }

    scores
}

pub fn estimate_key_lengths(ciphertext : &str, max_key_length : usize) -> Vec<usize> {
    rank_key_lengths(ciphertext, max_key_length)
        .into_iter()
        .take(TOP_KEY_LENGTHS)
        .map(|s| s.length)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vigenere::{encrypt, Key};

    const PLAIN : &str = "It is a truth universally acknowledged, that a single man in \
        possession of a good fortune, must be in want of a wife. However little known \
        the feelings or views of such a man may be on his first entering a neighbourhood, \
        this truth is so well fixed in the minds of the surrounding families, that he is \
        considered the rightful property of some one or other of their daughters.";

    #[test]
    fn columns_are_interleaved() {
        let cols = split_columns(b"ABCDEFG", 3);
        assert_eq!(cols, vec![b"ADG".to_vec(), b"BE".to_vec(), b"CF".to_vec()]);
    }

    #[test]
    fn finds_true_length() {
        let cipher = encrypt(PLAIN, &Key::parse("CODE").unwrap());
        let lengths = estimate_key_lengths(&cipher, 10);

        assert_eq!(lengths.len(), TOP_KEY_LENGTHS);
        // Multiples of the period score as well as the period itself.
        assert!(lengths.iter().any(|l| l % 4 == 0));
    }

    #[test]
    fn ranks_every_length() {
        let ranked = rank_key_lengths("ABCABCABCABC", 5);
        assert_eq!(ranked.len(), 5);
        assert_eq!(ranked[0].length, 3);
        assert_eq!(ranked[0].average_ic, 1.0);
    }

    #[test]
    fn short_text() {
        assert_eq!(estimate_key_lengths("ab", 2), vec![1, 2]);
        assert!(estimate_key_lengths("", 0).is_empty());
    }
}
