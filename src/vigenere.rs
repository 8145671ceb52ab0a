use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CrackError, Result};

pub const ALPHABET : &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A Vigenère key: a non-empty run of uppercase letters, each one a Caesar shift.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Key(Vec<u8>);

impl Key {
    pub fn parse(s : &str) -> Result<Self> {
        let s = s.trim();

        if s.is_empty() {
            return Err(CrackError::invalid("key is empty"));
        }

        if let Some(bad) = s.chars().find(|c| !c.is_ascii_alphabetic()) {
            return Err(CrackError::invalid(format!("key {:?} contains non-letter {:?}", s, bad)));
        }

        Ok(Key(s.bytes().map(|b| b.to_ascii_uppercase()).collect()))
    }

    /// Builds a key from shift values, each reduced mod 26.
    pub fn from_shifts(shifts : &[u8]) -> Option<Self> {
        if shifts.is_empty() {
            return None;
        }

        Some(Key(shifts.iter().map(|s| b'A' + s % 26).collect()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        // Only ever holds A-Z.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    pub fn shift_at(&self, i : usize) -> u8 {
        self.0[i % self.0.len()] - b'A'
    }

    /// Replaces the letter at `pos`. `letter` must be an uppercase ASCII letter.
    pub fn with_letter(&self, pos : usize, letter : u8) -> Key {
        debug_assert!(letter.is_ascii_uppercase());
        let mut key = self.clone();
        key.0[pos] = letter;
        key
    }

    pub fn with_swapped(&self, a : usize, b : usize) -> Key {
        let mut key = self.clone();
        key.0.swap(a, b);
        key
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Key {
    type Error = CrackError;

    fn try_from(s : String) -> Result<Self> {
        Key::parse(&s)
    }
}

impl From<Key> for String {
    fn from(key : Key) -> String {
        key.to_string()
    }
}

fn shift_letter(c : char, shift : u8, forward : bool) -> char {
    let base = if c.is_ascii_uppercase() { b'A' } else { b'a' };
    let idx = c as u8 - base;
    let idx = if forward {
        (idx + shift) % 26
    } else {
        (idx + 26 - shift % 26) % 26
    };

    (base + idx) as char
}

fn transform(text : &str, key : &Key, forward : bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    for c in text.chars() {
        if c.is_ascii_alphabetic() {
            out.push(shift_letter(c, key.shift_at(i), forward));
            i += 1;
        } else {
            out.push(c);
        }
    }

    out
}

/// Decrypts `text`, preserving case. Non-letters pass through and do not advance the key.
pub fn decrypt(text : &str, key : &Key) -> String {
    transform(text, key, false)
}

pub fn encrypt(text : &str, key : &Key) -> String {
    transform(text, key, true)
}

/// Constant Caesar decryption by `shift`.
pub fn caesar_shift(text : &str, shift : u8) -> String {
    text.chars()
        .map(|c| if c.is_ascii_alphabetic() { shift_letter(c, shift, false) } else { c })
        .collect()
}

/// The letters of `text`, uppercased, everything else dropped.
pub fn letters(text : &str) -> Vec<u8> {
    text.bytes()
        .filter(|b| b.is_ascii_alphabetic())
        .map(|b| b.to_ascii_uppercase())
        .collect()
}

pub fn decrypt_with_key(ciphertext : &str, key : &str) -> Result<String> {
    if ciphertext.is_empty() {
        return Err(CrackError::invalid("ciphertext is required"));
    }

    if key.trim().is_empty() {
        return Err(CrackError::invalid("key is required"));
    }

    let key = Key::parse(key)?;
    Ok(decrypt(ciphertext, &key))
}
