use std::fmt;
use std::fmt::{Display, Formatter};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::score::{count_recognized_words, Dictionary, WordStats};
use crate::vigenere::{decrypt, Key, ALPHABET};

/// Non-improving iterations allowed after the target is reached.
const GRACE_ITERATIONS : usize = 10;

/// Stagnation after which adjacent swaps are tried.
const SWAP_STAGNATION : usize = 5;

#[derive(Clone, Debug, Serialize)]
pub struct RefinementResult {
    pub final_key : Key,
    pub improved : bool,
    pub iterations : usize,
    pub word_stats : WordStats,
    pub decrypted : String,
}

impl Display for RefinementResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "RefineResult ( Key = {} Improved = {} Iterations = {} Words = {:.1}% )",
            self.final_key, self.improved, self.iterations, self.word_stats.percentage)
    }
}

struct Evaluated {
    key : Key,
    stats : WordStats,
    decrypted : String,
}

struct Climber<'a> {
    ciphertext : &'a str,
    dictionary : &'a Dictionary,
    best : Evaluated,
}

fn evaluate(ciphertext : &str, dictionary : &Dictionary, key : Key) -> Evaluated {
    let decrypted = decrypt(ciphertext, &key);
    let stats = count_recognized_words(&decrypted, dictionary);
    Evaluated { key, stats, decrypted }
}

impl<'a> Climber<'a> {
    /// Takes `candidate` as the new best if it strictly beats it.
    fn offer(&mut self, candidate : Key) -> bool {
        let evaluated = evaluate(self.ciphertext, self.dictionary, candidate);

        if evaluated.stats.percentage > self.best.stats.percentage {
            self.best = evaluated;
            true
        } else {
            false
        }
    }

    fn try_single_letters<R: Rng>(&mut self, current : &Key, rng : &mut R) -> Option<Key> {
        let mut letters : Vec<u8> = Vec::from(ALPHABET);

        for pos in 0..current.len() {
            letters.shuffle(rng);

            for &letter in &letters {
                if letter == current.as_bytes()[pos] {
                    continue;
                }

                let candidate = current.with_letter(pos, letter);
                if self.offer(candidate.clone()) {
                    return Some(candidate);
                }
            }
        }

        None
    }

    fn try_adjacent_swaps(&mut self, current : &Key) -> Option<Key> {
        for pos in 0..current.len().saturating_sub(1) {
            if current.as_bytes()[pos] == current.as_bytes()[pos + 1] {
                continue;
            }

            let candidate = current.with_swapped(pos, pos + 1);
            if self.offer(candidate.clone()) {
                return Some(candidate);
            }
        }

        None
    }
}

/// Random substitutions for a stagnant search: one more every three stagnant
/// iterations, never more than half the key.
fn mutation_strength(stagnation : usize, key_len : usize) -> usize {
    std::cmp::min(stagnation / 3 + 1, key_len / 2)
}

fn random_mutation<R: Rng>(key : &Key, count : usize, rng : &mut R) -> Key {
    let mut key = key.clone();

    for _ in 0..count {
        let pos = rng.gen_range(0, key.len());
        let letter = b'A' + rng.gen_range(0, 26u8);
        key = key.with_letter(pos, letter);
    }

    key
}

/// Hill-climbs from `seed` on word recognition percentage.
///
/// Each iteration tries single-letter changes at every position (letters in
/// random order), then adjacent swaps once stagnant for more than five
/// iterations, and finally perturbs the working key with a number of random
/// substitutions that grows with stagnation. Only strict improvements replace
/// the best key, so the result never scores below the seed.
pub fn refine_key<R: Rng>(
    seed : &Key,
    ciphertext : &str,
    dictionary : &Dictionary,
    target_percentage : f64,
    max_iterations : usize,
    rng : &mut R) -> RefinementResult {

    let mut climber = Climber {
        ciphertext,
        dictionary,
        best: evaluate(ciphertext, dictionary, seed.clone()),
    };

    let seed_score = climber.best.stats.percentage;
    let mut current = seed.clone();
    let mut iterations = 0;
    let mut last_improved = 0;

    while (climber.best.stats.percentage < target_percentage && iterations < max_iterations)
        || (iterations < max_iterations && iterations - last_improved < GRACE_ITERATIONS) {

        iterations += 1;

        let mut next = climber.try_single_letters(&current, rng);

        if next.is_none() && iterations - last_improved > SWAP_STAGNATION {
            next = climber.try_adjacent_swaps(&current);
        }

        match next {
            Some(key) => {
                tracing::trace!("Iteration {}: {} -> {:.1}%", iterations, key, climber.best.stats.percentage);
                current = key;
                last_improved = iterations;
            },
            None => {
                let strength = mutation_strength(iterations - last_improved, current.len());

                if strength > 0 {
                    let mutated = random_mutation(&current, strength, rng);
                    if climber.offer(mutated.clone()) {
                        last_improved = iterations;
                    }
                    current = mutated;
                }
            }
        }
    }

    let improved = climber.best.stats.percentage > seed_score;

    tracing::debug!("Refined {} -> {} in {} iterations ({:.1}% -> {:.1}%)",
        seed, climber.best.key, iterations, seed_score, climber.best.stats.percentage);

    RefinementResult {
        final_key: climber.best.key,
        improved,
        iterations,
        word_stats: climber.best.stats,
        decrypted: climber.best.decrypted,
    }
}
