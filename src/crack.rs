//! Top-level key recovery strategies.
//!
//! Brute force rates a caller supplied list of keys. Cryptanalysis searches
//! blind: key lengths by index of coincidence, per-column shifts by letter
//! frequency, then candidate keys by the composite rating. Both finish by
//! hill-climbing from their best key and rank results with the same formula.

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::combine::combine_shifts;
use crate::config::{validate_search_params, CrackConfig};
use crate::error::{CrackError, Result, MIN_CRYPTANALYSIS_LETTERS};
use crate::freq::{frequencies, index_of_coincidence_letters};
use crate::keylen::{estimate_key_lengths, rank_key_lengths, split_columns, KeyLengthScore};
use crate::rate::{rate, rate_all, ScoredCandidate};
use crate::refine::refine_key;
use crate::score::Dictionary;
use crate::shift::{best_shifts, ShiftScore, GENERAL_SHIFTS, KEY_SEARCH_SHIFTS};
use crate::vigenere::{decrypt, letters, Key};

/// Results kept on a `CrackResult`.
pub const MAX_RESULTS : usize = 5;

pub const NO_VIABLE_KEY : &str = "No viable key found";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrackMethod {
    BruteForce,
    BruteForceWithRefinement,
    Cryptanalysis,
}

impl fmt::Display for CrackMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CrackMethod::BruteForce => "brute-force",
            CrackMethod::BruteForceWithRefinement => "brute-force-with-refinement",
            CrackMethod::Cryptanalysis => "cryptanalysis",
        })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CrackResult {
    pub top_results : Vec<ScoredCandidate>,
    pub full_decryption : String,
    pub method : CrackMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message : Option<String>,
}

impl CrackResult {
    fn no_viable_key(method : CrackMethod, detail : &str) -> Self {
        CrackResult {
            top_results: Vec::new(),
            full_decryption: String::new(),
            method,
            message: Some(format!("{}: {}", NO_VIABLE_KEY, detail)),
        }
    }

    fn from_ranked(top_results : Vec<ScoredCandidate>, ciphertext : &str, method : CrackMethod) -> Self {
        let full_decryption = top_results.first()
            .map(|c| decrypt(ciphertext, &c.key))
            .unwrap_or_default();

        CrackResult { top_results, full_decryption, method, message: None }
    }

    pub fn best(&self) -> Option<&ScoredCandidate> {
        self.top_results.first()
    }
}

/// A crack request as it arrives from outside, before validation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CrackRequest {
    pub ciphertext : String,
    pub max_key_length : usize,
    pub target_recognition : f64,
    pub max_iterations : usize,
    pub use_brute_force : bool,
    pub known_keys : Vec<String>,
    /// Fixes the random source for reproducible refinement
    pub seed : Option<u64>,
}

impl Default for CrackRequest {
    fn default() -> Self {
        CrackRequest::with_config(String::new(), &CrackConfig::default())
    }
}

impl CrackRequest {
    pub fn with_config(ciphertext : String, config : &CrackConfig) -> Self {
        CrackRequest {
            ciphertext,
            max_key_length: config.max_key_length,
            target_recognition: config.target_recognition,
            max_iterations: config.max_iterations,
            use_brute_force: false,
            known_keys: Vec::new(),
            seed: None,
        }
    }

    pub fn validate(self, dictionary : Arc<Dictionary>) -> Result<CrackTask> {
        if self.ciphertext.trim().is_empty() {
            return Err(CrackError::invalid("ciphertext is required"));
        }

        validate_search_params(self.max_key_length, self.target_recognition, self.max_iterations)?;

        let known_keys = if self.use_brute_force {
            self.known_keys.iter()
                .map(|k| Key::parse(k))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        if let Some(k) = known_keys.iter().find(|k| k.len() > self.max_key_length) {
            return Err(CrackError::invalid(format!(
                "known key {} is longer than max_key_length {}", k, self.max_key_length)));
        }

        Ok(CrackTask {
            ciphertext: self.ciphertext,
            max_key_length: self.max_key_length,
            target_recognition: self.target_recognition,
            max_iterations: self.max_iterations,
            use_brute_force: self.use_brute_force,
            known_keys,
            seed: self.seed,
            dictionary,
        })
    }
}

/// A validated unit of work.
#[derive(Clone, Debug)]
pub struct CrackTask {
    pub ciphertext : String,
    pub max_key_length : usize,
    pub target_recognition : f64,
    pub max_iterations : usize,
    pub use_brute_force : bool,
    pub known_keys : Vec<Key>,
    pub seed : Option<u64>,
    pub dictionary : Arc<Dictionary>,
}

pub fn crack<R: Rng>(task : &CrackTask, rng : &mut R) -> Result<CrackResult> {
    if task.use_brute_force {
        Ok(brute_force(&task.ciphertext, &task.known_keys, &task.dictionary,
            task.target_recognition, task.max_iterations, rng))
    } else {
        cryptanalysis(&task.ciphertext, &task.dictionary, task.max_key_length,
            task.target_recognition, task.max_iterations, rng)
    }
}

/// Puts `candidate` at the head of `ranked`, dropping any entry with the same key.
fn promote(ranked : &mut Vec<ScoredCandidate>, candidate : ScoredCandidate) {
    ranked.retain(|c| c.key != candidate.key);
    ranked.insert(0, candidate);
    ranked.truncate(MAX_RESULTS);
}

pub fn brute_force<R: Rng>(
    ciphertext : &str,
    known_keys : &[Key],
    dictionary : &Dictionary,
    target_recognition : f64,
    max_iterations : usize,
    rng : &mut R) -> CrackResult {

    if known_keys.is_empty() {
        return CrackResult::no_viable_key(CrackMethod::BruteForce, "no known keys supplied");
    }

    let mut ranked = rate_all(known_keys, ciphertext, dictionary);
    ranked.truncate(MAX_RESULTS);

    let best = &ranked[0];
    tracing::info!("Brute force over {} keys, best {} at {:.1}%",
        known_keys.len(), best.key, best.word_stats.percentage);

    if best.word_stats.percentage >= target_recognition {
        return CrackResult::from_ranked(ranked, ciphertext, CrackMethod::BruteForce);
    }

    let refined = refine_key(&best.key, ciphertext, dictionary,
        target_recognition, max_iterations, rng);

    if refined.improved && refined.word_stats.percentage > best.word_stats.percentage {
        tracing::info!("Refinement improved {} to {}", best.key, refined.final_key);

        let candidate = rate(&refined.final_key, ciphertext, dictionary);
        promote(&mut ranked, candidate);

        CrackResult::from_ranked(ranked, ciphertext, CrackMethod::BruteForceWithRefinement)
    } else {
        CrackResult::from_ranked(ranked, ciphertext, CrackMethod::BruteForce)
    }
}

fn column_shift_options(cleaned : &[u8], length : usize, top_n : usize) -> Vec<Vec<ShiftScore>> {
    split_columns(cleaned, length)
        .iter()
        .map(|column| best_shifts(&String::from_utf8_lossy(column), top_n))
        .collect()
}

pub fn cryptanalysis<R: Rng>(
    ciphertext : &str,
    dictionary : &Dictionary,
    max_key_length : usize,
    target_recognition : f64,
    max_iterations : usize,
    rng : &mut R) -> Result<CrackResult> {

    let cleaned = letters(ciphertext);
    if cleaned.len() < MIN_CRYPTANALYSIS_LETTERS {
        return Err(CrackError::InsufficientData {
            letters: cleaned.len(),
            required: MIN_CRYPTANALYSIS_LETTERS,
        });
    }

    let mut best : Option<ScoredCandidate> = None;

    for length in estimate_key_lengths(ciphertext, max_key_length) {
        let options : Vec<Vec<u8>> = column_shift_options(&cleaned, length, KEY_SEARCH_SHIFTS)
            .iter()
            .map(|scores| scores.iter().map(|s| s.shift).collect())
            .collect();

        let keys = combine_shifts(&options);
        let candidate = match rate_all(&keys, ciphertext, dictionary).into_iter().next() {
            Some(c) => c,
            None => continue,
        };

        tracing::debug!("Key length {}: {} candidates, best {}", length, keys.len(), candidate);

        if best.as_ref().map_or(true, |b| candidate > *b) {
            best = Some(candidate);
        }
    }

    let best = match best {
        Some(b) => b,
        None => return Ok(CrackResult::no_viable_key(CrackMethod::Cryptanalysis, "no candidate keys")),
    };

    let refined = refine_key(&best.key, ciphertext, dictionary,
        target_recognition, max_iterations, rng);

    tracing::info!("Cryptanalysis best {}, {}", best.key, refined);

    let mut ranked = vec![rate(&refined.final_key, ciphertext, dictionary)];
    if refined.final_key != best.key {
        ranked.push(best);
    }

    Ok(CrackResult::from_ranked(ranked, ciphertext, CrackMethod::Cryptanalysis))
}

#[derive(Clone, Debug, Serialize)]
pub struct ColumnShifts {
    pub position : usize,
    pub shifts : Vec<ShiftScore>,
}

/// Statistics of a ciphertext without any key search.
#[derive(Clone, Debug, Serialize)]
pub struct AnalysisReport {
    pub letters : usize,
    pub index_of_coincidence : f64,
    pub letter_ranking : Vec<(char, f64)>,
    pub key_lengths : Vec<KeyLengthScore>,
    pub columns : Vec<ColumnShifts>,
    /// Key formed from the best shift of every column
    pub suggested_key : Option<Key>,
}

pub fn analyze(ciphertext : &str, max_key_length : usize) -> Result<AnalysisReport> {
    if ciphertext.trim().is_empty() {
        return Err(CrackError::invalid("ciphertext is required"));
    }

    if max_key_length == 0 {
        return Err(CrackError::invalid("max_key_length must be at least 1"));
    }

    let cleaned = letters(ciphertext);
    let key_lengths = rank_key_lengths(ciphertext, max_key_length);

    let columns : Vec<ColumnShifts> = match key_lengths.first() {
        Some(best) if !cleaned.is_empty() => column_shift_options(&cleaned, best.length, GENERAL_SHIFTS)
            .into_iter()
            .enumerate()
            .map(|(position, shifts)| ColumnShifts { position, shifts })
            .collect(),
        _ => Vec::new(),
    };

    let suggested : Vec<u8> = columns.iter()
        .filter_map(|c| c.shifts.first().map(|s| s.shift))
        .collect();

    Ok(AnalysisReport {
        letters: cleaned.len(),
        index_of_coincidence: index_of_coincidence_letters(&cleaned),
        letter_ranking: frequencies(ciphertext).ranked(),
        key_lengths,
        columns,
        suggested_key: Key::from_shifts(&suggested),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::vigenere::encrypt;

    fn dict() -> Arc<Dictionary> {
        Arc::new(Dictionary::from_ranked_words(vec![
            "the", "and", "attack", "at", "dawn", "we", "will", "march", "north", "to",
            "river", "before", "enemy", "wakes", "up",
        ]))
    }

    const PLAIN : &str = "we will attack at dawn and march north to the river before the enemy wakes up";

    #[test]
    fn brute_force_finds_lemon() {
        let cipher = encrypt(PLAIN, &Key::parse("LEMON").unwrap());
        let keys : Vec<Key> = ["APPLE", "LEMON", "MELON"].iter().map(|k| Key::parse(k).unwrap()).collect();

        let res = brute_force(&cipher, &keys, &dict(), 80.0, 100, &mut StdRng::seed_from_u64(1));

        assert_eq!(res.method, CrackMethod::BruteForce);
        assert_eq!(res.best().unwrap().key.as_str(), "LEMON");
        assert_eq!(res.best().unwrap().word_stats.percentage, 100.0);
        assert_eq!(res.top_results.len(), 3);
        assert_eq!(res.full_decryption, PLAIN);
    }

    #[test]
    fn brute_force_refines_near_miss() {
        let cipher = encrypt(PLAIN, &Key::parse("LEMON").unwrap());
        let keys = vec![Key::parse("LEMOX").unwrap()];

        let res = brute_force(&cipher, &keys, &dict(), 90.0, 50, &mut StdRng::seed_from_u64(5));

        assert_eq!(res.method, CrackMethod::BruteForceWithRefinement);
        assert_eq!(res.best().unwrap().key.as_str(), "LEMON");
        assert_eq!(res.top_results[1].key.as_str(), "LEMOX");
        assert_eq!(res.full_decryption, PLAIN);
    }

    #[test]
    fn promoted_key_is_not_listed_twice() {
        let cipher = encrypt(PLAIN, &Key::parse("LEMON").unwrap());
        let keys : Vec<Key> = ["APPLE", "LEMOX", "LEMON", "MELON", "GRAPE", "PEACH"].iter()
            .map(|k| Key::parse(k).unwrap())
            .collect();

        let mut ranked = rate_all(&keys, &cipher, &dict());
        ranked.truncate(MAX_RESULTS);
        assert!(ranked.iter().any(|c| c.key.as_str() == "LEMON"));

        promote(&mut ranked, rate(&Key::parse("LEMON").unwrap(), &cipher, &dict()));

        assert_eq!(ranked[0].key.as_str(), "LEMON");
        assert_eq!(ranked.iter().filter(|c| c.key.as_str() == "LEMON").count(), 1);
        assert_eq!(ranked.len(), MAX_RESULTS);

        promote(&mut ranked, rate(&Key::parse("ORANGE").unwrap(), &cipher, &dict()));
        promote(&mut ranked, rate(&Key::parse("KIWI").unwrap(), &cipher, &dict()));

        assert_eq!(ranked.len(), MAX_RESULTS);
        assert_eq!(ranked[0].key.as_str(), "KIWI");
        assert_eq!(ranked[1].key.as_str(), "ORANGE");
        assert_eq!(ranked[2].key.as_str(), "LEMON");
    }

    #[test]
    fn brute_force_without_keys() {
        let res = brute_force("ABC", &[], &dict(), 80.0, 10, &mut StdRng::seed_from_u64(1));

        assert!(res.top_results.is_empty());
        assert!(res.full_decryption.is_empty());
        assert!(res.message.unwrap().starts_with(NO_VIABLE_KEY));
    }

    #[test]
    fn cryptanalysis_rejects_short_text() {
        let err = cryptanalysis("LXFOPVEFRNHR", &dict(), 5, 80.0, 10, &mut StdRng::seed_from_u64(1));

        match err {
            Err(CrackError::InsufficientData { letters, required }) => {
                assert_eq!(letters, 12);
                assert_eq!(required, MIN_CRYPTANALYSIS_LETTERS);
            },
            other => panic!("expected InsufficientData, got {:?}", other.map(|r| r.method)),
        }
    }

    #[test]
    fn cryptanalysis_returns_ranked_result() {
        let cipher = encrypt(PLAIN, &Key::parse("KEY").unwrap());
        let res = cryptanalysis(&cipher, &dict(), 6, 80.0, 200, &mut StdRng::seed_from_u64(9)).unwrap();

        assert_eq!(res.method, CrackMethod::Cryptanalysis);
        assert!(!res.top_results.is_empty() && res.top_results.len() <= 2);
        let best = res.best().unwrap();
        assert_eq!(res.full_decryption, decrypt(&cipher, &best.key));
        if res.top_results.len() == 2 {
            assert_ne!(res.top_results[0].key, res.top_results[1].key);
        }
    }

    #[test]
    fn request_validation() {
        let req = CrackRequest { ciphertext: "  ".into(), ..Default::default() };
        assert!(matches!(req.validate(dict()), Err(CrackError::InvalidInput(_))));

        let req = CrackRequest {
            ciphertext: "abc".into(),
            use_brute_force: true,
            known_keys: vec!["lemon".into(), "b4d".into()],
            ..Default::default()
        };
        assert!(matches!(req.validate(dict()), Err(CrackError::InvalidInput(_))));

        let req = CrackRequest {
            ciphertext: "abc".into(),
            known_keys: vec!["b4d".into()],
            ..Default::default()
        };
        let task = req.validate(dict()).unwrap();
        assert!(task.known_keys.is_empty());
    }

    #[test]
    fn known_keys_longer_than_max_length_are_rejected() {
        let req = CrackRequest {
            ciphertext: "abc".into(),
            max_key_length: 5,
            use_brute_force: true,
            known_keys: vec!["LEMON".into(), "ORANGES".into()],
            ..Default::default()
        };

        match req.validate(dict()) {
            Err(CrackError::InvalidInput(msg)) => assert!(msg.contains("ORANGES")),
            other => panic!("expected InvalidInput, got {:?}", other.map(|t| t.known_keys)),
        }

        let req = CrackRequest {
            ciphertext: "abc".into(),
            max_key_length: 5,
            use_brute_force: true,
            known_keys: vec!["LEMON".into(), "KIWI".into()],
            ..Default::default()
        };
        assert_eq!(req.validate(dict()).unwrap().known_keys.len(), 2);
    }

    #[test]
    fn request_from_json() {
        let req : CrackRequest = serde_json::from_str(
            r#"{"ciphertext": "LXFOPVEFRNHR", "use_brute_force": true, "known_keys": ["LEMON"], "seed": 4}"#).unwrap();
        let task = req.validate(dict()).unwrap();

        assert_eq!(task.max_key_length, CrackConfig::default().max_key_length);
        let res = crack(&task, &mut StdRng::seed_from_u64(4)).unwrap();
        assert_eq!(res.full_decryption, "ATTACKATDAWN");
    }

    #[test]
    fn analysis_report() {
        let cipher = encrypt(PLAIN, &Key::parse("KEY").unwrap());
        let report = analyze(&cipher, 6).unwrap();

        assert_eq!(report.key_lengths.len(), 6);
        assert_eq!(report.columns.len(), report.key_lengths[0].length);
        assert!(report.columns.iter().all(|c| c.shifts.len() == GENERAL_SHIFTS));
        assert_eq!(report.suggested_key.unwrap().len(), report.key_lengths[0].length);
        assert!(analyze("", 6).is_err());
    }

    #[test]
    fn method_names() {
        assert_eq!(serde_json::to_string(&CrackMethod::BruteForceWithRefinement).unwrap(),
            "\"brute-force-with-refinement\"");
        assert_eq!(CrackMethod::Cryptanalysis.to_string(), "cryptanalysis");
    }
}
