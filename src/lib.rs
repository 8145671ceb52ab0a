//! Statistical cryptanalysis of the Vigenère cipher.
//!
//! Decrypts with a known key, or recovers an unknown one from letter
//! frequencies, index of coincidence, dictionary word recognition and
//! hill-climbing.

pub mod combine;
pub mod config;
pub mod crack;
pub mod dispatch;
pub mod error;
pub mod freq;
pub mod keylen;
pub mod rate;
pub mod refine;
pub mod score;
pub mod shift;
pub mod vigenere;

pub use crack::{CrackMethod, CrackRequest, CrackResult, CrackTask};
pub use dispatch::Dispatcher;
pub use error::{CrackError, Result};
pub use score::{count_recognized_words, Dictionary, WordStats};
pub use vigenere::{decrypt_with_key, Key};
