use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use analyzer::config::CrackConfig;
use analyzer::crack::{analyze, AnalysisReport};
use analyzer::dispatch::{Dispatcher, TaskOutcome};
use analyzer::error::{CrackError, Result};
use analyzer::freq::frequencies;
use analyzer::score::{count_recognized_words, load_known_keys, Dictionary};
use analyzer::vigenere::{decrypt_with_key, encrypt, Key};
use analyzer::{CrackRequest, CrackResult, CrackTask};

#[derive(Parser, Debug)]
#[command(name = "vigcrack", version, about = "Vigenère cipher decryption and key recovery")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decrypt with a known key
    Decrypt {
        #[arg(short, long)]
        key: String,

        /// Word list to report recognized words against
        #[arg(short, long)]
        dictionary: Option<PathBuf>,

        /// Ciphertext file (stdin if omitted or "-")
        input: Option<PathBuf>,
    },

    /// Encrypt with a key
    Encrypt {
        #[arg(short, long)]
        key: String,

        input: Option<PathBuf>,
    },

    /// Recover the key, one task per input
    Crack {
        /// Word list, most frequent words first
        #[arg(short, long)]
        dictionary: PathBuf,

        /// Candidate keys, one per line
        #[arg(short, long)]
        known_keys: Option<PathBuf>,

        /// Only try the known keys
        #[arg(short, long)]
        brute_force: bool,

        #[arg(long)]
        max_key_length: Option<usize>,

        #[arg(long)]
        target: Option<f64>,

        #[arg(long)]
        max_iterations: Option<usize>,

        #[arg(long)]
        workers: Option<usize>,

        /// Seed for reproducible refinement
        #[arg(long)]
        seed: Option<u64>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        inputs: Vec<PathBuf>,
    },

    /// Report letter statistics and likely key lengths
    Analyze {
        #[arg(long)]
        max_key_length: Option<usize>,

        #[arg(long)]
        json: bool,

        input: Option<PathBuf>,
    },
}

fn read_input(path : Option<&Path>) -> Result<String> {
    match path {
        Some(p) if p != Path::new("-") => fs::read_to_string(p)
            .map_err(|source| CrackError::Io { path: p.to_path_buf(), source }),
        _ => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)
                .map_err(|source| CrackError::Io { path: PathBuf::from("<stdin>"), source })?;
            Ok(text)
        }
    }
}

fn print_result(name : &str, result : &CrackResult) {
    println!("Results for {} ({}): ", name, result.method);

    if let Some(msg) = &result.message {
        println!("{}", msg);
    }

    for (i, c) in result.top_results.iter().enumerate() {
        println!("{}: {}\n", i, c);
    }

    println!("Decrypt = {}", result.full_decryption);
    println!("End Results");
}

fn print_report(report : &AnalysisReport) {
    println!("Letters = {} IC = {:.5}", report.letters, report.index_of_coincidence);

    for s in report.key_lengths.iter().take(5) {
        println!("Key length {:>2}: average IC {:.5}", s.length, s.average_ic);
    }

    for c in &report.columns {
        let shifts : Vec<String> = c.shifts.iter()
            .map(|s| format!("{}({:.1})", s.letter, s.combined))
            .collect();
        println!("Position {:>2}: {}", c.position, shifts.join(" "));
    }

    if let Some(key) = &report.suggested_key {
        println!("Suggested key = {}", key);
    }
}

/// First signal stops new tasks from starting, a second one aborts.
fn install_signal_handler() -> Arc<AtomicBool> {
    let stopping = Arc::new(AtomicBool::new(false));
    let flag = stopping.clone();

    let res = ctrlc::set_handler(move || {
        if !flag.swap(true, Ordering::SeqCst) {
            println!("Signal received! Waiting for running tasks...");
        } else {
            println!("Signal received again! Dying...");
            std::process::abort();
        }
    });

    if let Err(e) = res {
        tracing::warn!("Failed to install signal handler: {}", e);
    }

    stopping
}

fn run(cli : Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => CrackConfig::load(path)?,
        None => CrackConfig::default(),
    };

    match cli.command {
        Commands::Decrypt { key, dictionary, input } => {
            let cipher = read_input(input.as_deref())?;
            let plain = decrypt_with_key(&cipher, &key)?;

            println!("{}", plain);

            if let Some(dictionary) = dictionary {
                let stats = count_recognized_words(&plain, &Dictionary::load(dictionary)?);
                println!("Recognized {}/{} words ({:.1}%) weighted score {:.3}",
                    stats.recognized_count, stats.total_words, stats.percentage, stats.weighted_score);
            }
        },
        Commands::Encrypt { key, input } => {
            let plain = read_input(input.as_deref())?;
            print!("{}", encrypt(&plain, &Key::parse(&key)?));
        },
        Commands::Analyze { max_key_length, json, input } => {
            let cipher = read_input(input.as_deref())?;
            let report = analyze(&cipher, max_key_length.unwrap_or(config.max_key_length))?;

            if json {
                let out = serde_json::to_string_pretty(&report)
                    .map_err(|e| CrackError::Config(e.to_string()))?;
                println!("{}", out);
            } else {
                println!("Cipher Freq =\n{}", frequencies(&cipher));
                print_report(&report);
            }
        },
        Commands::Crack {
            dictionary, known_keys, brute_force, max_key_length, target,
            max_iterations, workers, seed, json, inputs,
        } => {
            config.max_key_length = max_key_length.unwrap_or(config.max_key_length);
            config.target_recognition = target.unwrap_or(config.target_recognition);
            config.max_iterations = max_iterations.unwrap_or(config.max_iterations);
            config.workers = workers.or(config.workers);
            config.validate()?;

            let dictionary = Arc::new(Dictionary::load(dictionary)?);
            let known_keys : Vec<String> = match known_keys {
                Some(path) => load_known_keys(path)?.into_iter().map(String::from).collect(),
                None => Vec::new(),
            };

            let inputs = if inputs.is_empty() { vec![PathBuf::from("-")] } else { inputs };

            let stopping = install_signal_handler();

            let mut dispatcher = Dispatcher::new(config.worker_count())?;

            let tasks = inputs.iter().map(|input| -> Result<(String, CrackTask)> {
                let request = CrackRequest {
                    use_brute_force: brute_force,
                    known_keys: known_keys.clone(),
                    seed,
                    ..CrackRequest::with_config(read_input(Some(input.as_path()))?, &config)
                };

                Ok((input.display().to_string(), request.validate(dictionary.clone())?))
            });

            let delivered = dispatcher.run_batch(tasks, &stopping, |name, res| {
                if json {
                    let out = serde_json::to_string_pretty(&TaskOutcome::from(res))
                        .map_err(|e| CrackError::Config(e.to_string()))?;
                    println!("{}", out);
                } else {
                    match res {
                        Ok(r) => print_result(name, &r),
                        Err(e) => println!("Task for {} failed: {}", name, e),
                    }
                }
                Ok(())
            })?;

            if delivered < inputs.len() {
                println!("Stopped, {} of {} inputs skipped", inputs.len() - delivered, inputs.len());
            }

            let status = dispatcher.status();
            tracing::info!("{} tasks completed, {} failed", status.completed, status.failed);

            dispatcher.shutdown();
        },
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
