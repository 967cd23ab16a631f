pub mod fallback;
pub mod http;

use std::time::Duration;

use anyhow::Result;

use crate::config::JokesConfig;
use crate::history::Ledger;

/// One joke as returned by a source, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub text: String,
    pub offensive: bool,
}

#[async_trait::async_trait]
pub trait JokeSource: Send + Sync {
    async fn next_candidate(&self) -> Result<Candidate>;
}

/// Why attempts were skipped before falling back.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SkipTally {
    pub offensive: u32,
    pub blank: u32,
    pub duplicate: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Remote { attempt: u32 },
    Fallback { tally: SkipTally },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub text: String,
    pub origin: Origin,
}

impl Fetched {
    pub fn is_fallback(&self) -> bool {
        matches!(self.origin, Origin::Fallback { .. })
    }
}

/// Linear backoff between failed attempts: `min(step * attempt, cap)`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub step: Duration,
    pub cap: Duration,
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt).min(self.cap)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            step: Duration::from_millis(1000),
            cap: Duration::from_millis(5000),
        }
    }
}

pub struct Fetcher {
    source: Box<dyn JokeSource>,
    max_attempts: u32,
    backoff: Backoff,
}

impl Fetcher {
    pub fn new(source: Box<dyn JokeSource>, max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            source,
            max_attempts,
            backoff,
        }
    }

    pub fn from_config(source: Box<dyn JokeSource>, config: &JokesConfig) -> Self {
        Self::new(
            source,
            config.max_attempts,
            Backoff {
                step: Duration::from_millis(config.backoff_step_ms),
                cap: Duration::from_millis(config.backoff_cap_ms),
            },
        )
    }

    /// Fetch a joke not present in `history`. Never fails: after
    /// `max_attempts` unusable results a fallback joke is returned.
    pub async fn fetch(&self, history: &Ledger) -> Fetched {
        let mut tally = SkipTally::default();

        for attempt in 1..=self.max_attempts {
            match self.source.next_candidate().await {
                Ok(candidate) if candidate.offensive => {
                    tally.offensive += 1;
                    tracing::warn!(
                        "Attempt {attempt}/{}: skipped offensive joke",
                        self.max_attempts
                    );
                }
                Ok(candidate) if candidate.text.trim().is_empty() => {
                    tally.blank += 1;
                    tracing::warn!(
                        "Attempt {attempt}/{}: skipped joke with no text",
                        self.max_attempts
                    );
                }
                Ok(candidate) if history.contains(&candidate.text) => {
                    tally.duplicate += 1;
                    tracing::warn!(
                        "Attempt {attempt}/{}: skipped recently posted joke",
                        self.max_attempts
                    );
                }
                Ok(candidate) => {
                    tracing::info!("Fetched joke on attempt {attempt}");
                    return Fetched {
                        text: candidate.text,
                        origin: Origin::Remote { attempt },
                    };
                }
                Err(e) => {
                    tally.failed += 1;
                    tracing::warn!("Attempt {attempt}/{}: {e:#}", self.max_attempts);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.backoff.delay(attempt)).await;
                    }
                }
            }
        }

        tracing::warn!(
            "No usable joke after {} attempts ({} offensive, {} blank, {} duplicate, {} failed), using fallback",
            self.max_attempts,
            tally.offensive,
            tally.blank,
            tally.duplicate,
            tally.failed
        );
        Fetched {
            text: fallback::pick().to_string(),
            origin: Origin::Fallback { tally },
        }
    }
}
