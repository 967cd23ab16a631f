use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;

use super::{Candidate, JokeSource};
use crate::config::JokesConfig;

pub struct HttpJokeSource {
    client: Client,
    url: String,
    user_agent: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct JokeResponse {
    joke: String,
    #[serde(default)]
    offensive: bool,
}

impl HttpJokeSource {
    pub fn new(config: &JokesConfig) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            url: config.url.clone(),
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    #[cfg(test)]
    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl JokeSource for HttpJokeSource {
    async fn next_candidate(&self) -> Result<Candidate> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .header("User-Agent", &self.user_agent)
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to call joke API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Joke API error ({}): {}", status, body);
        }

        let body: JokeResponse = response
            .json()
            .await
            .context("Failed to parse joke API response")?;

        Ok(Candidate {
            text: body.joke,
            offensive: body.offensive,
        })
    }
}
