use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Channel, DeliveryError};
use crate::config::SlackConfig;

const JOIN_METHOD: &str = "conversations.join";
const POST_METHOD: &str = "chat.postMessage";

pub struct SlackChannel {
    client: Client,
    api_base: String,
    bot_token: String,
    channel: String,
    username: String,
    icon: String,
    caption: String,
    timeout: Duration,
}

// --- Request types ---

#[derive(Serialize)]
struct JoinRequest<'a> {
    channel: &'a str,
}

#[derive(Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
    blocks: Vec<Block>,
    unfurl_links: bool,
    unfurl_media: bool,
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_emoji: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_url: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Section { text: TextObject },
    Context { elements: Vec<TextObject> },
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TextObject {
    Mrkdwn { text: String },
}

// --- Response types ---

#[derive(Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl SlackChannel {
    pub fn new(config: &SlackConfig) -> Result<Self> {
        let bot_token = config
            .bot_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .context("Slack bot token missing: set [slack] bot_token or SLACK_BOT_TOKEN")?;
        let channel = config
            .channel
            .clone()
            .filter(|c| !c.trim().is_empty())
            .context("Slack channel missing: set [slack] channel or SLACK_CHANNEL_ID")?;

        Ok(Self {
            client: Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token,
            channel,
            username: config.username.clone(),
            icon: config.icon.clone(),
            caption: config.caption.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    #[cfg(test)]
    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Best effort: the bot may already be a member.
    async fn join(&self) {
        let request = JoinRequest {
            channel: &self.channel,
        };
        match self.call(JOIN_METHOD, &request).await {
            Ok(()) => tracing::debug!("Joined Slack channel {}", self.channel),
            Err(e) => tracing::warn!("Could not join Slack channel {}: {e}", self.channel),
        }
    }

    fn build_message<'a>(&'a self, joke: &'a str) -> PostMessage<'a> {
        let (icon_emoji, icon_url) = if self.icon.starts_with(':') {
            (Some(self.icon.as_str()), None)
        } else if self.icon.is_empty() {
            (None, None)
        } else {
            (None, Some(self.icon.as_str()))
        };

        PostMessage {
            channel: &self.channel,
            text: joke,
            blocks: vec![
                Block::Section {
                    text: TextObject::Mrkdwn {
                        text: emphasize(joke),
                    },
                },
                Block::Context {
                    elements: vec![TextObject::Mrkdwn {
                        text: self.caption.clone(),
                    }],
                },
            ],
            unfurl_links: false,
            unfurl_media: false,
            username: &self.username,
            icon_emoji,
            icon_url,
        }
    }

    async fn call<T: Serialize + ?Sized>(
        &self,
        method: &'static str,
        body: &T,
    ) -> Result<(), DeliveryError> {
        let url = format!("{}/{method}", self.api_base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.bot_token)
            .json(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(method, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status {
                method,
                status,
                body,
            });
        }

        let body: SlackResponse = response
            .json()
            .await
            .map_err(|e| self.transport_error(method, e))?;
        if !body.ok {
            return Err(DeliveryError::Api {
                method,
                error: body.error.unwrap_or_else(|| "unknown_error".to_string()),
            });
        }
        Ok(())
    }

    fn transport_error(&self, method: &'static str, e: reqwest::Error) -> DeliveryError {
        if e.is_timeout() {
            DeliveryError::Timeout {
                method,
                timeout: self.timeout,
                source: e,
            }
        } else {
            DeliveryError::Transport { method, source: e }
        }
    }
}

#[async_trait::async_trait]
impl Channel for SlackChannel {
    fn name(&self) -> &str {
        "slack"
    }

    async fn deliver(&self, joke: &str) -> Result<String, DeliveryError> {
        self.join().await;
        self.call(POST_METHOD, &self.build_message(joke)).await?;
        tracing::info!("Posted joke to {}: {joke}", self.channel);
        Ok(joke.to_string())
    }
}

/// Bold every non-empty line; mrkdwn emphasis does not span newlines.
/// Surrounding whitespace stays outside the markers.
fn emphasize(text: &str) -> String {
    text.lines()
        .map(|line| {
            let body = line.trim();
            if body.is_empty() {
                return line.to_string();
            }
            let lead = &line[..line.len() - line.trim_start().len()];
            let trail = &line[line.trim_end().len()..];
            format!("{lead}*{}*{trail}", escape_mrkdwn(body))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Slack's control characters, plus `*` swapped for a look-alike so it
/// cannot close the bold run early.
fn escape_mrkdwn(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('*', "\u{2217}")
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;

    fn config(api_base: String) -> SlackConfig {
        SlackConfig {
            bot_token: Some("xoxb-test".into()),
            channel: Some("C123".into()),
            api_base,
            ..SlackConfig::default()
        }
    }

    async fn hanging_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_missing_token_is_config_error() {
        let mut cfg = config("http://localhost".into());
        cfg.bot_token = None;
        let err = SlackChannel::new(&cfg).err().unwrap();
        assert!(err.to_string().contains("SLACK_BOT_TOKEN"));
    }

    #[test]
    fn test_blank_channel_is_config_error() {
        let mut cfg = config("http://localhost".into());
        cfg.channel = Some("  ".into());
        assert!(SlackChannel::new(&cfg).is_err());
    }

    #[test]
    fn test_emphasize_multiline() {
        assert_eq!(emphasize("Q?\n\nA!"), "*Q?*\n\n*A!*");
        assert_eq!(emphasize("  one liner "), "  *one liner* ");
        assert_eq!(emphasize("Q?\n   \nA!"), "*Q?*\n   \n*A!*");
    }

    #[test]
    fn test_emphasize_escapes_markup() {
        assert_eq!(emphasize("2*3 = 6"), "*2\u{2217}3 = 6*");
        assert_eq!(emphasize("<!here> & co"), "*&lt;!here&gt; &amp; co*");
    }

    #[test]
    fn test_message_shape() {
        let slack = SlackChannel::new(&config("http://localhost".into())).unwrap();
        let msg = serde_json::to_value(slack.build_message("X")).unwrap();
        assert_eq!(
            msg,
            json!({
                "channel": "C123",
                "text": "X",
                "blocks": [
                    {"type": "section", "text": {"type": "mrkdwn", "text": "*X*"}},
                    {"type": "context", "elements": [
                        {"type": "mrkdwn", "text": "Your scheduled dose of dad jokes"}
                    ]}
                ],
                "unfurl_links": false,
                "unfurl_media": false,
                "username": "Joke Bot",
                "icon_emoji": ":laughing:"
            })
        );
    }

    #[test]
    fn test_icon_url_override() {
        let mut cfg = config("http://localhost".into());
        cfg.icon = "https://example.com/bot.png".into();
        let slack = SlackChannel::new(&cfg).unwrap();
        let msg = serde_json::to_value(slack.build_message("X")).unwrap();
        assert_eq!(msg["icon_url"], "https://example.com/bot.png");
        assert!(msg.get("icon_emoji").is_none());
    }

    #[tokio::test]
    async fn test_deliver_joins_then_posts() {
        let mut server = mockito::Server::new_async().await;
        let join = server
            .mock("POST", "/conversations.join")
            .match_header("authorization", "Bearer xoxb-test")
            .match_body(Matcher::PartialJson(json!({"channel": "C123"})))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;
        let post = server
            .mock("POST", "/chat.postMessage")
            .match_header("authorization", "Bearer xoxb-test")
            .match_body(Matcher::PartialJson(json!({
                "channel": "C123",
                "text": "X",
                "unfurl_links": false,
                "unfurl_media": false
            })))
            .with_status(200)
            .with_body(r#"{"ok":true,"ts":"1.2"}"#)
            .create_async()
            .await;

        let slack = SlackChannel::new(&config(server.url())).unwrap();
        assert_eq!(slack.deliver("X").await.unwrap(), "X");
        join.assert_async().await;
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_join_failure_is_not_fatal() {
        let mut server = mockito::Server::new_async().await;
        let _join = server
            .mock("POST", "/conversations.join")
            .with_status(200)
            .with_body(r#"{"ok":false,"error":"method_not_supported_for_channel_type"}"#)
            .create_async()
            .await;
        let post = server
            .mock("POST", "/chat.postMessage")
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let slack = SlackChannel::new(&config(server.url())).unwrap();
        assert!(slack.deliver("X").await.is_ok());
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_rejected_by_api() {
        let mut server = mockito::Server::new_async().await;
        let _join = server
            .mock("POST", "/conversations.join")
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;
        let _post = server
            .mock("POST", "/chat.postMessage")
            .with_status(200)
            .with_body(r#"{"ok":false,"error":"not_in_channel"}"#)
            .create_async()
            .await;

        let slack = SlackChannel::new(&config(server.url())).unwrap();
        match slack.deliver("X").await {
            Err(DeliveryError::Api { method, error }) => {
                assert_eq!(method, POST_METHOD);
                assert_eq!(error, "not_in_channel");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_post_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _join = server
            .mock("POST", "/conversations.join")
            .with_status(500)
            .create_async()
            .await;
        let _post = server
            .mock("POST", "/chat.postMessage")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let slack = SlackChannel::new(&config(server.url())).unwrap();
        let err = slack.deliver("X").await.unwrap_err();
        assert!(matches!(err, DeliveryError::Status { status, .. } if status.as_u16() == 429));
    }

    #[tokio::test]
    async fn test_post_timeout_is_delivery_error() {
        let base = hanging_server().await;
        let slack = SlackChannel::new(&config(base))
            .unwrap()
            .with_timeout(Duration::from_millis(200));

        let err = slack.deliver("X").await.unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::Timeout {
                method: POST_METHOD,
                ..
            }
        ));
        let cause = std::error::Error::source(&err).expect("timeout keeps its cause");
        assert!(cause.is::<reqwest::Error>());
    }
}
