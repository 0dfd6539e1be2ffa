//! Discord REST API client.
//!
//! Implements [`Destination`] over the v10 HTTP API with a bot token.
//! Every response is classified into success or a [`PostFailure`]; retrying
//! is the poster's job, not this client's.

use std::fs;
use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::domain::{
    AppError, ChannelHandle, Destination, Embed, MessageHandle, OutgoingMessage, PostFailure,
    PostResult, PostTarget, Result, ThreadHandle,
};

/// Channel type codes used by the API.
const GUILD_TEXT: u8 = 0;
const GUILD_CATEGORY: u8 = 4;

/// Category new channels are placed in, when it exists.
const TEXT_CHANNELS_CATEGORY: &str = "Text Channels";

#[derive(Debug, Deserialize)]
struct RawGuild {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawId {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawApiError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    retry_after: Option<f64>,
}

#[derive(Debug, Serialize)]
struct AllowedMentions {
    parse: [&'static str; 0],
}

#[derive(Debug, Serialize)]
struct AttachmentSlot {
    id: usize,
    filename: String,
}

#[derive(Debug, Serialize)]
struct MessagePayload {
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    embeds: Vec<Embed>,
    allowed_mentions: AllowedMentions,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentSlot>,
}

#[derive(Debug, Serialize)]
struct CreateChannelPayload<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct StartThreadPayload<'a> {
    name: &'a str,
}

/// A bot session bound to one Discord server.
pub struct DiscordClient {
    client: Client,
    api_base: String,
    token: String,
    guild_id: String,
}

impl DiscordClient {
    /// Connects and selects the server the import goes to.
    ///
    /// With no server name the bot must be a member of exactly one server.
    ///
    /// # Errors
    /// Returns a config error if the server cannot be determined.
    pub async fn connect(api_base: &str, token: &str, server: Option<&str>) -> Result<Self> {
        let mut client = Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            guild_id: String::new(),
        };

        let guilds: Vec<RawGuild> = client
            .call_json(client.request(reqwest::Method::GET, "/users/@me/guilds"))
            .await
            .map_err(|e| AppError::Config {
                message: format!("Unable to list Discord servers: {e}"),
            })?;

        let candidates: Vec<&RawGuild> = match server {
            Some(name) => guilds.iter().filter(|g| g.name == name).collect(),
            None => guilds.iter().collect(),
        };
        let suffix = server.map(|n| format!(" with name {n}")).unwrap_or_default();

        let guild = match candidates.as_slice() {
            [only] => *only,
            [] => {
                return Err(AppError::Config {
                    message: format!("Unable to find Discord server{suffix}"),
                })
            }
            many => {
                return Err(AppError::Config {
                    message: format!(
                        "Unable to find unique Discord server{suffix}: {:?}",
                        many.iter().map(|g| g.name.as_str()).collect::<Vec<_>>()
                    ),
                })
            }
        };

        tracing::info!(server = %guild.name, id = %guild.id, "Connected to Discord server");
        client.guild_id.clone_from(&guild.id);
        Ok(client)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.api_base))
            .header("Authorization", format!("Bot {}", self.token))
    }

    async fn call(&self, request: RequestBuilder) -> PostResult<Response> {
        let resp = request
            .send()
            .await
            .map_err(|e| PostFailure::Transient(format!("request failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let header_retry = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok());
        let body = resp.text().await.unwrap_or_default();
        let api_error: RawApiError = serde_json::from_str(&body).unwrap_or_default();

        Err(classify(status, header_retry, api_error, &body))
    }

    async fn call_json<T: for<'de> Deserialize<'de>>(&self, request: RequestBuilder) -> PostResult<T> {
        self.call(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| PostFailure::Transient(format!("unexpected response body: {e}")))
    }

    async fn guild_channels(&self) -> PostResult<Vec<RawChannel>> {
        let path = format!("/guilds/{}/channels", self.guild_id);
        self.call_json(self.request(reqwest::Method::GET, &path)).await
    }
}

impl Destination for DiscordClient {
    async fn find_channel(&self, name: &str) -> PostResult<Option<ChannelHandle>> {
        let channels = self.guild_channels().await?;
        let matching: Vec<&RawChannel> = channels
            .iter()
            .filter(|c| c.kind == GUILD_TEXT && c.name.as_deref() == Some(name))
            .collect();

        match matching.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(ChannelHandle(only.id.clone()))),
            many => Err(PostFailure::Permanent(format!(
                "found multiple Discord channels named {name}: {:?}",
                many.iter().map(|c| c.id.as_str()).collect::<Vec<_>>()
            ))),
        }
    }

    async fn create_channel(&self, name: &str) -> PostResult<ChannelHandle> {
        let parent_id = self
            .guild_channels()
            .await?
            .into_iter()
            .find(|c| c.kind == GUILD_CATEGORY && c.name.as_deref() == Some(TEXT_CHANNELS_CATEGORY))
            .map(|c| c.id);
        if parent_id.is_none() {
            tracing::warn!("No \"{TEXT_CHANNELS_CATEGORY}\" category, new channel will not be in a category");
        }

        let path = format!("/guilds/{}/channels", self.guild_id);
        let payload = CreateChannelPayload {
            name,
            kind: GUILD_TEXT,
            parent_id,
        };
        let created: RawId = self
            .call_json(self.request(reqwest::Method::POST, &path).json(&payload))
            .await?;

        Ok(ChannelHandle(created.id))
    }

    async fn send_message(
        &self,
        target: &PostTarget,
        message: &OutgoingMessage,
    ) -> PostResult<MessageHandle> {
        let channel_id = match target {
            PostTarget::Channel(c) => &c.0,
            PostTarget::Thread(t) => &t.0,
        };
        let path = format!("/channels/{channel_id}/messages");

        let payload = MessagePayload {
            content: message.content.clone(),
            embeds: message.embeds.clone(),
            allowed_mentions: AllowedMentions { parse: [] },
            attachments: message
                .files
                .iter()
                .enumerate()
                .map(|(id, f)| AttachmentSlot {
                    id,
                    filename: f.filename.clone(),
                })
                .collect(),
        };

        let request = self.request(reqwest::Method::POST, &path);
        let request = if message.files.is_empty() {
            request.json(&payload)
        } else {
            request.multipart(multipart_form(&payload, message)?)
        };

        let posted: RawId = self.call_json(request).await?;
        Ok(MessageHandle(posted.id))
    }

    async fn start_thread(
        &self,
        channel: &ChannelHandle,
        message: &MessageHandle,
        name: &str,
    ) -> PostResult<ThreadHandle> {
        let path = format!("/channels/{}/messages/{}/threads", channel.0, message.0);
        let created: RawId = self
            .call_json(
                self.request(reqwest::Method::POST, &path)
                    .json(&StartThreadPayload { name }),
            )
            .await?;

        Ok(ThreadHandle(created.id))
    }
}

fn multipart_form(payload: &MessagePayload, message: &OutgoingMessage) -> PostResult<Form> {
    let json = serde_json::to_string(payload)
        .map_err(|e| PostFailure::Permanent(format!("cannot encode message: {e}")))?;
    let payload_part = Part::text(json)
        .mime_str("application/json")
        .map_err(|e| PostFailure::Permanent(e.to_string()))?;

    let mut form = Form::new().part("payload_json", payload_part);
    for (i, file) in message.files.iter().enumerate() {
        let bytes = fs::read(&file.path).map_err(|e| {
            PostFailure::Permanent(format!("cannot read {}: {e}", file.path.display()))
        })?;
        form = form.part(
            format!("files[{i}]"),
            Part::bytes(bytes).file_name(file.filename.clone()),
        );
    }

    Ok(form)
}

/// Maps an unsuccessful response onto the retry taxonomy.
fn classify(
    status: StatusCode,
    header_retry: Option<f64>,
    api_error: RawApiError,
    body: &str,
) -> PostFailure {
    let detail = api_error
        .message
        .unwrap_or_else(|| body.chars().take(200).collect());

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = api_error
            .retry_after
            .or(header_retry)
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64);
        return PostFailure::RateLimited { retry_after };
    }

    if status.is_server_error() {
        PostFailure::Transient(format!("HTTP {status}: {detail}"))
    } else {
        PostFailure::Permanent(format!("HTTP {status}: {detail}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UploadFile;

    #[test]
    fn test_classify_rate_limit_prefers_body() {
        let failure = classify(
            StatusCode::TOO_MANY_REQUESTS,
            Some(9.0),
            RawApiError {
                message: Some("You are being rate limited.".into()),
                retry_after: Some(1.5),
            },
            "",
        );
        assert_eq!(
            failure,
            PostFailure::RateLimited {
                retry_after: Some(Duration::from_millis(1500))
            }
        );
    }

    #[test]
    fn test_classify_rate_limit_header_fallback() {
        let failure = classify(StatusCode::TOO_MANY_REQUESTS, Some(2.0), RawApiError::default(), "");
        assert_eq!(
            failure,
            PostFailure::RateLimited {
                retry_after: Some(Duration::from_secs(2))
            }
        );
    }

    #[test]
    fn test_classify_server_and_client_errors() {
        let transient = classify(StatusCode::BAD_GATEWAY, None, RawApiError::default(), "oops");
        assert!(matches!(transient, PostFailure::Transient(_)));

        let forbidden = classify(
            StatusCode::FORBIDDEN,
            None,
            RawApiError {
                message: Some("Missing Permissions".into()),
                retry_after: None,
            },
            "",
        );
        assert_eq!(
            forbidden,
            PostFailure::Permanent("HTTP 403 Forbidden: Missing Permissions".into())
        );
    }

    #[test]
    fn test_payload_disables_mentions() {
        let payload = MessagePayload {
            content: "hi @everyone".into(),
            embeds: Vec::new(),
            allowed_mentions: AllowedMentions { parse: [] },
            attachments: vec![AttachmentSlot {
                id: 0,
                filename: "a.png".into(),
            }],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["allowed_mentions"]["parse"], serde_json::json!([]));
        assert_eq!(json["attachments"][0]["filename"], "a.png");
        assert!(json.get("embeds").is_none());
    }

    #[test]
    fn test_multipart_missing_file_is_permanent() {
        let message = OutgoingMessage {
            content: "file".into(),
            embeds: Vec::new(),
            files: vec![UploadFile {
                path: "/nonexistent/a.png".into(),
                filename: "a.png".into(),
            }],
        };
        let payload = MessagePayload {
            content: message.content.clone(),
            embeds: Vec::new(),
            allowed_mentions: AllowedMentions { parse: [] },
            attachments: Vec::new(),
        };
        assert!(matches!(
            multipart_form(&payload, &message),
            Err(PostFailure::Permanent(_))
        ));
    }
}
