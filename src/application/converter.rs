//! Slack mrkdwn to Discord markdown conversion.
//!
//! Everything here is pure: the same message, users and channel names always
//! give the same output, and no input makes it fail.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::domain::{Embed, EmbedAuthor, EmbedMedia, LinkRef, Message};

use super::users::UserDirectory;

/// Discord's limit on message content, in characters.
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

/// Discord's limit on embeds per message.
pub const MAX_DISCORD_EMBEDS: usize = 10;

/// A converted message, ready to become a post task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// Content chunks in posting order; never empty.
    pub content: Vec<String>,
    pub embeds: Vec<Embed>,
}

/// Converts a whole message: header, body, embeds, and length splitting.
///
/// `channels` maps Slack channel names to destination names.
#[must_use]
pub fn convert(
    message: &Message,
    users: &UserDirectory,
    channels: &HashMap<String, String>,
) -> Rendered {
    let body = convert_text(&message.text, users, channels);
    let content = with_header(message, &users.label(&message.author), &body);

    let mut embeds: Vec<Embed> = message.links.iter().filter_map(to_embed).collect();
    if embeds.len() > MAX_DISCORD_EMBEDS {
        tracing::warn!(
            ts = %message.ts,
            embeds = embeds.len(),
            "Too many link previews, keeping the first {MAX_DISCORD_EMBEDS}"
        );
        embeds.truncate(MAX_DISCORD_EMBEDS);
    }

    Rendered {
        content: split_content(&content, DISCORD_MESSAGE_LIMIT),
        embeds,
    }
}

/// Converts message text, without the header.
#[must_use]
pub fn convert_text(
    text: &str,
    users: &UserDirectory,
    channels: &HashMap<String, String>,
) -> String {
    let text = replace_control_sequences(text, users, channels);
    let text = unescape(&text);
    fix_emphasis(&text)
}

#[allow(clippy::expect_used)]
fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("valid regex"))
}

fn replace_control_sequences(
    text: &str,
    users: &UserDirectory,
    channels: &HashMap<String, String>,
) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"<([^<>\n]+)>")
        .replace_all(text, |caps: &Captures| {
            control_sequence(&caps[1], users, channels).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Rewrites the inside of one `<...>`; `None` leaves it as written.
fn control_sequence(
    inner: &str,
    users: &UserDirectory,
    channels: &HashMap<String, String>,
) -> Option<String> {
    let (target, label) = match inner.split_once('|') {
        Some((target, label)) => (target, Some(label)),
        None => (inner, None),
    };

    if let Some(id) = target.strip_prefix('@') {
        return users.lookup(id).map(|name| format!("@{name}"));
    }

    if let Some(id) = target.strip_prefix('#') {
        let name = label.unwrap_or(id);
        let dest = channels.get(name).map_or(name, String::as_str);
        return Some(format!("#{dest}"));
    }

    if let Some(command) = target.strip_prefix('!') {
        return match command {
            "here" | "channel" | "everyone" => Some(format!("@{command}")),
            _ => label.map(String::from),
        };
    }

    if !target.contains(':') {
        return None;
    }

    Some(match label {
        Some(label) if !label.is_empty() => format!("[{label}]({target})"),
        _ => target.to_string(),
    })
}

/// Decodes the three entities Slack escapes, in one pass.
fn unescape(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"&(amp|lt|gt);")
        .replace_all(text, |caps: &Captures| match &caps[1] {
            "amp" => "&",
            "lt" => "<",
            _ => ">",
        })
        .into_owned()
}

fn fix_emphasis(text: &str) -> String {
    static BOLD: OnceLock<Regex> = OnceLock::new();
    static STRIKE: OnceLock<Regex> = OnceLock::new();

    let text = double_delimiter(
        text,
        regex(&BOLD, r"(^|[^\p{Alphabetic}\p{N}*])\*([^\s*](?:[^*\n]*[^\s*])?)\*"),
        '*',
    );
    double_delimiter(
        &text,
        regex(&STRIKE, r"(^|[^\p{Alphabetic}\p{N}~])~([^\s~](?:[^~\n]*[^\s~])?)~"),
        '~',
    )
}

/// Doubles a single-character delimiter pair matched by `re`.
///
/// The regex crate has no lookahead, so the character after the closing
/// delimiter is checked here.
fn double_delimiter(text: &str, re: &Regex, delim: char) -> String {
    re.replace_all(text, |caps: &Captures| {
        let end = caps.get(0).map_or(0, |m| m.end());
        let next = text[end..].chars().next();
        if next.is_some_and(|c| c == delim || c.is_alphanumeric()) {
            return caps[0].to_string();
        }
        format!("{}{delim}{delim}{}{delim}{delim}", &caps[1], &caps[2])
    })
    .into_owned()
}

fn with_header(message: &Message, author: &str, body: &str) -> String {
    let when = message.ts.to_local().map_or_else(
        || message.ts.to_string(),
        |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string(),
    );
    let header = format!("`{when}` **{author}**");

    if body.is_empty() {
        header
    } else if body.contains('\n') {
        format!("{header}\n{body}")
    } else {
        format!("{header} {body}")
    }
}

fn to_embed(link: &LinkRef) -> Option<Embed> {
    let author = (link.service_name.is_some() || link.service_icon.is_some()).then(|| EmbedAuthor {
        name: link.service_name.clone(),
        icon_url: link.service_icon.clone(),
    });

    let embed = Embed {
        title: link.title.clone(),
        url: link.title_link.clone(),
        description: link.text.clone(),
        author,
        image: link.image_url.clone().map(|url| EmbedMedia { url }),
        thumbnail: link.thumb_url.clone().map(|url| EmbedMedia { url }),
    };

    (embed != Embed::default()).then_some(embed)
}

/// Splits content into chunks of at most `limit` characters, breaking at
/// the last newline that fits when there is one.
#[must_use]
pub fn split_content(content: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = content;

    while rest.chars().count() > limit {
        let hard = rest
            .char_indices()
            .nth(limit)
            .map_or(rest.len(), |(i, _)| i);
        let (chunk, tail) = match rest[..hard].rfind('\n') {
            Some(nl) if nl > 0 => (&rest[..nl], &rest[nl + 1..]),
            _ => (&rest[..hard], &rest[hard..]),
        };
        chunks.push(chunk.to_string());
        rest = tail;
    }

    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuthorRef, SlackTs, ThreadLink};

    fn users() -> UserDirectory {
        UserDirectory::from_json(
            r#"[{"id": "U1", "name": "ada", "profile": {"display_name": "Ada"}}]"#,
        )
        .unwrap()
    }

    fn channels() -> HashMap<String, String> {
        HashMap::from([("general".to_string(), "slack-general".to_string())])
    }

    fn text(input: &str) -> String {
        convert_text(input, &users(), &channels())
    }

    fn message(body: &str) -> Message {
        Message {
            ts: SlackTs::new(1_674_412_345, 0),
            seq: 0,
            author: AuthorRef {
                user_id: Some("U1".into()),
                inline: vec![],
            },
            text: body.into(),
            attachments: vec![],
            links: vec![],
            thread: ThreadLink::TopLevel,
        }
    }

    #[test]
    fn test_user_mentions() {
        assert_eq!(text("hi <@U1>"), "hi @Ada");
        assert_eq!(text("hi <@U1|ada>"), "hi @Ada");
        assert_eq!(text("hi <@U9>"), "hi <@U9>");
    }

    #[test]
    fn test_channel_mentions() {
        assert_eq!(text("see <#C1|general>"), "see #slack-general");
        assert_eq!(text("see <#C2|random>"), "see #random");
    }

    #[test]
    fn test_special_mentions() {
        assert_eq!(text("<!here> <!channel> <!everyone>"), "@here @channel @everyone");
        assert_eq!(text("<!subteam^S1|@devs> ping"), "@devs ping");
    }

    #[test]
    fn test_links() {
        assert_eq!(
            text("<https://docs.rs|the docs> and <https://crates.io>"),
            "[the docs](https://docs.rs) and https://crates.io"
        );
        assert_eq!(text("mail <mailto:a@b.c|a@b.c>"), "mail [a@b.c](mailto:a@b.c)");
    }

    #[test]
    fn test_unescape_single_pass() {
        assert_eq!(text("a &lt;b&gt; &amp; c"), "a <b> & c");
        assert_eq!(text("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_unescaped_brackets_are_not_links() {
        assert_eq!(text("&lt;https://x.y&gt;"), "<https://x.y>");
    }

    #[test]
    fn test_emphasis() {
        assert_eq!(text("*bold* and ~gone~"), "**bold** and ~~gone~~");
        assert_eq!(text("a *two words* b"), "a **two words** b");
        assert_eq!(text("2*3*4"), "2*3*4");
        assert_eq!(text("* not bold *"), "* not bold *");
        assert_eq!(text("*~both~*"), "**~~both~~**");
    }

    #[test]
    fn test_emphasis_inside_italics() {
        assert_eq!(text("_*x*_"), "_**x**_");
        assert_eq!(
            text("_*bold italic*_ and ~*x*~"),
            "_**bold italic**_ and ~~**x**~~"
        );
        assert_eq!(text("_~gone~_"), "_~~gone~~_");
    }

    #[test]
    fn test_angle_text_without_scheme_is_kept() {
        assert_eq!(text("a <b> c"), "a <b> c");
        assert_eq!(text("<not a link|label>"), "<not a link|label>");
    }

    #[test]
    fn test_emphasis_is_idempotent() {
        for input in [
            "*bold* and ~gone~",
            "**already**",
            "mixed *a* **b** ~c~ ~~d~~",
            "*~both~*",
            "snake_case *word*_tail",
            "_*bold italic*_",
            "*bold* ~strike~ &amp; &lt;b&gt;",
        ] {
            let once = text(input);
            assert_eq!(text(&once), once, "{input}");
        }
    }

    #[test]
    fn test_header_single_line() {
        let rendered = convert(&message("hello"), &users(), &channels());
        assert_eq!(rendered.content.len(), 1);
        assert!(rendered.content[0].starts_with('`'));
        assert!(rendered.content[0].ends_with("` **Ada** hello"));
    }

    #[test]
    fn test_header_multi_line() {
        let rendered = convert(&message("line one\nline two"), &users(), &channels());
        assert!(rendered.content[0].ends_with("**Ada**\nline one\nline two"));
    }

    #[test]
    fn test_embeds_from_links() {
        let mut msg = message("look");
        msg.links.push(LinkRef {
            title: Some("Docs".into()),
            title_link: Some("https://docs.rs".into()),
            service_name: Some("docs.rs".into()),
            ..LinkRef::default()
        });
        msg.links.push(LinkRef::default());

        let rendered = convert(&msg, &users(), &channels());
        assert_eq!(rendered.embeds.len(), 1);
        let embed = &rendered.embeds[0];
        assert_eq!(embed.url.as_deref(), Some("https://docs.rs"));
        assert_eq!(
            embed.author,
            Some(EmbedAuthor {
                name: Some("docs.rs".into()),
                icon_url: None
            })
        );
    }

    #[test]
    fn test_embeds_capped() {
        let mut msg = message("many");
        for i in 0..12 {
            msg.links.push(LinkRef {
                title: Some(format!("link {i}")),
                ..LinkRef::default()
            });
        }
        let rendered = convert(&msg, &users(), &channels());
        assert_eq!(rendered.embeds.len(), MAX_DISCORD_EMBEDS);
        assert_eq!(rendered.embeds[9].title.as_deref(), Some("link 9"));
    }

    #[test]
    fn test_split_prefers_newlines() {
        let chunks = split_content("aaaa\nbbbb\ncc", 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb", "cc"]);
    }

    #[test]
    fn test_split_hard_without_newline() {
        let chunks = split_content("ééééé", 2);
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
    }

    #[test]
    fn test_split_short_content() {
        assert_eq!(split_content("hi", 2000), vec!["hi"]);
        assert_eq!(split_content("", 2000), vec![""]);
    }

    #[test]
    fn test_long_message_is_split() {
        let body = "x".repeat(DISCORD_MESSAGE_LIMIT * 2);
        let rendered = convert(&message(&body), &users(), &channels());
        assert!(rendered.content.len() >= 2);
        assert!(rendered
            .content
            .iter()
            .all(|c| c.chars().count() <= DISCORD_MESSAGE_LIMIT));
        assert_eq!(rendered.content.concat().matches('x').count(), body.len());
    }
}
