//! SOURCE request construction
//!
//! A source client registers with the broadcast server by sending a single
//! request and then streaming raw audio on the same socket:
//!
//! ```text
//! Relay                                    Server
//!   |                                        |
//!   |--- SOURCE /mount HTTP/1.0 ------------>|
//!   |--- Authorization / Content-Type / ... >|
//!   |--- \r\n ------------------------------>|
//!   |                                        |
//!   |<-- HTTP/1.0 200 OK (or nothing) -------|
//!   |                                        |
//!   |--- audio bytes, no framing ----------->|
//! ```
//!
//! Two dialects are in use. Icecast speaks the HTTP/1.0 form with Basic
//! authorization; Shoutcast-style and older Harbor inputs expect the ICY form
//! with a `source` literal. The dialect is chosen by configuration and never
//! switched mid-handshake.

use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;

use super::constants::CRLF;

/// Request line/authorization style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// `SOURCE <mount> HTTP/1.0` + `Authorization: Basic <base64(user:pass)>`
    #[default]
    Http,
    /// `SOURCE <mount> ICY/1.0` + `Authorization: source <user:pass>`
    Icy,
}

impl Dialect {
    fn version(&self) -> &'static str {
        match self {
            Dialect::Http => "HTTP/1.0",
            Dialect::Icy => "ICY/1.0",
        }
    }
}

/// Source credentials, fixed for the lifetime of a session
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn basic(&self) -> String {
        let pair = format!("{}:{}", self.username, self.password);
        base64::engine::general_purpose::STANDARD.encode(pair.as_bytes())
    }
}

// Keep passwords out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Station information announced through `ice-*` headers
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IceMetadata {
    pub name: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub url: Option<String>,
    pub bitrate: Option<u32>,
    /// Directory listing flag; unset is sent as `0`
    pub public: Option<bool>,
}

impl IceMetadata {
    /// Fill unset fields from `defaults`
    pub fn or(mut self, defaults: &IceMetadata) -> Self {
        if self.name.is_none() {
            self.name = defaults.name.clone();
        }
        if self.description.is_none() {
            self.description = defaults.description.clone();
        }
        if self.genre.is_none() {
            self.genre = defaults.genre.clone();
        }
        if self.url.is_none() {
            self.url = defaults.url.clone();
        }
        if self.bitrate.is_none() {
            self.bitrate = defaults.bitrate;
        }
        if self.public.is_none() {
            self.public = defaults.public;
        }
        self
    }
}

/// Everything needed to build one SOURCE request
#[derive(Debug, Clone)]
pub struct SourceRequest<'a> {
    pub mount: &'a str,
    pub credentials: &'a Credentials,
    pub content_type: &'a str,
    pub user_agent: &'a str,
    pub metadata: &'a IceMetadata,
    pub dialect: Dialect,
}

impl SourceRequest<'_> {
    /// Serialize the request line and header block.
    ///
    /// Pure: identical inputs give identical bytes, always ending in an empty line.
    pub fn build(&self) -> Bytes {
        let mut out = String::with_capacity(256);

        out.push_str("SOURCE ");
        out.push_str(&clean(self.mount));
        out.push(' ');
        out.push_str(self.dialect.version());
        out.push_str(CRLF);

        let authorization = match self.dialect {
            Dialect::Http => format!("Basic {}", self.credentials.basic()),
            Dialect::Icy if self.credentials.username.is_empty() => {
                format!("source {}", self.credentials.password)
            }
            Dialect::Icy => format!(
                "source {}:{}",
                self.credentials.username, self.credentials.password
            ),
        };
        header(&mut out, "Authorization", &authorization);
        header(&mut out, "Content-Type", self.content_type);
        header(&mut out, "User-Agent", self.user_agent);

        let meta = self.metadata;
        if let Some(name) = &meta.name {
            header(&mut out, "ice-name", name);
        }
        if let Some(description) = &meta.description {
            header(&mut out, "ice-description", description);
        }
        if let Some(genre) = &meta.genre {
            header(&mut out, "ice-genre", genre);
        }
        if let Some(url) = &meta.url {
            header(&mut out, "ice-url", url);
        }
        if let Some(bitrate) = meta.bitrate {
            header(&mut out, "ice-bitrate", &bitrate.to_string());
        }
        header(
            &mut out,
            "ice-public",
            if meta.public.unwrap_or(false) { "1" } else { "0" },
        );

        out.push_str(CRLF);
        Bytes::from(out)
    }
}

/// Out-of-band "now playing" update
#[derive(Debug, Clone)]
pub struct MetadataUpdate<'a> {
    pub mount: &'a str,
    pub credentials: &'a Credentials,
    pub user_agent: &'a str,
    pub dialect: Dialect,
    pub title: &'a str,
    pub artist: &'a str,
}

impl MetadataUpdate<'_> {
    /// Song string as listeners see it
    pub fn song(&self) -> String {
        match (self.artist.trim(), self.title.trim()) {
            ("", title) => title.to_string(),
            (artist, "") => artist.to_string(),
            (artist, title) => format!("{} - {}", artist, title),
        }
    }

    /// Build the admin request for this dialect
    pub fn build(&self, host: &str) -> Bytes {
        let song = urlencoding::encode(&self.song()).into_owned();

        let mut out = String::with_capacity(256);
        match self.dialect {
            Dialect::Http => {
                out.push_str(&format!(
                    "GET /admin/metadata?mode=updinfo&mount={}&song={} HTTP/1.0{}",
                    urlencoding::encode(self.mount),
                    song,
                    CRLF
                ));
                header(
                    &mut out,
                    "Authorization",
                    &format!("Basic {}", self.credentials.basic()),
                );
            }
            Dialect::Icy => {
                out.push_str(&format!(
                    "GET /admin.cgi?pass={}&mode=updinfo&song={} HTTP/1.0{}",
                    urlencoding::encode(&self.credentials.password),
                    song,
                    CRLF
                ));
            }
        }
        header(&mut out, "Host", host);
        header(&mut out, "User-Agent", self.user_agent);
        out.push_str(CRLF);
        Bytes::from(out)
    }
}

fn header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(&clean(value));
    out.push_str(CRLF);
}

/// Strip CR/LF so values cannot terminate the header block early.
fn clean(value: &str) -> String {
    value.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}
