//! Session context
//!
//! Producer-supplied parameters for one session. Fixed once the session is
//! created: reconnects reuse the same credentials and station metadata.

use bytes::Bytes;

use super::{ProducerId, SessionId};
use crate::client::{MountResolver, RelayConfig};
use crate::protocol::constants::{DEFAULT_CONTENT_TYPE, DEFAULT_SOURCE_USER};
use crate::protocol::handshake::{Credentials, Dialect, IceMetadata, MetadataUpdate, SourceRequest};
use crate::protocol::message::StartStream;

/// Immutable inputs of a relay session
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Unique session ID
    pub session_id: SessionId,

    /// Producer connection that owns the session
    pub producer: ProducerId,

    /// Source credentials
    pub credentials: Credentials,

    /// MIME type of the audio stream
    pub content_type: String,

    /// Station metadata, producer values over configured defaults
    pub metadata: IceMetadata,

    /// Mount the producer asked for, tried before the configured list
    pub preferred_mount: Option<String>,
}

impl SessionContext {
    /// Build from a `start-stream` request
    pub fn from_start(
        session_id: SessionId,
        producer: ProducerId,
        start: StartStream,
        config: &RelayConfig,
    ) -> Self {
        // Icecast expects the literal `source` user when none is given;
        // the ICY dialect sends the bare password instead.
        let username = if start.user.trim().is_empty() && config.dialect == Dialect::Http {
            DEFAULT_SOURCE_USER.to_string()
        } else {
            start.user.trim().to_string()
        };

        let content_type = if start.mime.trim().is_empty() {
            DEFAULT_CONTENT_TYPE.to_string()
        } else {
            start.mime.trim().to_string()
        };

        let metadata = start
            .ice_metadata
            .unwrap_or_default()
            .or(&config.station);

        Self {
            session_id,
            producer,
            credentials: Credentials::new(username, start.password),
            content_type,
            metadata,
            preferred_mount: start.mount.filter(|m| !m.trim().is_empty()),
        }
    }

    /// Mount candidates for this session, in trial order
    pub fn mounts(&self, config: &RelayConfig) -> MountResolver {
        MountResolver::with_preferred(self.preferred_mount.as_deref(), &config.mounts)
    }

    /// SOURCE request for `mount`
    pub fn source_request(&self, mount: &str, config: &RelayConfig) -> Bytes {
        SourceRequest {
            mount,
            credentials: &self.credentials,
            content_type: &self.content_type,
            user_agent: &config.user_agent,
            metadata: &self.metadata,
            dialect: config.dialect,
        }
        .build()
    }

    /// Admin request that sets the now-playing title on `mount`
    pub fn metadata_update(
        &self,
        mount: &str,
        config: &RelayConfig,
        title: &str,
        artist: &str,
    ) -> Bytes {
        MetadataUpdate {
            mount,
            credentials: &self.credentials,
            user_agent: &config.user_agent,
            dialect: config.dialect,
            title,
            artist,
        }
        .build(&config.target())
    }
}
