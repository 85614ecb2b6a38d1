//! Incremental parser for the MCS byte stream.
//!
//! The stream opens with a single version byte and then carries
//! `tag | varint-size | body` records back to back. [`StreamParser`] walks
//! that grammar with a four-state machine, reading exactly the bytes each
//! state needs, and yields one decoded [`McsMessage`] per call to
//! [`StreamParser::next`].

use log::trace;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    codec::{self, CodecError, MCS_VERSION, MCS_VERSION_COMPAT},
    registry::{self, Payload, RegistryError},
};

/// Position of the parser within the wire grammar.
///
/// `AwaitVersion` is entered exactly once per connection; after the first
/// frame the machine cycles `AwaitTag → AwaitSize → AwaitBody → AwaitTag`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParserState {
    AwaitVersion,
    AwaitTag,
    AwaitSize,
    AwaitBody,
}

/// One fully decoded frame from the stream.
#[derive(Clone, Debug, PartialEq)]
pub struct McsMessage {
    pub tag: u8,
    pub payload: Payload,
}

/// Errors terminating the parse (and with it the connection).
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The underlying reader failed or the stream ended mid-record.
    #[error("i/o error on mcs stream: {0}")]
    Io(#[from] std::io::Error),
    /// A size varint kept its continuation bit past the permitted length.
    #[error("malformed varint in frame size")]
    MalformedVarint,
    /// The connection did not open with a recognised protocol version.
    #[error("unexpected mcs version: {0}")]
    UnexpectedVersion(u8),
    /// A frame carried a tag outside the protocol's closed set.
    #[error("unknown message tag: {0}")]
    UnknownTag(u8),
    /// A frame body did not decode as its tag's protobuf type.
    #[error("malformed message body: {0}")]
    MalformedBody(#[source] prost::DecodeError),
}

impl From<CodecError> for ParseError {
    fn from(value: CodecError) -> Self {
        match value {
            CodecError::Io(err) => ParseError::Io(err),
            CodecError::MalformedVarint => ParseError::MalformedVarint,
        }
    }
}

impl From<RegistryError> for ParseError {
    fn from(value: RegistryError) -> Self {
        match value {
            RegistryError::UnknownTag(tag) => ParseError::UnknownTag(tag),
            RegistryError::MalformedBody { source, .. } => ParseError::MalformedBody(source),
        }
    }
}

/// Streaming MCS frame reader over any [`AsyncRead`].
///
/// The parser holds no buffer of its own; each state reads exactly the byte
/// count it needs, so wrapping the reader in a `BufReader` is advisable for
/// real sockets.
pub struct StreamParser<R> {
    reader: R,
    state: ParserState,
    tag: u8,
    size: u32,
    frames_read: u64,
}

impl<R> StreamParser<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap `reader` in a parser positioned before the version byte.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: ParserState::AwaitVersion,
            tag: 0,
            size: 0,
            frames_read: 0,
        }
    }

    /// Current state, exposed for diagnostics.
    #[must_use]
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Read until the next complete message and return it.
    ///
    /// Cancelling the returned future mid-read leaves the parser in an
    /// undefined position within the grammar; callers only do so when
    /// tearing the connection down.
    ///
    /// # Errors
    ///
    /// Any [`ParseError`] is terminal for the connection: the session that
    /// owns this parser closes the transport rather than resynchronising.
    pub async fn next(&mut self) -> Result<McsMessage, ParseError> {
        loop {
            match self.state {
                ParserState::AwaitVersion => self.read_version().await?,
                ParserState::AwaitTag => self.read_tag().await?,
                ParserState::AwaitSize => self.read_size().await?,
                ParserState::AwaitBody => return self.read_body().await,
            }
        }
    }

    async fn read_version(&mut self) -> Result<(), ParseError> {
        let version = self.reader.read_u8().await?;
        // 38 is the pre-41 wire revision; some frontends still answer with
        // it, so it stays accepted alongside the version we send.
        if version != MCS_VERSION && version != MCS_VERSION_COMPAT {
            return Err(ParseError::UnexpectedVersion(version));
        }
        trace!("mcs version byte accepted: {version}");
        self.state = ParserState::AwaitTag;
        Ok(())
    }

    async fn read_tag(&mut self) -> Result<(), ParseError> {
        self.tag = self.reader.read_u8().await?;
        self.state = ParserState::AwaitSize;
        Ok(())
    }

    async fn read_size(&mut self) -> Result<(), ParseError> {
        self.size = codec::read_varint(&mut self.reader).await?;
        self.state = ParserState::AwaitBody;
        Ok(())
    }

    async fn read_body(&mut self) -> Result<McsMessage, ParseError> {
        let payload = if self.size > 0 {
            let mut body = vec![0u8; self.size as usize];
            self.reader.read_exact(&mut body).await?;
            registry::decode(self.tag, &body)?
        } else {
            registry::empty(self.tag)?
        };

        let tag = self.tag;
        self.frames_read += 1;
        trace!(
            "frame #{count}: tag={tag} size={size}",
            count = self.frames_read,
            size = self.size
        );

        self.tag = 0;
        self.size = 0;
        self.state = ParserState::AwaitTag;
        Ok(McsMessage { tag, payload })
    }
}
