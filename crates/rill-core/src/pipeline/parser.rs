//! Payload parsing seam
//!
//! Container interpretation lives outside the engine; this trait gives
//! the pipeline a place to validate payloads and the embedder a hook to
//! plug a real demuxer in.

use crate::error::{Error, Result};
use crate::types::SegmentKind;
use bytes::Bytes;

/// A payload accepted by the parser, ready for the source buffer
#[derive(Debug, Clone)]
pub struct ParsedSegment {
    pub kind: SegmentKind,
    pub payload: Bytes,
}

pub trait SegmentParser: Send + Sync {
    fn parse(&self, kind: SegmentKind, raw: Bytes) -> Result<ParsedSegment>;
}

/// Forwards payloads untouched, rejecting empty ones
pub struct PassthroughParser;

impl SegmentParser for PassthroughParser {
    fn parse(&self, kind: SegmentKind, raw: Bytes) -> Result<ParsedSegment> {
        if raw.is_empty() {
            return Err(Error::SegmentParse("empty payload".into()));
        }
        Ok(ParsedSegment { kind, payload: raw })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_rejects_empty() {
        let parser = PassthroughParser;
        assert!(parser.parse(SegmentKind::Media, Bytes::new()).is_err());
        let parsed = parser
            .parse(SegmentKind::Media, Bytes::from_static(b"moof"))
            .unwrap();
        assert_eq!(parsed.payload.as_ref(), b"moof");
    }
}
