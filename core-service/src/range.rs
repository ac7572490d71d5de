//! Single byte-range parsing for audio responses.
//!
//! Only one `bytes=` range is honoured. Multiple ranges, other units and
//! malformed headers are ignored and the full body is served.

/// Inclusive byte range within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered; never zero.
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` header.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    Full,
    Partial(ByteRange),
    Unsatisfiable,
}

/// Interpret a `Range` header against a file of `size` bytes.
pub fn parse_range(header: Option<&str>, size: u64) -> RangeRequest {
    let Some(ranges) = header.and_then(|h| h.trim().strip_prefix("bytes=")) else {
        return RangeRequest::Full;
    };
    if ranges.contains(',') {
        return RangeRequest::Full;
    }
    let Some((start, end)) = ranges.trim().split_once('-') else {
        return RangeRequest::Full;
    };
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        // Suffix form: the last `n` bytes
        let Ok(suffix) = end.parse::<u64>() else {
            return RangeRequest::Full;
        };
        if suffix == 0 || size == 0 {
            return RangeRequest::Unsatisfiable;
        }
        return RangeRequest::Partial(ByteRange {
            start: size.saturating_sub(suffix),
            end: size - 1,
        });
    }

    let Ok(start) = start.parse::<u64>() else {
        return RangeRequest::Full;
    };
    let end = if end.is_empty() {
        None
    } else {
        match end.parse::<u64>() {
            Ok(end) => Some(end),
            Err(_) => return RangeRequest::Full,
        }
    };

    if start >= size || end.is_some_and(|end| end < start) {
        return RangeRequest::Unsatisfiable;
    }

    let last = size - 1;
    RangeRequest::Partial(ByteRange {
        start,
        end: end.map_or(last, |end| end.min(last)),
    })
}
