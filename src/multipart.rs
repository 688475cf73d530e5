//! # Multipart Module
//!
//! Incremental splitter for `multipart/x-mixed-replace` response bodies. Body chunks of any size
//! are pushed in, and the start of every part plus the bytes of its body come out. Part headers
//! are skipped, and delimiters may straddle chunks.

// -----------------------------------------------------------------------------------------------
// DATA STRUCTS
// -----------------------------------------------------------------------------------------------

/// Splits a multipart body into parts.
#[derive(Debug)]
pub struct MultipartSplitter {
    /// `--` followed by the boundary
    delimiter: Vec<u8>,

    /// Bytes which could not be classified yet
    pending: Vec<u8>,

    state: SplitState
}

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

/// Output of the splitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    /// A new part has started
    Boundary,

    /// Body bytes of the current part
    Data(Vec<u8>)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitState {
    /// Before the first delimiter
    Preamble,

    /// After a delimiter, before the blank line ending the part headers
    Headers,

    /// Inside a part body
    Body,

    /// After the closing delimiter
    Epilogue
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl MultipartSplitter {
    pub fn new(boundary: &str) -> Self {
        let mut delimiter = b"--".to_vec();
        delimiter.extend_from_slice(boundary.as_bytes());

        Self {
            delimiter,
            pending: Vec::new(),
            state: SplitState::Preamble
        }
    }

    /// Whether the closing delimiter has been seen.
    pub fn is_finished(&self) -> bool {
        self.state == SplitState::Epilogue
    }

    /// Push a chunk of the body, returning everything which can be classified so far.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Part> {
        let mut parts = Vec::new();

        if self.state == SplitState::Epilogue {
            return parts;
        }

        self.pending.extend_from_slice(chunk);

        loop {
            match self.state {
                SplitState::Preamble => match find(&self.pending, &self.delimiter) {
                    Some(idx) => {
                        self.pending.drain(..idx + self.delimiter.len());
                        self.state = SplitState::Headers;
                    },
                    None => {
                        // Keep enough to recognise a delimiter split across chunks
                        let keep = self.delimiter.len().saturating_sub(1);
                        let excess = self.pending.len().saturating_sub(keep);
                        self.pending.drain(..excess);
                        break;
                    }
                },
                SplitState::Headers => {
                    if self.pending.starts_with(b"--") {
                        self.pending.clear();
                        self.state = SplitState::Epilogue;
                        break;
                    }

                    match find(&self.pending, b"\r\n\r\n") {
                        Some(idx) => {
                            self.pending.drain(..idx + 4);
                            parts.push(Part::Boundary);
                            self.state = SplitState::Body;
                        },
                        None => break
                    }
                },
                SplitState::Body => match find(&self.pending, &self.delimiter) {
                    Some(idx) => {
                        let mut body: Vec<u8> = self.pending.drain(..idx).collect();
                        if body.ends_with(b"\r\n") {
                            body.truncate(body.len() - 2);
                        }
                        if !body.is_empty() {
                            parts.push(Part::Data(body));
                        }
                        self.pending.drain(..self.delimiter.len());
                        self.state = SplitState::Headers;
                    },
                    None => {
                        // Hold back a possible partial delimiter and the CRLF preceding it
                        let keep = self.delimiter.len() + 1;
                        if self.pending.len() > keep {
                            let body = self.pending.drain(..self.pending.len() - keep).collect();
                            parts.push(Part::Data(body));
                        }
                        break;
                    }
                },
                SplitState::Epilogue => break
            }
        }

        parts
    }
}

// -----------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Extract the boundary parameter from a multipart `Content-Type` header value.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');

    let mime = params.next()?.trim().to_ascii_lowercase();
    if !mime.starts_with("multipart/") {
        return None;
    }

    params
        .filter_map(|p| {
            let mut kv = p.splitn(2, '=');
            let key = kv.next()?.trim();
            let value = kv.next()?.trim();
            if key.eq_ignore_ascii_case("boundary") {
                Some(value.trim_matches('"').to_string())
            } else {
                None
            }
        })
        .find(|b| !b.is_empty())
}

// -----------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// -----------------------------------------------------------------------------------------------

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }

    haystack.windows(needle.len()).position(|w| w == needle)
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {

    use super::*;

    const BODY: &[u8] = b"preamble\r\n\
        --frame\r\nContent-Type: image/jpeg\r\nContent-Length: 5\r\n\r\nfirst\r\n\
        --frame\r\nContent-Type: image/jpeg\r\n\r\nsecond part\r\n\
        --frame\r\n\r\nthird\r\n\
        --frame--\r\nepilogue";

    /// Collapse consecutive data so tests don't depend on chunking.
    fn normalise(parts: Vec<Part>) -> Vec<Part> {
        let mut out: Vec<Part> = Vec::new();
        for part in parts {
            match (out.last_mut(), part) {
                (Some(Part::Data(prev)), Part::Data(d)) => prev.extend_from_slice(&d),
                (_, p) => out.push(p)
            }
        }
        out
    }

    fn expected() -> Vec<Part> {
        vec![
            Part::Boundary,
            Part::Data(b"first".to_vec()),
            Part::Boundary,
            Part::Data(b"second part".to_vec()),
            Part::Boundary,
            Part::Data(b"third".to_vec())
        ]
    }

    /// Test splitting a body delivered in one chunk
    #[test]
    fn test_single_chunk() {
        let mut splitter = MultipartSplitter::new("frame");

        assert_eq!(normalise(splitter.push(BODY)), expected());
        assert!(splitter.is_finished());
        assert!(splitter.push(b"--frame\r\n\r\nmore").is_empty());
    }

    /// Test every chunk size, so delimiters and header terminators straddle chunks
    #[test]
    fn test_any_chunking() {
        for size in 1..BODY.len() {
            let mut splitter = MultipartSplitter::new("frame");
            let parts = BODY.chunks(size).flat_map(|c| splitter.push(c)).collect();

            assert_eq!(normalise(parts), expected(), "chunk size {}", size);
        }
    }

    /// Test that body bytes resembling the delimiter are not split on
    #[test]
    fn test_lookalike_delimiter() {
        let mut splitter = MultipartSplitter::new("frame");
        let parts = splitter.push(b"--frame\r\n\r\n--fram-e-\r\n--frame\r\n\r\n");

        assert_eq!(normalise(parts), vec![
            Part::Boundary,
            Part::Data(b"--fram-e-".to_vec()),
            Part::Boundary
        ]);
    }

    #[test]
    fn test_boundary_from_content_type() {
        assert_eq!(
            boundary_from_content_type("multipart/x-mixed-replace; boundary=frame"),
            Some("frame".to_string())
        );
        assert_eq!(
            boundary_from_content_type("multipart/x-mixed-replace;charset=utf-8; Boundary=\"---osclivepreview---\""),
            Some("---osclivepreview---".to_string())
        );
        assert_eq!(boundary_from_content_type("image/jpeg"), None);
        assert_eq!(boundary_from_content_type("multipart/x-mixed-replace"), None);
        assert_eq!(boundary_from_content_type("multipart/x-mixed-replace; boundary="), None);
    }
}
