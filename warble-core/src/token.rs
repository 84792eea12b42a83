//! Flat JSON tokenization.
//!
//! Inbound frames are never deserialized into a document model. A
//! single pass produces a flat list of typed tokens, each holding byte
//! offsets into the source buffer and a count of its *direct* children.
//! The decoder then walks the list and copies out only the spans it
//! needs.
//!
//! Span convention: string tokens cover the content between the quotes;
//! object and array tokens cover the braces/brackets inclusive;
//! primitives cover the literal exactly.

use thiserror::Error;

// ── Token types ──────────────────────────────────────────────────

/// The syntactic class of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Object,
    Array,
    String,
    /// Number, `true`, `false` or `null`.
    Primitive,
}

/// One token: a typed span of the source buffer.
///
/// `child_count` is the number of direct children in the flat stream.
/// For an object that is every key *and* every value; for an array,
/// every element; strings and primitives have none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    pub child_count: usize,
}

impl Token {
    /// The token's byte span of `frame`, as UTF-8 text.
    pub fn text<'a>(&self, frame: &'a [u8]) -> Result<&'a str, std::str::Utf8Error> {
        std::str::from_utf8(&frame[self.start..self.end])
    }

    /// Returns `true` if this token is the JSON `null` literal.
    pub fn is_null(&self, frame: &[u8]) -> bool {
        self.kind == TokenKind::Primitive && &frame[self.start..self.end] == b"null"
    }
}

/// Tokenization failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The frame needs more tokens than the configured table allows.
    #[error("token table exhausted")]
    OutOfMemory,
    /// The buffer ended inside a value.
    #[error("partial input")]
    PartialInput,
    /// A byte that cannot start or continue a JSON value.
    #[error("invalid character at offset {0}")]
    Invalid(usize),
}

// ── Tokenizer ────────────────────────────────────────────────────

/// Single-pass JSON tokenizer over a byte buffer.
pub struct JsonTokenizer;

impl JsonTokenizer {
    /// Tokenize `input`, refusing to grow past `max_tokens`.
    pub fn tokenize(input: &[u8], max_tokens: usize) -> Result<Vec<Token>, TokenError> {
        let mut tokens: Vec<Token> = Vec::new();
        // Indexes of containers still waiting for their closer.
        let mut open: Vec<usize> = Vec::new();

        let mut i = 0;
        while i < input.len() {
            match input[i] {
                b'{' | b'[' => {
                    let kind = if input[i] == b'{' {
                        TokenKind::Object
                    } else {
                        TokenKind::Array
                    };
                    let idx = push(&mut tokens, &open, max_tokens, kind, i, 0)?;
                    open.push(idx);
                    i += 1;
                }
                b'}' | b']' => {
                    let expect = if input[i] == b'}' {
                        TokenKind::Object
                    } else {
                        TokenKind::Array
                    };
                    let idx = open.pop().ok_or(TokenError::Invalid(i))?;
                    if tokens[idx].kind != expect {
                        return Err(TokenError::Invalid(i));
                    }
                    tokens[idx].end = i + 1;
                    i += 1;
                }
                b'"' => {
                    let mut j = i + 1;
                    loop {
                        if j >= input.len() {
                            return Err(TokenError::PartialInput);
                        }
                        match input[j] {
                            b'\\' => j += 2,
                            b'"' => break,
                            _ => j += 1,
                        }
                    }
                    push(&mut tokens, &open, max_tokens, TokenKind::String, i + 1, j)?;
                    i = j + 1;
                }
                b' ' | b'\t' | b'\n' | b'\r' | b':' | b',' => i += 1,
                b'-' | b'0'..=b'9' | b't' | b'f' | b'n' => {
                    let mut j = i + 1;
                    while j < input.len() && !is_delimiter(input[j]) {
                        j += 1;
                    }
                    push(&mut tokens, &open, max_tokens, TokenKind::Primitive, i, j)?;
                    i = j;
                }
                _ => return Err(TokenError::Invalid(i)),
            }
        }

        if !open.is_empty() {
            return Err(TokenError::PartialInput);
        }
        Ok(tokens)
    }
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b',' | b']' | b'}' | b':' | b' ' | b'\t' | b'\n' | b'\r')
}

/// Append a token, crediting it to the innermost open container.
fn push(
    tokens: &mut Vec<Token>,
    open: &[usize],
    max_tokens: usize,
    kind: TokenKind,
    start: usize,
    end: usize,
) -> Result<usize, TokenError> {
    if tokens.len() >= max_tokens {
        return Err(TokenError::OutOfMemory);
    }
    if let Some(&parent) = open.last() {
        tokens[parent].child_count += 1;
    }
    tokens.push(Token {
        kind,
        start,
        end,
        child_count: 0,
    });
    Ok(tokens.len() - 1)
}

// ── Skip-size computation ────────────────────────────────────────

/// Number of tokens the value at `idx` occupies, descendants included.
///
/// Strings and primitives occupy one token; a container occupies one
/// plus the extents of each of its children. Skipping a consumed value
/// by anything other than this misaligns every later field in the
/// frame.
pub fn extent(tokens: &[Token], idx: usize) -> usize {
    let mut total = 1;
    let mut child = idx + 1;
    for _ in 0..tokens[idx].child_count {
        let sub = extent(tokens, child);
        total += sub;
        child += sub;
    }
    total
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(json: &str) -> Vec<Token> {
        JsonTokenizer::tokenize(json.as_bytes(), 64).unwrap()
    }

    #[test]
    fn flat_object() {
        let json = br#"{"op":10,"t":null}"#;
        let tokens = JsonTokenizer::tokenize(json, 64).unwrap();
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokens[0].kind, TokenKind::Object);
        assert_eq!(tokens[0].child_count, 4); // two keys, two values
        assert_eq!(tokens[1].text(json).unwrap(), "op");
        assert_eq!(tokens[2].text(json).unwrap(), "10");
        assert!(tokens[4].is_null(json));
    }

    #[test]
    fn string_span_excludes_quotes() {
        let json = br#"{"t":"READY"}"#;
        let tokens = JsonTokenizer::tokenize(json, 64).unwrap();
        assert_eq!(tokens[2].text(json).unwrap(), "READY");
    }

    #[test]
    fn escaped_quote_inside_string() {
        let json = br#"{"content":"say \"hi\""}"#;
        let tokens = JsonTokenizer::tokenize(json, 64).unwrap();
        assert_eq!(tokens[2].text(json).unwrap(), r#"say \"hi\""#);
    }

    #[test]
    fn nested_child_counts() {
        let tokens = toks(r#"{"d":{"a":1,"b":[2,3]}}"#);
        // root, "d", inner object, "a", 1, "b", array, 2, 3
        assert_eq!(tokens.len(), 9);
        assert_eq!(tokens[0].child_count, 2);
        assert_eq!(tokens[2].child_count, 4);
        assert_eq!(tokens[6].child_count, 2);
    }

    #[test]
    fn extent_of_primitives_is_one() {
        let tokens = toks(r#"{"s":5}"#);
        assert_eq!(extent(&tokens, 1), 1);
        assert_eq!(extent(&tokens, 2), 1);
    }

    #[test]
    fn extent_recurses_into_containers() {
        let tokens = toks(r#"{"d":{"a":[1,{"b":2}],"c":"x"}}"#);
        // The whole frame is one object.
        assert_eq!(extent(&tokens, 0), tokens.len());
        // The inner "d" object spans everything after its key.
        assert_eq!(extent(&tokens, 2), tokens.len() - 2);
    }

    #[test]
    fn extent_array_before_string() {
        // An array-valued field followed by a string field: the array's
        // extent must cover its nested tokens so the scan lands on "c".
        let json = r#"{"a":[1,[2,3]],"c":"after"}"#.as_bytes();
        let tokens = JsonTokenizer::tokenize(json, 64).unwrap();
        let array_idx = 2;
        assert_eq!(tokens[array_idx].kind, TokenKind::Array);
        let next_key = array_idx + extent(&tokens, array_idx);
        assert_eq!(tokens[next_key].text(json).unwrap(), "c");
        assert_eq!(tokens[next_key + 1].text(json).unwrap(), "after");
    }

    #[test]
    fn token_overflow() {
        let err = JsonTokenizer::tokenize(br#"{"a":1,"b":2}"#, 3).unwrap_err();
        assert_eq!(err, TokenError::OutOfMemory);
    }

    #[test]
    fn partial_input() {
        assert_eq!(
            JsonTokenizer::tokenize(br#"{"a":"unterminated"#, 64).unwrap_err(),
            TokenError::PartialInput
        );
        assert_eq!(
            JsonTokenizer::tokenize(br#"{"a":1"#, 64).unwrap_err(),
            TokenError::PartialInput
        );
    }

    #[test]
    fn invalid_input() {
        assert!(matches!(
            JsonTokenizer::tokenize(b"}", 64).unwrap_err(),
            TokenError::Invalid(_)
        ));
        assert!(matches!(
            JsonTokenizer::tokenize(br#"{"a":#}"#, 64).unwrap_err(),
            TokenError::Invalid(_)
        ));
        // Mismatched closer.
        assert!(matches!(
            JsonTokenizer::tokenize(br#"{"a":[1}]"#, 64).unwrap_err(),
            TokenError::Invalid(_)
        ));
    }

    #[test]
    fn primitives_recognized() {
        let json = br#"[true,false,null,-12.5]"#;
        let tokens = JsonTokenizer::tokenize(json, 64).unwrap();
        assert_eq!(tokens[0].child_count, 4);
        assert_eq!(tokens[1].text(json).unwrap(), "true");
        assert!(tokens[3].is_null(json));
        assert_eq!(tokens[4].text(json).unwrap(), "-12.5");
    }
}
