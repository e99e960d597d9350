//! Line framing for streamed HTTP bodies.
//!
//! Both wire formats the providers use are line oriented: Server-Sent
//! Events (`data: {...}` lines, blank separators, `:` comments, an optional
//! `[DONE]` marker) and newline-delimited JSON. Bytes are buffered until a
//! full line is available so multi-byte characters never get split.

use coordination::{FragmentStream, InvocationError};
use futures::stream::{BoxStream, Stream, StreamExt};

/// Split a byte stream into lines, without the trailing `\n` / `\r\n`.
///
/// A transport error ends the stream after being yielded once, discarding
/// any partial line. At a clean end a final unterminated line is yielded.
pub fn lines<S, B, E>(bytes: S) -> BoxStream<'static, Result<String, InvocationError>>
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    futures::stream::unfold(
        (bytes, Vec::<u8>::with_capacity(8192), false),
        |(mut bytes, mut buffer, finished)| async move {
            if finished {
                return None;
            }

            loop {
                if let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line: Vec<u8> = buffer.drain(..=pos).collect();
                    line.pop();
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    let text = String::from_utf8_lossy(&line).into_owned();
                    return Some((Ok(text), (bytes, buffer, false)));
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(chunk.as_ref()),
                    Some(Err(e)) => {
                        let err = InvocationError::Stream(e.to_string());
                        return Some((Err(err), (bytes, Vec::new(), true)));
                    }
                    None => {
                        if buffer.is_empty() {
                            return None;
                        }
                        let text = String::from_utf8_lossy(&buffer).into_owned();
                        return Some((Ok(text), (bytes, Vec::new(), true)));
                    }
                }
            }
        },
    )
    .boxed()
}

/// Payload of an SSE `data:` line.
///
/// `None` for blank lines, comments, other fields, and `[DONE]`.
pub fn sse_data(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }
    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?
        .trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data)
}

/// SSE payloads of a line stream.
pub fn sse_payloads(
    lines: BoxStream<'static, Result<String, InvocationError>>,
) -> BoxStream<'static, Result<String, InvocationError>> {
    lines
        .filter_map(|line| async move {
            match line {
                Ok(line) => sse_data(&line).map(|data| Ok(data.to_string())),
                Err(e) => Some(Err(e)),
            }
        })
        .boxed()
}

/// Non-blank NDJSON records of a line stream.
pub fn ndjson_records(
    lines: BoxStream<'static, Result<String, InvocationError>>,
) -> BoxStream<'static, Result<String, InvocationError>> {
    lines
        .filter(|line| {
            let keep = !matches!(line, Ok(l) if l.trim().is_empty());
            async move { keep }
        })
        .boxed()
}

/// Turn raw records into text fragments with a provider-specific decoder.
///
/// The decoder returns `Ok(None)` for records that carry no text. Empty
/// fragments are dropped.
pub fn fragments<F>(
    records: BoxStream<'static, Result<String, InvocationError>>,
    decode: F,
) -> FragmentStream
where
    F: Fn(&str) -> Result<Option<String>, InvocationError> + Send + Sync + 'static,
{
    records
        .filter_map(move |record| {
            let out = match record {
                Ok(raw) => match decode(&raw) {
                    Ok(Some(text)) if !text.is_empty() => Some(Ok(text)),
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                },
                Err(e) => Some(Err(e)),
            };
            async move { out }
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(
        parts: Vec<Result<&'static str, &'static str>>,
    ) -> impl Stream<Item = Result<Vec<u8>, String>> + Send + Unpin + 'static {
        futures::stream::iter(
            parts
                .into_iter()
                .map(|p| p.map(|s| s.as_bytes().to_vec()).map_err(str::to_string))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect(stream: BoxStream<'static, Result<String, InvocationError>>) -> Vec<String> {
        stream
            .map(|r| r.unwrap_or_else(|e| format!("ERR {}", e)))
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_lines_reassemble_across_chunks() {
        let got = collect(lines(chunks(vec![Ok("data: {\"a\""), Ok(":1}\r\n\ndata: x"), Ok("\n")]))).await;
        assert_eq!(got, vec!["data: {\"a\":1}", "", "data: x"]);
    }

    #[tokio::test]
    async fn test_lines_keep_multibyte_characters_whole() {
        let bytes = "héllo\n".as_bytes();
        let (a, b) = bytes.split_at(2);
        let parts: Vec<Result<Vec<u8>, String>> = vec![Ok(a.to_vec()), Ok(b.to_vec())];
        let got = collect(lines(futures::stream::iter(parts))).await;
        assert_eq!(got, vec!["héllo"]);
    }

    #[tokio::test]
    async fn test_lines_yield_trailing_line_and_errors() {
        let got = collect(lines(chunks(vec![Ok("one\ntwo"), Err("reset"), Ok("never")]))).await;
        // The unterminated "two" is dropped with the broken transport.
        assert_eq!(got, vec!["one", "ERR stream interrupted: reset"]);

        let got = collect(lines(chunks(vec![Ok("tail")]))).await;
        assert_eq!(got, vec!["tail"]);
    }

    #[test]
    fn test_sse_data() {
        assert_eq!(sse_data("data: {\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(sse_data("data:{}"), Some("{}"));
        assert_eq!(sse_data("data: [DONE]"), None);
        assert_eq!(sse_data(": keep-alive"), None);
        assert_eq!(sse_data("event: ping"), None);
        assert_eq!(sse_data(""), None);
    }

    #[tokio::test]
    async fn test_sse_and_ndjson_filters() {
        let sse = sse_payloads(lines(chunks(vec![Ok(": hi\ndata: a\n\ndata: [DONE]\n")])));
        assert_eq!(collect(sse).await, vec!["a"]);

        let nd = ndjson_records(lines(chunks(vec![Ok("{\"a\":1}\n\n  \n{\"b\":2}")])));
        assert_eq!(collect(nd).await, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[tokio::test]
    async fn test_fragments_drop_empty_and_surface_decode_errors() {
        let records = sse_payloads(lines(chunks(vec![Ok("data: a\ndata: -\ndata: !\ndata: b\n")])));
        let stream = fragments(records, |raw| match raw {
            "-" => Ok(Some(String::new())),
            "!" => Err(InvocationError::Parse("bad".into())),
            other => Ok(Some(other.to_string())),
        });
        assert_eq!(collect(stream).await, vec!["a", "ERR response parse error: bad", "b"]);
    }
}
