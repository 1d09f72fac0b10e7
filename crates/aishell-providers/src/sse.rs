//! Line-oriented streaming for vendor responses.
//!
//! Server-sent events (Claude, OpenAI, OpenRouter, Gemini) and NDJSON
//! (Ollama) are both consumed line by line; each client supplies a parser
//! that turns one line into a [`LineEvent`].

use futures::StreamExt;

use crate::http::check_status;
use crate::traits::{ProviderError, TextStream};

/// What one line of a streamed response means.
#[derive(Debug, PartialEq)]
pub(crate) enum LineEvent {
    Text(String),
    Skip,
    Done,
}

/// Strip the `data:` prefix of an SSE line.
///
/// Returns `None` for comments, `event:` lines, and the `[DONE]` sentinel.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return None;
    }
    Some(data)
}

/// Send `request` and stream the text produced by `parse` for each line.
///
/// Follows the [`TextStream`] convention: the first error ends the stream.
pub(crate) fn line_stream<F>(
    provider: &'static str,
    request: reqwest::RequestBuilder,
    parse: F,
) -> TextStream
where
    F: Fn(&str) -> Result<LineEvent, ProviderError> + Send + 'static,
{
    Box::pin(async_stream::try_stream! {
        let response = request.send().await?;
        let response = check_status(provider, response).await?;

        let mut bytes = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut done = false;

        while !done {
            let Some(chunk) = bytes.next().await else {
                break;
            };
            buffer.extend_from_slice(&chunk?);

            // Process complete lines
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match parse(line)? {
                    LineEvent::Text(text) => {
                        if !text.is_empty() {
                            yield text;
                        }
                    }
                    LineEvent::Done => {
                        done = true;
                        break;
                    }
                    LineEvent::Skip => {}
                }
            }
        }

        // A final line without a trailing newline
        if !done {
            let rest = String::from_utf8_lossy(&buffer);
            let rest = rest.trim();
            if !rest.is_empty() {
                if let LineEvent::Text(text) = parse(rest)? {
                    if !text.is_empty() {
                        yield text;
                    }
                }
            }
        }
    })
}
