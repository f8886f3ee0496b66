//! Reasoning extraction middleware.
//!
//! Some backends interleave `<thinking>...</thinking>` spans inside plain
//! text deltas instead of using a dedicated reasoning channel.
//! [`extract_reasoning`] wraps a chunk stream and splits that content out
//! into `reasoning-delta` chunks framed by `reasoning-start`/`reasoning-end`,
//! handling tags split across delta boundaries.

use std::sync::{Arc, Mutex};

use futures::StreamExt;

use stream_chunk::StreamChunk;

use super::{ChunkStream, ProviderError};

const OPEN_TAG: &str = "<thinking>";
const CLOSE_TAG: &str = "</thinking>";

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Text,
    Thinking,
}

/// Stateful scanner that splits thinking spans out of text deltas.
pub struct ReasoningExtractor {
    mode: Mode,
    /// Undecided tail: a suffix that may be the start of a split tag.
    carry: String,
}

impl Default for ReasoningExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ReasoningExtractor {
    pub fn new() -> Self {
        Self {
            mode: Mode::Text,
            carry: String::new(),
        }
    }

    /// Feeds one text delta; returns the chunks to emit in its place.
    pub fn push(&mut self, delta: &str) -> Vec<StreamChunk> {
        self.carry.push_str(delta);
        let mut out = Vec::new();

        loop {
            let tag = match self.mode {
                Mode::Text => OPEN_TAG,
                Mode::Thinking => CLOSE_TAG,
            };
            match self.carry.find(tag) {
                Some(pos) => {
                    let before: String = self.carry[..pos].to_string();
                    self.emit_payload(&before, &mut out);
                    self.carry.drain(..pos + tag.len());
                    match self.mode {
                        Mode::Text => {
                            out.push(StreamChunk::ReasoningStart);
                            self.mode = Mode::Thinking;
                        }
                        Mode::Thinking => {
                            out.push(StreamChunk::ReasoningEnd);
                            self.mode = Mode::Text;
                        }
                    }
                }
                None => {
                    // Hold back the longest tail that could be a split tag.
                    let hold = held_back_len(&self.carry, tag);
                    let safe_len = self.carry.len() - hold;
                    if safe_len > 0 {
                        let safe: String = self.carry[..safe_len].to_string();
                        self.emit_payload(&safe, &mut out);
                        self.carry.drain(..safe_len);
                    }
                    break;
                }
            }
        }
        out
    }

    /// Flushes any held-back text. Call before forwarding a non-text chunk
    /// and at end of stream.
    pub fn flush(&mut self) -> Vec<StreamChunk> {
        if self.carry.is_empty() {
            return Vec::new();
        }
        let pending = std::mem::take(&mut self.carry);
        let mut out = Vec::new();
        self.emit_payload(&pending, &mut out);
        out
    }

    fn emit_payload(&self, text: &str, out: &mut Vec<StreamChunk>) {
        if text.is_empty() {
            return;
        }
        out.push(match self.mode {
            Mode::Text => StreamChunk::TextDelta {
                delta: text.to_string(),
            },
            Mode::Thinking => StreamChunk::ReasoningDelta {
                delta: text.to_string(),
            },
        });
    }
}

/// Length of the longest suffix of `buffer` that is a proper prefix of `tag`.
fn held_back_len(buffer: &str, tag: &str) -> usize {
    let max = tag.len().saturating_sub(1).min(buffer.len());
    for len in (1..=max).rev() {
        if !buffer.is_char_boundary(buffer.len() - len) {
            continue;
        }
        if tag.starts_with(&buffer[buffer.len() - len..]) {
            return len;
        }
    }
    0
}

/// Wraps a chunk stream with the thinking-tag extractor. Non-text chunks pass
/// through unchanged after any held-back text is flushed.
pub fn extract_reasoning(stream: ChunkStream) -> ChunkStream {
    let extractor = Arc::new(Mutex::new(ReasoningExtractor::new()));
    let mapped = stream
        .map(move |item| {
            let extractor = Arc::clone(&extractor);
            let out: Vec<Result<StreamChunk, ProviderError>> = match item {
                Ok(StreamChunk::TextDelta { delta }) => extractor
                    .lock()
                    .unwrap()
                    .push(&delta)
                    .into_iter()
                    .map(Ok)
                    .collect(),
                Ok(other) => {
                    let mut ext = extractor.lock().unwrap();
                    let mut out: Vec<Result<StreamChunk, ProviderError>> =
                        ext.flush().into_iter().map(Ok).collect();
                    out.push(Ok(other));
                    out
                }
                Err(e) => vec![Err(e)],
            };
            futures::stream::iter(out)
        })
        .flatten();
    Box::pin(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use stream_chunk::{ChunkKind, FinishReason};

    #[test]
    fn plain_text_passes_through() {
        let mut ext = ReasoningExtractor::new();
        let chunks = ext.push("hello world");
        assert_eq!(
            chunks,
            vec![StreamChunk::TextDelta {
                delta: "hello world".to_string()
            }]
        );
        assert!(ext.flush().is_empty());
    }

    #[test]
    fn thinking_span_in_one_delta() {
        let mut ext = ReasoningExtractor::new();
        let chunks = ext.push("a<thinking>deep</thinking>b");
        let kinds: Vec<ChunkKind> = chunks.iter().map(StreamChunk::kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChunkKind::TextDelta,
                ChunkKind::ReasoningStart,
                ChunkKind::ReasoningDelta,
                ChunkKind::ReasoningEnd,
                ChunkKind::TextDelta,
            ]
        );
    }

    #[test]
    fn tag_split_across_deltas() {
        let mut ext = ReasoningExtractor::new();
        let mut chunks = ext.push("before<think");
        chunks.extend(ext.push("ing>inside</thi"));
        chunks.extend(ext.push("nking>after"));
        chunks.extend(ext.flush());

        let kinds: Vec<ChunkKind> = chunks.iter().map(StreamChunk::kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChunkKind::TextDelta,
                ChunkKind::ReasoningStart,
                ChunkKind::ReasoningDelta,
                ChunkKind::ReasoningEnd,
                ChunkKind::TextDelta,
            ]
        );
        match &chunks[2] {
            StreamChunk::ReasoningDelta { delta } => assert_eq!(delta, "inside"),
            other => panic!("expected reasoning delta, got {:?}", other),
        }
    }

    #[test]
    fn false_prefix_is_released_as_text() {
        let mut ext = ReasoningExtractor::new();
        let mut chunks = ext.push("a<th");
        chunks.extend(ext.push("ought>b"));
        chunks.extend(ext.flush());
        let text: String = chunks
            .iter()
            .filter_map(|c| match c {
                StreamChunk::TextDelta { delta } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "a<thought>b");
    }

    #[tokio::test]
    async fn stream_wrapper_flushes_before_terminal_chunk() {
        let source: ChunkStream = Box::pin(futures::stream::iter(vec![
            Ok(StreamChunk::TextDelta {
                delta: "tail<thin".to_string(),
            }),
            Ok(StreamChunk::Finish {
                reason: FinishReason::Stop,
                usage: None,
                provider_metadata: None,
            }),
        ]));
        let chunks: Vec<StreamChunk> = extract_reasoning(source)
            .map(|r| r.unwrap())
            .collect()
            .await;
        let kinds: Vec<ChunkKind> = chunks.iter().map(StreamChunk::kind).collect();
        assert_eq!(
            kinds,
            vec![ChunkKind::TextDelta, ChunkKind::TextDelta, ChunkKind::Finish]
        );
        match &chunks[1] {
            StreamChunk::TextDelta { delta } => assert_eq!(delta, "<thin"),
            other => panic!("expected held-back text, got {:?}", other),
        }
    }
}
