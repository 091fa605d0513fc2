//! Folding of server-sent chat completion chunks into assistant turns.
//!
//! The provider streams `data: {json}` lines. Content deltas are forwarded as
//! they arrive; tool-call fragments are merged by their `index` until the
//! turn finishes, either through a non-empty `finish_reason` or the
//! `data: [DONE]` sentinel.

use std::collections::{BTreeMap, VecDeque};

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;

use super::{AiError, ChatResponse, FunctionCall, ToolCall};

/// Output of the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    /// Text delta, forwarded immediately.
    Content(String),
    /// The completed turn: all content plus tool calls ordered by index.
    Finished(ChatResponse),
}

/// Splits a byte stream into lines, holding partial lines across chunks.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no newline.
    scanned: usize,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completes (without `\r\n`).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.buffer[from..].iter().position(|b| *b == b'\n') {
            let end = from + offset;
            lines.push(decode_line(&self.buffer[start..end]));
            start = end + 1;
            from = start;
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        lines
    }

    /// Trailing line left when the stream ends without a newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        self.scanned = 0;
        let line = std::mem::take(&mut self.buffer);
        Some(decode_line(&line))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[derive(Debug, Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Accumulates one assistant turn from SSE lines.
#[derive(Debug, Default)]
pub struct StreamAggregator {
    content: String,
    tool_calls: BTreeMap<u32, ToolCall>,
    finished: bool,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Process one line. Lines after the turn finished are ignored.
    pub fn handle_line(&mut self, line: &str) -> Vec<StreamUpdate> {
        let mut updates = Vec::new();
        if self.finished {
            return updates;
        }

        let Some(data) = line.strip_prefix("data:") else {
            return updates;
        };
        let data = data.trim();

        if data == "[DONE]" {
            self.finished = true;
            if !self.content.is_empty() || !self.tool_calls.is_empty() {
                updates.push(self.finish("stop".to_string()));
            }
            return updates;
        }

        let Ok(chunk) = serde_json::from_str::<Chunk>(data) else {
            tracing::debug!(line = data, "skipping undecodable stream chunk");
            return updates;
        };
        let Some(choice) = chunk.choices.into_iter().next() else {
            return updates;
        };

        if let Some(delta) = choice.delta.content.filter(|c| !c.is_empty()) {
            self.content.push_str(&delta);
            updates.push(StreamUpdate::Content(delta));
        }

        for fragment in choice.delta.tool_calls {
            self.merge_tool_call(fragment);
        }

        if let Some(reason) = choice.finish_reason.filter(|r| !r.is_empty()) {
            self.finished = true;
            updates.push(self.finish(reason));
        }

        updates
    }

    fn merge_tool_call(&mut self, fragment: ToolCallDelta) {
        let function = fragment.function.unwrap_or_default();

        match self.tool_calls.get_mut(&fragment.index) {
            Some(call) => {
                if let Some(arguments) = function.arguments {
                    call.function.arguments.push_str(&arguments);
                }
            }
            None => {
                self.tool_calls.insert(
                    fragment.index,
                    ToolCall {
                        id: fragment.id.unwrap_or_default(),
                        kind: fragment.kind.unwrap_or_else(|| "function".to_string()),
                        function: FunctionCall {
                            name: function.name.unwrap_or_default(),
                            arguments: function.arguments.unwrap_or_default(),
                        },
                    },
                );
            }
        }
    }

    fn finish(&mut self, finish_reason: String) -> StreamUpdate {
        StreamUpdate::Finished(ChatResponse {
            content: std::mem::take(&mut self.content),
            tool_calls: std::mem::take(&mut self.tool_calls).into_values().collect(),
            finish_reason,
        })
    }
}

struct State<S> {
    body: S,
    decoder: SseLineDecoder,
    aggregator: StreamAggregator,
    pending: VecDeque<StreamUpdate>,
    done: bool,
}

/// Turn a raw SSE byte stream into [`StreamUpdate`]s.
///
/// The stream ends after the turn finishes, when the body ends, or after the
/// first transport error.
pub fn aggregate<S, B>(body: S) -> BoxStream<'static, Result<StreamUpdate, AiError>>
where
    S: Stream<Item = Result<B, AiError>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = State {
        body: Box::pin(body),
        decoder: SseLineDecoder::new(),
        aggregator: StreamAggregator::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(update) = state.pending.pop_front() {
                return Some((Ok(update), state));
            }
            if state.done {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => {
                    for line in state.decoder.push(chunk.as_ref()) {
                        state.pending.extend(state.aggregator.handle_line(&line));
                    }
                    state.done = state.aggregator.is_finished();
                }
                Some(Err(err)) => {
                    state.done = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.done = true;
                    if let Some(line) = state.decoder.finish() {
                        state.pending.extend(state.aggregator.handle_line(&line));
                    }
                }
            }
        }
    })
    .boxed()
}
