//! Multi-turn chat over the completion endpoint

use crate::error::GgufResult;
use crate::proxy::client::ServerClient;
use serde_json::Value;
use std::io::Write;

pub const CHAT_PREAMBLE: &str = "A chat between a curious human and an artificial intelligence assistant. The assistant gives helpful, detailed, and polite answers to the human's questions.";

/// Generation stops when the model starts writing the next human turn
pub const STOP_MARKER: &str = "\n### Human:";

const HUMAN_PREFIX: &str = "\n### Human: ";
const ASSISTANT_PREFIX: &str = "\n### Assistant: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Human,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// Transcript of one interactive session
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    turns: Vec<Turn>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn push(&mut self, role: Role, text: impl Into<String>) {
        self.turns.push(Turn {
            role,
            text: text.into(),
        });
    }

    /// Full prompt for the next completion
    pub fn prompt(&self) -> String {
        let mut prompt = String::from(CHAT_PREAMBLE);
        for turn in &self.turns {
            prompt.push_str(match turn.role {
                Role::Human => HUMAN_PREFIX,
                Role::Assistant => ASSISTANT_PREFIX,
            });
            prompt.push_str(&turn.text);
        }
        if matches!(self.turns.last(), Some(t) if t.role == Role::Human) {
            prompt.push_str(ASSISTANT_PREFIX);
        }
        prompt
    }

    /// Send one human message and stream the reply into `out`
    ///
    /// On success the transcript gains the human turn and exactly one
    /// assistant turn. On failure it is left as it was before the call.
    pub async fn send<W: Write>(
        &mut self,
        client: &ServerClient,
        input: &str,
        out: &mut W,
    ) -> GgufResult<String> {
        self.push(Role::Human, input);
        let prompt = self.prompt();

        let result = client
            .complete_stream(&prompt, &[STOP_MARKER], |fragment| {
                out.write_all(fragment.as_bytes())?;
                out.flush()?;
                Ok(())
            })
            .await;

        match result {
            Ok(reply) => {
                self.push(Role::Assistant, reply.clone());
                Ok(reply)
            }
            Err(e) => {
                self.turns.pop();
                Err(e)
            }
        }
    }
}

/// Incremental splitter for a server-sent event body
///
/// Accepts arbitrary byte chunks and yields the `content` of every complete
/// `data: ` line. Lines that are not data lines, or whose payload is not
/// JSON with a string `content`, are skipped.
#[derive(Debug, Default)]
pub struct EventStreamScanner {
    buffer: Vec<u8>,
}

impl EventStreamScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut fragments = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(content) = parse_event_line(&line[..pos]) {
                fragments.push(content);
            }
        }
        fragments
    }

    /// Flush a trailing line that was not newline-terminated
    pub fn finish(&mut self) -> Vec<String> {
        let line = std::mem::take(&mut self.buffer);
        parse_event_line(&line).into_iter().collect()
    }
}

/// Content of a single `data: {...}` line
pub fn parse_event_line(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.strip_suffix('\r').unwrap_or(&line);
    let data = line.strip_prefix("data: ")?;

    match serde_json::from_str::<Value>(data) {
        Ok(value) => value.get("content")?.as_str().map(str::to_string),
        Err(e) => {
            tracing::trace!(error = %e, "Skipping malformed stream fragment");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_of_empty_session_is_preamble() {
        assert_eq!(ChatSession::new().prompt(), CHAT_PREAMBLE);
    }

    #[test]
    fn test_prompt_alternates_turns() {
        let mut session = ChatSession::new();
        session.push(Role::Human, "Hello");
        assert_eq!(
            session.prompt(),
            format!("{}\n### Human: Hello\n### Assistant: ", CHAT_PREAMBLE)
        );

        session.push(Role::Assistant, "Hi!");
        session.push(Role::Human, "How are you?");
        assert_eq!(
            session.prompt(),
            format!(
                "{}\n### Human: Hello\n### Assistant: Hi!\n### Human: How are you?\n### Assistant: ",
                CHAT_PREAMBLE
            )
        );
    }

    #[test]
    fn test_scanner_yields_content_and_skips_noise() {
        let mut scanner = EventStreamScanner::new();
        let body = b"data: {\"content\":\"Hi\"}\n\ndata: {\"content\":\" there\"}\n: keep-alive\ndata: not json\n";

        let fragments = scanner.feed(body);

        assert_eq!(fragments, vec!["Hi", " there"]);
        assert_eq!(fragments.concat(), "Hi there");
    }

    #[test]
    fn test_scanner_handles_split_chunks_and_crlf() {
        let mut scanner = EventStreamScanner::new();
        let mut fragments = scanner.feed(b"data: {\"con");
        assert!(fragments.is_empty());

        fragments.extend(scanner.feed(b"tent\":\"a\"}\r\ndata: {\"content\":\"b\"}"));
        assert_eq!(fragments, vec!["a"]);

        fragments.extend(scanner.finish());
        assert_eq!(fragments, vec!["a", "b"]);
        assert!(scanner.finish().is_empty());
    }

    #[test]
    fn test_parse_event_line_requires_string_content() {
        assert_eq!(parse_event_line(b"data: {\"content\":\"x\"}"), Some("x".to_string()));
        assert_eq!(parse_event_line(b"data: {\"content\":5}"), None);
        assert_eq!(parse_event_line(b"data: {\"stop\":true}"), None);
        assert_eq!(parse_event_line(b"event: done"), None);
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let line = "data: {\"content\":\"héllo\"}\n".as_bytes();
        let (a, b) = line.split_at(20);
        let mut scanner = EventStreamScanner::new();
        let mut fragments = scanner.feed(a);
        fragments.extend(scanner.feed(b));
        assert_eq!(fragments, vec!["héllo"]);
    }
}
