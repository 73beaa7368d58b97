//! Commands that forward to the inference server

use crate::error::{GgufError, GgufResult};
use crate::proxy::chat::ChatSession;
use crate::proxy::client::ServerClient;
use crate::store::Store;
use crate::supervisor::{EnsureOutcome, Supervisor};
use serde_json::Value;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

const RULE_WIDTH: usize = 80;

/// Inference commands bound to one store, supervisor and server
pub struct Proxy<'a> {
    pub supervisor: &'a Supervisor,
    pub store: &'a Store,
    pub client: &'a ServerClient,
}

impl<'a> Proxy<'a> {
    async fn ensure(&self, slug: &str) -> GgufResult<()> {
        match self.supervisor.ensure_running(self.store, slug).await? {
            EnsureOutcome::AlreadyRunning { pid } => {
                tracing::debug!(slug = %slug, pid = pid, "Reusing running server");
            }
            EnsureOutcome::Started { pid, checks } => {
                tracing::info!(slug = %slug, pid = pid, checks = checks, "Server ready");
            }
        }
        Ok(())
    }

    /// Complete `text`, or just bring the server up when it is empty
    pub async fn run<W: Write>(&self, slug: &str, text: &str, out: &mut W) -> GgufResult<()> {
        self.ensure(slug).await?;

        if text.is_empty() {
            writeln!(
                out,
                "Server for model {} is running. Use 'gguf chat {}' to start a chat session.",
                slug, slug
            )?;
            return Ok(());
        }

        tracing::info!(slug = %slug, "Completing text");
        let content = self.client.complete(text).await?;
        writeln!(out, "{}", "─".repeat(RULE_WIDTH))?;
        writeln!(out, "{}", content)?;
        Ok(())
    }

    /// Interactive chat reading lines from `input`
    pub async fn chat<R, W>(&self, slug: &str, input: R, out: &mut W) -> GgufResult<ChatSession>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        self.ensure(slug).await?;
        chat_loop(self.client, input, out).await
    }

    pub async fn embed<W: Write>(&self, slug: &str, text: &str, out: &mut W) -> GgufResult<()> {
        self.ensure(slug).await?;
        print_json(out, &self.client.embed(text).await?)
    }

    pub async fn tokenize<W: Write>(&self, slug: &str, text: &str, out: &mut W) -> GgufResult<()> {
        self.ensure(slug).await?;
        print_json(out, &self.client.tokenize(text).await?)
    }

    pub async fn detokenize<W: Write>(
        &self,
        slug: &str,
        tokens_json: &str,
        out: &mut W,
    ) -> GgufResult<()> {
        let tokens = parse_tokens(tokens_json)?;
        self.ensure(slug).await?;
        print_json(out, &self.client.detokenize(&tokens).await?)
    }
}

/// Read-eval loop for a chat session; ends on `exit` or end of input
pub async fn chat_loop<R, W>(client: &ServerClient, input: R, out: &mut W) -> GgufResult<ChatSession>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut session = ChatSession::new();
    let mut lines = input.lines();

    writeln!(out, "Starting chat session. Type 'exit' to end.")?;
    loop {
        write!(out, "User: ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };
        let line = line.trim();
        if line == "exit" {
            break;
        }

        write!(out, "Assistant: ")?;
        session.send(client, line, out).await?;
        writeln!(out)?;
    }

    writeln!(out, "Chat session ended.")?;
    Ok(session)
}

/// `GET /health` without starting anything
pub async fn health<W: Write>(client: &ServerClient, out: &mut W) -> GgufResult<()> {
    print_json(out, &client.health().await?)
}

/// `GET /props` without starting anything
pub async fn props<W: Write>(client: &ServerClient, out: &mut W) -> GgufResult<()> {
    print_json(out, &client.props().await?)
}

/// Parse a JSON array of token ids
pub fn parse_tokens(raw: &str) -> GgufResult<Vec<i64>> {
    serde_json::from_str(raw)
        .map_err(|e| GgufError::Validation(format!("parsing tokens: {}", e)))
}

fn print_json<W: Write>(out: &mut W, value: &Value) -> GgufResult<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tokens() {
        assert_eq!(parse_tokens("[1, 2, 3]").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_tokens("[]").unwrap(), Vec::<i64>::new());
    }

    #[test]
    fn test_parse_tokens_rejects_non_integer_arrays() {
        for raw in ["1,2,3", "[\"a\"]", "[1.5]", "{}"] {
            let err = parse_tokens(raw).unwrap_err();
            assert!(matches!(err, GgufError::Validation(_)), "{raw}");
        }
    }

    #[tokio::test]
    async fn test_run_without_text_only_starts_server() {
        use crate::config::GenerationParams;
        use crate::health::mocks::MockProbe;
        use crate::process::mocks::{MockInspector, MockLauncher};
        use crate::store::NewModel;
        use crate::supervisor::SupervisorSettings;
        use std::path::Path;
        use std::sync::Arc;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let inspector = Arc::new(MockInspector::new());
        let launcher = Arc::new(MockLauncher::new(inspector.clone()));
        let supervisor = Supervisor::new(
            SupervisorSettings {
                server_binary: "llama-server".to_string(),
                port: 1966,
                log_dir: dir.path().to_path_buf(),
                lock_dir: dir.path().join("locks"),
                max_ticks: 10,
                tick: Duration::from_millis(1),
                kill_grace: Duration::ZERO,
            },
            inspector,
            launcher.clone(),
            Arc::new(MockProbe::healthy_on(2)),
        );
        let store = Store::open_in_memory().unwrap();
        store
            .upsert(&NewModel {
                slug: "phi",
                source_id: "a/phi",
                file_name: "phi.gguf",
                file_path: Path::new("/m/a/phi/phi.gguf"),
                file_size: "1M",
            })
            .unwrap();
        // Nothing listens here; the empty-text path never calls it
        let client = ServerClient::new("http://127.0.0.1:9", GenerationParams::default());
        let proxy = Proxy {
            supervisor: &supervisor,
            store: &store,
            client: &client,
        };

        let mut out = Vec::new();
        proxy.run("phi", "", &mut out).await.unwrap();

        assert_eq!(launcher.launches().len(), 1);
        assert!(String::from_utf8(out).unwrap().contains("gguf chat phi"));
    }

    #[test]
    fn test_print_json_is_pretty() {
        let mut out = Vec::new();
        print_json(&mut out, &serde_json::json!({"tokens": [1]})).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\n  \"tokens\": [\n    1\n  ]\n}\n"
        );
    }
}
