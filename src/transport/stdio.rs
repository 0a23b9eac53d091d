//! Interactive line-based conversation on stdin/stdout.
//!
//! Logs go to stderr, so stdout carries only the conversation.

use crate::error::{AppError, AppResult};
use crate::models::AgentResponse;
use crate::orchestrator::Orchestrator;
use crate::transport::{Transport, wait_for_signal};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{info, warn};

const BANNER: &str = "Ask questions about your database in plain language.\n\
Type 'new' to start over, 'exit' or 'quit' to leave.\n";
const PROMPT: &str = "> ";

/// REPL transport.
pub struct StdioTransport {
    orchestrator: Arc<Orchestrator>,
}

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplExit {
    /// `exit`, `quit` or end of input
    Quit,
    Signal,
}

fn io_error(e: std::io::Error) -> AppError {
    AppError::internal(format!("Terminal I/O failed: {}", e))
}

/// What the user sees for one response.
pub fn render_response(response: &AgentResponse) -> String {
    let mut out = response.message.clone();
    if response.success {
        if let Some(sql) = response.data_str("sql") {
            out.push_str("\n\nSQL: ");
            out.push_str(sql);
        }
    }
    out.push('\n');
    out
}

impl StdioTransport {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Drive the conversation over any line source and sink.
    pub async fn run_with<R, W>(&self, reader: R, mut writer: W) -> AppResult<ReplExit>
    where
        R: AsyncBufRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let mut lines = reader.lines();
        let mut session_id: Option<String> = None;

        writer.write_all(BANNER.as_bytes()).await.map_err(io_error)?;
        loop {
            writer.write_all(PROMPT.as_bytes()).await.map_err(io_error)?;
            writer.flush().await.map_err(io_error)?;

            let line = tokio::select! {
                line = lines.next_line() => line.map_err(io_error)?,
                _ = wait_for_signal() => return Ok(ReplExit::Signal),
            };
            let Some(line) = line else {
                return Ok(ReplExit::Quit);
            };

            let utterance = line.trim();
            match utterance.to_lowercase().as_str() {
                "" => continue,
                "exit" | "quit" => return Ok(ReplExit::Quit),
                "new" => {
                    if let Some(id) = session_id.take() {
                        self.orchestrator.delete_session(&id).await;
                    }
                    writer
                        .write_all(b"Started a new conversation.\n")
                        .await
                        .map_err(io_error)?;
                    continue;
                }
                _ => {}
            }

            let response = self
                .orchestrator
                .process(utterance, session_id.as_deref())
                .await;
            if let Some(id) = &response.session_id {
                session_id = Some(id.clone());
            }
            writer
                .write_all(render_response(&response).as_bytes())
                .await
                .map_err(io_error)?;
        }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> AppResult<()> {
        info!("Starting conversation on stdio");

        let reader = BufReader::new(tokio::io::stdin());
        let exit = self.run_with(reader, tokio::io::stdout()).await?;

        if exit == ReplExit::Signal {
            // A second signal forces exit while connections close
            tokio::spawn(async {
                wait_for_signal().await;
                warn!("Received second signal, forcing immediate exit");
                std::process::exit(1);
            });
        }

        info!("Closing all database connections");
        self.orchestrator.shutdown().await;

        if exit == ReplExit::Signal {
            // The blocking stdin read cannot be interrupted
            info!("Exiting process");
            std::process::exit(0);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}
