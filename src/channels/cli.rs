//! CLI channel: stdin/stdout REPL that plays a farmer for local testing.
//!
//! Lines are sent as inbound messages from one phone number. Lines starting
//! with `/` are commands: `/status`, `/reset`, `/quit`.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{Error, OnboardingError};
use crate::onboarding::{OnboardingService, ResponseStatus};

/// Simulated WhatsApp conversation for a single phone number.
pub struct CliChannel {
    service: Arc<OnboardingService>,
    phone_number: String,
}

impl CliChannel {
    pub fn new(service: Arc<OnboardingService>, phone_number: impl Into<String>) -> Self {
        Self {
            service,
            phone_number: phone_number.into(),
        }
    }

    /// Run against the process's stdin and stdout until EOF or `/quit`.
    pub async fn run(&self) -> std::io::Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.run_with(stdin, stdout).await
    }

    /// Run against any line source and sink.
    pub async fn run_with<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        writer
            .write_all(
                format!(
                    "Chatting as {}. Commands: /status, /reset, /quit\n> ",
                    self.phone_number
                )
                .as_bytes(),
            )
            .await?;
        writer.flush().await?;

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                writer.write_all(b"> ").await?;
                writer.flush().await?;
                continue;
            }

            let reply = match line {
                "/quit" => break,
                "/status" => self.status().await,
                "/reset" => self.reset().await,
                text => self.send(text).await,
            };

            writer.write_all(format!("\n{reply}\n\n> ").as_bytes()).await?;
            writer.flush().await?;
        }

        Ok(())
    }

    async fn send(&self, text: &str) -> String {
        match self.service.handle_inbound(&self.phone_number, text).await {
            Ok(response) => {
                let marker = match response.status {
                    ResponseStatus::InProgress => "in progress",
                    ResponseStatus::AwaitingSelection => "awaiting selection",
                    ResponseStatus::Completed => "completed",
                    ResponseStatus::Failed => "failed",
                };
                format!("{}\n[{marker}, attempts: {}]", response.message, response.attempts)
            }
            Err(Error::Onboarding(OnboardingError::NotRequired { status, .. })) => {
                format!("[onboarding is {status}; type /reset to start again]")
            }
            Err(e) => {
                tracing::error!(error = %e, "CLI message failed");
                format!("[error: {e}]")
            }
        }
    }

    async fn customer_id(&self) -> Option<i64> {
        // Creates the customer if this is the first command.
        match self.service.customer_for_phone(&self.phone_number).await {
            Ok(customer) => Some(customer.id),
            Err(e) => {
                tracing::error!(error = %e, "CLI customer lookup failed");
                None
            }
        }
    }

    async fn status(&self) -> String {
        let Some(id) = self.customer_id().await else {
            return "[error: customer lookup failed]".to_string();
        };
        match self.service.snapshot(id).await {
            Ok(snapshot) => serde_json::to_string_pretty(&snapshot)
                .unwrap_or_else(|e| format!("[error: {e}]")),
            Err(e) => format!("[error: {e}]"),
        }
    }

    async fn reset(&self) -> String {
        let Some(id) = self.customer_id().await else {
            return "[error: customer lookup failed]".to_string();
        };
        match self.service.reset_onboarding(id).await {
            Ok(_) => "[onboarding reset]".to_string(),
            Err(e) => format!("[error: {e}]"),
        }
    }
}
