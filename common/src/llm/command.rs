use crate::error::GenerationError;
use crate::llm::model::{render_prompt, ChatTemplate, CompletionModel, Message};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// completion backed by an external program (a local inference cli, a wrapper
/// script around a hosted api, ...). the rendered prompt goes to stdin and
/// the completion is read from stdout.
///
/// the child is killed when the call's future is dropped, e.g. on timeout.
#[derive(Debug, Clone)]
pub struct CommandModel {
    program: String,
    args: Vec<String>,
    template: ChatTemplate,
}

impl CommandModel {
    pub fn new(program: impl Into<String>, args: Vec<String>, template: ChatTemplate) -> Self {
        Self {
            program: program.into(),
            args,
            template,
        }
    }

    /// split a command line on whitespace; the first word is the program
    pub fn from_command_line(line: &str, template: ChatTemplate) -> Result<Self, GenerationError> {
        let mut words = line.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| GenerationError::Model("model command is empty".to_string()))?;

        Ok(Self::new(program, words.collect(), template))
    }
}

#[async_trait]
impl CompletionModel for CommandModel {
    #[tracing::instrument(skip(self, messages), fields(llm.program = %self.program, message_count = messages.len()))]
    async fn complete(&self, messages: &[Message]) -> Result<String, GenerationError> {
        let prompt = render_prompt(messages, self.template);
        tracing::debug!("formatted prompt length: {} chars", prompt.len());

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GenerationError::Model(format!("failed to spawn {}: {}", self.program, e)))?;

        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(prompt.as_bytes()).await?;
                // closing stdin tells the child the prompt is complete
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };

        // write and read together so a chatty child can't block on a full stdout pipe
        let (fed, output) = tokio::join!(feed, child.wait_with_output());

        let output = output
            .map_err(|e| GenerationError::Model(format!("failed to wait for {}: {}", self.program, e)))?;

        // the child may exit before reading the whole prompt; its status decides
        if let Err(e) = fed {
            tracing::debug!("prompt write ended early: {}", e);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GenerationError::Model(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8(output.stdout)
            .map_err(|e| GenerationError::Model(format!("model output is not utf-8: {}", e)))?;

        tracing::debug!("generated {} chars", text.len());
        Ok(text.trim().to_string())
    }

    fn name(&self) -> &str {
        &self.program
    }
}
