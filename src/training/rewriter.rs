//! Prompt rewriting: `improve(current, feedback) -> revised`.
//!
//! Rewriters are pure text-to-text from the loop's point of view. The loop
//! never inspects how a revision was produced, only whether it differs and
//! whether it scores better.
//!
//! ## Agent Support
//!
//! Besides the HTTP client in [`crate::reader::openai`], any of the local LLM
//! CLIs can do the rewriting via `--rewriter`. The request is piped to the
//! CLI's stdin and the reply read from stdout:
//! - `claude`: Claude CLI (`claude --print`)
//! - `gemini`: Gemini CLI (`gemini -o text`)
//! - `codex`: OpenAI Codex CLI (`codex exec -`)

use std::io::Write;
use std::process::{Command, Stdio};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::reader::parse::strip_code_fence;

/// Produces a revised prompt from the current one and feedback text.
pub trait PromptRewriter {
    fn improve(&self, current: &str, feedback: &str) -> Result<String>;

    fn name(&self) -> &str;
}

impl<T: PromptRewriter + ?Sized> PromptRewriter for &T {
    fn improve(&self, current: &str, feedback: &str) -> Result<String> {
        (**self).improve(current, feedback)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: PromptRewriter + ?Sized> PromptRewriter for Box<T> {
    fn improve(&self, current: &str, feedback: &str) -> Result<String> {
        (**self).improve(current, feedback)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// The instruction sent to an LLM rewriter.
pub fn rewrite_request(current: &str, feedback: &str) -> String {
    format!(
        r#"You are a prompt engineering expert. Improve the following prompt based on the feedback.

Current prompt:
{current}

Feedback:
{feedback}

Please provide an improved version that addresses the issues mentioned in the feedback. Focus on making the instructions clearer and more specific for clock reading. Keep the JSON response format with "hour", "minute" and "confidence".

Return ONLY the improved prompt text, with no preamble or commentary.

Improved prompt:"#
    )
}

/// Normalize an LLM's reply into prompt text. Empty replies are an error.
pub fn clean_rewrite(response: &str) -> Result<String> {
    let mut text = response.trim();
    if let Some(rest) = text.strip_prefix("Improved prompt:") {
        text = rest.trim();
    }
    let text = strip_code_fence(text);
    if text.is_empty() {
        return Err(Error::Rewrite("rewriter returned an empty prompt".into()));
    }
    Ok(text.to_string())
}

/// Which LLM CLI to shell out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Agent {
    #[default]
    Claude,
    Gemini,
    /// OpenAI Codex CLI
    Codex,
}

impl FromStr for Agent {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" => Ok(Agent::Claude),
            "gemini" => Ok(Agent::Gemini),
            "codex" => Ok(Agent::Codex),
            _ => Err(format!("Unknown agent: {}. Use 'claude', 'gemini', or 'codex'", s)),
        }
    }
}

impl std::fmt::Display for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Agent::Claude => write!(f, "claude"),
            Agent::Gemini => write!(f, "gemini"),
            Agent::Codex => write!(f, "codex"),
        }
    }
}

impl Agent {
    fn program(self) -> &'static str {
        match self {
            Agent::Claude => "claude",
            Agent::Gemini => "gemini",
            Agent::Codex => "codex",
        }
    }

    /// Arguments for a one-shot, non-interactive reply to a prompt on stdin.
    fn args(self, model: Option<&str>) -> Vec<&str> {
        let (mut args, model_flag) = match self {
            Agent::Claude => (vec!["--print"], "--model"),
            Agent::Gemini => (vec!["-o", "text"], "-m"),
            Agent::Codex => (vec!["exec", "--skip-git-repo-check"], "-m"),
        };
        if let Some(m) = model {
            args.extend([model_flag, m]);
        }
        if self == Agent::Codex {
            args.push("-");
        }
        args
    }
}

/// Run `agent` on `prompt` and return its trimmed stdout.
///
/// The prompt goes in on stdin so long feedback never hits argv limits.
pub fn call_agent(agent: Agent, prompt: &str, model: Option<&str>) -> Result<String> {
    let program = agent.program();
    let mut child = Command::new(program)
        .args(agent.args(model))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Rewrite(format!("Failed to execute {}: {}", program, e)))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(prompt.as_bytes())
            .map_err(|e| Error::Rewrite(format!("Failed to write to {} stdin: {}", program, e)))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| Error::Rewrite(format!("Failed to wait for {}: {}", program, e)))?;

    if !output.status.success() {
        return Err(Error::Rewrite(format!(
            "{} returned error: {}",
            program,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Rewrites prompts by shelling out to a local LLM CLI.
#[derive(Debug, Clone)]
pub struct AgentRewriter {
    agent: Agent,
    model: Option<String>,
    label: String,
}

impl AgentRewriter {
    pub fn new(agent: Agent, model: Option<String>) -> Self {
        Self {
            agent,
            model,
            label: agent.to_string(),
        }
    }
}

impl PromptRewriter for AgentRewriter {
    fn improve(&self, current: &str, feedback: &str) -> Result<String> {
        let request = rewrite_request(current, feedback);
        let response = call_agent(self.agent, &request, self.model.as_deref())?;
        clean_rewrite(&response)
    }

    fn name(&self) -> &str {
        &self.label
    }
}
