//! Conversation Driver - the per-session turn loop over the refinement chain.
//!
//! One user turn is fully processed before the next is accepted: the driver
//! builds a fresh chain, feeds the model chain-local context, dispatches
//! function calls, and freezes the finished chain into the transcript. The
//! transcript is the only cross-turn state and is append-only.

use crate::chain::RefinementChain;
use crate::error::Result;
use crate::executor::ToolExecutor;
use crate::model::{ChatModel, ModelReply};
use crate::refinement::Refinement;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Turn-pairs of prior conversation included in the global context.
pub const MAX_CONTEXT_SIZE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One persisted transcript entry. Assistant entries carry the frozen
/// refinement history of their turn so a UI can rebuild the "extended
/// reasoning" disclosure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: Role,
    pub content: String,
    pub refinements: Option<Vec<Refinement>>,
}

impl TranscriptMessage {
    fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            refinements: None,
        }
    }

    fn assistant(content: impl Into<String>, refinements: Vec<Refinement>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            refinements: Some(refinements),
        }
    }
}

pub struct ConversationDriver<M: ChatModel> {
    model: M,
    executor: ToolExecutor,
    dataset_id: String,
    transcript: Vec<TranscriptMessage>,
}

impl<M: ChatModel> ConversationDriver<M> {
    pub fn new(model: M, executor: ToolExecutor, dataset_id: impl Into<String>) -> Self {
        Self {
            model,
            executor,
            dataset_id: dataset_id.into(),
            transcript: Vec::new(),
        }
    }

    pub fn transcript(&self) -> &[TranscriptMessage] {
        &self.transcript
    }

    /// Previous conversation, windowed to the last `MAX_CONTEXT_SIZE`
    /// user/assistant turn-pairs.
    fn chat_context(&self) -> String {
        let start = self.transcript.len().saturating_sub(MAX_CONTEXT_SIZE * 2);
        let mut context = String::new();
        for message in &self.transcript[start..] {
            context.push_str(&format!("{}: {}\n\n", message.role.label(), message.content));
        }
        context
    }

    /// Session-level context, built once per turn and sent with the first
    /// model call only.
    fn global_context(&self, prompt: &str) -> String {
        format!(
            "You are a data analysis assistant.\n\
             Only use information that you learn from context refinements, \
             do not make up information.\n\n\
             Previous conversation:\n{}\n\
             Current question: {}\n",
            self.chat_context(),
            prompt
        )
    }

    /// Process one user message to completion and return the answer. The
    /// turn is recorded in the transcript as one user entry and one
    /// assistant entry carrying the frozen chain.
    pub async fn run_turn(&mut self, prompt: &str) -> Result<String> {
        let global_context = self.global_context(prompt);
        self.transcript.push(TranscriptMessage::user(prompt));

        let mut chain = match RefinementChain::create(&self.executor, &self.dataset_id).await {
            Ok(chain) => chain,
            Err(e) => {
                // Introspection failed before any model turn; the session
                // keeps accepting new user messages.
                let message = e.surface_message();
                self.transcript.push(TranscriptMessage::assistant(
                    message.clone(),
                    vec![Refinement::Error {
                        message: message.clone(),
                    }],
                ));
                return Ok(message);
            }
        };

        let mut first_interaction = true;
        loop {
            let mut whole_prompt = String::new();
            if first_interaction {
                whole_prompt.push_str(&global_context);
                first_interaction = false;
            }
            whole_prompt.push_str(&chain.local_context());

            match self.model.send_message(&whole_prompt).await? {
                ModelReply::Text(text) => {
                    // Escape dollar signs for markdown display surfaces.
                    chain.set_final_answer(text.replace('$', "\\$"));
                    break;
                }
                ModelReply::FunctionCall { name, args } => {
                    info!(tool = %name, "model requested a tool call");
                    chain.dispatch(&self.executor, &name, &args).await;
                    if chain.is_terminated() {
                        if let Refinement::Error { message } = chain.last_refinement() {
                            chain.set_final_answer(message.clone());
                        }
                        break;
                    }
                    // A graph leaves no legal tools; the next model turn sees
                    // the graph context and is expected to answer in text. If
                    // it calls a tool anyway, dispatch fails closed and the
                    // loop ends one turn later.
                }
            }
        }

        let answer = chain.final_answer().to_string();
        self.transcript
            .push(TranscriptMessage::assistant(answer.clone(), chain.into_history()));
        Ok(answer)
    }
}
