use serde::{Deserialize, Serialize};

/// A single chat message in the OpenAI-compatible wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Inbound `POST /v1/chat/completions` body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// Minimum wire validity: a non-empty `messages` array whose entries
    /// all carry a non-empty `role` and `content`.
    pub fn validate(&self) -> Result<(), String> {
        if self.messages.is_empty() {
            return Err("messages must be a non-empty array".into());
        }
        for (i, m) in self.messages.iter().enumerate() {
            if m.role.is_empty() {
                return Err(format!("messages[{i}].role must not be empty"));
            }
            if m.content.is_empty() {
                return Err(format!("messages[{i}].content must not be empty"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    /// Approximate usage from raw prompt and completion text.
    ///
    /// `prompt_tokens = ceil(sum(len(content)) / 4)`,
    /// `completion_tokens = ceil(len(response) / 4)`. This is a contract,
    /// not a suggestion: it stands in for a real tokenizer and is pinned by
    /// tests.
    pub fn approximate(prompt_messages: &[Message], completion: &str) -> Self {
        let prompt_chars: usize = prompt_messages.iter().map(|m| m.content.len()).sum();
        let prompt_tokens = ceil_div4(prompt_chars);
        let completion_tokens = ceil_div4(completion.len());
        Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

fn ceil_div4(n: usize) -> u64 {
    ((n as u64) + 3) / 4
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl ChatCompletionResponse {
    pub fn new(model: String, content: String, usage: Usage, created: i64) -> Self {
        ChatCompletionResponse {
            id: format!("chatcmpl-{created}"),
            object: "chat.completion",
            created,
            model,
            choices: vec![Choice {
                index: 0,
                message: Message {
                    role: "assistant".to_string(),
                    content,
                },
                finish_reason: "stop".to_string(),
            }],
            usage,
        }
    }
}
