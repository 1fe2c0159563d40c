use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Ordered chat history for one session. Append-only and never persisted;
/// system messages are synthesized per request and never stored here.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self { Self::default() }

    pub fn append_user(&mut self, content: impl Into<String>) -> &Message {
        self.push(Message::user(content))
    }

    pub fn append_assistant(&mut self, content: impl Into<String>) -> &Message {
        self.push(Message::assistant(content))
    }

    fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /// System message first, then the full transcript. The transcript itself
    /// is left untouched.
    pub fn build_outbound_request(&self, system_prompt: &str) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        out.push(Message::system(system_prompt));
        out.extend(self.messages.iter().cloned());
        out
    }

    pub fn messages(&self) -> &[Message] { &self.messages }

    pub fn last(&self) -> Option<&Message> { self.messages.last() }

    pub fn len(&self) -> usize { self.messages.len() }

    pub fn is_empty(&self) -> bool { self.messages.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        let v = serde_json::to_value(Message::assistant("ok")).unwrap();
        assert_eq!(v, serde_json::json!({"role": "assistant", "content": "ok"}));
        let m: Message = serde_json::from_str(r#"{"role":"system","content":"x"}"#).unwrap();
        assert_eq!(m.role, Role::System);
    }

    #[test]
    fn outbound_request_prepends_system_without_mutating() {
        let mut t = Transcript::new();
        t.append_user("hi");
        t.append_assistant("hello");

        let out = t.build_outbound_request("be helpful");
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], Message::system("be helpful"));
        assert_eq!(&out[1..], t.messages());
        assert_eq!(t.len(), 2);
        assert!(t.messages().iter().all(|m| m.role != Role::System));
    }

    #[test]
    fn appends_keep_order() {
        let mut t = Transcript::new();
        assert!(t.is_empty());
        t.append_user("a");
        t.append_user("b");
        t.append_assistant("c");
        let contents: Vec<&str> = t.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
        assert_eq!(t.last(), Some(&Message::assistant("c")));
    }
}
