#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatModel {
    ChatGpt,
    DeepSeek,
}

impl ChatModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatModel::ChatGpt => "chatgpt",
            ChatModel::DeepSeek => "deepseek",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "chatgpt" => Some(ChatModel::ChatGpt),
            "deepseek" => Some(ChatModel::DeepSeek),
            _ => None,
        }
    }

    pub fn all() -> Vec<ChatModel> {
        vec![ChatModel::ChatGpt, ChatModel::DeepSeek]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ChatModel::ChatGpt => "ChatGPT (OpenAI)",
            ChatModel::DeepSeek => "DeepSeek",
        }
    }
}

/// The four logical memory collections the backend fronts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKey {
    User,
    Dog,
    Relationship,
    Conversation,
}

impl CollectionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKey::User => "user",
            CollectionKey::Dog => "dog",
            CollectionKey::Relationship => "relationship",
            CollectionKey::Conversation => "conversation",
        }
    }

    pub fn all() -> Vec<CollectionKey> {
        vec![
            CollectionKey::User,
            CollectionKey::Dog,
            CollectionKey::Relationship,
            CollectionKey::Conversation,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            CollectionKey::User => "User profile & events",
            CollectionKey::Dog => "Dog profile & events",
            CollectionKey::Relationship => "User-dog relationship",
            CollectionKey::Conversation => "Conversation history",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_round_trips_wire_names() {
        for model in ChatModel::all() {
            assert_eq!(ChatModel::from_str(model.as_str()), Some(model));
        }
        assert_eq!(ChatModel::from_str("ChatGPT"), Some(ChatModel::ChatGpt));
        assert_eq!(ChatModel::from_str("gpt5"), None);
    }

    #[test]
    fn test_collection_keys_match_backend() {
        let keys: Vec<&str> = CollectionKey::all().iter().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["user", "dog", "relationship", "conversation"]);
    }
}
