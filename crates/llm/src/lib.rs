pub mod providers;

pub use providers::chat_completions::OpenAiChatProvider;
pub use providers::create_provider;
