//! Built-in pipeline stages.

mod chat_completion;
mod filter_top_k;
mod into_chat_message;
mod merge;
mod search;

pub use chat_completion::{ChatCompletionStage, ChatCompletionStreamStage};
pub use filter_top_k::FilterTopKStage;
pub use into_chat_message::IntoChatMessageStage;
pub use merge::MergeStage;
pub use search::SearchStage;
