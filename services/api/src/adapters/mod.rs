pub mod db;
pub mod suggest_llm;

pub use db::DbAdapter;
pub use suggest_llm::OpenAiSuggestAdapter;
