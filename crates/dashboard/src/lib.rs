mod analytics;
mod db;
pub mod insights;
mod routes;
mod startup;
mod utils;

pub use analytics::*;
pub use db::*;
pub use insights::{
    render_prompt, ChatCompletionClient, InsightGenerator, DEFAULT_LLM_BASE_URL,
    DEFAULT_LLM_MODEL,
};
pub use routes::*;
pub use startup::*;
pub use utils::*;
