mod domains;
mod errors;
mod fetcher;
mod parquet_handler;
mod pipeline;
mod utils;

pub use domains::*;
pub use errors::*;
pub use fetcher::*;
pub use parquet_handler::*;
pub use pipeline::*;
pub use utils::*;
