pub mod client;
pub mod line_breaker;
pub mod prompts;
pub mod validation;

pub use client::*;
pub use line_breaker::*;
pub use prompts::*;
pub use validation::*;
