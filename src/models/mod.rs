pub mod cue;
pub mod token;
pub mod transcript;

pub use cue::*;
pub use token::*;
pub use transcript::*;
