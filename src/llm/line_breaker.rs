use anyhow::Result;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::client::AnthropicClient;
use super::prompts::{build_split_prompt, SPLIT_SYSTEM_PROMPT};
use super::validation::validate_split;
use crate::stages::{BreakLimits, LineBreakOracle};

/// Line-break oracle that asks a language model where to split
///
/// The segmenter is synchronous, so each request blocks the calling worker
/// thread. Requires the multi-threaded tokio runtime.
pub struct LlmLineBreaker {
    client: AnthropicClient,
    handle: Handle,
}

impl LlmLineBreaker {
    /// Must be called from within a tokio runtime
    pub fn new(client: AnthropicClient) -> Self {
        Self {
            client,
            handle: Handle::current(),
        }
    }
}

impl LineBreakOracle for LlmLineBreaker {
    fn break_offsets(&self, text: &str, limits: &BreakLimits) -> Result<Vec<usize>> {
        let prompt = build_split_prompt(text, limits);
        debug!("Asking {} to split: {:?}", self.client.model(), text.trim());

        let response = tokio::task::block_in_place(|| {
            self.handle
                .block_on(self.client.send_message(SPLIT_SYSTEM_PROMPT, &prompt))
        })?;

        match validate_split(text, &response) {
            Ok(offset) => Ok(vec![offset]),
            Err(rejection) => {
                warn!("Rejected split for {:?}: {}", text.trim(), rejection);
                Err(rejection.into())
            }
        }
    }
}
