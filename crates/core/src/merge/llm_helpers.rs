//! # LLM Helpers
//!
//! Provider dispatch for radkit `LlmFunction` calls, driven by [`ModelConfig`].
//!
//! [`ModelConfig`]: crate::models::ModelConfig

/// Run an `LlmFunction` producing `$output_type` with whichever provider the
/// config selects. Must be expanded inside a function returning
/// `anyhow::Result`, since client construction errors are propagated with `?`.
#[macro_export]
macro_rules! run_llm_function {
    ($config:expr, $output_type:ty, $system_prompt:expr, $input:expr) => {{
        use radkit::agent::LlmFunction;
        use radkit::models::providers::{
            AnthropicLlm, DeepSeekLlm, GeminiLlm, GrokLlm, OpenAILlm, OpenRouterLlm,
        };
        use $crate::models::LlmProvider;

        let config = $config;
        let system = $system_prompt;
        let input = $input;

        macro_rules! call {
            ($llm:expr) => {
                LlmFunction::<$output_type>::new_with_system_instructions($llm, system)
                    .run(input)
                    .await
                    .map_err(anyhow::Error::from)
            };
        }

        let result: anyhow::Result<$output_type> = match config.provider {
            LlmProvider::Anthropic => call!(AnthropicLlm::from_env(&config.model)?),
            LlmProvider::OpenAI => {
                let mut llm = OpenAILlm::from_env(&config.model)?;
                if let Some(base_url) = &config.base_url {
                    llm = llm.with_base_url(base_url);
                }
                call!(llm)
            }
            LlmProvider::Gemini => call!(GeminiLlm::from_env(&config.model)?),
            LlmProvider::OpenRouter => call!(OpenRouterLlm::from_env(&config.model)?),
            LlmProvider::Grok => call!(GrokLlm::from_env(&config.model)?),
            LlmProvider::DeepSeek => call!(DeepSeekLlm::from_env(&config.model)?),
        };
        result
    }};
}

pub use run_llm_function;
