use std::{fmt, str::FromStr};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelRefParseError {
    #[error("missing model identifier")]
    MissingModel,
    #[error("unsupported provider '{0}'. Supported providers: openai, anthropic")]
    UnsupportedProvider(String),
}

impl FromStr for Provider {
    type Err = ModelRefParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            _ => Err(ModelRefParseError::UnsupportedProvider(value.to_string())),
        }
    }
}

/// A `provider/model` pair such as `openai/gpt-4.1-nano`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub provider: Provider,
    pub model: String,
}

impl ModelRef {
    pub fn parse(input: &str) -> Result<Self, ModelRefParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ModelRefParseError::MissingModel);
        }

        if let Some((provider, model)) = trimmed.split_once('/') {
            let model = model.trim();
            if model.is_empty() {
                return Err(ModelRefParseError::MissingModel);
            }

            return Ok(Self {
                provider: Provider::from_str(provider)?,
                model: model.to_string(),
            });
        }

        Ok(Self {
            provider: Provider::OpenAi,
            model: trimmed.to_string(),
        })
    }
}
