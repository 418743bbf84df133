use std::collections::BTreeMap;

use foto3x4_contracts::images::{BackgroundRequest, EncodedImage};
use serde_json::{Map, Value};

use crate::config::PipelineConfig;
use crate::error::GenerationError;

mod dryrun;
mod gemini;

pub use dryrun::DryrunProvider;
pub use gemini::GeminiProvider;

/// Result of one background replacement.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub image: EncodedImage,
    pub prompt: String,
    pub model: Option<String>,
    pub provider_request: Map<String, Value>,
    pub provider_response: Map<String, Value>,
    pub warnings: Vec<String>,
}

/// Replaces the background of a portrait.
///
/// Called once per colour; implementations must not retry on their own.
/// Output dimensions are arbitrary and are cropped afterwards.
pub trait BackgroundGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn generate(
        &self,
        image: &EncodedImage,
        background: BackgroundRequest,
    ) -> Result<GenerationOutput, GenerationError>;
}

#[derive(Default)]
pub struct GeneratorRegistry {
    providers: BTreeMap<String, Box<dyn BackgroundGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: BackgroundGenerator + 'static>(&mut self, provider: P) {
        self.register_boxed(Box::new(provider));
    }

    pub fn register_boxed(&mut self, provider: Box<dyn BackgroundGenerator>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<&dyn BackgroundGenerator> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub fn default_generator_registry(config: &PipelineConfig) -> GeneratorRegistry {
    let mut registry = GeneratorRegistry::new();
    registry.register(GeminiProvider::new(&config.model, config.request_timeout()));
    registry.register(DryrunProvider);
    registry
}

/// Instruction sent with the portrait for `background`.
pub fn background_prompt(background: BackgroundRequest) -> String {
    format!(
        "Edit this photo into a formal ID document photo. Keep the person's face, \
         features, hairstyle, expression and clothing exactly as they are. Replace the \
         entire background with a {} background ({}) with no texture, gradient or \
         shadows. Frame the person front-facing from the shoulders up, centered, with \
         even studio lighting. Return only the edited image.",
        background.describe(),
        background.hex()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedOnly(&'static str);

    impl BackgroundGenerator for NamedOnly {
        fn name(&self) -> &str {
            self.0
        }

        fn generate(
            &self,
            _image: &EncodedImage,
            _background: BackgroundRequest,
        ) -> Result<GenerationOutput, GenerationError> {
            Err(GenerationError::Service {
                provider: self.0.to_string(),
                status: 503,
                message: "unavailable".to_string(),
            })
        }
    }

    #[test]
    fn registry_lists_names_sorted() {
        let mut registry = GeneratorRegistry::new();
        registry.register(NamedOnly("zeta"));
        registry.register(NamedOnly("alpha"));
        registry.register(DryrunProvider);
        assert_eq!(registry.names(), vec!["alpha", "dryrun", "zeta"]);
        assert!(registry.get("alpha").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn default_registry_offers_gemini_and_dryrun() {
        let registry = default_generator_registry(&PipelineConfig::default());
        assert_eq!(registry.names(), vec!["dryrun", "gemini"]);
    }

    #[test]
    fn prompt_names_the_colour() {
        let white = background_prompt(BackgroundRequest::White);
        let blue = background_prompt(BackgroundRequest::Blue);
        assert!(white.contains("pure white"));
        assert!(white.contains("#FFFFFF"));
        assert!(blue.contains("blue"));
        assert!(blue.contains("#1E63C8"));
        assert_ne!(white, blue);
    }
}
