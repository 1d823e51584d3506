//! Text generation collaborator boundary.
//!
//! Proposition-variant generation and full rewrites are delegated to an
//! external collaborator behind this trait. The collaborator is a black
//! box: it answers with either text or a failure message, and errors never
//! cross the boundary as panics or transport-level surprises.

use crate::era::PropositionKind;
use async_trait::async_trait;

/// A request for one generated variant of a condition statement.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// The condition statement to derive from.
    pub condition_text: String,
    /// Which logical variant to produce.
    pub variant: PropositionKind,
    /// Optional model override; falls back to the collaborator's default.
    pub model_id: Option<String>,
    /// Optional prompt template override.
    pub prompt_template: Option<String>,
}

/// What the collaborator answered.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    /// The generated text.
    Text(String),
    /// A human-readable failure description.
    Failure(String),
}

/// The external text generation collaborator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produces the requested variant, or a failure description.
    async fn generate(&self, request: &GenerationRequest) -> GenerationOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoGenerator;

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate(&self, request: &GenerationRequest) -> GenerationOutcome {
            GenerationOutcome::Text(format!("{:?}: {}", request.variant, request.condition_text))
        }
    }

    #[tokio::test]
    async fn test_collaborator_boundary() {
        let generator = EchoGenerator;
        let outcome = generator
            .generate(&GenerationRequest {
                condition_text: "Si P entonces Q".to_string(),
                variant: PropositionKind::Reciprocal,
                model_id: None,
                prompt_template: None,
            })
            .await;
        assert_eq!(
            outcome,
            GenerationOutcome::Text("Reciprocal: Si P entonces Q".to_string())
        );
    }
}
