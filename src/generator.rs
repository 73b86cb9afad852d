use async_trait::async_trait;
use tracing::debug;
use crate::error::GenerationError;
use crate::models::{GenerateOptions, GenerateRequest, GenerateResponse};

/// Turns a prompt into a response. Implementations may block for a long time.
#[async_trait]
pub trait Generator: Send + Sync {
    // Name of the loaded model
    fn model(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

const PERSONA: &str = "You are Alice, a helpful assistant.\nAlways answer clearly and concisely.";

// Wrap the user's text in the persona template
pub fn build_prompt(prompt: &str) -> String {
    format!("{}\nUser: {}\nAlice:", PERSONA, prompt)
}

// Fewer words than this is treated as a failed generation
pub const MIN_ANSWER_WORDS: usize = 2;

pub fn check_answer(answer: &str) -> Result<(), GenerationError> {
    let words = answer.split_whitespace().count();
    if words == 0 {
        return Err(GenerationError::EmptyResponse);
    }
    if words < MIN_ANSWER_WORDS {
        return Err(GenerationError::TooShort(answer.to_string()));
    }
    Ok(())
}

// Generator backed by an Ollama server
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    options: GenerateOptions,
}

impl OllamaGenerator {
    pub fn new(client: reqwest::Client, base_url: &str, model: &str) -> Self {
        // add http:// if not present
        let base_url = if base_url.starts_with("http") {
            base_url.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", base_url.trim_end_matches('/'))
        };
        Self {
            client,
            base_url,
            model: model.to_string(),
            options: GenerateOptions::default(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: build_prompt(prompt),
            stream: false,
            options: self.options.clone(),
        };
        debug!(model = %self.model, url = %self.base_url, "Calling backend");

        let res = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = res
            .json::<GenerateResponse>()
            .await
            .map_err(|e| GenerationError::Decode(e.to_string()))?;
        let answer = body.response.trim();
        check_answer(answer)?;
        Ok(answer.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_template_ends_with_assistant_turn() {
        let p = build_prompt("hello");
        assert!(p.contains("User: hello\n"));
        assert!(p.ends_with("Alice:"));
    }

    #[test]
    fn one_word_answers_are_rejected() {
        assert!(matches!(check_answer(""), Err(GenerationError::EmptyResponse)));
        assert!(matches!(check_answer("Yes."), Err(GenerationError::TooShort(_))));
        assert!(check_answer("hi there").is_ok());
    }

    #[test]
    fn base_url_is_normalized() {
        let client = reqwest::Client::new();
        let g = OllamaGenerator::new(client.clone(), "localhost:11434/", "mistral");
        assert_eq!(g.base_url(), "http://localhost:11434");
        let g = OllamaGenerator::new(client, "https://ollama.lan", "mistral");
        assert_eq!(g.base_url(), "https://ollama.lan");
        assert_eq!(g.model(), "mistral");
    }
}
