use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use crate::error::ChatError;
use crate::generator::{Generator, OllamaGenerator};

// Human-readable model name -> model file
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, PathBuf>,
}

impl ModelRegistry {
    pub fn new(models: BTreeMap<String, PathBuf>) -> Self {
        Self { models }
    }

    pub fn path(&self, name: &str) -> Option<&Path> {
        self.models.get(name).map(PathBuf::as_path)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Builds a generator for a registry entry.
///
/// Called on model selection, so any failure shows up there rather than on the
/// first prompt.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, name: &str, path: &Path) -> Result<Arc<dyn Generator>, ChatError>;
}

// Ollama model names: lowercase letters, digits, '-', '_' and '.'
pub fn model_tag(name: &str) -> String {
    let mut tag = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_') {
            tag.push(c.to_ascii_lowercase());
        } else if !tag.ends_with('-') {
            tag.push('-');
        }
    }
    tag.trim_matches('-').to_string()
}

// sha256 of the model file, read in chunks
pub async fn file_digest(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1 << 20];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("sha256:{:x}", hasher.finalize()))
}

// Ollama create request
#[derive(Serialize, Debug)]
struct CreateRequest<'a> {
    model: &'a str,
    files: BTreeMap<&'a str, &'a str>,
    stream: bool,
}

/// Registers the model file with the Ollama server and generates with the tag it creates.
///
/// The file is uploaded as a blob (skipped when the server already has it), then
/// `/api/create` turns it into a model named after the registry entry.
pub struct OllamaLoader {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaLoader {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        // add http:// if not present
        let base_url = if base_url.starts_with("http") {
            base_url.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", base_url.trim_end_matches('/'))
        };
        Self { client, base_url }
    }

    async fn upload_blob(&self, path: &Path, digest: &str) -> Result<(), String> {
        let url = format!("{}/api/blobs/{}", self.base_url, digest);
        let res = self.client.head(&url).send().await.map_err(|e| e.to_string())?;
        if res.status().is_success() {
            debug!(%digest, "Model blob already on server");
            return Ok(());
        }

        let file = tokio::fs::File::open(path).await.map_err(|e| e.to_string())?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let res = self
            .client
            .post(&url)
            .body(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            return Err(format!("blob upload returned status {}", res.status().as_u16()));
        }
        Ok(())
    }

    async fn create_model(&self, tag: &str, file_name: &str, digest: &str) -> Result<(), String> {
        let mut files = BTreeMap::new();
        files.insert(file_name, digest);
        let request = CreateRequest {
            model: tag,
            files,
            stream: false,
        };
        let res = self
            .client
            .post(format!("{}/api/create", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(format!("create returned status {}: {}", status.as_u16(), body));
        }
        Ok(())
    }
}

#[async_trait]
impl ModelLoader for OllamaLoader {
    async fn load(&self, name: &str, path: &Path) -> Result<Arc<dyn Generator>, ChatError> {
        let fail = |reason: String| ChatError::ModelLoad {
            name: name.to_string(),
            reason,
        };
        if !path.is_file() {
            return Err(fail(format!("model file not found: {}", path.display())));
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| fail(format!("bad model file name: {}", path.display())))?;
        let tag = model_tag(name);
        if tag.is_empty() {
            return Err(fail("model name has no usable characters".to_string()));
        }

        let digest = file_digest(path).await.map_err(|e| fail(e.to_string()))?;
        self.upload_blob(path, &digest).await.map_err(fail)?;
        self.create_model(&tag, file_name, &digest).await.map_err(fail)?;

        info!(model = %name, %tag, path = %path.display(), "Model loaded");
        Ok(Arc::new(OllamaGenerator::new(self.client.clone(), &self.base_url, &tag)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_sorted() {
        let mut models = BTreeMap::new();
        models.insert("Nous-Hermes".to_string(), PathBuf::from("b.gguf"));
        models.insert("Mistral".to_string(), PathBuf::from("a.gguf"));
        let registry = ModelRegistry::new(models);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["Mistral", "Nous-Hermes"]);
        assert_eq!(registry.path("Mistral"), Some(Path::new("a.gguf")));
        assert_eq!(registry.path("GPT"), None);
    }

    #[test]
    fn tags_are_ollama_safe() {
        assert_eq!(model_tag("Mistral-7B-Instruct"), "mistral-7b-instruct");
        assert_eq!(model_tag("Nous Hermes 2 (Mixtral)"), "nous-hermes-2-mixtral");
        assert_eq!(model_tag("llama3.1_q8"), "llama3.1_q8");
        assert_eq!(model_tag("!!!"), "");
    }

    #[tokio::test]
    async fn digest_matches_sha256_of_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.gguf");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            file_digest(&path).await.unwrap(),
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn missing_model_file_fails_at_load() {
        let loader = OllamaLoader::new(reqwest::Client::new(), "http://localhost:11434");
        let err = loader
            .load("Mistral", Path::new("/definitely/not/here.gguf"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ChatError::ModelLoad { .. }));
    }

    #[tokio::test]
    async fn unreachable_server_fails_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mistral.gguf");
        std::fs::write(&path, b"GGUF").unwrap();
        // nothing listens on port 9 locally
        let loader = OllamaLoader::new(reqwest::Client::new(), "127.0.0.1:9");
        let err = loader.load("Mistral", &path).await.err().unwrap();
        assert!(matches!(err, ChatError::ModelLoad { .. }));
    }
}
