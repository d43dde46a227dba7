use std::path::{Path, PathBuf};

use hf_hub::{
    api::sync::{Api, ApiBuilder, ApiRepo},
    Repo, RepoType,
};
use tracing::info;

use crate::error::{Result, ServiceError};

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

/// Resolves the files for `model_id`. A local directory is used as is;
/// anything else is fetched through the Hugging Face Hub cache.
pub fn load_model_files(
    model_id: &str,
    revision: &str,
    token: Option<&str>,
) -> Result<ModelFiles> {
    let local = Path::new(model_id);
    if local.is_dir() {
        info!("Using local model directory {:?}", local);
        return local_files(local);
    }

    info!("Fetching {} (revision: {}) from the hub", model_id, revision);

    let api = match token {
        Some(t) => ApiBuilder::new()
            .with_token(Some(t.to_string()))
            .build()
            .map_err(|e| ServiceError::Hub(e.to_string()))?,
        None => Api::new().map_err(|e| ServiceError::Hub(e.to_string()))?,
    };

    let repo = api.repo(Repo::with_revision(
        model_id.to_string(),
        RepoType::Model,
        revision.to_string(),
    ));

    let files = ModelFiles {
        config: fetch(&repo, CONFIG_FILE)?,
        tokenizer: fetch(&repo, TOKENIZER_FILE)?,
        weights: fetch(&repo, WEIGHTS_FILE)?,
    };

    info!(
        "Model files ready: config={:?}, tokenizer={:?}, weights={:?}",
        files.config, files.tokenizer, files.weights
    );
    Ok(files)
}

fn fetch(repo: &ApiRepo, filename: &str) -> Result<PathBuf> {
    repo.get(filename)
        .map_err(|e| ServiceError::Hub(format!("Failed to download {}: {}", filename, e)))
}

fn local_files(dir: &Path) -> Result<ModelFiles> {
    let require = |name: &str| -> Result<PathBuf> {
        let path = dir.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(ServiceError::ModelLoad(format!("{} not found in {:?}", name, dir)))
        }
    };

    Ok(ModelFiles {
        config: require(CONFIG_FILE)?,
        tokenizer: require(TOKENIZER_FILE)?,
        weights: require(WEIGHTS_FILE)?,
    })
}
