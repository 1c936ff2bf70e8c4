// Upload command construction

use std::path::PathBuf;

use super::config::UploadConfig;
use super::errors::RelayError;
use super::models::UploadBatch;

/// `<program> upload <paths...> --copyright= --desc= --tid= --tag= --title= --source= -l=`
#[derive(Debug, Clone, PartialEq)]
pub struct UploadCommand {
    pub program: String,
    pub artifacts: Vec<PathBuf>,
    pub copyright: u8,
    pub description: String,
    pub category_id: u32,
    pub tags: Vec<String>,
    pub title: String,
    pub source: String,
    pub route: String,
}

impl UploadCommand {
    pub fn for_batch(batch: &UploadBatch, upload: &UploadConfig) -> Self {
        Self {
            program: upload.program.clone(),
            artifacts: batch.artifacts.clone(),
            copyright: upload.copyright,
            description: batch.description.clone(),
            category_id: upload.category_id,
            tags: batch.tags.clone(),
            title: batch.title.clone(),
            source: batch.source.clone(),
            route: batch.route.clone(),
        }
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }

    pub fn args(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.artifacts.len() + 9);
        argv.push(self.program.clone());
        argv.push("upload".to_string());
        argv.extend(self.artifacts.iter().map(|p| p.to_string_lossy().to_string()));
        argv.push(format!("--copyright={}", self.copyright));
        argv.push(format!("--desc={}", self.description));
        argv.push(format!("--tid={}", self.category_id));
        argv.push(format!("--tag={}", self.tags.join(",")));
        argv.push(format!("--title={}", self.title));
        argv.push(format!("--source={}", self.source));
        argv.push(format!("-l={}", self.route));
        argv
    }

    /// Task queue payload
    pub fn to_json(&self) -> Result<String, RelayError> {
        Ok(serde_json::to_string(&self.args())?)
    }
}
