use hf_api_types::{CreatePipeRequest, Envelope, Pagination, Pipe};

use crate::error::ApiError;
use crate::pipeline::RequestPipeline;

pub const PIPES_PATH: &str = "/pipes";

/// One page of pipes plus the backend's pagination block.
#[derive(Debug, Clone)]
pub struct PipePage {
    pub items: Vec<Pipe>,
    pub pagination: Option<Pagination>,
}

impl PipePage {
    pub fn has_more(&self) -> bool {
        self.pagination
            .map(|p| p.page < p.total_page)
            .unwrap_or(false)
    }
}

#[derive(Clone)]
pub struct PipesClient {
    pipeline: RequestPipeline,
}

impl PipesClient {
    pub fn new(pipeline: RequestPipeline) -> Self {
        Self { pipeline }
    }

    pub async fn list(&self, page: u32, limit: u32) -> Result<PipePage, ApiError> {
        let path = format!("{PIPES_PATH}?page={page}&limit={limit}");
        let envelope: Envelope<Vec<Pipe>> = self.pipeline.get(&path).await?;
        let pagination = envelope.pagination().copied();
        Ok(PipePage {
            items: envelope.data.unwrap_or_default(),
            pagination,
        })
    }

    pub async fn create(&self, request: &CreatePipeRequest) -> Result<Pipe, ApiError> {
        let envelope: Envelope<Pipe> = self.pipeline.post(PIPES_PATH, request).await?;
        envelope
            .data
            .ok_or_else(|| ApiError::Decode("missing pipe in response".into()))
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let path = format!("{PIPES_PATH}/{}", urlencoding::encode(id));
        let _: serde_json::Value = self.pipeline.delete(&path).await?;
        Ok(())
    }
}
