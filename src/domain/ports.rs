use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// One batch stage: read its input, transform it in memory, write its output.
#[async_trait]
pub trait Pipeline: Send + Sync {
    type Extracted: Send + 'static;
    type Transformed: Send + 'static;

    fn name(&self) -> &str;

    async fn extract(&self) -> Result<Self::Extracted>;
    async fn transform(&self, data: Self::Extracted) -> Result<Self::Transformed>;

    /// Persists the result and returns `(output path, records written)`.
    async fn load(&self, result: Self::Transformed) -> Result<(String, usize)>;
}
