use async_trait::async_trait;

/// Asks the operator a question and waits for one line of answer.
#[async_trait]
pub trait Prompt: Send + Sync {
    async fn ask(&self, question: &str) -> anyhow::Result<String>;
}
