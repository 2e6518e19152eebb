use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    ngram_search::run().await
}
