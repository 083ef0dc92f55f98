//! Search command - hybrid retrieval from the command line

use clap::Args;

use super::{emit, GlobalArgs};
use crate::config::AppConfig;
use crate::domain::knowledge_base::KnowledgeBaseId;
use crate::AppContext;

#[derive(Args, Clone)]
pub struct SearchArgs {
    pub query: String,

    /// Knowledge base to search; repeat for several
    #[arg(long = "kb", required = true)]
    pub knowledge_bases: Vec<String>,

    /// Number of chunks to return (defaults to retrieval.top_k)
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Weight of the vector ranking in [0, 1] (defaults to retrieval.vector_weight)
    #[arg(long)]
    pub vector_weight: Option<f32>,
}

pub async fn run(config: &AppConfig, globals: &GlobalArgs, args: SearchArgs) -> anyhow::Result<()> {
    let owner = globals.require_owner()?;
    let knowledge_bases = args
        .knowledge_bases
        .iter()
        .map(KnowledgeBaseId::new)
        .collect::<Result<Vec<_>, _>>()?;
    let top_k = args.top_k.unwrap_or(config.retrieval.top_k);
    let vector_weight = args.vector_weight.unwrap_or(config.retrieval.vector_weight);

    let context = AppContext::from_config(config).await?;
    let result = context
        .retriever
        .retrieve(&owner, &args.query, &knowledge_bases, top_k, vector_weight)
        .await;
    context.shutdown().await;

    let chunks = result?;
    emit(globals, &chunks, |chunks| {
        if chunks.is_empty() {
            println!("No matching chunks");
        }
        for (i, chunk) in chunks.iter().enumerate() {
            println!(
                "#{} score={:.5} {} / {} [chunk {}]",
                i + 1,
                chunk.score,
                chunk.knowledge_base_name,
                chunk.filename,
                chunk.sequence
            );
            println!("{}\n", chunk.content);
        }
    })
}
