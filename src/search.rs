//! `shopdesk search`: run the hybrid retriever from the command line.

use anyhow::Result;

use shopdesk_core::retrieval::{NoMatchReason, RetrievalOutcome};

use crate::config::{Config, MAX_TOP_K};
use crate::runtime::Runtime;

/// Print the ranked products for `query`.
///
/// Distances are shown as reported by the index (lower is closer).
pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let runtime = Runtime::load(config).await?;
    let k = limit.unwrap_or(config.retrieval.top_k).clamp(1, MAX_TOP_K);

    match runtime.ctx.retriever.retrieve(query, k).await? {
        RetrievalOutcome::Found {
            products,
            stale_ids,
        } => {
            for r in &products {
                let p = &r.product;
                println!("{}. [{}] {}  (distance: {:.4})", r.rank, p.id, p.name, r.distance);
                if let Some(price) = &p.price {
                    println!("    price: {}", price);
                }
                if let Some(activity) = p.activity.as_deref().filter(|a| !a.trim().is_empty()) {
                    println!("    activity: {}", activity);
                }
                println!();
            }
            if !stale_ids.is_empty() {
                eprintln!(
                    "Warning: {} indexed product(s) no longer in the database: {}",
                    stale_ids.len(),
                    stale_ids.join(", ")
                );
            }
        }
        RetrievalOutcome::NoMatch(NoMatchReason::NoCandidates) => {
            println!("No results.");
        }
        RetrievalOutcome::NoMatch(NoMatchReason::NoIdentifiers) => {
            println!("No results (index entries carry no product id).");
        }
        RetrievalOutcome::NoMatch(NoMatchReason::OutOfSync) => {
            println!("No results (index is out of sync with the database; run `shopdesk index build`).");
        }
    }

    Ok(())
}
