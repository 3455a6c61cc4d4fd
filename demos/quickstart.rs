//! Minimal end-to-end example for `score-criteria`.
//!
//! Fetches the dimensions and traits of a project, prints the grouped options,
//! then selects the first option and sets a minimum score.
//!
//! To run:
//! - Set `UNIFORM_API_KEY` and `UNIFORM_PROJECT_ID`
//! - `cargo run --example quickstart`

use std::sync::Arc;

use score_criteria::{
    CacheConfig, Criteria, CriteriaController, EditorSession, MemoryCriteriaStore, TaxonomyCache,
    UniformAdapter,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let project_id = std::env::var("UNIFORM_PROJECT_ID").unwrap_or_default();
    let api_key = std::env::var("UNIFORM_API_KEY").unwrap_or_default();

    // One cache per process: repeated refreshes within five minutes reuse it.
    let cache = TaxonomyCache::with_config(
        Arc::new(UniformAdapter::from_env()?),
        CacheConfig::default(),
    );

    // The host editor normally owns the record; an in-memory store stands in here.
    let store = MemoryCriteriaStore::new(project_id, Criteria::default());
    let session = EditorSession::new(cache, CriteriaController::new(store), &api_key);

    session.refresh().await;

    for group in session.groups().iter() {
        println!("{}", group.name);
        for option in &group.options {
            println!("  {} ({})", option.label, option.value);
        }
    }

    let first = session
        .groups()
        .first()
        .and_then(|g| g.options.first())
        .map(|o| o.value.clone());

    if let Some(value) = first {
        session.select(Some(value.as_str()))?;
        session.set_min_score("10")?;
    }

    let view = session.view();
    println!(
        "selected: {:?}, min score: {:?}",
        view.selected.map(|o| o.label),
        view.min_score
    );

    Ok(())
}
