//! Seed partitioning of the registry catalog
//!
//! The registry search only answers prefix queries, so the catalog is split
//! into one search per leading symbol. Every search becomes the first task
//! of its own lineage in the crawl chain.

use crate::crawler::chain::{CrawlChain, TaskKind};
use rand::seq::SliceRandom;
use rand::Rng;

/// First lowercase Cyrillic letter of the alphabet ('а')
const CYRILLIC_START: u32 = 0x0430;

/// Lowercase Cyrillic letters 'а'..='я'
const CYRILLIC_LEN: u32 = 32;

/// Primary name field the prefix filter applies to
pub const NAME_FIELD: &str = "N_LP";

/// Returns the 68 search symbols: Cyrillic, then Latin, then digits
pub fn seed_alphabet() -> Vec<char> {
    let cyrillic = (CYRILLIC_START..CYRILLIC_START + CYRILLIC_LEN).filter_map(char::from_u32);
    let latin = 'a'..='z';
    let digits = '0'..='9';

    cyrillic.chain(latin).chain(digits).collect()
}

/// Chooses the crawl order of the seeds
///
/// The full alphabet is shuffled; the order only affects how fast lineages
/// progress, never what is crawled. An explicit subset keeps its own order.
pub fn partition_seeds<R: Rng + ?Sized>(rng: &mut R, subset: Option<&str>) -> Vec<char> {
    match subset {
        Some(subset) => subset.chars().collect(),
        None => {
            let mut seeds = seed_alphabet();
            seeds.shuffle(rng);
            seeds
        }
    }
}

/// Builds the crawl chain with one search task per seed
pub fn build_chain(seeds: &[char]) -> CrawlChain {
    let mut chain = CrawlChain::new();
    for &seed in seeds {
        chain.enqueue(seed, TaskKind::Search);
    }
    chain
}

/// Form fields of a first-page prefix search
pub fn search_form(seed: char, page_size: u32) -> Vec<(String, String)> {
    let fields: [(&str, String); 15] = [
        ("IsPostBack", "False".into()),
        ("PropSubmit", "FOpt_PageN".into()),
        ("ValueSubmit", String::new()),
        ("FOpt.PageC", page_size.to_string()),
        ("FOpt.OrderBy", NAME_FIELD.into()),
        ("FOpt.DirOrder", "asc".into()),
        ("VFiles", "False".into()),
        ("FOpt.VFiles", "False".into()),
        ("FOpt.VEField1", "False".into()),
        ("FProps[0].IsText", "True".into()),
        ("FProps[0].Name", NAME_FIELD.into()),
        ("FProps[0].CritElems[0].Num", "1".into()),
        ("FProps[0].CritElems[0].Val", seed.to_string()),
        ("FProps[0].CritElems[0].Crit", "Start".into()),
        ("FProps[0].CritElems[0].Excl", "False".into()),
    ];

    fields
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}
