//! Command implementations behind the `msq` binary.
//!
//! Each command builds what it needs from the [`Config`], runs through the
//! library, and prints either a human listing or JSON on stdout.

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Config;
use crate::engine::{SearchClient, SearchIntent};
use crate::models::{FilterSpec, Hit, SearchOptions, SearchResponse};
use crate::orchestrator::{self, AggregatedResult, IndexQuery};
use crate::replica::{ReplicaTable, SortKey};

/// Arguments of `msq search`.
#[derive(Debug, Clone)]
pub struct SearchArgs {
    pub index: String,
    pub query: String,
    pub filters: FilterSpec,
    pub sort: Option<String>,
    pub page: u32,
    pub hits_per_page: u32,
    pub attributes: Vec<String>,
    pub json: bool,
}

pub async fn run_search(config: &Config, args: SearchArgs) -> Result<()> {
    let client = SearchClient::from_config(config)?;
    let options = SearchOptions {
        filters: args.filters,
        page: args.page,
        hits_per_page: args.hits_per_page,
        attributes: if args.attributes.is_empty() {
            None
        } else {
            Some(args.attributes)
        },
        sort: args.sort.as_deref().and_then(SortKey::parse_lenient),
    };

    let response = client.search(&args.index, &args.query, &options).await;
    if args.json {
        print_json(&response)?;
    } else {
        print_response(&args.index, &response);
    }
    Ok(())
}

pub async fn run_search_all(
    config: &Config,
    query: &str,
    indices: &[String],
    hits_per_page: u32,
    json: bool,
) -> Result<()> {
    let client = Arc::new(SearchClient::from_config(config)?);
    let targets: Vec<IndexQuery> = indices
        .iter()
        .map(|index| {
            IndexQuery::new(index.clone()).with_options(SearchOptions {
                hits_per_page,
                ..SearchOptions::default()
            })
        })
        .collect();

    let result = orchestrator::search_all(&client, query, &targets).await;
    if json {
        print_json(&aggregated_json(&result))?;
    } else {
        for (index, entry) in result.iter() {
            if let Some(err) = entry.outcome.error() {
                println!("[{}] unavailable: {}", index, err);
                println!();
                continue;
            }
            print_response(index, entry.outcome.response());
        }
        println!(
            "total: {} hit(s) across {} index(es)",
            result.total_hits(),
            result.len()
        );
    }
    Ok(())
}

pub async fn run_lookup(
    config: &Config,
    index: &str,
    ids: &[String],
    id_field: Option<&str>,
    json: bool,
) -> Result<()> {
    let client = SearchClient::from_config(config)?;
    let field = id_field.unwrap_or(&config.lookup.id_field);
    let hits = orchestrator::lookup_ids(&client, index, field, ids, config.lookup.chunk_size).await;

    if json {
        print_json(&hits)?;
    } else if hits.is_empty() {
        println!("No results.");
    } else {
        for hit in &hits {
            print_hit(hit);
        }
        println!("found {} of {} id(s)", hits.len(), ids.len());
    }
    Ok(())
}

/// Search-as-you-type over stdin: every line is the field's new content.
///
/// Lines go through a [`Coalescer`](crate::debounce::Coalescer) with the
/// configured window, so only terms that were left alone for a full window
/// are searched. Returns once stdin is closed and pending searches finish.
pub async fn run_watch(config: &Config, index: &str, hits_per_page: u32) -> Result<()> {
    let client = Arc::new(SearchClient::from_config(config)?);
    let coalescer = client.coalescer(index, config.debounce.window());
    let options = SearchOptions {
        hits_per_page,
        ..SearchOptions::default()
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = FuturesUnordered::new();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => pending.push(coalescer.submit(SearchIntent {
                    term: line.trim().to_string(),
                    options: options.clone(),
                })),
                None => stdin_open = false,
            },
            Some(result) = pending.next(), if !pending.is_empty() => {
                if let Some(response) = result {
                    println!("> {}", response.query);
                    print_response(index, &response);
                }
            }
            else => break,
        }
    }
    Ok(())
}

/// Print the physical index every sort key resolves to.
pub fn run_replicas(config: &Config, index: &str) -> Result<()> {
    let table = ReplicaTable::new(config.indices.unsortable.iter().cloned());
    println!("{:<12} {}", "(none)", table.resolve(index, None));
    for key in SortKey::ALL {
        println!("{:<12} {}", key.as_str(), table.resolve(index, Some(key)));
    }
    if !table.is_sortable(index) {
        println!("note: {} is unsortable; sort keys are ignored", index);
    }
    Ok(())
}

fn print_response(index: &str, response: &SearchResponse) {
    println!(
        "[{}] {} hit(s), page {}/{} ({} ms)",
        index,
        response.total_hits,
        response.page + 1,
        response.total_pages.max(1),
        response.processing_time_ms
    );
    if response.is_empty() {
        println!("No results.");
    }
    for (i, hit) in response.hits.iter().enumerate() {
        print!("{}. ", i + 1);
        print_hit(hit);
    }
    println!();
}

fn print_hit(hit: &Hit) {
    println!("{}  (id: {})", hit.label(), hit.object_id());
}

#[derive(Serialize)]
struct IndexJson<'a> {
    #[serde(flatten)]
    response: &'a SearchResponse,
    elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn aggregated_json(result: &AggregatedResult) -> serde_json::Map<String, serde_json::Value> {
    result
        .iter()
        .map(|(index, entry)| {
            let value = serde_json::to_value(IndexJson {
                response: entry.outcome.response(),
                elapsed_ms: entry.elapsed.as_millis() as u64,
                error: entry.outcome.error().map(|e| e.to_string()),
            })
            .unwrap_or(serde_json::Value::Null);
            (index.to_string(), value)
        })
        .collect()
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
