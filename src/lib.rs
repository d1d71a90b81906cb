//! # Marketplace Search
//!
//! Faceted-search query compiler and resilient execution engine for the
//! marketplace back-office.
//!
//! Turns typed filter criteria into search-service queries, picks the
//! pre-sorted replica for the requested order, runs queries against the hosted
//! search service with bounded retries and escalating timeouts, debounces
//! search-as-you-type input, and fans dashboard queries out across several
//! indices at once.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐
//! │  Filter  │   │ Replica  │
//! │ compiler │   │ selector │
//! └────┬─────┘   └────┬─────┘
//!      └──────┬───────┘
//!             ▼
//!      ┌─────────────┐     ┌──────────────┐
//!      │ QueryRequest│◀────│  Coalescer   │  (interactive fields)
//!      └──────┬──────┘     └──────────────┘
//!             ▼
//!      ┌─────────────┐     ┌──────────────┐
//!      │ SearchClient│────▶│ RetryPolicy  │
//!      │   (engine)  │     └──────────────┘
//!      └──────┬──────┘
//!             ▼
//!      ┌─────────────┐     ┌──────────────┐
//!      │  Transport  │     │ Orchestrator │  (fan-out, id lookup)
//!      │ HTTPS/mock  │     └──────────────┘
//!      └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export SEARCH_API_KEY=...
//! msq search products "olive oil" --filter minPrice=5 --filter inStock=true --sort price_asc
//! msq search-all "lisbon" --index shops --index products --index orders
//! msq lookup products p-1001 p-1002 p-1003
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Filters, requests, responses, typed hits |
//! | [`filter`] | Filter expression compiler |
//! | [`replica`] | Sorted replica resolution |
//! | [`retry`] | Timeout progression, backoff, retry eligibility |
//! | [`transport`] | Transport trait and HTTPS implementation |
//! | [`engine`] | Search execution with retries |
//! | [`debounce`] | Request coalescing |
//! | [`orchestrator`] | Multi-index fan-out and chunked id lookup |
//! | [`logging`] | Log subscriber setup |
//! | [`commands`] | `msq` command implementations |

pub mod commands;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod filter;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod replica;
pub mod retry;
pub mod transport;
