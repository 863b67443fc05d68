//! Read-side event queries
//!
//! Paginates stored events for one integrator, optionally restricted to a
//! chain, in ascending `(block_number, log_index, seq)` order. The cursor
//! is opaque to callers: base64 over a small JSON document naming the
//! last-seen position. This path is strictly read-only.

use crate::records::EventRecord;
use crate::store::{EventPosition, FeeStore};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Smallest allowed page size.
pub const MIN_PAGE_SIZE: usize = 1;
/// Largest allowed page size.
pub const MAX_PAGE_SIZE: usize = 200;
/// Page size when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// A page request.
#[derive(Debug, Clone)]
pub struct EventQuery {
    /// Integrator whose events to return
    pub integrator: Address,
    /// Restrict to one chain; `None` returns every chain
    pub chain_id: Option<u64>,
    /// Opaque cursor from a previous page's `next_cursor`
    pub cursor: Option<String>,
    /// Requested page size, clamped to `[MIN_PAGE_SIZE, MAX_PAGE_SIZE]`
    pub limit: Option<usize>,
}

/// A page of events plus the cursor to fetch the next one.
#[derive(Debug)]
pub struct EventPage {
    pub events: Vec<EventRecord>,
    /// Present when the page was full; absent means iteration is done
    pub next_cursor: Option<String>,
}

/// Cursor wire format. Field names are deliberately short: the cursor
/// travels in URLs.
#[derive(Serialize, Deserialize)]
struct CursorDoc {
    b: u64,
    l: u64,
    s: u64,
}

/// Encode the position of the last event on a page.
pub fn encode_cursor(position: EventPosition) -> String {
    let (b, l, s) = position;
    let doc = CursorDoc { b, l, s };
    BASE64.encode(serde_json::to_vec(&doc).expect("cursor serialization cannot fail"))
}

/// Decode a cursor back into a position.
pub fn decode_cursor(cursor: &str) -> Result<EventPosition> {
    let bytes = BASE64.decode(cursor).context("Invalid cursor encoding")?;
    let doc: CursorDoc = serde_json::from_slice(&bytes).context("Invalid cursor contents")?;
    Ok((doc.b, doc.l, doc.s))
}

/// Clamp a requested page size into the allowed range.
pub fn clamp_page_size(limit: Option<usize>) -> usize {
    limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
}

/// Fetch one page of events.
pub fn fetch_events(store: &dyn FeeStore, query: &EventQuery) -> Result<EventPage> {
    let limit = clamp_page_size(query.limit);
    let after = match &query.cursor {
        Some(cursor) => Some(decode_cursor(cursor)?),
        None => None,
    };

    let events = store.events_by_integrator(query.integrator, query.chain_id, after, limit)?;
    let next_cursor = if events.len() == limit {
        events
            .last()
            .map(|e| encode_cursor((e.block_number, e.log_index, e.seq)))
    } else {
        None
    };
    Ok(EventPage {
        events,
        next_cursor,
    })
}
