//! Cursor pagination shared by the list operations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_TAKE: usize = 20;
pub const MAX_TAKE: usize = 100;

/// Page request: an optional cursor (id of the last item already seen) and a size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageRequest {
    pub cursor: Option<Uuid>,
    pub take: Option<usize>,
}

impl PageRequest {
    pub fn new(cursor: Option<Uuid>, take: Option<usize>) -> Self {
        Self { cursor, take }
    }

    pub fn first(take: usize) -> Self {
        Self {
            cursor: None,
            take: Some(take),
        }
    }

    /// Page size (defaults to 20, clamped between 1 and 100).
    pub fn take(&self) -> usize {
        self.take.unwrap_or(DEFAULT_TAKE).clamp(1, MAX_TAKE)
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<Uuid>,
}

impl<T> Page<T> {
    /// Build a page from `take + 1` fetched rows: the extra row only signals
    /// that another page exists.
    pub fn from_overfetch(mut rows: Vec<T>, take: usize, id_of: impl Fn(&T) -> Uuid) -> Self {
        let has_more = rows.len() > take;
        rows.truncate(take);
        let next_cursor = if has_more { rows.last().map(&id_of) } else { None };
        Self {
            items: rows,
            next_cursor,
        }
    }
}
