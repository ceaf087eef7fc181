// src/pagination/mod.rs
//
// Page-by-page accumulation of list results

pub mod paginator;

pub use paginator::{FetchOutcome, PageSource, PageState, Paginator, FIRST_PAGE};
