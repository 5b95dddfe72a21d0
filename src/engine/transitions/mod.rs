mod async_results;
mod combinators;
mod input;
mod journal;
mod terminal;

pub(crate) use journal::check_header_match;
