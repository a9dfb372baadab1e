mod coerce;
mod query;

pub use coerce::{coerce_count, coerce_rating};
pub use query::QueryParams;
