pub mod date_parser;

pub use date_parser::{parse_since_date, parse_since_date_at};
