//! iCalendar feed generation (RFC 5545).

mod generate;

pub use generate::generate_feed;
