//! Policy constants shared across the engine, cache and server.

use std::time::Duration;

/// Year stored for birthdays given without a year (`--MM-DD`).
/// Must be a leap year so that `--02-29` resolves.
pub const LEAP_YEAR_SENTINEL: i32 = 2000;

/// Events are generated for the previous, current and next year.
pub const TARGET_YEAR_OFFSETS: [i32; 3] = [-1, 0, 1];

/// Salt mixed into stable contact identifiers.
pub const UID_SALT: &str = "birthcal-v1-";

/// Number of digest bytes kept for a stable identifier (hex doubles it).
pub const UID_HASH_BYTES: usize = 16;

/// Domain suffix of event UIDs.
pub const UID_DOMAIN: &str = "birthcal";

/// Display name used when a card has neither FN nor N.
pub const FALLBACK_NAME: &str = "Unknown";

// iCalendar feed metadata
pub const ICAL_VERSION: &str = "2.0";
pub const ICAL_PRODID: &str = "-//Birthcal//Engine//EN";
pub const ICAL_CALNAME: &str = "Birthdays";
pub const ICAL_SCALE: &str = "GREGORIAN";
pub const ICAL_METHOD: &str = "PUBLISH";
pub const ICAL_REFRESH_INTERVAL: &str = "PT1H";

// HTTP client
pub const USER_AGENT: &str = concat!("birthcal/", env!("CARGO_PKG_VERSION"));
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_RESPONSE_BYTES: usize = 256 * 1024 * 1024;

// HTTP server
pub const DEFAULT_PORT: u16 = 18080;
pub const SERVER_READ_TIMEOUT: Duration = Duration::from_secs(15);
pub const SERVER_WRITE_TIMEOUT: Duration = Duration::from_secs(30);
/// Connections with no traffic in either direction for this long are closed.
pub const SERVER_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
pub const RETRY_AFTER_SECONDS: &str = "10";
pub const ALLOWED_METHODS: &str = "GET, HEAD";
pub const MIME_TEXT_CALENDAR: &str = "text/calendar; charset=utf-8";
pub const CACHE_CONTROL_PRIVATE: &str = "private, no-cache";

/// RFC 7231 IMF-fixdate, the format of `Last-Modified` and `If-Modified-Since`.
pub const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

// Background sync
pub const DEFAULT_REFRESH_MINUTES: i64 = 60;
/// Upper bound for the refresh period (one year).
pub const MAX_REFRESH_MINUTES: i64 = 366 * 24 * 60;
pub const DEFAULT_REMINDER_VALUE: u32 = 1;
