/// Listings shown per page on category browse pages.
pub const LISTINGS_PER_PAGE: usize = 2;

/// Listings shown on the index page and in the JSON feed.
pub const FRONT_PAGE_LISTINGS: u64 = 10;

/// Hard cap on additional images attached to a single listing.
pub const MAX_ADDITIONAL_IMAGES: usize = 8;

/// Session lifetime for the database-backed login token.
pub const SESSION_LIFETIME_DAYS: i64 = 30;

/// Password reset tokens expire after this many hours.
pub const PASSWORD_RESET_TOKEN_HOURS: i64 = 1;
