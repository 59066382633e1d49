pub mod additional_images;
pub mod comments;
pub mod listings;
pub mod password_reset_tokens;
pub mod sessions;
pub mod sub_categories;
pub mod super_categories;
pub mod users;
