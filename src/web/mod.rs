pub mod account;
pub mod activation;
pub mod admin;
pub mod api;
pub mod asset;
pub mod category;
pub mod error;
pub mod index;
pub mod listing;
pub mod login;
pub mod logout;
pub mod password_reset;

/// Configures the web app by adding services from each web file.
///
/// @see https://docs.rs/actix-web/4.0.1/actix_web/struct.App.html#method.configure
pub fn configure(conf: &mut actix_web::web::ServiceConfig) {
    // Descending order. Order is important.
    // Route resolution will stop at the first match.
    index::configure(conf);
    listing::configure(conf);
    account::configure(conf);
    activation::configure(conf);
    admin::configure(conf);
    api::configure(conf);
    asset::configure(conf);
    category::configure(conf);
    login::configure(conf);
    logout::configure(conf);
    password_reset::configure(conf);

    conf.service(crate::create_user::create_user_get)
        .service(crate::create_user::create_user_post);
}
