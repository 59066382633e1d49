//! Friendly HTML pages for error responses.
//!
//! Wired through [`actix_web::middleware::ErrorHandlers`] in main. These
//! render static markup on purpose: a database problem must not stop the
//! error page itself from rendering.

use actix_web::dev::ServiceResponse;
use actix_web::http::header;
use actix_web::middleware::ErrorHandlerResponse;
use actix_web::Result;

fn render<B>(
    res: ServiceResponse<B>,
    title: &str,
    message: &str,
) -> Result<ErrorHandlerResponse<B>> {
    let body = format!(
        r#"<!DOCTYPE html>
<html>
<head><title>{title}</title></head>
<body>
    <h1>{title}</h1>
    <p>{message}</p>
    <p><a href="/">Back to the front page</a></p>
</body>
</html>"#,
        title = title,
        message = message,
    );

    let (req, res) = res.into_parts();
    let mut res = res.set_body(body);
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/html; charset=utf-8"),
    );

    let res = ServiceResponse::new(req, res)
        .map_into_boxed_body()
        .map_into_right_body();

    Ok(ErrorHandlerResponse::Response(res))
}

pub fn render_400<B>(res: ServiceResponse<B>) -> Result<ErrorHandlerResponse<B>> {
    render(
        res,
        "Bad Request",
        "The request could not be understood. Check the form and try again.",
    )
}

pub fn render_404<B>(res: ServiceResponse<B>) -> Result<ErrorHandlerResponse<B>> {
    render(
        res,
        "Not Found",
        "The page you are looking for does not exist or has been removed.",
    )
}

pub fn render_500<B>(res: ServiceResponse<B>) -> Result<ErrorHandlerResponse<B>> {
    render(
        res,
        "Server Error",
        "Something went wrong on our side. Please try again later.",
    )
}
