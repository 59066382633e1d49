use crate::db::get_db_pool;
use crate::user::Profile;
use actix_session::Session;
use actix_web::dev::{
    self, Extensions, Payload, Service, ServiceRequest, ServiceResponse, Transform,
};
use actix_web::{web::Data, Error, FromRequest, HttpMessage, HttpRequest};
use futures::future::{ready, LocalBoxFuture, Ready};
use sea_orm::{entity::*, query::*};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Sub-category entry for the site navigation, shown on every page.
#[derive(Clone, Debug)]
pub struct NavCategory {
    pub id: i32,
    pub name: String,
    pub super_name: String,
}

/// Keyword and page number carried through browse navigation, so links on
/// every page can return the client to the same spot in a filtered list.
#[derive(Clone, Debug)]
pub struct QueryState {
    /// Decoded keyword parameter, ready for SQL matching and redisplay.
    pub keyword: String,
    pub page: i32,
}

impl Default for QueryState {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            page: 1,
        }
    }
}

/// Browse parameters as they arrive on the wire. The page number is kept
/// textual so one garbage value doesn't discard the whole query string.
#[derive(serde::Deserialize, Default)]
struct RawQuery {
    keyword: Option<String>,
    page: Option<String>,
}

impl QueryState {
    /// Parse and decode from a raw query string.
    pub fn from_query_string(query: &str) -> Self {
        let raw: RawQuery = serde_urlencoded::from_str(query).unwrap_or_default();
        QueryState {
            keyword: raw.keyword.unwrap_or_default(),
            page: raw
                .page
                .and_then(|p| p.parse::<i32>().ok())
                .unwrap_or(1)
                .max(1),
        }
    }

    /// `?keyword=...` (form-encoded) when a keyword is present, else empty.
    pub fn keyword_suffix(&self) -> String {
        if self.keyword.is_empty() {
            String::new()
        } else {
            match serde_urlencoded::to_string([("keyword", self.keyword.as_str())]) {
                Ok(encoded) => format!("?{}", encoded),
                Err(_) => String::new(),
            }
        }
    }

    /// Full suffix restoring both keyword and page, omitting page 1.
    pub fn full_suffix(&self) -> String {
        let mut pairs: Vec<(&str, String)> = Vec::new();
        if !self.keyword.is_empty() {
            pairs.push(("keyword", self.keyword.clone()));
        }
        if self.page > 1 {
            pairs.push(("page", self.page.to_string()));
        }
        if pairs.is_empty() {
            return String::new();
        }
        match serde_urlencoded::to_string(&pairs) {
            Ok(encoded) => format!("?{}", encoded),
            Err(_) => String::new(),
        }
    }
}

/// Client data stored for a single request cycle.
/// Distinct from ClientCtx because it is defined through request data.
#[derive(Clone, Debug)]
pub struct ClientCtxInner {
    /// User data. Optional. None is a guest user.
    pub client: Option<Profile>,
    /// Sub-categories for the navigation chrome.
    pub nav_categories: Vec<NavCategory>,
    /// Keyword/page state preserved across browse navigation.
    pub query_state: QueryState,
    /// Randomly generated string for CSP.
    pub nonce: String,
    /// CSRF token for form protection
    pub csrf_token: String,
    /// Time the request started for page load statistics.
    pub request_start: Instant,
}

impl Default for ClientCtxInner {
    fn default() -> Self {
        Self {
            client: None,
            nav_categories: Vec::new(),
            query_state: QueryState::default(),
            nonce: Self::nonce(),
            csrf_token: String::new(), // Will be populated from session
            request_start: Instant::now(),
        }
    }
}

impl ClientCtxInner {
    pub async fn from_request_parts(session: &Session, query: &str) -> Self {
        use crate::middleware::csrf::get_or_create_csrf_token;
        use crate::session::authenticate_client_by_session;

        let client = authenticate_client_by_session(session).await;
        let csrf_token = get_or_create_csrf_token(session).unwrap_or_else(|_| String::new());
        let nav_categories = load_nav_categories().await;

        ClientCtxInner {
            client,
            nav_categories,
            query_state: QueryState::from_query_string(query),
            csrf_token,
            ..Default::default()
        }
    }

    /// Returns a hash unique to each request used for CSP.
    /// See: <https://developer.mozilla.org/en-US/docs/Web/HTTP/CSP>
    pub fn nonce() -> String {
        let mut hasher = blake3::Hasher::new();

        match std::env::var("SECRET_KEY") {
            Ok(v) => hasher.update(v.as_bytes()),
            Err(_) => hasher.update("NO_SECRET_FOR_NONCE".as_bytes()),
        };

        use std::time::{SystemTime, UNIX_EPOCH};
        hasher.update(
            &SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("System clock before 1970. Really?")
                .as_millis()
                .to_ne_bytes(),
        );
        hasher.finalize().to_string()
    }
}

/// Fetch the sub-category navigation list, grouped under super-categories.
async fn load_nav_categories() -> Vec<NavCategory> {
    use crate::orm::{sub_categories, super_categories};

    let db = get_db_pool();
    let supers = match super_categories::Entity::find()
        .order_by_asc(super_categories::Column::DisplayOrder)
        .order_by_asc(super_categories::Column::Id)
        .all(db)
        .await
    {
        Ok(supers) => supers,
        Err(e) => {
            log::error!("load_nav_categories: {}", e);
            return Vec::new();
        }
    };

    let subs = match sub_categories::Entity::find()
        .order_by_asc(sub_categories::Column::DisplayOrder)
        .order_by_asc(sub_categories::Column::Id)
        .all(db)
        .await
    {
        Ok(subs) => subs,
        Err(e) => {
            log::error!("load_nav_categories: {}", e);
            return Vec::new();
        }
    };

    let mut nav = Vec::with_capacity(subs.len());
    for sup in &supers {
        for sub in subs.iter().filter(|s| s.super_category_id == sup.id) {
            nav.push(NavCategory {
                id: sub.id,
                name: sub.name.clone(),
                super_name: sup.name.clone(),
            });
        }
    }
    nav
}

/// Client context passed to routes.
/// Wraps ClientCtxInner, which is set at the beginning of the request.
#[derive(Clone, Debug)]
pub struct ClientCtx(Data<ClientCtxInner>);

impl Default for ClientCtx {
    fn default() -> Self {
        Self(Data::new(ClientCtxInner::default()))
    }
}

impl ClientCtx {
    pub async fn from_request_parts(session: &Session, query: &str) -> Self {
        Self(Data::new(ClientCtxInner::from_request_parts(session, query).await))
    }

    fn get_or_default_from_extensions(extensions: &mut Extensions) -> Self {
        match extensions.get::<Data<ClientCtxInner>>() {
            // Existing record in extensions; pull it and return clone.
            Some(cbox) => Self(cbox.clone()),
            // No existing record; create and insert it.
            None => {
                let cbox = Data::new(ClientCtxInner::default());
                extensions.insert(cbox.clone());
                Self(cbox)
            }
        }
    }

    /// Returns either the user's id or None.
    pub fn get_id(&self) -> Option<i32> {
        self.0.client.as_ref().map(|u| u.id)
    }

    /// Returns either the user's name or the word for guest.
    pub fn get_name(&self) -> String {
        match &self.0.client {
            Some(user) => user.username.to_owned(),
            None => "Guest".to_owned(),
        }
    }

    pub fn get_user(&self) -> Option<&Profile> {
        self.0.client.as_ref()
    }

    pub fn get_csrf_token(&self) -> &str {
        &self.0.csrf_token
    }

    pub fn get_nonce(&self) -> &String {
        &self.0.nonce
    }

    pub fn nav_categories(&self) -> &Vec<NavCategory> {
        &self.0.nav_categories
    }

    pub fn query_state(&self) -> &QueryState {
        &self.0.query_state
    }

    pub fn is_user(&self) -> bool {
        self.0.client.is_some()
    }

    pub fn is_staff(&self) -> bool {
        self.0.client.as_ref().map(|u| u.is_staff).unwrap_or(false)
    }

    /// Returns Duration representing request time.
    pub fn request_time(&self) -> Duration {
        Instant::now() - self.0.request_start
    }

    /// Returns human readable representing request time.
    pub fn request_time_as_string(&self) -> String {
        let us = self.request_time().as_micros();
        if us > 5000 {
            format!("{}ms", us / 1000)
        } else {
            format!("{}us", us)
        }
    }

    /// Require user to be logged in. Returns user_id or ErrorUnauthorized.
    pub fn require_login(&self) -> Result<i32, actix_web::Error> {
        self.get_id()
            .ok_or_else(|| actix_web::error::ErrorUnauthorized("Login required"))
    }

    /// Require the staff flag. Returns user_id or an error.
    pub fn require_staff(&self) -> Result<i32, actix_web::Error> {
        let user_id = self.require_login()?;
        if !self.is_staff() {
            return Err(actix_web::error::ErrorForbidden(
                "Administrator access required",
            ));
        }
        Ok(user_id)
    }

    /// Require ownership of a resource. Returns user_id or ErrorForbidden.
    pub fn require_ownership(&self, resource_user_id: i32) -> Result<i32, actix_web::Error> {
        let user_id = self.require_login()?;
        if resource_user_id != user_id {
            return Err(actix_web::error::ErrorForbidden(
                "You don't own this resource",
            ));
        }
        Ok(user_id)
    }
}

/// This implementation is what actually provides the `client: ClientCtx` in the parameters of route functions.
impl FromRequest for ClientCtx {
    /// The associated error which can be returned.
    type Error = Error;
    /// Future that resolves to a Self.
    type Future = Ready<Result<Self, Self::Error>>;

    /// Create a Self from request parts asynchronously.
    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(ClientCtx::get_or_default_from_extensions(
            &mut req.extensions_mut(),
        )))
    }
}

impl<S: 'static, B> Transform<S, ServiceRequest> for ClientCtx
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ClientCtxMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ClientCtxMiddleware {
            service: Rc::new(service),
        }))
    }
}

/// Client context middleware
pub struct ClientCtxMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ClientCtxMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();

        // Borrows of `req` must be done in a precise way to avoid conflicts.
        // This order is important.
        let (httpreq, payload) = req.into_parts();
        let session = Session::extract(&httpreq).into_inner();
        let query = httpreq.query_string().to_owned();
        let req = ServiceRequest::from_parts(httpreq, payload);

        Box::pin(async move {
            match session {
                Ok(session) => {
                    let inner = ClientCtxInner::from_request_parts(&session, &query).await;
                    req.extensions_mut().insert(Data::new(inner));
                }
                Err(err) => {
                    log::error!("Unable to extract Session data in middleware: {}", err);
                }
            };

            svc.call(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::QueryState;

    #[test]
    fn test_query_state_parsing() {
        let state = QueryState::from_query_string("keyword=bike&page=3");
        assert_eq!(state.keyword, "bike");
        assert_eq!(state.page, 3);

        let state = QueryState::from_query_string("");
        assert_eq!(state.keyword, "");
        assert_eq!(state.page, 1);

        // Garbage page numbers fall back to page 1 without losing keyword.
        let state = QueryState::from_query_string("keyword=bike&page=banana");
        assert_eq!(state.keyword, "bike");
        assert_eq!(state.page, 1);
        let state = QueryState::from_query_string("page=-2");
        assert_eq!(state.page, 1);
    }

    #[test]
    fn test_query_state_decodes_keyword() {
        let state = QueryState::from_query_string("keyword=tea%20pot");
        assert_eq!(state.keyword, "tea pot");
        let state = QueryState::from_query_string("keyword=tea+pot");
        assert_eq!(state.keyword, "tea pot");
    }

    #[test]
    fn test_suffixes_preserve_navigation_state() {
        let state = QueryState::from_query_string("keyword=tea%20pot&page=2");
        assert_eq!(state.keyword_suffix(), "?keyword=tea+pot");
        assert_eq!(state.full_suffix(), "?keyword=tea+pot&page=2");

        let state = QueryState::from_query_string("page=2");
        assert_eq!(state.keyword_suffix(), "");
        assert_eq!(state.full_suffix(), "?page=2");

        // Page 1 is the default and is never emitted.
        let state = QueryState::from_query_string("keyword=x&page=1");
        assert_eq!(state.full_suffix(), "?keyword=x");
    }
}
