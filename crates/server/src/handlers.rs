//! Route handlers and the small HTML views they render.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Form, Query, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use satchel_core::{Config, Database, PageInfo, Processor, SatchelError, escape_html, get_host, sha256_hex};

const SESSION_COOKIE: &str = "session";
/// Sessions effectively never expire; this is a single-user service.
const SESSION_MAX_AGE_SECS: i64 = 86400 * 365 * 100;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub db: Arc<Database>,
    pub processor: Arc<Processor>,
}

impl AppState {
    fn base(&self) -> String {
        self.cfg.base_path()
    }

    /// Where the page list lives ("/" when served at the root).
    fn list_path(&self) -> String {
        let base = self.base();
        if base.is_empty() { "/".to_string() } else { base }
    }

    /// Token accepted by the add endpoint and baked into bookmarklets.
    fn add_token(&self) -> String {
        sha256_hex(&format!("{}|{}", self.cfg.username, self.cfg.password))
    }
}

/// Error wrapper mapping library failures onto HTTP responses.
pub struct AppError(SatchelError);

impl From<SatchelError> for AppError {
    fn from(e: SatchelError) -> Self {
        AppError(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SatchelError::PageNotFound(_) | SatchelError::InvalidPageId(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(error = %self.0, "request failed");
        (status, self.0.to_string()).into_response()
    }
}

type HandlerResult = std::result::Result<Response, AppError>;

/// Redirect to the login form unless the request carries a valid session.
pub async fn require_session(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(session) = session_cookie(request.headers())
        && state.db.valid_session(&session).unwrap_or(false)
    {
        return next.run(request).await;
    }

    info!(path = %request.uri().path(), "unauthenticated request");
    let target = format!("{}/auth?r={}", state.base(), request.uri().path());
    Redirect::to(&target).into_response()
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    let prefix = format!("{SESSION_COOKIE}=");
    cookies
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix(prefix.as_str()).map(str::to_string))
}

#[derive(Debug, Deserialize)]
pub struct AuthParams {
    #[serde(default)]
    pub u: String,
    #[serde(default)]
    pub p: String,
    #[serde(default)]
    pub r: String,
}

pub async fn auth_form(State(state): State<AppState>, Query(params): Query<AuthParams>) -> Html<String> {
    render_auth_form(&state, &params.r)
}

pub async fn auth(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Form(params): Form<AuthParams>,
) -> HandlerResult {
    if !params.p.is_empty() && params.u == state.cfg.username && params.p == state.cfg.password {
        let id = sha256_hex(&format!(
            "{}|{}|{}",
            state.cfg.username,
            state.cfg.password,
            OffsetDateTime::now_utc().unix_timestamp_nanos()
        ));
        state.db.add_session(&id, &addr.to_string())?;
        info!(%addr, "successful authentication attempt");

        let cookie = format!(
            "{SESSION_COOKIE}={id};Path={};Max-Age={SESSION_MAX_AGE_SECS};Secure;HttpOnly",
            state.list_path()
        );
        let redirect = if params.r.is_empty() { state.list_path() } else { params.r };
        return Ok(([(header::SET_COOKIE, cookie)], Redirect::to(&redirect)).into_response());
    }

    if !params.p.is_empty() {
        warn!(%addr, "bad authentication attempt");
    }
    Ok(render_auth_form(&state, &params.r).into_response())
}

fn render_auth_form(state: &AppState, redirect: &str) -> Html<String> {
    let body = format!(
        "  <body>\n    <form method=\"post\">\n      <input type=\"hidden\" name=\"r\" value=\"{}\">\n      \
         <table class=\"auth\">\n        <tr><td>Username</td><td><input type=\"text\" name=\"u\"></td></tr>\n        \
         <tr><td>Password</td><td><input type=\"password\" name=\"p\"></td></tr>\n        \
         <tr><td><input type=\"submit\" value=\"Submit\"></td></tr>\n      </table>\n    </form>\n  </body>\n</html>\n",
        escape_html(redirect)
    );
    page_shell(state, "Auth", &body)
}

#[derive(Debug, Deserialize)]
pub struct AddParams {
    #[serde(default)]
    pub u: String,
    #[serde(default)]
    pub t: String,
    /// Send to the e-reader after saving.
    #[serde(default)]
    pub k: String,
    /// Archive immediately after saving.
    #[serde(default)]
    pub a: String,
}

pub async fn add(State(state): State<AppState>, Query(params): Query<AddParams>) -> HandlerResult {
    handle_add(state, params).await
}

pub async fn add_form(State(state): State<AppState>, Form(params): Form<AddParams>) -> HandlerResult {
    handle_add(state, params).await
}

async fn handle_add(state: AppState, params: AddParams) -> HandlerResult {
    if params.u.is_empty() {
        let body = format!(
            "  <body>\n    <form method=\"post\">\n      <table>\n        \
             <input type=\"hidden\" name=\"t\" value=\"{}\">\n        <tr>\n          <td>URL</td>\n          \
             <td><input type=\"text\" autofocus name=\"u\" id=\"add-url\"></td>\n        </tr>\n        \
             <tr><td><input type=\"submit\" value=\"Add\"></td></tr>\n      </table>\n    </form>\n  </body>\n</html>\n",
            state.add_token()
        );
        return Ok(page_shell(&state, "Add", &body).into_response());
    }

    if params.t != state.add_token() {
        warn!(url = %params.u, "bad or missing token in add request");
        return Ok((StatusCode::FORBIDDEN, "Invalid token").into_response());
    }

    let pi = state.processor.process_url(&params.u).await?;
    state.db.add_page(&pi)?;
    if params.a == "1" {
        state.db.toggle_archived(&pi.id)?;
    }
    if params.k == "1" {
        state.processor.send_to_kindle(&pi.id).await?;
    }

    Ok(Redirect::to(&format!("{}/pages/{}/", state.base(), pi.id)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct PageActionParams {
    #[serde(default)]
    pub i: String,
    #[serde(default)]
    pub t: String,
    #[serde(default)]
    pub r: String,
}

pub async fn archive(State(state): State<AppState>, Query(params): Query<PageActionParams>) -> HandlerResult {
    let pi = match checked_page(&state, &params) {
        Ok(pi) => pi,
        Err(response) => return Ok(response),
    };
    state.db.toggle_archived(&pi.id)?;
    Ok(redirect_back(&state, &params).into_response())
}

pub async fn kindle(State(state): State<AppState>, Query(params): Query<PageActionParams>) -> HandlerResult {
    let pi = match checked_page(&state, &params) {
        Ok(pi) => pi,
        Err(response) => return Ok(response),
    };
    state.processor.send_to_kindle(&pi.id).await?;
    Ok(redirect_back(&state, &params).into_response())
}

/// Look up the page named by an action request and verify its access token.
fn checked_page(state: &AppState, params: &PageActionParams) -> std::result::Result<PageInfo, Response> {
    let pi = match state.db.page(&params.i) {
        Ok(pi) => pi,
        Err(e) => return Err(AppError::from(e).into_response()),
    };
    if !pi.token.is_empty() && params.t != pi.token {
        warn!(id = %pi.id, "bad or missing token in page action");
        return Err((StatusCode::BAD_REQUEST, "Invalid token").into_response());
    }
    Ok(pi)
}

fn redirect_back(state: &AppState, params: &PageActionParams) -> Redirect {
    let target = if params.r.is_empty() { state.list_path() } else { params.r.clone() };
    Redirect::to(&target)
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub a: String,
}

pub async fn list(State(state): State<AppState>, Query(params): Query<ListParams>) -> HandlerResult {
    let archived = params.a == "1";
    let pages = state.db.pages(archived, state.cfg.max_list_size)?;

    let base = state.base();
    let list_path = state.list_path();
    let archived_list_path = format!("{list_path}?a=1");
    let (toggle_page, toggle_list_path, toggle_list) = if archived {
        ("Unarchive", &list_path, "View unarchived pages")
    } else {
        ("Archive", &archived_list_path, "View archived pages")
    };
    let back_path = if archived { &archived_list_path } else { &list_path };

    let mut body = String::from("  <body>\n");
    body.push_str(&format!(
        "    <p><a href=\"{toggle_list_path}\">{toggle_list}</a> - <a href=\"{base}/add\">Add URL</a></p>\n"
    ));
    for pi in &pages {
        let toggle_url = format!("{base}/archive?i={}&t={}&r={back_path}", pi.id, pi.token);
        body.push_str(&format!(
            "    <div class=\"list-entry\">\n      \
             <div class=\"title\"><a href=\"{base}/pages/{}/\">{}</a></div>\n      \
             <div class=\"orig\"><a href=\"{}\">{}</a></div>\n      \
             <div class=\"details\">\n        \
             <a href=\"{toggle_url}\">{toggle_page}</a> - <span class=\"time\">Added {}</span>\n      \
             </div>\n    </div>\n",
            pi.id,
            escape_html(&pi.title),
            escape_html(&pi.original_url),
            escape_html(&get_host(&pi.original_url)),
            format_added(pi.time_added),
        ));
    }

    let token = state.add_token();
    body.push_str("    <div>\n      <span class=\"bookmarklets-label\">Bookmarklets:</span>\n");
    for (label, extra) in [("Add", ""), ("Save", "&a=1"), ("Kindle", "&k=1")] {
        let href = make_bookmarklet(&state.cfg.base_url, &token, extra);
        body.push_str(&format!(
            "      <div class=\"bookmarklet\"><a href=\"{href}\">{label}</a></div>\n"
        ));
    }
    body.push_str("    </div>\n  </body>\n</html>\n");

    Ok(page_shell(&state, "satchel", &body).into_response())
}

/// Document head shared by the frontend views.
fn page_shell(state: &AppState, title: &str, body: &str) -> Html<String> {
    let base = state.base();
    let mut html = String::from("<!DOCTYPE html>\n<html>\n  <head>\n");
    html.push_str("    <meta content=\"text/html; charset=utf-8\" http-equiv=\"Content-Type\"/>\n");
    html.push_str("    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\"/>\n");
    html.push_str(&format!("    <title>{}</title>\n", escape_html(title)));
    for css in ["common.css", "app.css"] {
        html.push_str(&format!("    <link rel=\"stylesheet\" href=\"{base}/static/{css}\"/>\n"));
    }
    html.push_str(&format!("    <link rel=\"icon\" href=\"{base}/static/favicon.ico\"/>\n"));
    html.push_str("  </head>\n");
    html.push_str(body);
    Html(html)
}

/// `Monday, Jan 2 at 15:04` timestamps for the list view.
fn format_added(unix: i64) -> String {
    let format =
        time::macros::format_description!("[weekday repr:long], [month repr:short] [day padding:none] at [hour]:[minute]");
    OffsetDateTime::from_unix_timestamp(unix)
        .ok()
        .and_then(|t| t.format(&format).ok())
        .unwrap_or_default()
}

/// Build a `javascript:` bookmarklet that adds the page being viewed.
fn make_bookmarklet(base_url: &str, token: &str, extra: &str) -> String {
    let add_url = format!("{}?u='+encodeURIComponent(window.location.href)+'&t={token}{extra}",
        join_url_and_path(base_url, "add"));
    format!("javascript:{{window.location.href='{add_url}';}};void(0);")
}

/// Join a base URL and a path without collapsing the scheme's slashes.
fn join_url_and_path(url: &str, path: &str) -> String {
    let url = url.strip_suffix('/').unwrap_or(url);
    let path = path.strip_prefix('/').unwrap_or(path);
    format!("{url}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_join_url_and_path() {
        for (url, path) in [
            ("https://www.example.com", "page.html"),
            ("https://www.example.com/", "page.html"),
            ("https://www.example.com", "/page.html"),
            ("https://www.example.com/", "/page.html"),
        ] {
            assert_eq!(join_url_and_path(url, path), "https://www.example.com/page.html");
        }
    }

    #[test]
    fn test_session_cookie_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_cookie(&headers), None);

        headers.insert(header::COOKIE, HeaderValue::from_static("a=b; session=deadbeef; c=d"));
        assert_eq!(session_cookie(&headers).as_deref(), Some("deadbeef"));

        headers.insert(header::COOKIE, HeaderValue::from_static("a=b"));
        assert_eq!(session_cookie(&headers), None);
    }

    #[test]
    fn test_make_bookmarklet() {
        let href = make_bookmarklet("https://example.org/satchel", "tok123", "&k=1");
        assert!(href.starts_with("javascript:"));
        assert!(href.contains("https://example.org/satchel/add?u='+encodeURIComponent(window.location.href)+'"));
        assert!(href.contains("&t=tok123&k=1"));
    }

    #[test]
    fn test_format_added_epoch() {
        assert_eq!(format_added(0), "Thursday, Jan 1 at 00:00");
    }
}
