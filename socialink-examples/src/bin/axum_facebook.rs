//! # Axum Facebook Login Example
//!
//! A minimal server that logs users in with Facebook and links them to accounts kept
//! in a `MemoryStore`.
//!
//! Configure it through the environment (or a `.env` file):
//!
//! ```text
//! FACEBOOK_CLIENT_ID=...
//! FACEBOOK_CLIENT_SECRET=...
//! FACEBOOK_REDIRECT_URI=http://localhost:3000/auth/facebook/callback
//! FACEBOOK_EXTENDED_PERMISSIONS=email
//! RUST_LOG=debug
//! ```
//!
//! - `GET /auth/facebook` redirects to the login dialog.
//! - `GET /auth/facebook/callback` completes a code login.
//! - `POST /auth/facebook/canvas` completes a login from a widget `signed_request`.

use axum::{
    extract::{Form, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use html_escape::encode_text;
use socialink::flow::{AssociationPipeline, PipelineOutcome, SocialAuthFlow};
use socialink::store::{MemoryStore, MemoryUser};
use socialink::{AuthError, IdentityProvider, LogObserver, Provider, RequestData};
use std::sync::Arc;
use tower_cookies::{Cookie, CookieManagerLayer, Cookies};

const STATE_COOKIE: &str = "socialink_state";

type FacebookFlow = SocialAuthFlow<Provider, MemoryStore>;

#[derive(Clone)]
struct AppState {
    flow: Arc<FacebookFlow>,
    store: MemoryStore,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let provider = Provider::from_env("facebook")?;
    let app = app(app_state(provider));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    log::info!("listening on http://localhost:3000");
    axum::serve(listener, app).await?;
    Ok(())
}

fn app_state(provider: Provider) -> AppState {
    let store = MemoryStore::new();
    let pipeline = AssociationPipeline::with_default_stages(
        store.clone(),
        provider.config().create_users,
        Arc::new(LogObserver),
    );
    AppState {
        flow: Arc::new(SocialAuthFlow::new(provider, pipeline)),
        store,
    }
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/auth/facebook", get(login))
        .route("/auth/facebook/callback", get(callback))
        .route("/auth/facebook/canvas", post(canvas))
        .layer(CookieManagerLayer::new())
        .with_state(state)
}

async fn index(State(state): State<AppState>) -> impl IntoResponse {
    let users = state.store.users().map(|users| users.len()).unwrap_or_default();
    Html(format!(
        "<h1>Socialink Example</h1>\
         <p>Provider: {}</p>\
         <p>Known users: {users}</p>\
         <p><a href=\"/auth/facebook\">Login with Facebook</a></p>",
        state.flow.provider().provider_id(),
    ))
}

async fn login(State(state): State<AppState>, cookies: Cookies) -> impl IntoResponse {
    let (url, csrf_state) = state.flow.initiate_login();
    cookies.add(
        Cookie::build((STATE_COOKIE, csrf_state))
            .path("/")
            .http_only(true)
            .build(),
    );
    Redirect::to(&url)
}

async fn callback(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(params): Query<RequestData>,
) -> Response {
    let expected = cookies
        .get(STATE_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty());
    cookies.remove(Cookie::from(STATE_COOKIE));

    // Without the cookie issued by `/auth/facebook` there is nothing to compare against.
    let Some(expected) = expected else {
        return render(Err(AuthError::CsrfMismatch));
    };

    let outcome = state
        .flow
        .complete_login(&params, Some(expected.as_str()), None)
        .await;
    render(outcome)
}

async fn canvas(State(state): State<AppState>, Form(params): Form<RequestData>) -> Response {
    render(state.flow.complete_login(&params, None, None).await)
}

fn render(outcome: Result<PipelineOutcome<MemoryUser>, AuthError>) -> Response {
    match outcome {
        Ok(PipelineOutcome::Authenticated { user, is_new, .. }) => Html(format!(
            "<h1>Welcome{} {}!</h1><p>User id: {}</p><a href=\"/\">Home</a>",
            if is_new { "" } else { " back" },
            encode_text(&user.username),
            user.id,
        ))
        .into_response(),
        Ok(PipelineOutcome::NoUser) => {
            Html("<h1>Login failed</h1><p>No account could be created.</p>").into_response()
        }
        Err(e) => {
            log::warn!("login failed: {e}");
            Html(format!(
                "<h1>Login failed</h1><p>{}</p>",
                encode_text(&e.user_message())
            ))
            .into_response()
        }
    }
}
