use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use ripple_api::middleware::require_identity;
use ripple_api::{AppState, AppStateInner, chats, posts, social, users, webhook};
use ripple_gateway::connection;
use ripple_gateway::dispatcher::Dispatcher;

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    db: Arc<ripple_db::Database>,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ripple=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("RIPPLE_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let webhook_secret = std::env::var("RIPPLE_WEBHOOK_SECRET")
        .unwrap_or_else(|_| "whsec_ZGV2LXdlYmhvb2stc2VjcmV0".into());
    let db_path = std::env::var("RIPPLE_DB_PATH").unwrap_or_else(|_| "ripple.db".into());
    let host = std::env::var("RIPPLE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("RIPPLE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(ripple_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let dispatcher = Dispatcher::new();
    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        dispatcher: dispatcher.clone(),
        jwt_secret: jwt_secret.clone(),
        webhook_secret,
    });

    let state = ServerState {
        dispatcher,
        db,
        jwt_secret,
    };

    // Routes
    let public_routes = Router::new()
        .route("/webhooks/identity", post(webhook::identity_webhook))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/users/me", get(users::me).put(users::update_profile))
        .route("/users/search", get(users::search_users))
        .route("/users/username-available", get(users::username_available))
        .route("/users/{user_id}", get(users::get_user))
        .route(
            "/users/{user_id}/follow",
            post(social::toggle_follow).get(social::is_following),
        )
        .route("/chats", post(chats::create_chat).get(chats::list_chats))
        .route(
            "/chats/{chat_id}/messages",
            get(chats::get_messages).post(chats::send_message),
        )
        .route(
            "/chats/{chat_id}/read",
            post(chats::mark_read).get(chats::get_read_receipt),
        )
        .route(
            "/chats/{chat_id}/typing",
            put(chats::set_typing).get(chats::get_typing),
        )
        .route("/chats/{chat_id}/participants", get(chats::get_participants))
        .route("/posts", post(posts::create_post))
        .route("/posts/{post_id}", get(posts::get_post))
        .route("/posts/{post_id}/bookmark", post(posts::toggle_bookmark))
        .route("/bookmarks", get(posts::list_bookmarks))
        .route("/notifications", get(social::list_notifications))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            require_identity,
        ))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Ripple server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.db, state.jwt_secret)
    })
}
