use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use axum::extract::rejection::JsonRejection;
use axum::{
    Router,
    extract::{Path, State},
    response::Json,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::chat::chat;
use crate::config::AppConfig;
use crate::email::EmailTransport;
use crate::gmail::GmailSender;
use crate::history::{HistoryStore, is_valid_user_key};
use crate::openai::{BoxedToolCall, CompletionClient, Message, OpenAiClient, Role};
use crate::prompt::{system_prompt, templates};
use crate::public::{
    ApiError, ChatRequest, ChatResponse, ChatTranscriptResponse, INVALID_REQUEST,
    INVALID_USER_KEY,
};
use crate::tools::SendEmailTool;
use crate::tools::email::SEND_EMAIL_TOOL_NAME;

type SharedState = Arc<AppState>;

/// Everything a request needs. Services are passed in rather than
/// built here so they can be swapped out.
pub struct AppState {
    completion_client: Arc<dyn CompletionClient>,
    email_transport: Arc<dyn EmailTransport>,
    history: HistoryStore,
    operator_email: String,
    system_prompt: String,
}

impl AppState {
    pub fn new(
        completion_client: Arc<dyn CompletionClient>,
        email_transport: Arc<dyn EmailTransport>,
        history: HistoryStore,
        operator_email: &str,
    ) -> Result<Self, Error> {
        let system_prompt = system_prompt(&templates(), operator_email, SEND_EMAIL_TOOL_NAME)?;
        Ok(Self {
            completion_client,
            email_transport,
            history,
            operator_email: operator_email.to_string(),
            system_prompt,
        })
    }

    /// Wire up the production services from config
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let completion_client = OpenAiClient::new(
            &config.completion_api_hostname,
            &config.completion_api_key,
            &config.completion_model,
            config.completion_timeout,
        )?;
        let email_transport = GmailSender::new(
            &config.gmail_api_client_id,
            &config.gmail_api_client_secret,
            &config.gmail_refresh_token,
        );
        let history = HistoryStore::new(&config.data_dir)?;
        Self::new(
            Arc::new(completion_client),
            Arc::new(email_transport),
            history,
            &config.operator_email,
        )
    }

    fn tools(&self) -> Vec<BoxedToolCall> {
        vec![Box::new(SendEmailTool::new(
            &self.operator_email,
            Arc::clone(&self.email_transport),
        ))]
    }
}

async fn chat_handler(
    State(state): State<SharedState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(payload) = payload.map_err(|e| {
        tracing::warn!("Rejected chat request: {}", e);
        ApiError::BadRequest(INVALID_REQUEST)
    })?;
    if !is_valid_user_key(&payload.user_key) {
        return Err(ApiError::BadRequest(INVALID_USER_KEY));
    }

    // Held until the updated history is saved so concurrent requests
    // for the same user can't drop each other's messages
    let _guard = state.history.lock(&payload.user_key).await;

    let mut history = state.history.load(&payload.user_key).await?;
    history.push(Message::new(Role::User, &payload.message));

    let tools = state.tools();
    let messages = chat(
        state.completion_client.as_ref(),
        &tools,
        &state.system_prompt,
        &history,
    )
    .await?;
    let reply = messages
        .last()
        .and_then(|m| m.content.clone())
        .ok_or(anyhow!("Chat returned no reply"))?;

    // Nothing is written unless the whole turn succeeded
    history.extend(messages);
    state.history.save(&payload.user_key, &history).await?;

    Ok(Json(ChatResponse::new(&reply)))
}

async fn chat_transcript(
    State(state): State<SharedState>,
    Path(user_key): Path<String>,
) -> Result<Json<ChatTranscriptResponse>, ApiError> {
    if !is_valid_user_key(&user_key) {
        return Err(ApiError::BadRequest(INVALID_USER_KEY));
    }
    let transcript = state.history.load(&user_key).await?;
    Ok(Json(ChatTranscriptResponse { transcript }))
}

pub fn app(app_state: AppState) -> Router {
    let shared_state = SharedState::new(app_state);
    let cors = CorsLayer::permissive();

    Router::new()
        // Chat with the assistant
        .route("/chat", post(chat_handler))
        // Retrieve a user's conversation so far
        .route("/chat/{user_key}", get(chat_transcript))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

// Run the server
pub async fn serve(host: String, port: String, config: AppConfig) -> Result<(), Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // axum logs rejections from built-in extractors with the `axum::rejection`
                // target, at `TRACE` level. `axum::rejection=trace` enables showing those events
                format! {
                    "{}=debug,tower_http=debug,axum::rejection=trace",
                    env!("CARGO_CRATE_NAME")
                }
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_state = AppState::from_config(&config)?;
    let app = app(app_state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;

    tracing::info!("Server started. Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
