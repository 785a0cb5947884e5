//! Ordered acquisition and release of the tool session and the engine.
//!
//! The [`SessionManager`] keeps everything a chat session needs behind one
//! async mutex: the credential, the cached [`ConversationEngine`] and the
//! connected [`McpClient`]. Holding the lock for a whole operation serialises
//! callers and guarantees a session is never torn down mid-call.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use toolchat_core::Config;
use toolchat_mcp::{LaunchOptions, McpClient, McpTransport};
use toolchat_runtime::{
    ChatProvider, ConversationEngine, EngineError, LlmError, SessionError, ToolDefinition,
    ToolSession, Transcript,
};

use crate::error::ClientError;

/// Builds a chat provider for a credential.
pub type ProviderFactory =
    Arc<dyn Fn(&str) -> Result<Arc<dyn ChatProvider>, LlmError> + Send + Sync>;

/// Start-up settings for a [`SessionManager`].
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub launch: LaunchOptions,
    /// Script connected to lazily on the first call that needs tools.
    pub server_script: Option<PathBuf>,
    pub credential: Option<String>,
}

impl ClientOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            launch: LaunchOptions {
                python: config.tools.python.clone(),
                node: config.tools.node.clone(),
                request_timeout: config.tools.request_timeout(),
                handshake_timeout: config.tools.handshake_timeout(),
            },
            server_script: Some(config.tools.script_path.clone()),
            credential: config.llm.api_key.clone(),
        }
    }
}

struct State {
    credential: Option<String>,
    server_script: Option<PathBuf>,
    engine: Option<ConversationEngine>,
    session: Option<McpClient>,
}

pub struct SessionManager {
    launch: LaunchOptions,
    factory: ProviderFactory,
    state: Mutex<State>,
}

impl SessionManager {
    pub fn new(options: ClientOptions, factory: ProviderFactory) -> Self {
        Self {
            launch: options.launch,
            factory,
            state: Mutex::new(State {
                credential: options.credential,
                server_script: options.server_script,
                engine: None,
                session: None,
            }),
        }
    }

    /// Launch the tool server at `script` and make it the active session.
    ///
    /// The new server is connected before the old one is released, so a
    /// failed connect leaves the current session in place. On success the
    /// path is remembered for later reconnects.
    pub async fn connect(&self, script: &Path) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        let client = McpClient::connect(script, &self.launch).await?;
        state.server_script = Some(script.to_path_buf());
        install(&mut state, client).await;
        Ok(())
    }

    /// Make an already connected client the active session.
    pub async fn attach(&self, client: McpClient) {
        let mut state = self.state.lock().await;
        install(&mut state, client).await;
    }

    /// Handshake over `transport` and make the result the active session.
    pub async fn attach_transport(&self, transport: Box<dyn McpTransport>) -> Result<(), ClientError> {
        let client = McpClient::with_transport(transport, &self.launch).await?;
        self.attach(client).await;
        Ok(())
    }

    /// Run one question through the engine, connecting and building the
    /// engine first if needed.
    ///
    /// On failure `transcript` is left exactly as it was. A session error
    /// other than an unknown tool also releases the session.
    pub async fn process(&self, transcript: &mut Transcript) -> Result<String, ClientError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        ensure_session(state, &self.launch).await?;
        if state.engine.is_none() {
            let credential = state
                .credential
                .as_deref()
                .ok_or(ClientError::MissingCredential)?;
            let provider = (self.factory)(credential).map_err(ClientError::Provider)?;
            info!(provider = provider.provider_name(), "Conversation engine ready");
            state.engine = Some(ConversationEngine::new(provider));
        }

        let (Some(engine), Some(session)) = (state.engine.as_ref(), state.session.as_ref()) else {
            return Err(ClientError::NotConnected);
        };
        let outcome = engine.process(session, transcript).await;
        if let Err(EngineError::Session(e)) = &outcome {
            drop_broken_session(state, e).await;
        }
        Ok(outcome?)
    }

    /// The tools the server currently offers, connecting first if needed.
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ClientError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        ensure_session(state, &self.launch).await?;
        let session = state.session.as_ref().ok_or(ClientError::NotConnected)?;
        let outcome = ToolSession::list_tools(session).await;
        if let Err(e) = &outcome {
            drop_broken_session(state, e).await;
        }
        Ok(outcome?)
    }

    /// Switch to a new credential.
    ///
    /// When it differs from the current one the session is disconnected and
    /// the engine dropped, so the next call reconnects with fresh state.
    /// Returns whether anything changed.
    pub async fn reconfigure(&self, credential: &str) -> bool {
        let mut state = self.state.lock().await;
        if state.credential.as_deref() == Some(credential) {
            debug!("Credential unchanged");
            return false;
        }

        info!("Credential changed, resetting session");
        state.credential = Some(credential.to_string());
        state.engine = None;
        if let Some(mut session) = state.session.take() {
            session.disconnect().await;
        }
        true
    }

    /// Release the session and the engine. Waits for an in-flight call to
    /// finish first. Idempotent.
    pub async fn cleanup(&self) {
        let mut state = self.state.lock().await;
        state.engine = None;
        if let Some(mut session) = state.session.take() {
            info!("Closing tool session");
            session.disconnect().await;
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.session.is_some()
    }

    pub async fn has_credential(&self) -> bool {
        self.state.lock().await.credential.is_some()
    }
}

async fn install(state: &mut State, client: McpClient) {
    if let Some(server) = client.server_info() {
        info!(server = %server.name, "Tool session attached");
    }
    if let Some(mut old) = state.session.replace(client) {
        old.disconnect().await;
    }
}

/// Disconnect the session after an error that leaves it unusable, so the
/// next call reconnects from the remembered script.
async fn drop_broken_session(state: &mut State, err: &SessionError) {
    if !err.is_fatal() {
        return;
    }
    if let Some(mut session) = state.session.take() {
        warn!(error = %err, "Tool session failed, disconnecting");
        session.disconnect().await;
    }
}

async fn ensure_session(state: &mut State, launch: &LaunchOptions) -> Result<(), ClientError> {
    if state.session.is_some() {
        return Ok(());
    }
    let script = state.server_script.as_deref().ok_or(ClientError::NotConnected)?;
    info!(script = %script.display(), "Connecting to tool server on demand");
    let client = McpClient::connect(script, launch).await?;
    state.session = Some(client);
    Ok(())
}
