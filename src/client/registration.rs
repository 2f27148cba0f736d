//! Registration operations and line-status queries
//!
//! `register_sip`/`unregister_sip` only delegate to the transport after their
//! preconditions pass; the registration state itself changes when the
//! resulting transport event (`Registered`, `Unregistered`,
//! `RegistrationFailed`) flows through the dispatch loop.

use tracing::info;

use crate::config::UnregisterOptions;
use crate::error::{ClientError, ClientResult};
use crate::registration::RegistrationSnapshot;

use super::manager::ClientManager;

impl ClientManager {
    /// Send a REGISTER request for the configured user
    ///
    /// Preconditions: a transport exists, automatic registration is disabled
    /// in the configuration, and the line is connected.
    pub async fn register_sip(&self) -> ClientResult<()> {
        let state = self.shared.state.lock().await;
        let transport = state
            .transport
            .clone()
            .ok_or_else(|| ClientError::precondition("no signaling transport"))?;
        if self.shared.config.auto_register {
            return Err(ClientError::precondition(
                "auto-registration is enabled; manual registration is not available",
            ));
        }
        if !state.registration.is_line_connected() {
            return Err(ClientError::precondition("line is not connected"));
        }
        drop(state);
        info!(user = %self.shared.config.sip_user, "registering");
        transport.register().await
    }

    /// Remove the current registration
    ///
    /// Precondition: a registration is currently active.
    pub async fn unregister_sip(&self, options: UnregisterOptions) -> ClientResult<()> {
        let state = self.shared.state.lock().await;
        let transport = state
            .transport
            .clone()
            .ok_or_else(|| ClientError::precondition("no signaling transport"))?;
        if !state.registration.is_registered() {
            return Err(ClientError::precondition("not registered"));
        }
        drop(state);
        info!(user = %self.shared.config.sip_user, all = options.all, "unregistering");
        transport.unregister(&options).await
    }

    /// Whether the signaling line is connected
    pub async fn is_line_connected(&self) -> bool {
        self.shared.state.lock().await.registration.is_line_connected()
    }

    /// Whether a SIP registration is current
    pub async fn is_registered(&self) -> bool {
        self.shared.state.lock().await.registration.is_registered()
    }

    /// Whether the registration state carries an error
    pub async fn has_error(&self) -> bool {
        self.shared.state.lock().await.registration.has_error()
    }

    /// The recorded registration error message, empty when there is none
    pub async fn error_message(&self) -> String {
        self.shared.state.lock().await.registration.error_message().to_string()
    }

    /// Full snapshot of the registration state
    pub async fn registration_state(&self) -> RegistrationSnapshot {
        self.shared.state.lock().await.registration.snapshot()
    }
}
