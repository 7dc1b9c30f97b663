//! Platform capability strategy.
//!
//! The host (web shell or desktop shell) is detected once at startup and
//! passed in as a value; concrete collaborator implementations are
//! constructed here, behind their traits, instead of being re-selected per
//! call.

use std::sync::Arc;

use glossa_core::Result;
use glossa_core::coach::{CoachService, LanguageCoachApi};

use crate::config::ClientConfig;
use crate::http::HttpLanguageCoachApi;

/// Which shell the client is running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    Web,
    Desktop,
}

/// Startup-time platform capabilities.
#[derive(Debug, Clone)]
pub struct Platform {
    kind: PlatformKind,
    config: ClientConfig,
    app_version: Option<String>,
}

impl Platform {
    pub fn new(kind: PlatformKind, config: ClientConfig) -> Self {
        Self {
            kind,
            config,
            app_version: None,
        }
    }

    /// Records the desktop shell's version string.
    pub fn with_app_version(mut self, app_version: impl Into<String>) -> Self {
        self.app_version = Some(app_version.into());
        self
    }

    pub fn kind(&self) -> PlatformKind {
        self.kind
    }

    pub fn is_desktop(&self) -> bool {
        self.kind == PlatformKind::Desktop
    }

    pub fn app_version(&self) -> Option<&str> {
        self.app_version.as_deref()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Builds the coach API collaborator for this platform.
    ///
    /// Both shells currently speak the same HTTP protocol, parameterized by
    /// the configured API base; the choice is made once, here, behind the
    /// trait.
    pub fn coach_api(&self) -> Result<Arc<dyn LanguageCoachApi>> {
        Ok(Arc::new(HttpLanguageCoachApi::new(&self.config)?))
    }

    /// Builds a fully wired coach service for this platform.
    pub fn coach_service(&self) -> Result<Arc<CoachService>> {
        let api = self.coach_api()?;
        Ok(Arc::new(
            CoachService::new(api)
                .with_stream_idle_timeout(self.config.stream_idle_timeout()),
        ))
    }
}
