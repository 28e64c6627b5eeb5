//! Installed-font access and the one-time consent that guards it.

use std::sync::Arc;

use tokio::sync::watch;

/// Looks up installed fonts by family or PostScript name.
pub trait LocalFontSource: Send + Sync {
    fn find(&self, name: &str) -> Option<Vec<u8>>;
}

/// Whether the platform can read installed fonts at all.
#[derive(Clone)]
pub enum LocalFontAccess {
    Available(Arc<dyn LocalFontSource>),
    Unavailable,
}

impl LocalFontAccess {
    /// System fonts via `fontdb`, when `enabled`.
    pub fn system(enabled: bool) -> Self {
        if enabled {
            Self::Available(Arc::new(SystemFonts::load()))
        } else {
            Self::Unavailable
        }
    }

    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

impl std::fmt::Debug for LocalFontAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available(_) => f.write_str("Available"),
            Self::Unavailable => f.write_str("Unavailable"),
        }
    }
}

/// Installed fonts indexed by `fontdb`.
pub struct SystemFonts {
    db: fontdb::Database,
}

impl SystemFonts {
    pub fn load() -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        crate::debug!("font"; "indexed {} installed faces", db.len());
        Self { db }
    }
}

impl LocalFontSource for SystemFonts {
    fn find(&self, name: &str) -> Option<Vec<u8>> {
        let face = self.db.faces().find(|face| {
            face.post_script_name.eq_ignore_ascii_case(name)
                || face
                    .families
                    .iter()
                    .any(|(family, _)| family.eq_ignore_ascii_case(name))
        })?;
        self.db.with_face_data(face.id, |data, _| data.to_vec())
    }
}

// ============================================================================
// Consent
// ============================================================================

/// Front-end answer to the installed-font prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontAccess {
    /// Nobody asked yet.
    #[default]
    NotRequested,
    /// Waiting for the front end to acknowledge.
    Requested,
    Granted,
    Denied,
}

impl FontAccess {
    pub const fn is_decided(self) -> bool {
        matches!(self, Self::Granted | Self::Denied)
    }
}

/// Session-wide consent for reading installed fonts.
///
/// The first [`acknowledge`](Self::acknowledge) decides for the whole
/// session; later answers are ignored.
#[derive(Debug)]
pub struct FontConsent {
    state: watch::Sender<FontAccess>,
}

impl Default for FontConsent {
    fn default() -> Self {
        Self::new()
    }
}

impl FontConsent {
    pub fn new() -> Self {
        Self {
            state: watch::Sender::new(FontAccess::NotRequested),
        }
    }

    pub fn state(&self) -> FontAccess {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<FontAccess> {
        self.state.subscribe()
    }

    /// Record the decision. Returns `false` if one was already recorded.
    pub fn acknowledge(&self, granted: bool) -> bool {
        let decision = if granted {
            FontAccess::Granted
        } else {
            FontAccess::Denied
        };
        self.state.send_if_modified(|state| {
            if state.is_decided() {
                return false;
            }
            *state = decision;
            true
        })
    }

    /// Wait for a decision, raising the request if nobody has yet.
    pub async fn obtain(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == FontAccess::NotRequested {
                *state = FontAccess::Requested;
                return true;
            }
            false
        });

        let mut rx = self.state.subscribe();
        match rx.wait_for(|state| state.is_decided()).await {
            Ok(state) => *state == FontAccess::Granted,
            Err(_) => false,
        }
    }
}
