//! Messages exchanged between the gateway and the compiler host.
//!
//! Every request travels in an [`Envelope`] carrying a fresh id; the host
//! answers with a [`Reply`] echoing that id. Binary payloads are `Arc<[u8]>`
//! so buffers move through the channel without being copied.
//!
//! The serde representation mirrors the wire shape:
//!
//! ```text
//! -> {"id": "...", "type": "compileTypst", "data": {"contest": {...}}}
//! <- {"id": "...", "success": true, "data": {"kind": "pdf", "value": [...]}}
//! ```

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contest::Contest;

/// Outbound request with its correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    #[serde(flatten)]
    pub request: Request,
}

impl Envelope {
    pub fn new(request: Request) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Request {
    Init(InitData),
    RegisterImages(RegisterImagesData),
    CompileTypst(CompileData),
    RenderTypst(RenderData),
}

impl Request {
    /// Wire name, used in logs and timeout errors.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::RegisterImages(_) => "registerImages",
            Self::CompileTypst(_) => "compileTypst",
            Self::RenderTypst(_) => "renderTypst",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitData {
    /// Font buffers in manifest order.
    pub fonts: Vec<Arc<[u8]>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterImagesData {
    /// uuid -> image bytes
    pub images: FxHashMap<String, Arc<[u8]>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileData {
    pub contest: Contest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderData {
    pub contest: Contest,
    pub layout: SvgLayout,
}

/// How rendered SVG is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SvgLayout {
    /// All pages stacked into one document.
    #[default]
    Merged,
    /// One SVG document per page.
    Pages,
}

/// Inbound answer to an [`Envelope`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub id: Uuid,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    pub fn ok(id: Uuid, data: ResponseData) -> Self {
        Self {
            id,
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(id: Uuid, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Collapse into the payload or the host's error message.
    pub fn into_result(self) -> Result<ResponseData, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err("host replied without a payload".into()),
            (false, _) => Err(self
                .error
                .unwrap_or_else(|| "host reported an unknown error".into())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ResponseData {
    Initialized,
    ImagesRegistered(usize),
    Pdf(Arc<[u8]>),
    Svg(String),
    Pages(Vec<String>),
}

impl ResponseData {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::ImagesRegistered(_) => "imagesRegistered",
            Self::Pdf(_) => "pdf",
            Self::Svg(_) => "svg",
            Self::Pages(_) => "pages",
        }
    }
}
