//! The renderer bridge.
//!
//! The interpreter talks to an external renderer over a synchronous
//! request/response message channel: one message out, one response back
//! within a timeout. A `retCode` of 200 carries the created handle in
//! `resultValue`; anything else is `ServerRefused`.
//!
//! The transport itself is out of scope; [`RendererEndpoint`] is the seam
//! and [`LoopbackRenderer`] is the in-process implementation used by
//! tests, recording every message and answering success with fresh
//! handles.

use hvml_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tracing::debug;

/// Success status on the renderer wire.
pub const RET_CODE_OK: u16 = 200;

/// Default response timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// What a message is addressed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RdrTargetKind {
    /// The renderer session.
    Session,
    /// A workspace.
    Workspace,
    /// A window.
    Window,
    /// A page.
    Page,
}

/// One request message on the renderer wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RdrMessage {
    /// Target kind.
    pub target: RdrTargetKind,
    /// Target handle.
    pub target_value: u64,
    /// Operation name (`createPlainWindow`, `appendChild`, …).
    pub operation: String,
    /// Optional correlation id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    /// Optional element handle the operation applies to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<u64>,
    /// Optional property name (`updateElementProperty`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    /// JSON payload.
    pub data: Json,
}

/// The response to one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RdrResponse {
    /// Status; 200 is success.
    #[serde(rename = "retCode")]
    pub ret_code: u16,
    /// Created/affected handle on success.
    #[serde(rename = "resultValue")]
    pub result_value: u64,
}

/// The transport seam to the renderer process.
pub trait RendererEndpoint {
    /// Send one message and block for its response within `timeout`.
    fn send_request(&self, msg: &RdrMessage, timeout: Duration) -> CoreResult<RdrResponse>;
}

// =============================================================================
// Connection
// =============================================================================

/// A live connection: the endpoint plus the handles created so far.
pub struct RdrConn {
    endpoint: Rc<dyn RendererEndpoint>,
    timeout: Duration,
    session: u64,
    /// Workspace handle, once created.
    pub workspace: Option<u64>,
    /// Window handle, once created.
    pub window: Option<u64>,
    /// Page handle, once created.
    pub page: Option<u64>,
}

impl RdrConn {
    /// Wrap `endpoint` with the default timeout.
    #[must_use]
    pub fn new(endpoint: Rc<dyn RendererEndpoint>) -> Self {
        Self {
            endpoint,
            timeout: DEFAULT_TIMEOUT,
            session: 1,
            workspace: None,
            window: None,
            page: None,
        }
    }

    /// Override the response timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn roundtrip(&self, msg: RdrMessage) -> CoreResult<u64> {
        debug!(operation = %msg.operation, target = ?msg.target, "renderer request");
        let resp = self.endpoint.send_request(&msg, self.timeout)?;
        if resp.ret_code == RET_CODE_OK {
            Ok(resp.result_value)
        } else {
            Err(CoreError::ServerRefused {
                operation: msg.operation,
                ret_code: resp.ret_code,
            })
        }
    }

    /// `createWorkspace` on the session.
    pub fn create_workspace(&mut self, title: &str) -> CoreResult<u64> {
        let handle = self.roundtrip(RdrMessage {
            target: RdrTargetKind::Session,
            target_value: self.session,
            operation: "createWorkspace".to_owned(),
            request_id: None,
            element: None,
            property: None,
            data: serde_json::json!({ "title": title }),
        })?;
        self.workspace = Some(handle);
        Ok(handle)
    }

    /// `createPlainWindow` on the workspace (or session).
    pub fn create_plain_window(&mut self, title: &str) -> CoreResult<u64> {
        let (target, target_value) = match self.workspace {
            Some(ws) => (RdrTargetKind::Workspace, ws),
            None => (RdrTargetKind::Session, self.session),
        };
        let handle = self.roundtrip(RdrMessage {
            target,
            target_value,
            operation: "createPlainWindow".to_owned(),
            request_id: None,
            element: None,
            property: None,
            data: serde_json::json!({ "title": title }),
        })?;
        self.window = Some(handle);
        self.page = Some(handle);
        Ok(handle)
    }

    /// First-round attach: `createPlainWindow` carrying the serialized
    /// document.
    pub fn attach_page(&mut self, title: &str, html: &str) -> CoreResult<u64> {
        let (target, target_value) = match self.workspace {
            Some(ws) => (RdrTargetKind::Workspace, ws),
            None => (RdrTargetKind::Session, self.session),
        };
        let handle = self.roundtrip(RdrMessage {
            target,
            target_value,
            operation: "createPlainWindow".to_owned(),
            request_id: None,
            element: None,
            property: None,
            data: serde_json::json!({ "title": title, "html": html }),
        })?;
        self.window = Some(handle);
        self.page = Some(handle);
        Ok(handle)
    }

    /// `createTabbedWindow` on the workspace (or session).
    pub fn create_tabbed_window(&mut self, title: &str) -> CoreResult<u64> {
        let (target, target_value) = match self.workspace {
            Some(ws) => (RdrTargetKind::Workspace, ws),
            None => (RdrTargetKind::Session, self.session),
        };
        let handle = self.roundtrip(RdrMessage {
            target,
            target_value,
            operation: "createTabbedWindow".to_owned(),
            request_id: None,
            element: None,
            property: None,
            data: serde_json::json!({ "title": title }),
        })?;
        self.window = Some(handle);
        Ok(handle)
    }

    /// `createTabPage` on a tabbed window.
    pub fn create_tab_page(&mut self, title: &str) -> CoreResult<u64> {
        let window = self
            .window
            .ok_or_else(|| CoreError::not_allowed("createTabPage without a window"))?;
        let handle = self.roundtrip(RdrMessage {
            target: RdrTargetKind::Window,
            target_value: window,
            operation: "createTabPage".to_owned(),
            request_id: None,
            element: None,
            property: None,
            data: serde_json::json!({ "title": title }),
        })?;
        self.page = Some(handle);
        Ok(handle)
    }

    /// Emit a per-DOM-edit operation against the page.
    pub fn dom_edit(
        &self,
        operation: &str,
        element: u64,
        property: Option<&str>,
        data: Json,
    ) -> CoreResult<()> {
        let page = self
            .page
            .ok_or_else(|| CoreError::not_allowed("DOM edit without a page"))?;
        self.roundtrip(RdrMessage {
            target: RdrTargetKind::Page,
            target_value: page,
            operation: operation.to_owned(),
            request_id: None,
            element: Some(element),
            property: property.map(str::to_owned),
            data,
        })?;
        Ok(())
    }
}

// =============================================================================
// Loopback Endpoint
// =============================================================================

/// An in-process endpoint recording every message and answering success.
#[derive(Default)]
pub struct LoopbackRenderer {
    sent: RefCell<Vec<RdrMessage>>,
    next_handle: RefCell<u64>,
    /// When set, every request is refused with this status.
    pub refuse_with: Option<u16>,
}

impl LoopbackRenderer {
    /// A recording endpoint that accepts everything.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            sent: RefCell::new(Vec::new()),
            next_handle: RefCell::new(100),
            refuse_with: None,
        })
    }

    /// An endpoint refusing every request with `status`.
    #[must_use]
    pub fn refusing(status: u16) -> Rc<Self> {
        Rc::new(Self {
            sent: RefCell::new(Vec::new()),
            next_handle: RefCell::new(100),
            refuse_with: Some(status),
        })
    }

    /// Operation names seen so far, in order.
    #[must_use]
    pub fn operations(&self) -> Vec<String> {
        self.sent.borrow().iter().map(|m| m.operation.clone()).collect()
    }

    /// All recorded messages.
    #[must_use]
    pub fn messages(&self) -> Vec<RdrMessage> {
        self.sent.borrow().clone()
    }
}

impl RendererEndpoint for LoopbackRenderer {
    fn send_request(&self, msg: &RdrMessage, _timeout: Duration) -> CoreResult<RdrResponse> {
        self.sent.borrow_mut().push(msg.clone());
        if let Some(status) = self.refuse_with {
            return Ok(RdrResponse {
                ret_code: status,
                result_value: 0,
            });
        }
        let mut next = self.next_handle.borrow_mut();
        *next += 1;
        Ok(RdrResponse {
            ret_code: RET_CODE_OK,
            result_value: *next,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_plain_window_yields_handle() {
        let endpoint = LoopbackRenderer::new();
        let mut conn = RdrConn::new(endpoint.clone());
        let handle = conn.create_plain_window("main").unwrap();
        assert!(handle > 100);
        assert_eq!(conn.page, Some(handle));
        assert_eq!(endpoint.operations(), vec!["createPlainWindow"]);
    }

    #[test]
    fn test_refusal_maps_to_server_refused() {
        let endpoint = LoopbackRenderer::refusing(500);
        let mut conn = RdrConn::new(endpoint);
        let err = conn.create_plain_window("main").unwrap_err();
        assert!(matches!(err, CoreError::ServerRefused { ret_code: 500, .. }));
    }

    #[test]
    fn test_message_serialization_shape() {
        let msg = RdrMessage {
            target: RdrTargetKind::Page,
            target_value: 7,
            operation: "appendChild".to_owned(),
            request_id: None,
            element: Some(3),
            property: None,
            data: serde_json::json!({ "content": "<span></span>" }),
        };
        let text = serde_json::to_string(&msg).unwrap();
        assert!(text.contains("\"target\":\"page\""));
        assert!(text.contains("\"operation\":\"appendChild\""));
        let back: RdrMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back.target_value, 7);
    }

    #[test]
    fn test_workspace_then_window_chain() {
        let endpoint = LoopbackRenderer::new();
        let mut conn = RdrConn::new(endpoint.clone());
        conn.create_workspace("ws").unwrap();
        conn.create_tabbed_window("win").unwrap();
        conn.create_tab_page("tab").unwrap();
        assert_eq!(
            endpoint.operations(),
            vec!["createWorkspace", "createTabbedWindow", "createTabPage"]
        );
    }
}
