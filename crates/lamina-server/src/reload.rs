//! WebSocket-based live reload.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Messages sent to connected pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Full page reload
    Reload,

    /// Re-fetch stylesheets in place, no navigation
    RefreshStyles,

    /// Connection established
    Connected,
}

/// Hub for broadcasting reload messages to all connected pages.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl ReloadHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a message to all connected pages.
    pub fn send(&self, msg: ReloadMessage) {
        // Ignore send errors (no receivers)
        let _ = self.sender.send(msg);
    }

    /// Subscribe to reload messages.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    /// Number of connected pages.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate the client-side reload script served at `/__reload.js`.
pub fn reload_client_script(ws_url: &str) -> String {
    format!(
        r#"
(function() {{
  'use strict';

  const ws = new WebSocket('{}');
  let reconnectAttempts = 0;
  const maxReconnectAttempts = 10;

  ws.onopen = function() {{
    console.log('[reload] Connected');
    reconnectAttempts = 0;
  }};

  ws.onmessage = function(event) {{
    const msg = JSON.parse(event.data);
    console.log('[reload]', msg.type);

    switch (msg.type) {{
      case 'reload':
        location.reload();
        break;

      case 'refresh_styles':
        document.querySelectorAll('link[rel="stylesheet"]').forEach(function(link) {{
          const url = new URL(link.href);
          url.searchParams.set('v', Date.now().toString());
          link.href = url.toString();
        }});
        break;

      case 'connected':
        console.log('[reload] Server acknowledged connection');
        break;
    }}
  }};

  ws.onclose = function() {{
    console.log('[reload] Disconnected');
    if (reconnectAttempts < maxReconnectAttempts) {{
      reconnectAttempts++;
      setTimeout(function() {{
        console.log('[reload] Reconnecting...');
        location.reload();
      }}, 1000 * reconnectAttempts);
    }}
  }};

  ws.onerror = function(e) {{
    console.error('[reload] WebSocket error:', e);
  }};
}})();
"#,
        ws_url
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_broadcasts_messages() {
        let hub = ReloadHub::new();
        let mut rx = hub.subscribe();

        hub.send(ReloadMessage::Reload);

        match rx.try_recv() {
            Ok(ReloadMessage::Reload) => {}
            _ => panic!("Expected Reload message"),
        }
    }

    #[test]
    fn serializes_messages() {
        let json = serde_json::to_string(&ReloadMessage::RefreshStyles).unwrap();
        assert!(json.contains("refresh_styles"));
    }

    #[test]
    fn client_script_embeds_socket_url() {
        let script = reload_client_script("ws://127.0.0.1:3000/__reload");
        assert!(script.contains("ws://127.0.0.1:3000/__reload"));
    }
}
