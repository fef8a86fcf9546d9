//! Browser side of the live-update channel.

use crate::protocol::{CLIENT_SCRIPT_PATH, SOCKET_PATH};

/// Delay before the first reconnect attempt, doubled on every retry.
pub const RECONNECT_BASE_MS: u64 = 500;

/// Upper bound for the reconnect delay.
pub const RECONNECT_MAX_MS: u64 = 10_000;

/// Attempts before the client gives up.
pub const RECONNECT_ATTEMPTS: u32 = 20;

/// Tag injected into served HTML in development.
pub fn script_tag() -> String {
    format!(r#"<script src="{}"></script>"#, CLIENT_SCRIPT_PATH)
}

/// Generate the live-update client script.
///
/// Pages may register `window.__folio.accept(fn)` to handle updates for
/// their own route instead of reloading.
pub fn client_script() -> String {
    format!(
        r#"
(function() {{
  'use strict';

  if (window.__folio) return;

  const handlers = [];
  window.__folio = {{
    accept: function(fn) {{ handlers.push(fn); }}
  }};

  const socketUrl = (location.protocol === 'https:' ? 'wss://' : 'ws://') + location.host + '{socket}';
  const baseDelay = {base};
  const maxDelay = {max};
  const maxAttempts = {attempts};
  let attempts = 0;
  let dropped = false;

  function decodePath(path) {{
    try {{ return decodeURIComponent(path); }} catch (e) {{ return path; }}
  }}

  function currentRoute() {{
    let path = decodePath(location.pathname).replace(/\/index\.html$/, '').replace(/\/+$/, '');
    return path === '' ? '/' : path;
  }}

  function swapStyles(paths, timestamp) {{
    document.querySelectorAll('link[rel="stylesheet"]').forEach(function(link) {{
      const url = new URL(link.href, location.href);
      if (paths.indexOf(decodePath(url.pathname)) !== -1) {{
        url.searchParams.set('t', timestamp);
        link.href = url.toString();
      }}
    }});
  }}

  function showOverlay(message) {{
    let overlay = document.getElementById('__folio-overlay');
    if (!overlay) {{
      overlay = document.createElement('div');
      overlay.id = '__folio-overlay';
      overlay.style.cssText = 'position:fixed;inset:0;z-index:99999;background:rgba(0,0,0,.85);' +
        'color:#ff6b6b;font:14px/1.5 monospace;padding:2rem;white-space:pre-wrap;overflow:auto;cursor:pointer';
      overlay.title = 'Click to dismiss';
      overlay.addEventListener('click', function() {{ overlay.remove(); }});
      document.body.appendChild(overlay);
    }}
    overlay.textContent = message;
  }}

  function handle(msg) {{
    switch (msg.type) {{
      case 'update':
        if (msg.path !== currentRoute()) return;
        if (handlers.length === 0) {{
          location.reload();
          return;
        }}
        handlers.forEach(function(fn) {{
          try {{
            fn(msg);
          }} catch (e) {{
            console.error('[folio] Update handler failed:', e);
            location.reload();
          }}
        }});
        break;

      case 'style-update':
        swapStyles(msg.paths, msg.timestamp);
        break;

      case 'reload':
        location.reload();
        break;

      case 'error':
        console.error('[folio]', msg.message);
        showOverlay(msg.message);
        break;
    }}
  }}

  function connect() {{
    const ws = new WebSocket(socketUrl);

    ws.onopen = function() {{
      console.log('[folio] Connected');
      if (dropped) {{
        location.reload();
        return;
      }}
      attempts = 0;
      ws.send(JSON.stringify({{ type: 'connect', id: currentRoute() }}));
    }};

    ws.onmessage = function(event) {{
      try {{
        handle(JSON.parse(event.data));
      }} catch (e) {{
        console.error('[folio] Bad message:', e);
      }}
    }};

    ws.onclose = function() {{
      dropped = true;
      if (attempts >= maxAttempts) {{
        console.log('[folio] Giving up on live updates');
        return;
      }}
      const delay = Math.min(baseDelay * Math.pow(2, attempts), maxDelay);
      attempts++;
      setTimeout(connect, delay);
    }};
  }}

  connect();
}})();
"#,
        socket = SOCKET_PATH,
        base = RECONNECT_BASE_MS,
        max = RECONNECT_MAX_MS,
        attempts = RECONNECT_ATTEMPTS,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_targets_socket_path() {
        let script = client_script();

        assert!(script.contains("'/__folio/ws'"));
        assert!(script.contains("const baseDelay = 500;"));
        assert!(script.contains("case 'style-update':"));
        assert!(script.contains("window.__folio"));
    }

    #[test]
    fn script_compares_decoded_paths() {
        let script = client_script();

        assert!(script.contains("decodeURIComponent(path)"));
        assert!(script.contains("paths.indexOf(decodePath(url.pathname))"));
        assert!(script.contains("decodePath(location.pathname)"));
    }

    #[test]
    fn tag_points_at_script() {
        assert_eq!(script_tag(), r#"<script src="/__folio/client.js"></script>"#);
    }
}
