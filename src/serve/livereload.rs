// src/serve/livereload.rs

//! Live-reload messages and the browser client.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::{BuildEvent, TaskName};
use crate::types::ReloadKind;

/// Path of the Server-Sent Events stream.
pub const EVENTS_PATH: &str = "/__assetpipe/events";
/// Path of the client script injected into HTML pages.
pub const CLIENT_PATH: &str = "/__assetpipe/client.js";

/// What connected browsers are told to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReloadMessage {
    pub kind: ReloadKind,
    pub task: TaskName,
    pub files: Vec<PathBuf>,
}

/// Message for a finished task, if any.
///
/// Failed tasks never reload clients; the error is logged instead.
pub fn reload_for(event: &BuildEvent) -> Option<ReloadMessage> {
    if let Some(err) = &event.error {
        warn!(task = %event.task, error = %err, "build failed; not reloading clients");
        return None;
    }
    if event.reload == ReloadKind::None {
        debug!(task = %event.task, "task does not reload clients");
        return None;
    }
    Some(ReloadMessage {
        kind: event.reload,
        task: event.task.clone(),
        files: event.outputs.clone(),
    })
}

/// Insert the client `<script>` before the last `</body>` (or append it).
pub fn inject_client(html: &str) -> String {
    let tag = format!(r#"<script src="{CLIENT_PATH}"></script>"#);
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..pos]);
            out.push_str(&tag);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{html}{tag}"),
    }
}

/// Browser side of the live-reload channel.
pub const CLIENT_JS: &str = r#"(function () {
  if (!window.EventSource) { return; }
  var source = new EventSource("/__assetpipe/events");

  function refreshStyles() {
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    var stamp = Date.now();
    for (var i = 0; i < links.length; i++) {
      var href = links[i].getAttribute("href");
      if (!href) { continue; }
      var base = href.replace(/([?&])__assetpipe=\d+&?/, "$1").replace(/[?&]$/, "");
      links[i].setAttribute("href", base + (base.indexOf("?") < 0 ? "?" : "&") + "__assetpipe=" + stamp);
    }
  }

  source.addEventListener("reload", function (e) {
    var msg = JSON.parse(e.data);
    if (msg.kind === "styles") {
      refreshStyles();
    } else if (msg.kind === "scripts") {
      var evt = new CustomEvent("assetpipe:scripts", { detail: msg, cancelable: true });
      if (window.dispatchEvent(evt)) { window.location.reload(); }
    } else if (msg.kind === "page") {
      window.location.reload();
    }
  });
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event(reload: ReloadKind, error: Option<&str>) -> BuildEvent {
        BuildEvent {
            run_id: 1,
            task: "styles".into(),
            duration: Duration::from_millis(5),
            error: error.map(str::to_string),
            reload,
            outputs: vec![PathBuf::from(".tmp/styles/main.css")],
        }
    }

    #[test]
    fn reload_kind_follows_the_event() {
        let msg = reload_for(&event(ReloadKind::Styles, None)).unwrap();
        assert_eq!(msg.kind, ReloadKind::Styles);
        assert_eq!(msg.files, vec![PathBuf::from(".tmp/styles/main.css")]);
        assert_eq!(reload_for(&event(ReloadKind::Page, None)).unwrap().kind, ReloadKind::Page);
        assert!(reload_for(&event(ReloadKind::None, None)).is_none());
    }

    #[test]
    fn failed_builds_do_not_reload() {
        assert!(reload_for(&event(ReloadKind::Page, Some("sass exited with code 1"))).is_none());
    }

    #[test]
    fn client_goes_before_closing_body() {
        let html = "<html><BODY><p>hi</p></BODY></html>";
        assert_eq!(
            inject_client(html),
            r#"<html><BODY><p>hi</p><script src="/__assetpipe/client.js"></script></BODY></html>"#
        );
        assert!(inject_client("<p>fragment</p>").ends_with("</script>"));
    }

    #[test]
    fn message_serializes_with_lowercase_kind() {
        let msg = reload_for(&event(ReloadKind::Scripts, None)).unwrap();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "scripts");
        assert_eq!(json["task"], "styles");
    }
}
