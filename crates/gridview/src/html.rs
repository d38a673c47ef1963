//! HTML document loaded into the webview.
//!
//! The page is self-contained: inline style and script, both allowed only
//! through a per-panel nonce. The script posts `connected` on load and
//! `refresh` on demand to `gridview://localhost/message`, and exposes
//! `globalThis.onMessage` for the host to push `update` messages.

/// Custom protocol scheme the webview is served from.
pub const SCHEME: &str = "gridview";

/// Path the webview posts bridge messages to.
pub const MESSAGE_PATH: &str = "/message";

/// A fresh 32-character nonce.
pub fn nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Content-Security-Policy for a page rendered with `nonce`.
pub fn content_security_policy(nonce: &str) -> String {
    format!(
        "default-src 'none'; style-src 'nonce-{nonce}'; script-src 'nonce-{nonce}'; connect-src {SCHEME}:"
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Render the grid page.
pub fn render(title: &str, nonce: &str, column_width: u32) -> String {
    let csp = content_security_policy(nonce);
    let title = escape_html(title);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta http-equiv="Content-Security-Policy" content="{csp}">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<style nonce="{nonce}">
  body {{ font-family: system-ui, sans-serif; font-size: 13px; margin: 0; }}
  header {{ display: flex; gap: 8px; align-items: center; padding: 6px 8px; border-bottom: 1px solid #ddd; }}
  #status {{ color: #a00; }}
  #grid {{ overflow: auto; position: absolute; top: 38px; bottom: 0; left: 0; right: 0; }}
  table {{ border-collapse: collapse; table-layout: fixed; }}
  th, td {{ width: {column_width}px; max-width: {column_width}px; overflow: hidden; text-overflow: ellipsis;
           white-space: nowrap; border: 1px solid #e4e4e4; padding: 2px 6px; text-align: left; }}
  th {{ position: sticky; top: 0; background: #f6f6f6; }}
</style>
</head>
<body>
<header>
  <strong>{title}</strong>
  <button id="refresh" type="button">Refresh</button>
  <span id="status"></span>
</header>
<div id="grid"></div>
<script nonce="{nonce}">
  const endpoint = "{SCHEME}://localhost{MESSAGE_PATH}";
  function post(message) {{
    fetch(endpoint, {{ method: "POST", body: JSON.stringify(message) }});
  }}
  function render(payload) {{
    const columns = payload.columns || [];
    const rows = payload.data || [];
    const table = document.createElement("table");
    const head = table.createTHead().insertRow();
    for (const column of columns) {{
      const th = document.createElement("th");
      th.textContent = column;
      head.appendChild(th);
    }}
    const body = table.createTBody();
    for (const row of rows) {{
      const tr = body.insertRow();
      for (let col = 0; col < columns.length; col++) {{
        tr.insertCell().textContent = String(row[col]);
      }}
    }}
    document.getElementById("grid").replaceChildren(table);
    document.getElementById("status").textContent = payload.error || "";
  }}
  globalThis.onMessage = (message) => {{
    if (message.command === "update") {{
      render(message.data);
    }}
  }};
  document.getElementById("refresh").addEventListener("click", () => {{
    post({{ command: "refresh", text: "refresh" }});
  }});
  post({{ command: "connected" }});
</script>
</body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_is_32_alphanumeric() {
        let n = nonce();
        assert_eq!(n.len(), 32);
        assert!(n.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(n, nonce());
    }

    #[test]
    fn test_script_and_style_carry_nonce() {
        let html = render("df", "abc123", 100);
        assert!(html.contains("script-src 'nonce-abc123'"));
        assert!(html.contains(r#"<script nonce="abc123">"#));
        assert!(html.contains(r#"<style nonce="abc123">"#));
        assert!(html.contains("gridview://localhost/message"));
    }

    #[test]
    fn test_title_is_escaped() {
        let html = render("<b>df</b>", "n", 100);
        assert!(html.contains("&lt;b&gt;df&lt;/b&gt;"));
        assert!(!html.contains("<title><b>"));
    }
}
