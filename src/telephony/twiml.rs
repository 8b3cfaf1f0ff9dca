//! TwiML responses for Twilio voice webhooks.

/// Path of the media stream WebSocket route.
pub const MEDIA_STREAM_PATH: &str = "/media-stream";

/// WebSocket URL carriers should stream call audio to.
///
/// `host` may carry a scheme (`https://relay.example.com`), which is swapped
/// for the matching WebSocket scheme; a bare host gets `wss://`.
pub fn media_stream_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    let (scheme, rest) = if let Some(rest) = host.strip_prefix("https://") {
        ("wss", rest)
    } else if let Some(rest) = host.strip_prefix("http://") {
        ("ws", rest)
    } else if let Some(rest) = host.strip_prefix("wss://") {
        ("wss", rest)
    } else if let Some(rest) = host.strip_prefix("ws://") {
        ("ws", rest)
    } else {
        ("wss", host)
    };
    format!("{scheme}://{rest}{MEDIA_STREAM_PATH}")
}

/// TwiML that connects the call to a bidirectional media stream.
pub fn connect_stream(stream_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Connect>
    <Stream url="{}"/>
  </Connect>
</Response>"#,
        escape_xml(stream_url)
    )
}

fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
