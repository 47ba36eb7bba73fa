//! Informational HTML pages shown to the browser.

use axum::response::Html;

const HEAD: &str = "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Vouch</title></head>\n<body>\n";
const TAIL: &str = "</body>\n</html>\n";

/// A page with a single escaped message.
pub fn message(msg: &str) -> Html<String> {
    Html(format!("{HEAD}<p>{}</p>\n{TAIL}", escape(msg)))
}

/// A page with a message followed by a link.
pub fn message_with_link(msg: &str, href: &str, text: &str) -> Html<String> {
    Html(format!(
        "{HEAD}<p>{} <a href=\"{}\">{}</a>.</p>\n{TAIL}",
        escape(msg),
        escape(href),
        escape(text)
    ))
}

/// Testing mode stand-in for a 302.
pub fn redirect(url: &str) -> Html<String> {
    Html(format!(
        "{HEAD}<p>302 redirect to: <a href=\"{href}\">{text}</a></p>\n{TAIL}",
        href = escape(url),
        text = escape(url)
    ))
}

pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
