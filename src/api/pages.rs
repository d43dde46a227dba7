use axum::http::header::CONTENT_TYPE;
use axum::response::{Html, IntoResponse};

const INDEX_HTML: &str = include_str!("../../templates/index.html");
const ABOUT_HTML: &str = include_str!("../../templates/about.html");
const CHAT_HTML: &str = include_str!("../../templates/chat.html");

const CHAT_JS: &str = include_str!("../../static/chat.js");
const STYLE_CSS: &str = include_str!("../../static/style.css");

pub async fn home() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn about() -> Html<&'static str> {
    Html(ABOUT_HTML)
}

pub async fn chat() -> Html<&'static str> {
    Html(CHAT_HTML)
}

pub async fn chat_script() -> impl IntoResponse {
    ([(CONTENT_TYPE, "text/javascript; charset=utf-8")], CHAT_JS)
}

pub async fn stylesheet() -> impl IntoResponse {
    ([(CONTENT_TYPE, "text/css; charset=utf-8")], STYLE_CSS)
}
