//! Static page shells. The playground front end is served separately; these
//! exist so the public and guarded UI paths answer with something real.

use axum::response::Html;

fn shell(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body><main id=\"app\" data-page=\"{title}\">{body}</main></body></html>"
    ))
}

pub async fn home() -> Html<String> {
    shell("AI Playground", "<a href=\"/login\">Log in</a> <a href=\"/signup\">Sign up</a>")
}

pub async fn login() -> Html<String> {
    shell("Log in", "")
}

pub async fn signup() -> Html<String> {
    shell("Sign up", "")
}

pub async fn playground() -> Html<String> {
    shell("Playground", "")
}

pub async fn health() -> &'static str {
    "ok"
}
