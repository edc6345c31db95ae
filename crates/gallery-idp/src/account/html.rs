//! Inline HTML templates for the provider's account pages

/// Username/password login form
pub fn login_page(return_url: Option<&str>, username: &str, error: Option<&str>) -> String {
    let return_input = return_url
        .map(|r| format!(r#"<input type="hidden" name="return_url" value="{}">"#, html_escape(r)))
        .unwrap_or_default();
    let error_block = error
        .map(|e| format!(r#"<div class="status error">{}</div>"#, html_escape(e)))
        .unwrap_or_default();

    layout(
        "Login",
        &format!(
            r#"<h1>Login</h1>
        <p>Sign in with your local account.</p>
        {}
        <form method="post" action="/account/login">
            {}
            <div class="field">
                <label for="username">Username</label>
                <input type="text" id="username" name="username" value="{}" required autofocus>
            </div>
            <div class="field">
                <label for="password">Password</label>
                <input type="password" id="password" name="password" required>
            </div>
            <button type="submit">Login</button>
        </form>"#,
            error_block,
            return_input,
            html_escape(username)
        ),
    )
}

/// Shown after logout; links back to the client when it registered a return address
pub fn signed_out_page(post_logout: Option<(&str, &str)>) -> String {
    let link = post_logout
        .map(|(uri, client_name)| {
            format!(
                r#"<p>Click <a href="{}">here</a> to return to {}.</p>"#,
                html_escape(uri),
                html_escape(client_name)
            )
        })
        .unwrap_or_default();

    layout(
        "Logged out",
        &format!(
            r#"<h1>Logout</h1>
        <p>You are now logged out.</p>
        {}"#,
            link
        ),
    )
}

/// Landing page of the provider itself
pub fn home_page(username: Option<&str>) -> String {
    let status = match username {
        Some(name) => format!(
            r#"<p>Signed in as <strong>{}</strong>.</p>
        <p><a href="/account/logout">Logout</a></p>"#,
            html_escape(name)
        ),
        None => r#"<p><a href="/account/login">Login</a></p>"#.to_string(),
    };
    layout("Home", &format!("<h1>Image Gallery IDP</h1>\n        {}", status))
}

/// Error page for requests that cannot be redirected back to a client
pub fn error_page(error: &str, description: &str) -> String {
    layout(
        "Error",
        &format!(
            r#"<h1>Error</h1>
        <p>Sorry, there was an error.</p>
        <div class="status error"><strong>{}</strong><br>{}</div>"#,
            html_escape(error),
            html_escape(description)
        ),
    )
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{} - Image Gallery IDP</title>
    <style>{}</style>
</head>
<body>
    <div class="container">
        {}
    </div>
</body>
</html>"#,
        html_escape(title),
        CSS_STYLES,
        body
    )
}

/// Escape HTML special characters
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

const CSS_STYLES: &str = r#"
body {
    font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
    background: #f4f5f7;
    color: #222;
    margin: 0;
    padding: 40px 20px;
}
.container {
    background: #fff;
    padding: 32px;
    border-radius: 8px;
    max-width: 420px;
    margin: 0 auto;
    box-shadow: 0 2px 8px rgba(0,0,0,0.1);
}
h1 { margin: 0 0 12px 0; font-size: 22px; }
p { color: #555; line-height: 1.5; }
.field { margin-bottom: 16px; }
label { display: block; margin-bottom: 6px; font-size: 14px; }
input {
    width: 100%;
    padding: 10px;
    border: 1px solid #ccc;
    border-radius: 4px;
    font-size: 15px;
    box-sizing: border-box;
}
button {
    width: 100%;
    padding: 12px;
    background: #337ab7;
    color: #fff;
    border: none;
    border-radius: 4px;
    font-size: 15px;
    cursor: pointer;
}
.status.error {
    margin-bottom: 16px;
    padding: 10px;
    border-radius: 4px;
    background: #f2dede;
    color: #a94442;
}
"#;
