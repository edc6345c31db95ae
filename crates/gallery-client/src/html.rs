//! Inline HTML templates for the gallery pages

use gallery_model::{claims, Image, MAX_TITLE_LEN};

use crate::policy::can_order_frame;
use crate::session::Principal;

/// The signed-in user's images
pub fn gallery_page(principal: &Principal, images: &[Image], api_base_url: &str) -> String {
    let items = if images.is_empty() {
        "<p>No images yet.</p>".to_string()
    } else {
        images
            .iter()
            .map(|image| {
                format!(
                    r#"<div class="image">
            <img src="{base}/images/{file}" alt="{title}">
            <div class="title">{title}</div>
            <a href="/gallery/edit-image/{id}">Edit</a>
            <a href="/gallery/delete-image/{id}">Delete</a>
        </div>"#,
                    base = html_escape(api_base_url),
                    file = html_escape(&image.file_name),
                    title = html_escape(&image.title),
                    id = image.id,
                )
            })
            .collect::<Vec<_>>()
            .join("\n        ")
    };

    layout(
        "Gallery",
        Some(principal),
        &format!("<h1>Image Gallery</h1>\n        {}", items),
    )
}

pub fn edit_image_page(principal: &Principal, id: &str, title: &str, error: Option<&str>) -> String {
    layout(
        "Edit image",
        Some(principal),
        &format!(
            r#"<h1>Edit image</h1>
        {}
        <form method="post" action="/gallery/edit-image">
            <input type="hidden" name="id" value="{}">
            <div class="field">
                <label for="title">Title</label>
                <input type="text" id="title" name="title" value="{}" maxlength="{}" required>
            </div>
            <button type="submit">Save</button>
        </form>"#,
            error_block(error),
            html_escape(id),
            html_escape(title),
            MAX_TITLE_LEN
        ),
    )
}

pub fn add_image_page(principal: &Principal, title: &str, error: Option<&str>) -> String {
    layout(
        "Add image",
        Some(principal),
        &format!(
            r#"<h1>Add an image</h1>
        {}
        <form method="post" action="/gallery/add-image" enctype="multipart/form-data">
            <div class="field">
                <label for="title">Title</label>
                <input type="text" id="title" name="title" value="{}" maxlength="{}" required>
            </div>
            <div class="field">
                <label for="file">Image</label>
                <input type="file" id="file" name="file" accept="image/jpeg" required>
            </div>
            <button type="submit">Add</button>
        </form>"#,
            error_block(error),
            html_escape(title),
            MAX_TITLE_LEN
        ),
    )
}

pub fn order_frame_page(principal: &Principal, address: Option<&str>) -> String {
    let address = address
        .map(html_escape)
        .unwrap_or_else(|| "<em>unknown</em>".to_string());
    layout(
        "Order a framed picture",
        Some(principal),
        &format!(
            r#"<h1>Order a framed picture</h1>
        <p>Your frame will be sent to:</p>
        <p class="address">{}</p>"#,
            address
        ),
    )
}

pub fn access_denied_page() -> String {
    layout(
        "Access denied",
        None,
        r#"<h1>Woops, looks like you're not authorized to view this page.</h1>
        <p><a href="/">Back to the gallery</a></p>"#,
    )
}

pub fn error_page(message: &str) -> String {
    layout(
        "Error",
        None,
        &format!(
            r#"<h1>Error</h1>
        <p>An error occurred while processing your request.</p>
        <div class="status error">{}</div>"#,
            html_escape(message)
        ),
    )
}

fn error_block(error: Option<&str>) -> String {
    error
        .map(|e| format!(r#"<div class="status error">{}</div>"#, html_escape(e)))
        .unwrap_or_default()
}

fn nav(principal: &Principal) -> String {
    let mut links = vec![r#"<a href="/gallery">Gallery</a>"#.to_string()];
    if principal.is_in_role(claims::PAYING_USER) {
        links.push(r#"<a href="/gallery/add-image">Add an image</a>"#.to_string());
    }
    if can_order_frame(principal) {
        links.push(r#"<a href="/gallery/order-frame">Order a framed picture</a>"#.to_string());
    }
    let user = principal
        .name()
        .map(|n| format!("<span>Signed in as {}</span>", html_escape(n)))
        .unwrap_or_default();
    links.push(r#"<a href="/gallery/logout">Logout</a>"#.to_string());

    format!("<nav>{} {}</nav>", links.join(" "), user)
}

fn layout(title: &str, principal: Option<&Principal>, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{} - Image Gallery</title>
    <style>{}</style>
</head>
<body>
    {}
    <div class="container">
        {}
    </div>
</body>
</html>"#,
        html_escape(title),
        CSS_STYLES,
        principal.map(nav).unwrap_or_default(),
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
}
nav {
    background: #2d3e50;
    padding: 12px 20px;
}
nav a, nav span { color: #fff; margin-right: 16px; text-decoration: none; }
.container {
    background: #fff;
    padding: 32px;
    border-radius: 8px;
    max-width: 860px;
    margin: 32px auto;
    box-shadow: 0 2px 8px rgba(0,0,0,0.1);
}
h1 { margin: 0 0 16px 0; font-size: 22px; }
.image { display: inline-block; width: 240px; margin: 0 12px 16px 0; vertical-align: top; }
.image img { width: 100%; border-radius: 4px; background: #eee; min-height: 120px; }
.title { font-weight: 600; margin: 6px 0; }
.field { margin-bottom: 16px; }
label { display: block; margin-bottom: 6px; font-size: 14px; }
input[type=text] { width: 100%; padding: 10px; box-sizing: border-box; }
button {
    background: #2d3e50;
    color: #fff;
    border: none;
    padding: 10px 20px;
    border-radius: 4px;
    cursor: pointer;
}
.status.error { background: #fdecea; color: #a12622; padding: 10px; border-radius: 4px; margin-bottom: 16px; }
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Claim;
    use uuid::Uuid;

    #[test]
    fn test_gallery_page_escapes_titles() {
        let principal = Principal::new(vec![Claim::new("given_name", "Frank")]);
        let images = vec![Image {
            id: Uuid::nil(),
            title: "<script>".into(),
            file_name: "a.jpg".into(),
        }];
        let page = gallery_page(&principal, &images, "https://api.test");
        assert!(page.contains("&lt;script&gt;"));
        assert!(page.contains("https://api.test/images/a.jpg"));
        assert!(page.contains("Signed in as Frank"));
    }

    #[test]
    fn test_nav_follows_policies() {
        let free = Principal::new(vec![Claim::new("role", "FreeUser")]);
        let page = gallery_page(&free, &[], "");
        assert!(!page.contains("/gallery/add-image"));
        assert!(!page.contains("/gallery/order-frame"));

        let claire = Principal::new(vec![
            Claim::new("role", "PayingUser"),
            Claim::new("country", "be"),
            Claim::new("subscriptionlevel", "PayingUser"),
        ]);
        let page = gallery_page(&claire, &[], "");
        assert!(page.contains("/gallery/add-image"));
        assert!(page.contains("/gallery/order-frame"));
    }
}
