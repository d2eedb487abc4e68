use html_escape::encode_text;
use teloxide::types::User;

/// Tries to print the user in the prettiest way possible, with either `@username` or full name
/// that links to the user, HTML-escaped. Optionally allows including user ID.
///
/// Only ever used for reviewers. Submitters stay anonymous.
#[must_use]
pub fn user_name_prettyprint(user: &User, with_id: bool) -> String {
    let mut name = if let Some(username) = &user.username {
        format!("@{username}")
    } else {
        format!(
            "<a href=\"tg://user?id={}\">{}</a>",
            user.id,
            encode_text(&user.full_name())
        )
    };

    if with_id {
        use std::fmt::Write;
        write!(name, " (userid {})", user.id).expect("Writing to a String never fails");
    }

    name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(username: Option<&str>, first_name: &str, last_name: Option<&str>) -> User {
        serde_json::from_value(serde_json::json!({
            "id": 42,
            "is_bot": false,
            "first_name": first_name,
            "last_name": last_name,
            "username": username,
        }))
        .unwrap()
    }

    #[test]
    fn prettyprinting_names() {
        assert_eq!(
            user_name_prettyprint(&user(Some("admin"), "Ad", None), false),
            "@admin"
        );
        assert_eq!(
            user_name_prettyprint(&user(Some("admin"), "Ad", None), true),
            "@admin (userid 42)"
        );
        assert_eq!(
            user_name_prettyprint(&user(None, "<Ad>", Some("Min")), false),
            "<a href=\"tg://user?id=42\">&lt;Ad&gt; Min</a>"
        );
    }
}
